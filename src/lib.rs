//  _______  _______  ______   _______           _       _________
// (       )(  ___  )(  __  \ (  ____ \|\     /|( (    /|\__   __/|\     /|
// | () () || (   ) || (  \  )| (    \/( \   / )|  \  ( |   ) (   | )   ( |
// | || || || |   | || |   ) || (_____  \ (_) / |   \ | |   | |   | (___) |
// | |(_)| || |   | || |   | |(_____  )  \   /  | (\ \) |   | |   |  ___  |
// | |   | || |   | || |   ) |      ) |   ) (   | | \   |   | |   | (   ) |
// | )   ( || (___) || (__/  )/\____) |   | |   | )  \  |   | |   | )   ( |
// |/     \|(_______)(______/ \_______)   \_/   |/    )_)   )_(   |/     \|

pub mod error;
pub mod utils;
pub mod waveform;
pub mod instrument;
pub mod pattern;
pub mod module;
pub mod effects;
pub mod channel;
pub mod tracker;
pub mod engine;
pub mod render;

pub use error::ModError;
pub use waveform::WaveformType;
pub use instrument::Sample;
pub use pattern::{Note, Pattern, NUM_CHANNELS, NUM_ROWS};
pub use module::Module;
pub use effects::{Command, Effect};
pub use channel::Channel;
pub use tracker::Tracker;
pub use engine::{ModPlayer, PlaybackState, PlaybackParameters, ScopeSnapshot, StreamBuffer};
pub use render::{render_song, write_wav, export_wav};
