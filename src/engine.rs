use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tracing::{debug, error, info};

use crate::error::ModError;
use crate::module::Module;
use crate::tracker::Tracker;

const MIX_FRAMES: usize = 2048; // per tracker read

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackParameters {
    pub master_volume: f32,
    pub buffer_seconds: f32, // ring length
}

impl Default for PlaybackParameters {
    fn default() -> Self {
        PlaybackParameters {
            master_volume: 1.0,
            buffer_seconds: 5.0,
        }
    }
}

impl PlaybackParameters {
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 2.0);
    }
}

#[derive(Debug, Clone)]
pub struct StreamBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
    position: usize,
    remaining: usize,
    mix: Vec<i32>,
}

impl StreamBuffer {
    pub fn new(frames: usize) -> Self {
        let frames = frames.max(MIX_FRAMES);
        StreamBuffer {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
            position: 0,
            remaining: 0,
            mix: vec![0; MIX_FRAMES * 2],
        }
    }

    pub fn with_seconds(seconds: f32, sample_rate: u32) -> Self {
        StreamBuffer::new((seconds.max(0.0) * sample_rate as f32) as usize)
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    // rendered but not yet played
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Renders whole ticks after the unread frames until at least `wanted`
    /// frames are buffered or the ring has no room for another read.
    pub fn fill(&mut self, tracker: &mut Tracker, wanted: usize) {
        let len = self.len();
        let mut write = (self.position + self.remaining) % len;
        while self.remaining < wanted && len - self.remaining >= MIX_FRAMES {
            let frames = tracker.read(&mut self.mix);
            for frame in self.mix[..frames * 2].chunks_exact(2) {
                self.left[write] = frame[0] as f32 / 32768.0;
                self.right[write] = frame[1] as f32 / 32768.0;
                write = (write + 1) % len;
            }
            self.remaining += frames;
        }
    }

    pub fn next_frame(&mut self, tracker: &mut Tracker) -> (f32, f32) {
        if self.remaining == 0 {
            self.fill(tracker, 1);
        }
        let frame = (self.left[self.position], self.right[self.position]);
        self.position = (self.position + 1) % self.len();
        self.remaining = self.remaining.saturating_sub(1);
        frame
    }

    pub fn clear(&mut self) {
        self.position = 0;
        self.remaining = 0;
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    pub fn snapshot(&self, frames: usize) -> ScopeSnapshot {
        let len = self.len();
        let frames = frames.min(len);
        let (left, right) = (0..frames)
            .map(|i| {
                let at = (self.position + i) % len;
                (self.left[at], self.right[at])
            })
            .unzip();
        ScopeSnapshot { left, right, position: self.position }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeSnapshot {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub position: usize,
}

struct PlaybackContext {
    module: Arc<Module>,
    tracker: Tracker,
    buffer: StreamBuffer,
    state: PlaybackState,
    params: PlaybackParameters,
    frames_played: u64,
    duration: f32,
}

impl PlaybackContext {
    fn render(&mut self, data: &mut [f32], channels: usize) {
        if self.state != PlaybackState::Playing {
            data.fill(0.0);
            return;
        }
        let volume = self.params.master_volume;
        self.buffer.fill(&mut self.tracker, data.len() / channels.max(1));
        for frame in data.chunks_mut(channels) {
            let (left, right) = self.buffer.next_frame(&mut self.tracker);
            match frame {
                [mono] => *mono = (left + right) * 0.5 * volume,
                [l, r, rest @ ..] => {
                    *l = left * volume;
                    *r = right * volume;
                    rest.fill(0.0);
                }
                [] => {}
            }
            self.frames_played += 1;
        }
    }
}

pub struct ModPlayer {
    stream_config: StreamConfig,
    sample_rate: u32,
    params: PlaybackParameters,
    playback_context: Arc<Mutex<Option<PlaybackContext>>>,
    stream: Option<Stream>,
}

impl ModPlayer {
    pub fn new() -> Result<Self, ModError> {
        ModPlayer::with_parameters(PlaybackParameters::default())
    }

    pub fn with_parameters(params: PlaybackParameters) -> Result<Self, ModError> {
        let host = cpal::default_host();
        let device = host.default_output_device()
            .ok_or_else(|| ModError::AudioError("No output device found".to_string()))?;
        let config = device.default_output_config()
            .map_err(|e| ModError::AudioError(e.to_string()))?;
        let stream_config = config.config();
        debug!(
            "Output device: {} Hz, {} channels",
            stream_config.sample_rate.0, stream_config.channels
        );

        Ok(ModPlayer {
            sample_rate: stream_config.sample_rate.0,
            stream_config,
            params,
            playback_context: Arc::new(Mutex::new(None)),
            stream: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn context(&self) -> MutexGuard<'_, Option<PlaybackContext>> {
        self.playback_context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<Arc<Module>, ModError> {
        let data = std::fs::read(path.as_ref())
            .map_err(|e| ModError::FileError(format!("{}: {}", path.as_ref().display(), e)))?;
        self.load(&data)
    }

    /// Parses `data` and replaces whatever was loaded. Playback state carries
    /// over, so a playing player goes straight on with the new song.
    pub fn load(&mut self, data: &[u8]) -> Result<Arc<Module>, ModError> {
        let module = Arc::new(Module::parse(data)?);
        let tracker = Tracker::new(Arc::clone(&module), self.sample_rate);
        let duration = tracker.clone().song_duration() as f32 / tracker.sample_rate() as f32;
        let buffer = StreamBuffer::with_seconds(self.params.buffer_seconds, self.sample_rate);
        info!("Loaded '{}' ({:.1} s)", module.title, duration);

        let mut context = self.context();
        let state = context.as_ref().map_or(PlaybackState::Stopped, |ctx| ctx.state);
        let params = context.as_ref().map_or(self.params, |ctx| ctx.params);
        *context = Some(PlaybackContext {
            module: Arc::clone(&module),
            tracker,
            buffer,
            state,
            params,
            frames_played: 0,
            duration,
        });
        Ok(module)
    }

    pub fn play(&mut self) -> Result<(), ModError> {
        match self.context().as_mut() {
            Some(ctx) => ctx.state = PlaybackState::Playing,
            None => return Err(ModError::AudioError("No module loaded".to_string())),
        }
        if self.stream.is_none() {
            self.start_stream()?;
        }
        Ok(())
    }

    pub fn pause(&self) {
        if let Some(ctx) = self.context().as_mut() {
            if ctx.state == PlaybackState::Playing {
                ctx.state = PlaybackState::Paused;
            }
        }
    }

    pub fn resume(&self) {
        if let Some(ctx) = self.context().as_mut() {
            if ctx.state == PlaybackState::Paused {
                ctx.state = PlaybackState::Playing;
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        if let Some(ctx) = self.context().as_mut() {
            ctx.state = PlaybackState::Stopped;
            ctx.tracker.set_sequence_index(0);
            ctx.buffer.clear();
            ctx.frames_played = 0;
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.params.set_master_volume(volume);
        if let Some(ctx) = self.context().as_mut() {
            ctx.params.set_master_volume(volume);
        }
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.context().as_ref().map_or(PlaybackState::Stopped, |ctx| ctx.state)
    }

    pub fn playback_position(&self) -> f32 {
        self.context()
            .as_ref()
            .map_or(0.0, |ctx| ctx.frames_played as f32 / self.sample_rate as f32)
    }

    pub fn song_duration(&self) -> f32 {
        self.context().as_ref().map_or(0.0, |ctx| ctx.duration)
    }

    pub fn module(&self) -> Option<Arc<Module>> {
        self.context().as_ref().map(|ctx| Arc::clone(&ctx.module))
    }

    pub fn scope(&self, frames: usize) -> ScopeSnapshot {
        self.context()
            .as_ref()
            .map(|ctx| ctx.buffer.snapshot(frames))
            .unwrap_or_default()
    }

    fn start_stream(&mut self) -> Result<(), ModError> {
        let host = cpal::default_host();
        let device = host.default_output_device()
            .ok_or_else(|| ModError::AudioError("No output device".to_string()))?;

        let config = self.stream_config.clone();
        let channels = config.channels as usize;
        let ctx = Arc::clone(&self.playback_context);

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut context = ctx.lock().unwrap_or_else(PoisonError::into_inner);
                match context.as_mut() {
                    Some(context) => context.render(data, channels),
                    None => data.fill(0.0),
                }
            },
            |err| error!("Stream error: {}", err),
            None,
        ).map_err(|e| ModError::AudioError(e.to_string()))?;

        stream.play().map_err(|e| ModError::AudioError(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }
}
