use std::sync::Arc;

use tracing::warn;

use crate::channel::Channel;
use crate::effects::{Command, Effect};
use crate::module::Module;
use crate::pattern::{Note, NUM_CHANNELS, NUM_ROWS};

pub const DEFAULT_SPEED: i32 = 6;
pub const DEFAULT_TEMPO: u32 = 125;
pub const MIN_SAMPLE_RATE: u32 = 8000;

const DEFAULT_PANNING: [i32; NUM_CHANNELS] = [64, 192, 192, 64];

#[derive(Debug, Clone)]
pub struct Tracker {
    module: Arc<Module>,
    sample_rate: u32,
    channels: [Channel; NUM_CHANNELS],
    tick_len: f64,
    tick_carry: f64,
    tick_frames: usize,
    tick_offset: usize,
    current_sequence_index: usize,
    next_sequence_index: usize,
    current_row: usize,
    next_row: usize,
    tick_counter: i32,
    ticks_per_row: i32,
    pattern_loop_count: i32, // negative when no loop is running
    pattern_loop_channel: usize,
    restarted: bool,
}

impl Tracker {
    pub fn new(module: Arc<Module>, sample_rate: u32) -> Self {
        let sample_rate = if sample_rate < MIN_SAMPLE_RATE {
            warn!("Sample rate {} Hz too low, using {} Hz", sample_rate, MIN_SAMPLE_RATE);
            MIN_SAMPLE_RATE
        } else {
            sample_rate
        };
        let channels = std::array::from_fn(|i| Channel::new(i, Arc::clone(&module), sample_rate));

        let mut tracker = Tracker {
            module,
            sample_rate,
            channels,
            tick_len: 0.0,
            tick_carry: 0.0,
            tick_frames: 0,
            tick_offset: 0,
            current_sequence_index: 0,
            next_sequence_index: 0,
            current_row: 0,
            next_row: 0,
            tick_counter: 0,
            ticks_per_row: DEFAULT_SPEED,
            pattern_loop_count: -1,
            pattern_loop_channel: 0,
            restarted: true,
        };
        tracker.set_sequence_index(0);
        tracker
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    pub fn sequence_index(&self) -> usize {
        self.current_sequence_index
    }

    pub fn row(&self) -> usize {
        self.current_row
    }

    pub fn ticks_per_row(&self) -> i32 {
        self.ticks_per_row
    }

    // frames per tick before rounding
    pub fn tick_len(&self) -> f64 {
        self.tick_len
    }

    pub fn set_sequence_index(&mut self, pos: usize) {
        for (channel, panning) in self.channels.iter_mut().zip(DEFAULT_PANNING) {
            channel.reset();
            channel.set_panning(panning);
        }
        self.ticks_per_row = DEFAULT_SPEED;
        self.set_tempo(DEFAULT_TEMPO);
        self.tick_carry = 0.0;
        self.tick_frames = 0;
        self.tick_offset = 0;
        self.pattern_loop_count = -1;
        self.next_sequence_index = pos;
        self.next_row = 0;
        self.tick_counter = 0;
        self.restarted = true;
    }

    pub fn set_tempo(&mut self, bpm: u32) {
        let bpm = bpm.clamp(32, 255);
        self.tick_len = (self.sample_rate as f64 * 5.0) / (bpm as f64 * 2.0);
    }

    /// Total song length in frames, from the start until it ends or loops.
    /// Leaves the tracker rewound to the start.
    pub fn song_duration(&mut self) -> usize {
        self.set_sequence_index(0);
        let mut duration = 0;
        while !self.next_tick() {
            duration += self.tick_frames;
        }
        self.set_sequence_index(0);
        duration
    }

    /// Mixes at most one tick of audio into `out` (interleaved L/R, overwritten).
    /// Returns the number of frames written; a tick longer than `out` is
    /// finished by the next call.
    pub fn read(&mut self, out: &mut [i32]) -> usize {
        if self.tick_offset >= self.tick_frames {
            self.next_tick();
            self.tick_offset = 0;
        }
        let frames = (self.tick_frames - self.tick_offset).min(out.len() / 2);
        out[..frames * 2].fill(0);
        for channel in &self.channels {
            channel.resample(&mut out[..frames * 2], frames, self.tick_offset);
        }
        self.tick_offset += frames;
        frames
    }

    pub fn render(&mut self, out: &mut [i32]) {
        let mut offset = 0;
        while offset + 1 < out.len() {
            offset += self.read(&mut out[offset..]) * 2;
        }
    }

    /// Advances one tick. Returns true when the song ended or looped.
    pub fn next_tick(&mut self) -> bool {
        for channel in self.channels.iter_mut() {
            channel.update_sample_index(self.tick_frames);
        }
        self.tick_counter -= 1;
        let song_end = if self.tick_counter <= 0 {
            self.tick_counter = self.ticks_per_row;
            self.next_row()
        } else {
            for channel in self.channels.iter_mut() {
                channel.tick();
            }
            false
        };

        let exact = self.tick_len + self.tick_carry;
        let frames = exact.floor();
        self.tick_carry = exact - frames;
        self.tick_frames = frames as usize;
        song_end
    }

    fn next_row(&mut self) -> bool {
        let sequence_length = self.module.sequence_length;
        let mut song_end = false;

        if self.next_sequence_index >= sequence_length {
            song_end = true;
            self.next_sequence_index = self.module.restart;
            if self.next_sequence_index >= sequence_length {
                self.next_sequence_index = 0;
            }
            self.next_row = 0;
        }
        if self.next_sequence_index < self.current_sequence_index {
            song_end = true;
        }
        if self.next_sequence_index == self.current_sequence_index
            && self.next_row <= self.current_row
            && self.pattern_loop_count < 0
        {
            song_end = true;
        }
        if self.restarted {
            song_end = false;
            self.restarted = false;
        }

        if self.next_sequence_index != self.current_sequence_index {
            for channel in self.channels.iter_mut() {
                channel.pattern_loop_row = 0;
            }
        }
        self.current_sequence_index = self.next_sequence_index;

        if self.next_row >= NUM_ROWS {
            self.next_row = 0;
        }
        self.current_row = self.next_row;
        self.next_row += 1;
        if self.next_row >= NUM_ROWS {
            self.next_sequence_index = self.current_sequence_index + 1;
            self.next_row = 0;
        }

        let Some(pattern) = self.module.sequence_pattern(self.current_sequence_index) else {
            return true;
        };
        let mut notes = [Note::default(); NUM_CHANNELS];
        notes.copy_from_slice(pattern.row(self.current_row));

        for (index, note) in notes.iter().enumerate() {
            self.channels[index].row(note);
            self.sequence_effect(index, Command::from_note(note));
        }
        song_end
    }

    fn sequence_effect(&mut self, channel: usize, command: Command) {
        let param = command.param;
        match command.effect {
            Effect::PositionJump => {
                if self.pattern_loop_count < 0 {
                    self.next_sequence_index = param as usize;
                    self.next_row = 0;
                }
            }
            Effect::PatternBreak => {
                if self.pattern_loop_count < 0 {
                    self.next_sequence_index = self.current_sequence_index + 1;
                    self.next_row = ((param >> 4) * 10 + (param & 0x0F)) as usize;
                }
            }
            Effect::PatternLoop => {
                let row = self.current_row;
                if param == 0 {
                    self.channels[channel].pattern_loop_row = row;
                }
                if self.channels[channel].pattern_loop_row < row {
                    if self.pattern_loop_count < 0 {
                        self.pattern_loop_count = param as i32;
                        self.pattern_loop_channel = channel;
                    }
                    if self.pattern_loop_channel == channel {
                        if self.pattern_loop_count == 0 {
                            self.channels[channel].pattern_loop_row = row + 1;
                        } else {
                            self.next_row = self.channels[channel].pattern_loop_row;
                            self.next_sequence_index = self.current_sequence_index;
                        }
                        self.pattern_loop_count -= 1;
                    }
                }
            }
            Effect::PatternDelay => {
                self.tick_counter += self.ticks_per_row * param as i32;
            }
            Effect::SetSpeed => {
                if param < 32 {
                    if param > 0 {
                        self.ticks_per_row = param as i32;
                    }
                    self.tick_counter = self.ticks_per_row;
                } else {
                    self.set_tempo(param as u32);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{Sample, C2_RATE};
    use crate::pattern::Pattern;

    const TICK: usize = 882; // 44100 Hz at 125 BPM
    const ROW: usize = 6 * TICK;

    fn tone() -> Sample {
        let data: Vec<i8> = (0..256).map(|i| if i % 16 < 8 { 90 } else { -90 }).collect();
        Sample::new("tone".to_string(), C2_RATE, 0, 64, 0, 256, Arc::from(data))
    }

    fn song(sequence: Vec<u8>, restart: usize, patterns: Vec<Pattern>) -> Arc<Module> {
        Arc::new(Module::from_parts("song".to_string(), sequence, restart, patterns, vec![tone()]))
    }

    fn single(notes: &[(usize, usize, Note)]) -> Arc<Module> {
        let mut pattern = Pattern::default();
        for &(row, channel, note) in notes {
            pattern.set_note(row, channel, note);
        }
        song(vec![0], 0, vec![pattern])
    }

    fn fx(effect: u8, param: u8) -> Note {
        Note::new(0, 0, effect, param)
    }

    #[test]
    fn empty_pattern_duration() {
        let mut tracker = Tracker::new(single(&[]), 44100);
        assert_eq!(tracker.tick_len(), TICK as f64);
        assert_eq!(tracker.song_duration(), 64 * ROW);
    }

    #[test]
    fn duration_leaves_tracker_at_start() {
        let mut tracker = Tracker::new(single(&[(0, 0, Note::new(49, 1, 0, 0))]), 44100);
        tracker.song_duration();
        assert_eq!(tracker.ticks_per_row(), DEFAULT_SPEED);
        assert!(!tracker.next_tick());
        assert_eq!((tracker.sequence_index(), tracker.row()), (0, 0));
    }

    #[test]
    fn speed_and_tempo() {
        let mut tracker = Tracker::new(single(&[(0, 0, fx(0xF, 3))]), 44100);
        assert_eq!(tracker.song_duration(), 64 * 3 * TICK);

        let mut tracker = Tracker::new(single(&[(0, 1, fx(0xF, 150))]), 44100);
        assert_eq!(tracker.song_duration(), 64 * 6 * 735);
    }

    #[test]
    fn speed_zero_keeps_current_speed() {
        let mut tracker = Tracker::new(single(&[(0, 0, fx(0xF, 0))]), 44100);
        assert_eq!(tracker.song_duration(), 64 * ROW);
    }

    #[test]
    fn pattern_loop_repeats_rows() {
        let mut tracker = Tracker::new(single(&[(0, 0, fx(0xE, 0x60)), (1, 0, fx(0xE, 0x62))]), 44100);
        assert_eq!(tracker.song_duration(), (64 + 4) * ROW);
    }

    #[test]
    fn backward_jump_ends_song() {
        let mut tracker = Tracker::new(single(&[(10, 2, fx(0xB, 0))]), 44100);
        assert_eq!(tracker.song_duration(), 11 * ROW);
    }

    #[test]
    fn pattern_break_uses_decimal_row() {
        let mut first = Pattern::default();
        first.set_note(0, 3, fx(0xD, 0x32));
        let mut tracker = Tracker::new(song(vec![0, 1], 0, vec![first, Pattern::default()]), 44100);
        assert_eq!(tracker.song_duration(), (1 + 32) * ROW);
    }

    #[test]
    fn pattern_delay_stretches_row() {
        let mut tracker = Tracker::new(single(&[(0, 0, fx(0xE, 0xE2))]), 44100);
        assert_eq!(tracker.song_duration(), (64 + 12) * ROW);
    }

    #[test]
    fn song_wraps_to_restart_position() {
        let module = song(vec![0, 1, 0], 1, vec![Pattern::default(), Pattern::default()]);
        let mut tracker = Tracker::new(module, 44100);
        assert_eq!(tracker.song_duration(), 3 * 64 * ROW);
        while !tracker.next_tick() {}
        assert_eq!((tracker.sequence_index(), tracker.row()), (1, 0));
    }

    #[test]
    fn empty_sequence_is_silent() {
        let module = Arc::new(Module::from_parts("none".to_string(), vec![], 0, vec![], vec![tone()]));
        let mut tracker = Tracker::new(module, 44100);
        assert_eq!(tracker.song_duration(), 0);
        let mut out = vec![1i32; 2000];
        tracker.render(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn tempo_is_clamped() {
        let mut tracker = Tracker::new(single(&[]), 44100);
        tracker.set_tempo(0);
        assert_eq!(tracker.tick_len(), 44100.0 * 5.0 / 64.0);
        assert!(!tracker.next_tick());
        tracker.set_tempo(1000);
        assert_eq!(tracker.tick_len(), 44100.0 * 5.0 / 510.0);
    }

    #[test]
    fn low_sample_rate_is_clamped() {
        assert_eq!(Tracker::new(single(&[]), 4000).sample_rate(), MIN_SAMPLE_RATE);
    }

    #[test]
    fn read_returns_at_most_one_tick() {
        let mut tracker = Tracker::new(single(&[(0, 0, Note::new(49, 1, 0, 0))]), 44100);
        let mut out = vec![0i32; 4000 * 2];
        assert_eq!(tracker.read(&mut out), TICK);

        let mut small = vec![0i32; 100 * 2];
        let mut frames = Vec::new();
        for _ in 0..10 {
            frames.push(tracker.read(&mut small));
        }
        assert_eq!(frames, vec![100, 100, 100, 100, 100, 100, 100, 100, 82, 100]);
    }

    #[test]
    fn chunk_size_does_not_change_output() {
        let module = single(&[(0, 0, Note::new(49, 1, 0, 0)), (0, 1, Note::new(56, 1, 4, 0x46))]);
        let mut whole = Tracker::new(Arc::clone(&module), 44100);
        let mut chunked = Tracker::new(module, 44100);

        let mut expected = vec![0i32; 3 * ROW * 2];
        whole.render(&mut expected);

        let mut actual = Vec::with_capacity(expected.len());
        let mut buf = vec![0i32; 333 * 2];
        while actual.len() < expected.len() {
            let frames = chunked.read(&mut buf);
            actual.extend_from_slice(&buf[..frames * 2]);
        }
        actual.truncate(expected.len());
        assert_eq!(actual, expected);
    }

    #[test]
    fn left_channel_pans_left() {
        let mut tracker = Tracker::new(single(&[(0, 0, Note::new(49, 1, 0, 0))]), 44100);
        let mut out = vec![0i32; TICK * 2];
        tracker.render(&mut out);
        let left: i64 = out.chunks(2).map(|f| (f[0] as i64).abs()).sum();
        let right: i64 = out.chunks(2).map(|f| (f[1] as i64).abs()).sum();
        assert!(left > 0);
        assert!(left > right * 2);
    }

    #[test]
    fn zero_volume_is_silent() {
        let mut tracker = Tracker::new(single(&[(0, 2, Note::new(49, 1, 0xC, 0))]), 44100);
        let mut out = vec![0i32; 2 * ROW * 2];
        tracker.render(&mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn set_sequence_index_jumps() {
        let module = song(vec![0, 1], 0, vec![Pattern::default(), Pattern::default()]);
        let mut tracker = Tracker::new(module, 44100);
        tracker.set_sequence_index(1);
        assert!(!tracker.next_tick());
        assert_eq!(tracker.sequence_index(), 1);
        assert_eq!(tracker.channel(1).panning(), 192);
    }
}
