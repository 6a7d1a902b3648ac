use std::sync::Arc;

use crate::effects::{Command, Effect};
use crate::instrument::Sample;
use crate::module::Module;
use crate::pattern::Note;
use crate::utils::{key_to_period, playback_step, FP_MASK, FP_ONE, FP_SHIFT, MAX_KEY, MAX_PERIOD, MIN_PERIOD};
use crate::waveform::{resets_on_note, waveform};

const CHANNEL_GAIN: i32 = 0x3000; // headroom for four voices
const FADE_OUT_FULL: i32 = 32768;

#[inline]
fn remember(slot: &mut u8, value: u8) {
    if value != 0 {
        *slot = value;
    }
}

#[derive(Debug, Clone, Default)]
struct Oscillator {
    speed: u8,
    depth: u8,
    phase: u32,
    selector: u8,
    add: i32,
}

impl Oscillator {
    fn set_params(&mut self, param: u8) {
        remember(&mut self.speed, param >> 4);
        remember(&mut self.depth, param & 0x0F);
    }

    fn set_selector(&mut self, selector: u8) {
        self.selector = if selector > 7 { 0 } else { selector };
    }

    fn apply(&mut self, depth_shift: u32, rng: &mut fastrand::Rng) {
        let phase = self.phase.wrapping_mul(self.speed as u32);
        self.add += waveform(phase, self.selector, rng) * self.depth as i32 >> depth_shift;
    }

    fn reset(&mut self) {
        self.speed = 0;
        self.depth = 0;
        self.selector = 0;
    }
}

#[derive(Debug, Clone)]
pub struct Channel {
    index: usize,
    module: Arc<Module>,
    log2_device_rate: f64,
    sample: Arc<Sample>,
    log2_sample_rate: f64,
    note: Note,
    command: Command,
    silent: bool,
    sample_index: usize,
    sample_frac: u32,
    step: u32,
    left_gain: i32,
    right_gain: i32,
    volume: i32,
    panning: i32,
    period: i32,
    porta_period: i32,
    key_add: i32,
    vibrato: Oscillator,
    tremolo: Oscillator,
    volume_slide_param: u8,
    portamento_param: u8,
    effect_tick: u32,
    fade_out_volume: i32,
    pub(crate) pattern_loop_row: usize,
    rng: fastrand::Rng,
}

impl Channel {
    pub fn new(index: usize, module: Arc<Module>, sample_rate: u32) -> Self {
        Channel {
            index,
            module,
            log2_device_rate: (sample_rate as f64).log2(),
            sample: Arc::new(Sample::empty()),
            log2_sample_rate: 0.0,
            note: Note::default(),
            command: Command::NONE,
            silent: true,
            sample_index: 0,
            sample_frac: 0,
            step: 0,
            left_gain: 0,
            right_gain: 0,
            volume: 0,
            panning: 0,
            period: 0,
            porta_period: 0,
            key_add: 0,
            vibrato: Oscillator::default(),
            tremolo: Oscillator::default(),
            volume_slide_param: 0,
            portamento_param: 0,
            effect_tick: 0,
            fade_out_volume: 0,
            pattern_loop_row: 0,
            rng: fastrand::Rng::with_seed(0xABCDEF + index as u64),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn volume(&self) -> i32 {
        self.volume
    }

    pub fn panning(&self) -> i32 {
        self.panning
    }

    pub fn period(&self) -> i32 {
        self.period
    }

    pub fn porta_period(&self) -> i32 {
        self.porta_period
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn gains(&self) -> (i32, i32) {
        (self.left_gain, self.right_gain)
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    pub fn sample(&self) -> &Arc<Sample> {
        &self.sample
    }

    pub fn vibrato_phase(&self) -> u32 {
        self.vibrato.phase
    }

    pub fn tremolo_phase(&self) -> u32 {
        self.tremolo.phase
    }

    pub fn reset(&mut self) {
        self.vibrato.reset();
        self.tremolo.reset();
        self.volume_slide_param = 0;
        self.portamento_param = 0;
        self.note = Note::default();
        self.command = Command::NONE;
        self.sample = Arc::new(Sample::empty());
        self.log2_sample_rate = 0.0;
        self.pattern_loop_row = 0;
    }

    pub fn set_volume(&mut self, volume: i32) {
        self.volume = volume.clamp(0, 64);
    }

    pub fn set_panning(&mut self, panning: i32) {
        self.panning = panning.clamp(0, 255);
    }

    fn set_period(&mut self, period: i32) {
        self.period = period.clamp(MIN_PERIOD, MAX_PERIOD);
    }

    fn set_sample_index(&mut self, index: usize) {
        self.sample_index = index;
        self.sample_frac = 0;
    }

    // keeps a private copy of the note so a delayed trigger can rewrite it
    pub fn row(&mut self, note: &Note) {
        let command = Command::from_note(note);
        let param = command.param;

        self.note = *note;
        self.command = command;
        self.effect_tick = 0;
        self.key_add = 0;
        self.vibrato.add = 0;
        self.tremolo.add = 0;

        if !command.defers_trigger() {
            self.trigger();
        }

        match command.effect {
            Effect::PortamentoUp => {
                remember(&mut self.portamento_param, param);
                self.portamento_up();
            }
            Effect::PortamentoDown => {
                remember(&mut self.portamento_param, param);
                self.portamento_down();
            }
            Effect::TonePortamento => remember(&mut self.portamento_param, param),
            Effect::Vibrato => {
                self.vibrato.set_params(param);
                self.vibrato.apply(5, &mut self.rng);
            }
            Effect::TonePortamentoVolumeSlide => {
                remember(&mut self.volume_slide_param, param);
                self.volume_slide();
            }
            Effect::VibratoVolumeSlide => {
                remember(&mut self.volume_slide_param, param);
                self.vibrato.apply(5, &mut self.rng);
                self.volume_slide();
            }
            Effect::Tremolo => {
                self.tremolo.set_params(param);
                self.tremolo.apply(6, &mut self.rng);
            }
            Effect::SetPanning => self.set_panning(param as i32),
            Effect::SampleOffset => self.set_sample_index((param as usize) << 8),
            Effect::VolumeSlide => {
                remember(&mut self.volume_slide_param, param);
                self.volume_slide();
            }
            Effect::SetVolume => self.set_volume(param as i32),
            Effect::FinePortamentoUp => {
                remember(&mut self.portamento_param, 0xF0 | param);
                self.portamento_up();
            }
            Effect::FinePortamentoDown => {
                remember(&mut self.portamento_param, 0xF0 | param);
                self.portamento_down();
            }
            Effect::VibratoWaveform => self.vibrato.set_selector(param),
            Effect::TremoloWaveform => self.tremolo.set_selector(param),
            Effect::FineVolumeSlideUp => {
                remember(&mut self.volume_slide_param, param << 4 | 0x0F);
                self.volume_slide();
            }
            Effect::FineVolumeSlideDown => {
                remember(&mut self.volume_slide_param, 0xF0 | param);
                self.volume_slide();
            }
            Effect::NoteCut if param == 0 => self.set_volume(0),
            _ => {}
        }

        self.update();
    }

    pub fn tick(&mut self) {
        self.effect_tick += 1;
        let Command { effect, param } = self.command;

        if effect == Effect::NoteDelay && param as u32 == self.effect_tick {
            let mut note = self.note;
            note.param &= 0xF0;
            self.row(&note);
            return;
        }

        self.vibrato.phase = self.vibrato.phase.wrapping_add(1);
        self.tremolo.phase = self.tremolo.phase.wrapping_add(1);
        self.key_add = 0;
        self.vibrato.add = 0;
        self.tremolo.add = 0;

        match effect {
            Effect::PortamentoUp => self.portamento_up(),
            Effect::PortamentoDown => self.portamento_down(),
            Effect::TonePortamento => self.tone_portamento(),
            Effect::Vibrato => self.vibrato.apply(5, &mut self.rng),
            Effect::TonePortamentoVolumeSlide => {
                self.tone_portamento();
                self.volume_slide();
            }
            Effect::VibratoVolumeSlide => {
                self.vibrato.apply(5, &mut self.rng);
                self.volume_slide();
            }
            Effect::Tremolo => self.tremolo.apply(6, &mut self.rng),
            Effect::VolumeSlide => self.volume_slide(),
            Effect::NoteCut if param as u32 == self.effect_tick => self.set_volume(0),
            Effect::Arpeggio => {
                self.key_add = match self.effect_tick % 3 {
                    1 => (param >> 4) as i32,
                    2 => (param & 0x0F) as i32,
                    _ => 0,
                };
            }
            _ => {}
        }

        self.update();
    }

    fn trigger(&mut self) {
        let Note { key, instrument, .. } = self.note;
        if instrument > 0 {
            self.sample = Arc::clone(self.module.sample(instrument));
            self.volume = (self.sample.volume as i32).clamp(0, 64);
            self.log2_sample_rate = (self.sample.rate as f64).log2();
            self.fade_out_volume = FADE_OUT_FULL;
        }
        if key > 0 && key <= MAX_KEY {
            self.porta_period = key_to_period(key);
            if !self.command.is_tone_portamento() {
                if resets_on_note(self.vibrato.selector) {
                    self.vibrato.phase = 0;
                }
                if resets_on_note(self.tremolo.selector) {
                    self.tremolo.phase = 0;
                }
                self.set_period(self.porta_period);
                self.set_sample_index(0);
            }
        }
    }

    // Fx memory slides fine, Ex extra fine, anything else on every tick but the first
    fn portamento_up(&mut self) {
        let delta = self.portamento_delta();
        self.set_period(self.period - delta);
    }

    fn portamento_down(&mut self) {
        let delta = self.portamento_delta();
        self.set_period(self.period + delta);
    }

    fn portamento_delta(&self) -> i32 {
        let param = self.portamento_param as i32;
        match param & 0xF0 {
            0xE0 if self.effect_tick == 0 => param & 0x0F,
            0xF0 if self.effect_tick == 0 => (param & 0x0F) << 2,
            0xE0 | 0xF0 => 0,
            _ if self.effect_tick > 0 => param << 2,
            _ => 0,
        }
    }

    fn tone_portamento(&mut self) {
        let speed = (self.portamento_param as i32) << 2;
        if self.porta_period < self.period {
            self.set_period((self.period - speed).max(self.porta_period));
        } else if self.porta_period > self.period {
            self.set_period((self.period + speed).min(self.porta_period));
        }
    }

    fn volume_slide(&mut self) {
        let up = (self.volume_slide_param >> 4) as i32;
        let down = (self.volume_slide_param & 0x0F) as i32;
        if down == 0x0F && up > 0 {
            if self.effect_tick == 0 {
                self.set_volume(self.volume + up);
            }
        } else if up == 0x0F && down > 0 {
            if self.effect_tick == 0 {
                self.set_volume(self.volume - down);
            }
        } else if self.effect_tick > 0 {
            self.set_volume(self.volume + up - down);
        }
    }

    fn update(&mut self) {
        self.silent = self.sample.has_finished(self.sample_index);
        if !self.silent {
            let volume = (self.volume + self.tremolo.add).clamp(0, 64);
            let mut amplitude = volume << (FP_SHIFT - 6);
            amplitude = amplitude * self.fade_out_volume >> 15;
            amplitude = amplitude * CHANNEL_GAIN >> FP_SHIFT;
            if amplitude < 1 {
                self.silent = true;
            } else {
                let panning = (self.panning & 0xFF) << (FP_SHIFT - 8);
                self.left_gain = amplitude * (FP_ONE - panning) >> FP_SHIFT;
                self.right_gain = amplitude * panning >> FP_SHIFT;
            }
        }
        if self.silent {
            self.left_gain = 0;
            self.right_gain = 0;
        }

        let semitones = self.key_add as f64 + self.sample.fine_tune as f64 / 8.0;
        self.step = if self.sample.rate == 0 {
            0
        } else {
            playback_step(
                self.log2_sample_rate,
                self.period + self.vibrato.add,
                semitones,
                self.log2_device_rate,
            )
        };
    }

    pub fn update_sample_index(&mut self, frames: usize) {
        let total = self.sample_frac as u64 + self.step as u64 * frames as u64;
        self.sample_index = self.sample_index.saturating_add((total >> FP_SHIFT) as usize);
        self.sample_frac = (total & FP_MASK as u64) as u32;

        let sample = &self.sample;
        if sample.is_looped() {
            if self.sample_index >= sample.loop_end() {
                self.sample_index = sample.loop_start + (self.sample_index - sample.loop_start) % sample.loop_length;
            }
        } else if self.sample_index > sample.loop_start {
            self.sample_index = sample.loop_start + 1;
        }
    }

    // `offset` is frames into the current tick; the cursor stays put
    pub fn resample(&self, mix: &mut [i32], frames: usize, offset: usize) {
        if self.silent {
            return;
        }
        let sample = &self.sample;
        let data = &sample.data;
        let loop_start = sample.loop_start;
        let loop_length = sample.loop_length;
        let loop_end = sample.loop_end().min(data.len());

        let start = self.sample_frac as u64 + self.step as u64 * offset as u64;
        let mut index = self.sample_index.saturating_add((start >> FP_SHIFT) as usize);
        let mut frac = (start & FP_MASK as u64) as u32;

        for frame in mix.chunks_exact_mut(2).take(frames) {
            if index >= loop_end {
                if loop_length <= 1 {
                    break;
                }
                index = loop_start + (index - loop_start) % loop_length;
            }
            let amplitude = data[index] as i32;
            frame[0] += (amplitude * self.left_gain << 8) >> FP_SHIFT;
            frame[1] += (amplitude * self.right_gain << 8) >> FP_SHIFT;
            frac += self.step;
            index += (frac >> FP_SHIFT) as usize;
            frac &= FP_MASK as u32;
        }
    }
}
