// first half of one sine period; the second half is mirrored negative
const SINE_TABLE: [i32; 32] = [
    0, 24, 49, 74, 97, 120, 141, 161, 180, 197, 212, 224, 235, 244, 250, 253,
    255, 253, 250, 244, 235, 224, 212, 197, 180, 161, 141, 120, 97, 74, 49, 24,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaveformType {
    Sine,
    RampDown,
    Square,
    Random,
}

impl WaveformType {
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0 | 4 => Some(WaveformType::Sine),
            1 | 5 => Some(WaveformType::RampDown),
            2 | 6 => Some(WaveformType::Square),
            3 | 7 => Some(WaveformType::Random),
            _ => None,
        }
    }

    /// Amplitude in [-255, 256] for a 64-step phase; only the low 6 bits of `phase` matter.
    pub fn generate_sample(&self, phase: u32, rng: &mut fastrand::Rng) -> i32 {
        match self {
            WaveformType::Sine => {
                let amplitude = SINE_TABLE[(phase & 0x1F) as usize];
                if phase & 0x20 == 0 { amplitude } else { -amplitude }
            }
            WaveformType::RampDown => 255 - ((phase.wrapping_add(0x20) & 0x3F) << 3) as i32,
            WaveformType::Square => if phase & 0x20 != 0 { 255 } else { -255 },
            WaveformType::Random => rng.i32(-255..=256),
        }
    }
}

pub fn waveform(phase: u32, selector: u8, rng: &mut fastrand::Rng) -> i32 {
    WaveformType::from_selector(selector)
        .map(|w| w.generate_sample(phase, rng))
        .unwrap_or(0)
}

pub fn resets_on_note(selector: u8) -> bool {
    selector < 4
}
