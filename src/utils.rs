pub const FP_SHIFT: u32 = 15;
pub const FP_ONE: i32 = 1 << FP_SHIFT;
pub const FP_MASK: i32 = FP_ONE - 1;

// Amiga period of key 0 in pattern units
const PATTERN_PERIOD_BASE: f64 = 7256.0;
const CHANNEL_PERIOD_BASE: f64 = 29024.0; // internal periods are 4x finer
pub const REFERENCE_PERIOD: f64 = 1712.0; // native-rate playback

pub const MIN_PERIOD: i32 = 32;
pub const MAX_PERIOD: i32 = 32768;

pub const MAX_KEY: u8 = 96;

pub fn period_to_key(period: u16) -> u8 {
    if period < 32 {
        return 0;
    }
    let octaves = (PATTERN_PERIOD_BASE / period as f64).log2();
    if octaves < 0.0 {
        return 0;
    }
    let key = ((octaves * 12.0 + 0.5).floor() as u32) & 0xFF;
    if key <= MAX_KEY as u32 { key as u8 } else { 0 }
}

pub fn key_to_period(key: u8) -> i32 {
    (CHANNEL_PERIOD_BASE * (-(key as f64) / 12.0).exp2()) as i32
}

/// Playback step in `FP_SHIFT` fixed point.
pub fn playback_step(log2_rate: f64, period: i32, semitones: f64, log2_device_rate: f64) -> u32 {
    let period = period.clamp(MIN_PERIOD, MAX_PERIOD) as f64;
    let octaves = log2_rate + REFERENCE_PERIOD.log2() - period.log2() + semitones / 12.0;
    ((octaves - log2_device_rate).exp2() * FP_ONE as f64) as u32
}
