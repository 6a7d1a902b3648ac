use std::sync::Arc;

pub const C2_RATE: u32 = 8312;

#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    pub rate: u32,
    pub fine_tune: i8, // eighths of a semitone, -8..=7
    pub volume: u8,
    pub loop_start: usize,
    pub loop_length: usize,
    pub data: Arc<[i8]>,
}

impl Sample {
    /// Builds a sample, clipping the loop to the waveform. Loops shorter
    /// than 4 frames are disabled and the loop start moved to the end.
    pub fn new(
        name: String,
        rate: u32,
        fine_tune: i8,
        volume: u8,
        loop_start: usize,
        loop_length: usize,
        data: Arc<[i8]>,
    ) -> Self {
        let loop_length = if loop_start.saturating_add(loop_length) > data.len() {
            data.len().saturating_sub(loop_start)
        } else {
            loop_length
        };
        let (loop_start, loop_length) = if loop_length < 4 {
            (data.len(), 0)
        } else {
            (loop_start, loop_length)
        };

        Sample { name, rate, fine_tune, volume, loop_start, loop_length, data }
    }

    pub fn empty() -> Self {
        Sample::new(String::new(), 0, 0, 0, 0, 0, Arc::from(Vec::new()))
    }

    pub fn is_looped(&self) -> bool {
        self.loop_length > 1
    }

    pub fn loop_end(&self) -> usize {
        self.loop_start + self.loop_length
    }

    pub fn has_finished(&self, position: usize) -> bool {
        !self.is_looped() && position > self.loop_start
    }
}

impl Default for Sample {
    fn default() -> Self {
        Sample::empty()
    }
}
