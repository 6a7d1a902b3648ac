use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::ModError;
use crate::instrument::{Sample, C2_RATE};
use crate::pattern::{Note, Pattern, NOTES_PER_PATTERN};

pub const NUM_SAMPLES: usize = 31;

const TITLE_LEN: usize = 20;
const SAMPLE_HEADER_OFFSET: usize = 20;
const SAMPLE_HEADER_LEN: usize = 30;
const SAMPLE_NAME_LEN: usize = 22;
const SEQUENCE_LENGTH_OFFSET: usize = 950;
const RESTART_OFFSET: usize = 951;
const SEQUENCE_OFFSET: usize = 952;
const SEQUENCE_TABLE_LEN: usize = 128;
const PATTERN_OFFSET: usize = 1084;
const NOTE_LEN: usize = 4;

pub const MAX_MODULE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Module {
    pub title: String,
    pub sequence_length: usize,
    pub restart: usize,
    pub sequence: Vec<u8>,
    pub patterns: Vec<Pattern>,
    pub samples: Vec<Arc<Sample>>,
    empty: Arc<Sample>,
}

impl Module {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModError> {
        let data = std::fs::read(path.as_ref())
            .map_err(|e| ModError::FileError(format!("{}: {}", path.as_ref().display(), e)))?;
        Module::parse(&data)
    }

    /// Decodes a whole file. Bytes past the end of `data` read as zero, so a
    /// truncated or garbage file still yields a playable (if odd) song.
    pub fn parse(data: &[u8]) -> Result<Self, ModError> {
        if data.len() > MAX_MODULE_SIZE {
            return Err(ModError::TooLarge { size: data.len(), limit: MAX_MODULE_SIZE });
        }

        let title = read_string(data, 0, TITLE_LEN);
        let sequence_length = (byte(data, SEQUENCE_LENGTH_OFFSET) & 0x7F) as usize;
        let restart = (byte(data, RESTART_OFFSET) & 0x7F) as usize;
        let restart = if restart >= sequence_length { 0 } else { restart };

        let table: Vec<u8> = (0..SEQUENCE_TABLE_LEN)
            .map(|i| byte(data, SEQUENCE_OFFSET + i) & 0x7F)
            .collect();
        // the last table byte is not counted when sizing the pattern block
        let num_patterns = table[..SEQUENCE_TABLE_LEN - 1].iter().copied().max().unwrap_or(0) as usize + 1;
        let sequence = table[..sequence_length].to_vec();

        let patterns = (0..num_patterns)
            .map(|p| {
                let base = PATTERN_OFFSET + p * NOTES_PER_PATTERN * NOTE_LEN;
                let notes = (0..NOTES_PER_PATTERN)
                    .map(|n| {
                        let at = base + n * NOTE_LEN;
                        Note::from_bytes([byte(data, at), byte(data, at + 1), byte(data, at + 2), byte(data, at + 3)])
                    })
                    .collect();
                Pattern::new(notes)
            })
            .collect();

        let mut offset = PATTERN_OFFSET + num_patterns * NOTES_PER_PATTERN * NOTE_LEN;
        let mut samples = Vec::with_capacity(NUM_SAMPLES);
        for i in 0..NUM_SAMPLES {
            let header = SAMPLE_HEADER_OFFSET + i * SAMPLE_HEADER_LEN;
            let length = read16(data, header + 22) as usize * 2;
            let sample = Sample::new(
                read_string(data, header, SAMPLE_NAME_LEN),
                C2_RATE,
                signed_nibble(byte(data, header + 24)),
                byte(data, header + 25) & 0x7F,
                read16(data, header + 26) as usize * 2,
                read16(data, header + 28) as usize * 2,
                read_pcm(data, offset, length)?,
            );
            offset += length;
            samples.push(Arc::new(sample));
        }

        debug!(
            "Loaded module '{}': {} sequence entries, {} patterns, restart at {}",
            title, sequence_length, num_patterns, restart
        );

        Ok(Module {
            title,
            sequence_length,
            restart,
            sequence,
            patterns,
            samples,
            empty: Arc::new(Sample::empty()),
        })
    }

    pub fn sequence_pattern(&self, index: usize) -> Option<&Pattern> {
        self.sequence.get(index).and_then(|&p| self.patterns.get(p as usize))
    }

    // instrument numbers are 1-based, anything else is the silent sample
    pub fn sample(&self, number: u8) -> &Arc<Sample> {
        match number as usize {
            n @ 1..=NUM_SAMPLES => self.samples.get(n - 1).unwrap_or(&self.empty),
            _ => &self.empty,
        }
    }

    pub fn from_parts(
        title: String,
        sequence: Vec<u8>,
        restart: usize,
        patterns: Vec<Pattern>,
        samples: Vec<Sample>,
    ) -> Self {
        let sequence: Vec<u8> = sequence.into_iter().take(SEQUENCE_TABLE_LEN).map(|p| p & 0x7F).collect();
        let mut patterns = patterns;
        let needed = sequence.iter().copied().max().unwrap_or(0) as usize + 1;
        if patterns.len() < needed {
            patterns.resize(needed, Pattern::default());
        }
        let sequence_length = sequence.len();
        Module {
            title,
            sequence_length,
            restart: if restart >= sequence_length { 0 } else { restart },
            sequence,
            patterns,
            samples: samples.into_iter().take(NUM_SAMPLES).map(Arc::new).collect(),
            empty: Arc::new(Sample::empty()),
        }
    }
}

#[inline]
fn byte(data: &[u8], offset: usize) -> u8 {
    data.get(offset).copied().unwrap_or(0)
}

fn read16(data: &[u8], offset: usize) -> u16 {
    (byte(data, offset) as u16) << 8 | byte(data, offset + 1) as u16
}

fn read_string(data: &[u8], offset: usize, len: usize) -> String {
    (0..len)
        .map(|i| byte(data, offset + i))
        .take_while(|&b| b != 0)
        .map(|b| if b.is_ascii_graphic() || b == b' ' { b as char } else { ' ' })
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn signed_nibble(b: u8) -> i8 {
    let n = (b & 0x0F) as i8;
    (n & 0x07) - (n & 0x08)
}

fn read_pcm(data: &[u8], offset: usize, length: usize) -> Result<Arc<[i8]>, ModError> {
    let available = data.get(offset..).map_or(&[][..], |rest| &rest[..length.min(rest.len())]);
    let mut pcm: Vec<i8> = Vec::new();
    pcm.try_reserve_exact(available.len())
        .map_err(|e| ModError::OutOfMemory(format!("{} bytes of sample data: {}", available.len(), e)))?;
    pcm.extend(available.iter().map(|&b| b as i8));
    Ok(Arc::from(pcm))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_sequence(seq: &[u8], restart: u8) -> Vec<u8> {
        let mut data = vec![0u8; PATTERN_OFFSET];
        data[..8].copy_from_slice(b"testsong");
        data[SEQUENCE_LENGTH_OFFSET] = seq.len() as u8;
        data[RESTART_OFFSET] = restart;
        data[SEQUENCE_OFFSET..SEQUENCE_OFFSET + seq.len()].copy_from_slice(seq);
        data[1080..1084].copy_from_slice(b"M.K.");
        data
    }

    #[test]
    fn header_fields() {
        let data = header_with_sequence(&[0, 2, 1], 1);
        let module = Module::parse(&data).unwrap();
        assert_eq!(module.title, "testsong");
        assert_eq!(module.sequence_length, 3);
        assert_eq!(module.sequence, vec![0, 2, 1]);
        assert_eq!(module.patterns.len(), 3);
        assert_eq!(module.restart, 1);
        assert_eq!(module.samples.len(), NUM_SAMPLES);
        assert!(module.sequence_pattern(1).is_some());
        assert!(module.sequence_pattern(3).is_none());
    }

    #[test]
    fn restart_past_end_falls_back_to_zero() {
        let data = header_with_sequence(&[0, 0], 5);
        assert_eq!(Module::parse(&data).unwrap().restart, 0);
    }

    #[test]
    fn sequence_entries_use_seven_bits() {
        let data = header_with_sequence(&[0x81], 0);
        let module = Module::parse(&data).unwrap();
        assert_eq!(module.sequence, vec![1]);
        assert_eq!(module.patterns.len(), 2);
    }

    #[test]
    fn last_table_entry_does_not_add_patterns() {
        let mut data = header_with_sequence(&[0], 0);
        data[SEQUENCE_OFFSET + 127] = 5;
        data[SAMPLE_HEADER_OFFSET + 23] = 2; // 4 bytes
        data.extend(std::iter::repeat(0u8).take(NOTES_PER_PATTERN * NOTE_LEN));
        data.extend([10u8, 20, 30, 40]);

        let module = Module::parse(&data).unwrap();
        assert_eq!(module.patterns.len(), 1);
        assert_eq!(&module.sample(1).data[..], &[10, 20, 30, 40]);
    }

    #[test]
    fn sample_header_and_data() {
        let mut data = header_with_sequence(&[0], 0);
        let h = SAMPLE_HEADER_OFFSET;
        data[h..h + 5].copy_from_slice(b"kick\0");
        data[h + 23] = 8; // 16 bytes
        data[h + 24] = 0x0F; // fine-tune -1
        data[h + 25] = 48;
        data[h + 27] = 2; // loop start 4
        data[h + 29] = 4; // loop length 8
        data.extend(std::iter::repeat(0u8).take(NOTES_PER_PATTERN * NOTE_LEN));
        data.extend((0..16u8).map(|i| i.wrapping_mul(16)));

        let module = Module::parse(&data).unwrap();
        let s = module.sample(1);
        assert_eq!(s.name, "kick");
        assert_eq!(s.fine_tune, -1);
        assert_eq!(s.volume, 48);
        assert_eq!((s.loop_start, s.loop_length), (4, 8));
        assert_eq!(s.data.len(), 16);
        assert_eq!(s.data[8], -128);
    }

    #[test]
    fn truncated_sample_data_is_shortened() {
        let mut data = header_with_sequence(&[0], 0);
        data[SAMPLE_HEADER_OFFSET + 23] = 100;
        data.extend(std::iter::repeat(0u8).take(NOTES_PER_PATTERN * NOTE_LEN + 10));
        let module = Module::parse(&data).unwrap();
        assert_eq!(module.sample(1).data.len(), 10);
    }

    #[test]
    fn out_of_range_instrument_is_empty() {
        let module = Module::parse(&header_with_sequence(&[0], 0)).unwrap();
        assert!(module.sample(0).data.is_empty());
        assert!(module.sample(32).data.is_empty());
        assert_eq!(module.sample(200).rate, 0);
    }

    #[test]
    fn oversized_input_is_rejected() {
        let data = vec![0u8; MAX_MODULE_SIZE + 1];
        assert!(matches!(Module::parse(&data), Err(ModError::TooLarge { .. })));
    }

    #[test]
    fn garbage_parses_without_error() {
        let data: Vec<u8> = (0..3000u32).map(|i| (i * 37 % 251) as u8).collect();
        let module = Module::parse(&data).unwrap();
        assert!(module.sequence.iter().all(|&p| (p as usize) < module.patterns.len()));
    }
}
