use crate::utils::period_to_key;

pub const NUM_CHANNELS: usize = 4;
pub const NUM_ROWS: usize = 64;
pub const NOTES_PER_PATTERN: usize = NUM_ROWS * NUM_CHANNELS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Note {
    pub key: u8,        // 0 = no new note
    pub instrument: u8, // 0 = keep the current instrument
    pub effect: u8,
    pub param: u8,
}

impl Note {
    pub fn new(key: u8, instrument: u8, effect: u8, param: u8) -> Self {
        Note { key, instrument, effect, param }
    }

    pub fn from_bytes(b: [u8; 4]) -> Self {
        let period = ((b[0] as u16 & 0x0F) << 8) | b[1] as u16;
        Note {
            key: period_to_key(period),
            instrument: (b[0] & 0xF0) | (b[2] >> 4),
            effect: b[2] & 0x0F,
            param: b[3],
        }
    }
}

// 64 rows of 4 notes, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    notes: Vec<Note>,
}

impl Pattern {
    pub fn new(mut notes: Vec<Note>) -> Self {
        notes.resize(NOTES_PER_PATTERN, Note::default());
        Pattern { notes }
    }

    pub fn note(&self, row: usize, channel: usize) -> Note {
        self.notes[row * NUM_CHANNELS + channel]
    }

    pub fn row(&self, row: usize) -> &[Note] {
        let start = row * NUM_CHANNELS;
        &self.notes[start..start + NUM_CHANNELS]
    }

    pub fn set_note(&mut self, row: usize, channel: usize, note: Note) {
        self.notes[row * NUM_CHANNELS + channel] = note;
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::new(Vec::new())
    }
}
