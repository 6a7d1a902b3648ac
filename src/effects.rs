use crate::pattern::Note;

/// Pattern effect commands. `Exy` sub-commands are flattened into their own
/// variants with the parameter reduced to `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Arpeggio,
    PortamentoUp,
    PortamentoDown,
    TonePortamento,
    Vibrato,
    TonePortamentoVolumeSlide,
    VibratoVolumeSlide,
    Tremolo,
    SetPanning,
    SampleOffset,
    VolumeSlide,
    PositionJump,
    SetVolume,
    PatternBreak,
    SetSpeed,
    FinePortamentoUp,
    FinePortamentoDown,
    VibratoWaveform,
    PatternLoop,
    TremoloWaveform,
    FineVolumeSlideUp,
    FineVolumeSlideDown,
    NoteCut,
    NoteDelay,
    PatternDelay,
    Extended(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub effect: Effect,
    pub param: u8,
}

impl Command {
    pub const NONE: Command = Command { effect: Effect::None, param: 0 };

    pub fn decode(code: u8, param: u8) -> Self {
        let effect = match code {
            0x0 if param != 0 => Effect::Arpeggio,
            0x1 => Effect::PortamentoUp,
            0x2 => Effect::PortamentoDown,
            0x3 => Effect::TonePortamento,
            0x4 => Effect::Vibrato,
            0x5 => Effect::TonePortamentoVolumeSlide,
            0x6 => Effect::VibratoVolumeSlide,
            0x7 => Effect::Tremolo,
            0x8 => Effect::SetPanning,
            0x9 => Effect::SampleOffset,
            0xA => Effect::VolumeSlide,
            0xB => Effect::PositionJump,
            0xC => Effect::SetVolume,
            0xD => Effect::PatternBreak,
            0xE => return Command::decode_extended(param),
            0xF => Effect::SetSpeed,
            _ => Effect::None,
        };
        Command { effect, param }
    }

    fn decode_extended(param: u8) -> Self {
        let sub = param >> 4;
        let effect = match sub {
            0x1 => Effect::FinePortamentoUp,
            0x2 => Effect::FinePortamentoDown,
            0x4 => Effect::VibratoWaveform,
            0x6 => Effect::PatternLoop,
            0x7 => Effect::TremoloWaveform,
            0xA => Effect::FineVolumeSlideUp,
            0xB => Effect::FineVolumeSlideDown,
            0xC => Effect::NoteCut,
            0xD => Effect::NoteDelay,
            0xE => Effect::PatternDelay,
            _ => Effect::Extended(sub),
        };
        Command { effect, param: param & 0x0F }
    }

    pub fn from_note(note: &Note) -> Self {
        Command::decode(note.effect, note.param)
    }

    pub fn is_tone_portamento(&self) -> bool {
        matches!(self.effect, Effect::TonePortamento | Effect::TonePortamentoVolumeSlide)
    }

    pub fn defers_trigger(&self) -> bool {
        self.effect == Effect::NoteDelay && self.param > 0
    }
}

impl Default for Command {
    fn default() -> Self {
        Command::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_code_with_param_is_arpeggio() {
        assert_eq!(Command::decode(0, 0x37).effect, Effect::Arpeggio);
        assert_eq!(Command::decode(0, 0), Command::NONE);
    }

    #[test]
    fn extended_commands_use_low_nibble() {
        let cmd = Command::decode(0xE, 0xD3);
        assert_eq!(cmd, Command { effect: Effect::NoteDelay, param: 3 });
        assert!(cmd.defers_trigger());
        assert_eq!(Command::decode(0xE, 0x62).effect, Effect::PatternLoop);
        assert_eq!(Command::decode(0xE, 0x01), Command { effect: Effect::Extended(0), param: 1 });
    }

    #[test]
    fn out_of_range_codes_are_ignored() {
        assert_eq!(Command::decode(0x10, 0x44).effect, Effect::None);
        assert_eq!(Command::decode(0xFF, 0).effect, Effect::None);
    }

    #[test]
    fn tone_portamento_family() {
        assert!(Command::decode(3, 0).is_tone_portamento());
        assert!(Command::decode(5, 0x10).is_tone_portamento());
        assert!(!Command::decode(1, 0x10).is_tone_portamento());
        assert!(!Command::decode(0xE, 0xD0).defers_trigger());
    }
}
