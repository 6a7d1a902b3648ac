use std::io::{Seek, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::ModError;
use crate::module::Module;
use crate::tracker::Tracker;

/// Renders a whole song, from the start up to where it ends or loops, as
/// interleaved stereo frames at mixer scale (full scale is ±32768).
pub fn render_song(module: Arc<Module>, sample_rate: u32) -> Vec<i32> {
    let mut tracker = Tracker::new(module, sample_rate);
    let frames = tracker.song_duration();
    let mut out = vec![0; frames * 2];
    tracker.render(&mut out);
    out
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn hound_error(e: hound::Error) -> ModError {
    ModError::FileError(e.to_string())
}

pub fn write_wav<W: Write + Seek>(module: Arc<Module>, sample_rate: u32, writer: W) -> Result<usize, ModError> {
    let title = module.title.clone();
    let mut tracker = Tracker::new(module, sample_rate);
    let rate = tracker.sample_rate();
    let frames = tracker.song_duration();

    let mut wav = hound::WavWriter::new(writer, wav_spec(rate)).map_err(hound_error)?;
    let mut mix = vec![0i32; 4096];
    let mut written = 0;
    while written < frames {
        let count = tracker.read(&mut mix).min(frames - written);
        for &s in &mix[..count * 2] {
            wav.write_sample(s.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
                .map_err(hound_error)?;
        }
        written += count;
    }
    wav.finalize().map_err(hound_error)?;
    info!("Rendered '{}': {} frames at {} Hz", title, frames, rate);
    Ok(frames)
}

pub fn export_wav(module: Arc<Module>, sample_rate: u32, path: impl AsRef<Path>) -> Result<usize, ModError> {
    let file = std::fs::File::create(path.as_ref())
        .map_err(|e| ModError::FileError(format!("{}: {}", path.as_ref().display(), e)))?;
    write_wav(module, sample_rate, std::io::BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::instrument::{Sample, C2_RATE};
    use crate::pattern::{Note, Pattern};

    fn module() -> Arc<Module> {
        let data: Vec<i8> = (0..64).map(|i| ((i * 4) as i32 - 128) as i8).collect();
        let sample = Sample::new("ramp".to_string(), C2_RATE, 0, 64, 0, 64, Arc::from(data));
        let mut pattern = Pattern::default();
        pattern.set_note(0, 0, Note::new(37, 1, 0, 0));
        pattern.set_note(16, 0, Note::new(0, 0, 0xB, 0));
        Arc::new(Module::from_parts("ramp".to_string(), vec![0], 0, vec![pattern], vec![sample]))
    }

    #[test]
    fn render_covers_song_duration() {
        let out = render_song(module(), 22050);
        let frames = Tracker::new(module(), 22050).song_duration();
        assert_eq!(out.len(), frames * 2);
        assert!(out.iter().any(|&s| s != 0));
    }

    #[test]
    fn wav_header_and_samples() {
        let mut cursor = Cursor::new(Vec::new());
        let frames = write_wav(module(), 22050, &mut cursor).unwrap();
        cursor.set_position(0);

        let mut reader = hound::WavReader::new(cursor).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration() as usize, frames);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let expected = render_song(module(), 22050);
        assert_eq!(samples.len(), expected.len());
        assert!(samples.iter().zip(&expected).all(|(&a, &b)| a as i32 == b));
    }
}
