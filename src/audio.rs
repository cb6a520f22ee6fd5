//! Generated audio and WAV decoding

use crate::error::{Error, Result};
use hound::{SampleFormat, WavReader};
use std::io::Read;
use std::path::Path;

/// Audio produced by the model, interleaved `f32` samples in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl GeneratedAudio {
    /// Number of samples along the time axis (per channel)
    pub fn len(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }
}

/// Decode an in-memory WAV file
pub fn decode_wav(bytes: &[u8]) -> Result<GeneratedAudio> {
    decode(WavReader::new(bytes)?)
}

/// Read a WAV file from disk
pub fn read_wav(path: &Path) -> Result<GeneratedAudio> {
    let reader = WavReader::open(path)
        .map_err(|e| Error::Generation(format!("{}: {}", path.display(), e)))?;
    decode(reader)
}

fn decode<R: Read>(mut reader: WavReader<R>) -> Result<GeneratedAudio> {
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok(GeneratedAudio {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}
