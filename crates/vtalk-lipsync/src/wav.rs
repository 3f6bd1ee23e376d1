//! WAV decoding for synthesized speech

use std::io::Cursor;
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use vtalk_core::{VtalkError, VtalkResult};

/// Decoded mono audio
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    /// Mono samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the source before downmixing
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Decode WAV bytes and downmix to mono
pub fn decode_wav(bytes: &[u8]) -> VtalkResult<DecodedAudio> {
    let mut reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| VtalkError::AudioDecode(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(VtalkError::UnsupportedAudio("zero channels".into()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| VtalkError::AudioDecode(e.to_string()))?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(VtalkError::UnsupportedAudio(format!(
                    "{} bits per sample",
                    spec.bits_per_sample
                )));
            }
            let max = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(|e| VtalkError::AudioDecode(e.to_string()))?
        }
    };

    Ok(DecodedAudio {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Average interleaved frames to mono. A trailing partial frame is
/// averaged over the samples it has.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
