use std::io::Cursor;

use rodio::Source;

use crate::utils::audio;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported or corrupt audio frame: {0}")]
    Format(#[from] rodio::decoder::DecoderError),
    #[error("audio frame decoded to no samples")]
    Empty,
    #[error("failed to resample from {from}hz to {to}hz: {reason}")]
    Resample { from: u32, to: u32, reason: String },
}

/// Turns one encoded binary frame into mono samples ready for the sink.
///
/// Called off the event loop, so implementations may block.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, DecodeError>;
}

/// Decodes MP3 and WAV frames, downmixes and resamples to the output rate.
#[derive(Debug, Clone)]
pub struct EncodedAudioDecoder {
    output_rate: u32,
}

impl EncodedAudioDecoder {
    pub fn new(output_rate: u32) -> Self {
        Self { output_rate }
    }
}

impl AudioDecoder for EncodedAudioDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
        let source = rodio::Decoder::new(Cursor::new(bytes.to_vec()))?;
        let channels = source.channels() as usize;
        let sample_rate = source.sample_rate();

        let pcm: Vec<i16> = source.collect();
        if pcm.is_empty() {
            return Err(DecodeError::Empty);
        }
        let mono = audio::downmix(&audio::convert_i16_to_f32(&pcm), channels);

        audio::resample(&mono, sample_rate, self.output_rate).map_err(|e| DecodeError::Resample {
            from: sample_rate,
            to: self.output_rate,
            reason: e.to_string(),
        })
    }
}
