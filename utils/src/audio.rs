use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Number of input frames the resampler consumes per call when converting
/// whole buffers.
pub const RESAMPLE_CHUNK_SIZE: usize = 1024;

/// Creates a mono resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Splits samples into fixed-size chunks, padding the last one with silence.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Creates a new ring buffer on the heap for audio shared with a device callback.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Resamples a complete mono buffer. The padding added to the final chunk is
/// trimmed so the output length tracks the input duration.
pub fn resample(samples: &[f32], in_rate: u32, out_rate: u32) -> anyhow::Result<Vec<f32>> {
    if in_rate == out_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = create_resampler(in_rate as f64, out_rate as f64, RESAMPLE_CHUNK_SIZE)?;
    let expected = (samples.len() as f64 * out_rate as f64 / in_rate as f64).round() as usize;

    let mut out = Vec::with_capacity(expected + RESAMPLE_CHUNK_SIZE);
    for chunk in split_for_chunks(samples, RESAMPLE_CHUNK_SIZE) {
        let processed = resampler.process(&[chunk.as_slice()], None)?;
        if let Some(channel) = processed.first() {
            out.extend_from_slice(channel);
        }
    }
    out.truncate(expected);
    Ok(out)
}

/// Averages interleaved frames down to a single channel.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// A trait for converting audio sample types to little-endian PCM16 bytes.
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [i16] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| sample.to_le_bytes())
            .collect()
    }
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        convert_f32_to_i16(self).to_binary()
    }
}
