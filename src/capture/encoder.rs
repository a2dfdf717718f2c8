//! Self-contained WAV chunk encoding.
//!
//! Every capture window becomes a complete RIFF/WAV byte sequence with a
//! full header, so each chunk decodes on its own — the chunking boundary
//! never splits header or codec state. Samples stay at the capture
//! device's native rate and channel count, written as 16-bit PCM.

use crate::error::{Result, StreamError};

const HEADER_LEN: u32 = 44;

/// Serialize one capture window of interleaved f32 samples.
pub fn encode_chunk(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    if samples.is_empty() {
        return Err(StreamError::EncodeChunk("empty capture window".into()));
    }
    if channels == 0 || sample_rate == 0 {
        return Err(StreamError::EncodeChunk(format!(
            "unusable stream shape: {} Hz, {} channels",
            sample_rate, channels
        )));
    }
    let bytes_per_sample: u16 = 2;
    let data_size = samples.len() as u64 * bytes_per_sample as u64;
    if data_size > (u32::MAX - HEADER_LEN) as u64 {
        return Err(StreamError::EncodeChunk(format!(
            "capture window too large: {} samples",
            samples.len()
        )));
    }
    let data_size = data_size as u32;
    let file_size = HEADER_LEN - 8 + data_size;

    let mut buf = Vec::with_capacity((HEADER_LEN + data_size) as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt sub-chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // sub-chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * channels as u32 * bytes_per_sample as u32;
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    let block_align = channels * bytes_per_sample;
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&(bytes_per_sample * 8).to_le_bytes()); // bits per sample

    // data sub-chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let pcm = (clamped * 32767.0) as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_carries_a_complete_header() {
        let chunk = encode_chunk(&[0.0; 480], 48_000, 2).unwrap();
        assert_eq!(chunk.len(), 44 + 480 * 2);
        assert_eq!(&chunk[0..4], b"RIFF");
        assert_eq!(&chunk[8..12], b"WAVE");
        assert_eq!(&chunk[12..16], b"fmt ");
        assert_eq!(&chunk[36..40], b"data");

        // Declared sizes match the payload.
        let file_size = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
        assert_eq!(file_size as usize, chunk.len() - 8);
        let data_size = u32::from_le_bytes(chunk[40..44].try_into().unwrap());
        assert_eq!(data_size, 480 * 2);

        // Stream shape is preserved, not resampled.
        let channels = u16::from_le_bytes(chunk[22..24].try_into().unwrap());
        assert_eq!(channels, 2);
        let rate = u32::from_le_bytes(chunk[24..28].try_into().unwrap());
        assert_eq!(rate, 48_000);
    }

    #[test]
    fn samples_are_clamped_to_full_scale() {
        let chunk = encode_chunk(&[2.0, -2.0], 16_000, 1).unwrap();
        let first = i16::from_le_bytes(chunk[44..46].try_into().unwrap());
        let second = i16::from_le_bytes(chunk[46..48].try_into().unwrap());
        assert_eq!(first, 32767);
        assert_eq!(second, -32767);
    }

    #[test]
    fn empty_window_is_an_encode_error() {
        let err = encode_chunk(&[], 48_000, 1).unwrap_err();
        assert!(matches!(err, StreamError::EncodeChunk(_)));
    }

    #[test]
    fn zero_channels_is_an_encode_error() {
        let err = encode_chunk(&[0.0], 48_000, 0).unwrap_err();
        assert!(matches!(err, StreamError::EncodeChunk(_)));
    }

    #[test]
    fn consecutive_chunks_decode_independently() {
        // Two windows from the same stream: both carry full headers.
        let a = encode_chunk(&[0.1; 100], 44_100, 1).unwrap();
        let b = encode_chunk(&[0.2; 100], 44_100, 1).unwrap();
        assert_eq!(&a[0..4], b"RIFF");
        assert_eq!(&b[0..4], b"RIFF");
        assert_eq!(a.len(), b.len());
    }
}
