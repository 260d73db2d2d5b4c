//! WAV encoding and sample-rate conversion.
//!
//! Pure functions — no I/O, no async runtime.

/// Size of the canonical RIFF/WAVE header written by [`write_wav`].
pub const WAV_HEADER_LEN: usize = 44;

/// Encode 16-bit mono PCM samples as a complete WAV file.
pub fn write_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let file_len = 36u32.saturating_add(data_len);
    let mut buf = Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_len.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&sample_rate.saturating_mul(2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

/// Format fields of a parsed WAV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Byte offset where raw PCM data begins.
    pub data_offset: usize,
    /// Declared length of the data chunk in bytes.
    pub data_len: usize,
}

impl WavHeader {
    /// Number of sample frames in the data chunk.
    pub fn frames(&self) -> usize {
        let frame_bytes = self.channels as usize * (self.bits_per_sample as usize / 8);
        if frame_bytes == 0 {
            return 0;
        }
        self.data_len / frame_bytes
    }
}

/// Parse a PCM WAV header, walking chunks until `data`.
pub fn parse_wav_header(buf: &[u8]) -> Result<WavHeader, &'static str> {
    if buf.len() < 12 {
        return Err("too short for RIFF header");
    }
    if &buf[0..4] != b"RIFF" {
        return Err("missing RIFF tag");
    }
    if &buf[8..12] != b"WAVE" {
        return Err("missing WAVE tag");
    }

    let mut pos = 12;
    let mut format: Option<(u16, u32, u16)> = None;

    while pos + 8 <= buf.len() {
        let chunk_id = &buf[pos..pos + 4];
        let chunk_size =
            u32::from_le_bytes([buf[pos + 4], buf[pos + 5], buf[pos + 6], buf[pos + 7]]) as usize;

        if chunk_id == b"fmt " {
            if pos + 24 > buf.len() {
                return Err("fmt chunk truncated");
            }
            let audio_format = u16::from_le_bytes([buf[pos + 8], buf[pos + 9]]);
            if audio_format != 1 {
                return Err("not PCM format");
            }
            let channels = u16::from_le_bytes([buf[pos + 10], buf[pos + 11]]);
            let sample_rate = u32::from_le_bytes([
                buf[pos + 12],
                buf[pos + 13],
                buf[pos + 14],
                buf[pos + 15],
            ]);
            let bits_per_sample = u16::from_le_bytes([buf[pos + 22], buf[pos + 23]]);
            format = Some((channels, sample_rate, bits_per_sample));
        } else if chunk_id == b"data" {
            let (channels, sample_rate, bits_per_sample) =
                format.ok_or("data chunk before fmt chunk")?;
            let data_offset = pos + 8;
            return Ok(WavHeader {
                channels,
                sample_rate,
                bits_per_sample,
                data_offset,
                data_len: chunk_size.min(buf.len() - data_offset),
            });
        }

        // chunks are padded to even length
        pos = pos
            .saturating_add(8)
            .saturating_add(chunk_size)
            .saturating_add(chunk_size & 1);
    }

    Err("data chunk not found")
}

/// Convert normalized float samples (-1.0..=1.0) to 16-bit PCM, clipping.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
            (s * i16::MAX as f32).round() as i16
        })
        .collect()
}

/// Number of samples [`resample_linear`] produces for `len` input samples.
pub fn resampled_len(len: usize, from_rate: u32, to_rate: u32) -> u64 {
    if len == 0 || from_rate == 0 || to_rate == 0 || from_rate == to_rate {
        return len as u64;
    }
    ((len as u64 * to_rate as u64) / from_rate as u64).max(1)
}

/// Linear-interpolation resampler from `from_rate` to `to_rate`.
///
/// Returns the input unchanged when the rates match or either is zero.
pub fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 || from_rate == to_rate {
        return samples.to_vec();
    }

    let out_len = resampled_len(samples.len(), from_rate, to_rate) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos.floor() as usize).min(last);
            let frac = pos - idx as f64;
            let a = samples[idx] as f64;
            let b = samples[(idx + 1).min(last)] as f64;
            (a + (b - a) * frac)
                .round()
                .clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_wav_produces_valid_header() {
        let samples = vec![0i16; 100];
        let wav = write_wav(&samples, 16000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(wav.len(), WAV_HEADER_LEN + 200);
        let riff_size = u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]);
        assert_eq!(riff_size as usize, wav.len() - 8);
    }

    #[test]
    fn write_wav_empty_is_header_only() {
        let wav = write_wav(&[], 24000);
        assert_eq!(wav.len(), WAV_HEADER_LEN);
        let hdr = parse_wav_header(&wav).unwrap();
        assert_eq!(hdr.frames(), 0);
    }

    #[test]
    fn parse_wav_header_basic() {
        let wav = write_wav(&[0i16; 50], 24000);
        let hdr = parse_wav_header(&wav).unwrap();
        assert_eq!(hdr.channels, 1);
        assert_eq!(hdr.sample_rate, 24000);
        assert_eq!(hdr.bits_per_sample, 16);
        assert_eq!(hdr.data_offset, 44);
        assert_eq!(hdr.data_len, 100);
        assert_eq!(hdr.frames(), 50);
    }

    #[test]
    fn parse_wav_header_skips_unknown_chunks() {
        let wav = write_wav(&[1i16, 2, 3], 22050);
        // splice a LIST chunk between fmt and data
        let mut spliced = wav[..36].to_vec();
        spliced.extend_from_slice(b"LIST");
        spliced.extend_from_slice(&4u32.to_le_bytes());
        spliced.extend_from_slice(b"INFO");
        spliced.extend_from_slice(&wav[36..]);
        let hdr = parse_wav_header(&spliced).unwrap();
        assert_eq!(hdr.sample_rate, 22050);
        assert_eq!(hdr.data_offset, 56);
        assert_eq!(hdr.frames(), 3);
    }

    #[test]
    fn parse_wav_header_too_short() {
        assert!(parse_wav_header(b"RIFF").is_err());
    }

    #[test]
    fn parse_wav_header_not_riff() {
        let mut wav = write_wav(&[0i16; 10], 16000);
        wav[0..4].copy_from_slice(b"NOPE");
        assert!(parse_wav_header(&wav).is_err());
    }

    #[test]
    fn f32_to_i16_clips_and_scales() {
        let out = f32_to_i16(&[0.0, 1.0, -1.0, 2.0, f32::NAN, 0.5]);
        assert_eq!(out, vec![0, 32767, -32767, 32767, 0, 16384]);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = vec![1i16, 2, 3, 4];
        assert_eq!(resample_linear(&samples, 24000, 24000), samples);
        assert_eq!(resample_linear(&samples, 0, 24000), samples);
    }

    #[test]
    fn resample_down_scales_length() {
        let samples = vec![100i16; 24_000];
        let out = resample_linear(&samples, 24_000, 16_000);
        assert_eq!(out.len(), 16_000);
        assert!(out.iter().all(|&s| s == 100));
    }

    #[test]
    fn resampled_len_matches_output() {
        let samples = vec![7i16; 441];
        for (from, to) in [(44_100, 16_000), (16_000, 384_000), (24_000, 24_000)] {
            assert_eq!(
                resampled_len(samples.len(), from, to),
                resample_linear(&samples, from, to).len() as u64
            );
        }
        assert_eq!(resampled_len(24_000, 24_000, u32::MAX), 4_294_967_295);
    }

    #[test]
    fn resample_up_interpolates() {
        let out = resample_linear(&[0i16, 100], 1, 2);
        assert_eq!(out, vec![0, 50, 100, 100]);
    }
}
