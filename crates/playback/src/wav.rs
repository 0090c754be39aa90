//! Fixed-format WAV sample source.
//!
//! Parses a RIFF/WAVE container from any [`platform::Storage`]
//! implementation and produces a lazy, restartable sequence of 16-bit
//! samples from the data region. Only one encoding is ever streamed to the
//! peers: PCM, 32 kHz, mono, 12- or 16-bit — anything else is rejected by
//! [`validate`](WavSource::validate), not treated as a fatal error.
//!
//! The container stores 12-bit DAC values sign/zero-extended into 16-bit
//! words; every sample is masked to its low 12 bits after reading so the
//! extension bits never reach the wire.

use platform::storage::{File, Storage};

/// The single sample rate the peer DACs run at.
pub const SUPPORTED_SAMPLE_RATE: u32 = 32_000;

/// Mask applied to every 16-bit container word.
pub const SAMPLE_MASK: u16 = 0x0FFF;

/// PCM format tag in the `fmt ` chunk.
const FORMAT_PCM: u16 = 1;

/// Errors from opening or reading a WAV container.
#[derive(Debug)]
pub enum WavError<E> {
    /// I/O error from the underlying storage.
    Storage(E),
    /// File ended inside a header or chunk descriptor.
    TruncatedHeader,
    /// Missing `RIFF`/`WAVE` magic.
    NotRiff,
    /// No `fmt ` chunk before the data region.
    MissingFmt,
    /// The format tag is not plain PCM.
    NotPcm,
    /// No `data` chunk in the container.
    MissingData,
    /// The stored sample layout cannot be streamed (e.g. packed 12-bit).
    UnsupportedLayout,
}

impl<E: core::fmt::Debug> core::fmt::Display for WavError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e:?}"),
            Self::TruncatedHeader => f.write_str("truncated container header"),
            Self::NotRiff => f.write_str("not a RIFF/WAVE container"),
            Self::MissingFmt => f.write_str("missing fmt chunk"),
            Self::NotPcm => f.write_str("not PCM encoded"),
            Self::MissingData => f.write_str("missing data chunk"),
            Self::UnsupportedLayout => f.write_str("unsupported sample layout"),
        }
    }
}

/// An open WAV container positioned inside its data region.
pub struct WavSource<F> {
    file: F,
    sample_rate: u32,
    bits_per_sample: u16,
    channels: u16,
    data_offset: u64,
    #[allow(dead_code)] // kept for status/diagnostic surfaces
    data_len: u32,
    total_samples: u32,
    cursor: u32,
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    let mut word = [0u8; 2];
    if let Some(src) = bytes.get(at..at.saturating_add(2)) {
        word.copy_from_slice(src);
    }
    u16::from_le_bytes(word)
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    if let Some(src) = bytes.get(at..at.saturating_add(4)) {
        word.copy_from_slice(src);
    }
    u32::from_le_bytes(word)
}

impl<F: File> WavSource<F> {
    /// Open `path` and parse the container header.
    ///
    /// Walks the chunk list linearly from byte 12, skipping unknown chunks,
    /// until both the `fmt ` fields and the `data` region are located. On
    /// success the read cursor sits at the first sample.
    #[allow(clippy::arithmetic_side_effects)] // divisor is checked non-zero below
    pub async fn open<S>(storage: &mut S, path: &str) -> Result<Self, WavError<F::Error>>
    where
        S: Storage<File = F, Error = F::Error>,
    {
        let mut file = storage.open_file(path).await.map_err(WavError::Storage)?;

        let mut riff = [0u8; 12];
        if !read_exact(&mut file, &mut riff)
            .await
            .map_err(WavError::Storage)?
        {
            return Err(WavError::TruncatedHeader);
        }
        if riff.split_at(4).0 != b"RIFF" || riff.split_at(8).1 != b"WAVE" {
            return Err(WavError::NotRiff);
        }

        let mut fmt: Option<(u16, u16, u32, u16)> = None; // tag, channels, rate, bits
        let mut data: Option<(u64, u32)> = None; // offset, length
        let mut offset: u64 = 12;
        loop {
            let mut desc = [0u8; 8];
            if !read_exact(&mut file, &mut desc)
                .await
                .map_err(WavError::Storage)?
            {
                break;
            }
            let chunk_id = desc.split_at(4).0;
            let chunk_len = le_u32(&desc, 4);
            let body = offset.saturating_add(8);

            if chunk_id == b"fmt " {
                let mut fields = [0u8; 16];
                if !read_exact(&mut file, &mut fields)
                    .await
                    .map_err(WavError::Storage)?
                {
                    return Err(WavError::TruncatedHeader);
                }
                fmt = Some((
                    le_u16(&fields, 0),
                    le_u16(&fields, 2),
                    le_u32(&fields, 4),
                    le_u16(&fields, 14),
                ));
            } else if chunk_id == b"data" {
                data = Some((body, chunk_len));
                break;
            }

            offset = body.saturating_add(u64::from(chunk_len));
            file.seek(offset).await.map_err(WavError::Storage)?;
        }

        let (format_tag, channels, sample_rate, bits_per_sample) =
            fmt.ok_or(WavError::MissingFmt)?;
        if format_tag != FORMAT_PCM {
            return Err(WavError::NotPcm);
        }
        let (data_offset, data_len) = data.ok_or(WavError::MissingData)?;

        // Bytes per sample frame, rounding odd bit depths up to whole bytes.
        let bytes_per_sample =
            u32::from(bits_per_sample.saturating_add(7) / 8).saturating_mul(u32::from(channels));
        let total_samples = if bytes_per_sample == 0 {
            0
        } else {
            data_len / bytes_per_sample
        };

        file.seek(data_offset).await.map_err(WavError::Storage)?;
        Ok(Self {
            file,
            sample_rate,
            bits_per_sample,
            channels,
            data_offset,
            data_len,
            total_samples,
            cursor: 0,
        })
    }

    /// `true` when the container carries the one encoding the peers accept:
    /// 32 kHz, mono, 12- or 16-bit. A mismatch is a rejection, not an error.
    pub fn validate(&self) -> bool {
        self.sample_rate == SUPPORTED_SAMPLE_RATE
            && self.channels == 1
            && (self.bits_per_sample == 12 || self.bits_per_sample == 16)
    }

    /// Read up to `out.len()` samples, masked to the low 12 bits.
    ///
    /// Returns fewer samples than requested only at end-of-stream; a return
    /// of 0 signals EOF. Packed 12-bit payloads (1.5 bytes per sample) are
    /// not streamable and report [`WavError::UnsupportedLayout`].
    #[allow(clippy::arithmetic_side_effects)] // byte/sample conversions by constant 2
    pub async fn read_samples(&mut self, out: &mut [u16]) -> Result<usize, WavError<F::Error>> {
        let remaining = self.total_samples.saturating_sub(self.cursor) as usize;
        let want = out.len().min(remaining);
        if want == 0 {
            return Ok(0);
        }
        if self.bits_per_sample != 16 {
            return Err(WavError::UnsupportedLayout);
        }

        let mut scratch = [0u8; 512];
        let mut filled = 0usize;
        while filled < want {
            let take = want.saturating_sub(filled).min(scratch.len() / 2);
            let byte_len = take * 2;
            let slice = match scratch.get_mut(..byte_len) {
                Some(s) => s,
                None => break,
            };
            let n = read_up_to(&mut self.file, slice)
                .await
                .map_err(WavError::Storage)?;
            let whole = n / 2;
            let dst = match out.get_mut(filled..filled.saturating_add(whole)) {
                Some(d) => d,
                None => break,
            };
            let src = match scratch.get(..whole * 2) {
                Some(s) => s,
                None => break,
            };
            for (slot, pair) in dst.iter_mut().zip(src.chunks_exact(2)) {
                let mut word = [0u8; 2];
                word.copy_from_slice(pair);
                *slot = u16::from_le_bytes(word) & SAMPLE_MASK;
            }
            filled = filled.saturating_add(whole);
            if n < byte_len {
                break; // data region shorter than the header promised
            }
        }

        #[allow(clippy::cast_possible_truncation)] // filled <= total_samples (u32 range)
        {
            self.cursor = self.cursor.saturating_add(filled as u32);
        }
        Ok(filled)
    }

    /// Reposition to the first sample. Used for loop playback and for
    /// replay-from-start on an explicit play.
    pub async fn rewind(&mut self) -> Result<(), WavError<F::Error>> {
        self.file
            .seek(self.data_offset)
            .await
            .map_err(WavError::Storage)?;
        self.cursor = 0;
        Ok(())
    }

    /// Sample rate declared by the container.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Bit depth declared by the container.
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    /// Channel count declared by the container.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total samples in the data region.
    pub fn total_samples(&self) -> u32 {
        self.total_samples
    }

    /// Samples consumed since open or the last rewind.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }
}

/// Fill `buf` completely, retrying short reads. `Ok(false)` at EOF.
async fn read_exact<F: File>(file: &mut F, buf: &mut [u8]) -> Result<bool, F::Error> {
    let n = read_up_to(file, buf).await?;
    Ok(n == buf.len())
}

/// Read until `buf` is full or the stream ends; returns bytes read.
async fn read_up_to<F: File>(file: &mut F, buf: &mut [u8]) -> Result<usize, F::Error> {
    let mut pos = 0;
    while pos < buf.len() {
        let slice = match buf.get_mut(pos..) {
            Some(s) => s,
            None => break,
        };
        let n = file.read(slice).await?;
        if n == 0 {
            break;
        }
        pos = pos.saturating_add(n);
    }
    Ok(pos)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;
    use platform::mocks::MemStorage;

    /// Build a WAV container; a junk `LIST` chunk sits between `fmt ` and
    /// `data` to exercise the linear chunk walk.
    fn build_wav(rate: u32, channels: u16, bits: u16, samples: &[u16]) -> Vec<u8> {
        let mut data = Vec::new();
        for &s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let junk = b"not audio metadata";
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        let riff_len = 4 + 24 + (8 + junk.len()) + 8 + data.len();
        out.extend_from_slice(&(riff_len as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        let byte_rate = rate * u32::from(channels) * 2;
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes()); // block align
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"LIST");
        out.extend_from_slice(&(junk.len() as u32).to_le_bytes());
        out.extend_from_slice(junk);
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&data);
        out
    }

    fn storage_with(path: &str, bytes: &[u8]) -> MemStorage {
        let mut storage = MemStorage::new();
        storage.insert(path, bytes);
        storage
    }

    #[tokio::test]
    async fn open_parses_header_and_skips_unknown_chunks() {
        let samples: Vec<u16> = (0..100).collect();
        let mut storage = storage_with("a.wav", &build_wav(32_000, 1, 16, &samples));
        let src = WavSource::open(&mut storage, "a.wav").await.unwrap();
        assert_eq!(src.sample_rate(), 32_000);
        assert_eq!(src.channels(), 1);
        assert_eq!(src.bits_per_sample(), 16);
        assert_eq!(src.total_samples(), 100);
        assert!(src.validate());
    }

    #[tokio::test]
    async fn open_rejects_non_riff() {
        let mut storage = storage_with("x.bin", b"MP3 junk but long enough to read");
        match WavSource::<_>::open(&mut storage, "x.bin").await {
            Err(WavError::NotRiff) => {}
            other => panic!("expected NotRiff, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn open_rejects_non_pcm() {
        let mut bytes = build_wav(32_000, 1, 16, &[0; 4]);
        bytes[20] = 3; // IEEE float format tag
        let mut storage = storage_with("f.wav", &bytes);
        match WavSource::<_>::open(&mut storage, "f.wav").await {
            Err(WavError::NotPcm) => {}
            other => panic!("expected NotPcm, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn validate_rejects_wrong_rate_stereo_and_depth() {
        let cases = [
            build_wav(44_100, 1, 16, &[0; 4]),
            build_wav(32_000, 2, 16, &[0; 4]),
            build_wav(32_000, 1, 8, &[0; 4]),
        ];
        for (i, bytes) in cases.iter().enumerate() {
            let mut storage = storage_with("c.wav", bytes);
            let src = WavSource::open(&mut storage, "c.wav").await.unwrap();
            assert!(!src.validate(), "case {i} must be rejected");
        }
    }

    #[tokio::test]
    async fn read_masks_to_low_twelve_bits() {
        let samples = [0xF123u16, 0x8FFF, 0x0ABC];
        let mut storage = storage_with("m.wav", &build_wav(32_000, 1, 16, &samples));
        let mut src = WavSource::open(&mut storage, "m.wav").await.unwrap();
        let mut out = [0u16; 3];
        let n = src.read_samples(&mut out).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, [0x0123, 0x0FFF, 0x0ABC]);
    }

    #[tokio::test]
    async fn reads_summing_to_total_end_with_zero() {
        let samples: Vec<u16> = (0..600).map(|i| i & 0x0FFF).collect();
        let mut storage = storage_with("t.wav", &build_wav(32_000, 1, 16, &samples));
        let mut src = WavSource::open(&mut storage, "t.wav").await.unwrap();
        let mut out = [0u16; 256];
        let mut got = 0usize;
        loop {
            let n = src.read_samples(&mut out).await.unwrap();
            if n == 0 {
                break;
            }
            got += n;
        }
        assert_eq!(got, 600);
        // EOF is repeatable and error-free.
        assert_eq!(src.read_samples(&mut out).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rewind_reproduces_exact_sequence() {
        let samples: Vec<u16> = (100..400).map(|i| i & 0x0FFF).collect();
        let mut storage = storage_with("r.wav", &build_wav(32_000, 1, 16, &samples));
        let mut src = WavSource::open(&mut storage, "r.wav").await.unwrap();

        let mut first = vec![0u16; samples.len()];
        assert_eq!(src.read_samples(&mut first).await.unwrap(), samples.len());

        src.rewind().await.unwrap();
        assert_eq!(src.cursor(), 0);
        let mut second = vec![0u16; samples.len()];
        assert_eq!(src.read_samples(&mut second).await.unwrap(), samples.len());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn twelve_bit_container_validates_but_rejects_read() {
        let bytes = build_wav(32_000, 1, 12, &[0; 8]);
        let mut storage = storage_with("p.wav", &bytes);
        let mut src = WavSource::open(&mut storage, "p.wav").await.unwrap();
        assert!(src.validate());
        let mut out = [0u16; 4];
        match src.read_samples(&mut out).await {
            Err(WavError::UnsupportedLayout) => {}
            other => panic!("expected UnsupportedLayout, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn missing_data_chunk_is_reported() {
        let full = build_wav(32_000, 1, 16, &[0; 4]);
        // Chop the container off right after the LIST chunk.
        let truncated = &full[..12 + 24 + 8 + 18];
        let mut storage = storage_with("d.wav", truncated);
        match WavSource::<_>::open(&mut storage, "d.wav").await {
            Err(WavError::MissingData) => {}
            other => panic!("expected MissingData, got {:?}", other.map(|_| ())),
        }
    }
}
