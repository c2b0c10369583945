//! RIFF/WAVE container codec
//!
//! Pure byte-level decode/encode for linear PCM at 8, 16, or 32 bits per
//! sample. The decoder tolerates two quirks seen in the wild:
//!
//! - a data chunk whose declared length is negative (the synthesis service
//!   sometimes leaves the field unset); the payload is taken to run to the
//!   end of the stream
//! - odd-length payloads, which are word-aligned with a trailing pad byte
//!   that must not be read as the next chunk header
//!
//! 8-bit samples decode as unsigned bytes (the legacy convention of the
//! source format) but encode as signed bytes; the two directions are
//! intentionally not symmetric. 16- and 32-bit round-trip cleanly.

use crate::audio::pcm::{PcmBuffer, SUPPORTED_BIT_DEPTHS};
use crate::{Error, Result};

const FORM_TAG: &[u8; 4] = b"RIFF";
const CONTAINER_TAG: &[u8; 4] = b"WAVE";
const FORMAT_TAG: &[u8; 4] = b"fmt ";
const DATA_TAG: &[u8; 4] = b"data";

/// Chunk header: 4-byte id + 4-byte declared length
const CHUNK_HEADER_LEN: usize = 8;
/// Fixed PCM format chunk payload
const FORMAT_PAYLOAD_LEN: u32 = 16;
/// Form length field for "WAVE" + fmt chunk + data chunk header
const FORM_LENGTH_BASE: u32 = 4 + CHUNK_HEADER_LEN as u32 + FORMAT_PAYLOAD_LEN + CHUNK_HEADER_LEN as u32;

/// Format metadata carried between the fmt and data chunks during a decode
#[derive(Debug, Clone, Copy)]
struct FormatChunk {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Decode a RIFF/WAVE byte stream into a [`PcmBuffer`].
///
/// Scanning stops after the first data chunk; other chunk tags are skipped
/// by their (corrected, word-aligned) length.
///
/// # Errors
///
/// Returns [`Error::MalformedContainer`] when the form/container tags are
/// wrong or no data chunk is found, [`Error::MissingFormatChunk`] when a
/// data chunk precedes the format chunk, and [`Error::UnsupportedBitDepth`]
/// when the format chunk declares a depth outside {8, 16, 32}.
pub fn decode(bytes: &[u8]) -> Result<PcmBuffer> {
    let mut reader = Reader::new(bytes);

    let form_tag = reader.tag()?;
    let _form_length = reader.u32()?;
    let container_tag = reader.tag()?;
    if &form_tag != FORM_TAG || &container_tag != CONTAINER_TAG {
        return Err(Error::MalformedContainer(format!(
            "{} != RIFF || {} != WAVE",
            print_tag(&form_tag),
            print_tag(&container_tag)
        )));
    }

    let mut format: Option<FormatChunk> = None;

    while reader.remaining() >= CHUNK_HEADER_LEN {
        let id = reader.tag()?;
        let declared = reader.i32()?;

        // Negative length means the writer never filled the field in; the
        // payload runs to the end of the stream.
        #[allow(clippy::cast_sign_loss)]
        let length = if declared < 0 {
            reader.remaining()
        } else {
            declared as usize
        };
        // Chunks are word-aligned: odd payloads carry one pad byte.
        let padded = length + (length & 1);
        let chunk_start = reader.position();

        if &id == FORMAT_TAG {
            format = Some(parse_format(&mut reader)?);
            reader.seek(chunk_start + padded);
        } else if &id == DATA_TAG {
            let Some(format) = format else {
                return Err(Error::MissingFormatChunk);
            };
            let payload = reader.take_up_to(length);
            return convert_payload(format, payload);
        } else {
            tracing::trace!(tag = %print_tag(&id), length, "skipping chunk");
            reader.seek(chunk_start + padded);
        }
    }

    Err(Error::MalformedContainer("no data chunk".to_string()))
}

/// Encode a [`PcmBuffer`] into a RIFF/WAVE byte stream.
///
/// Emits the 12-byte form header, a 16-byte linear PCM format chunk, and a
/// data chunk of little-endian integer samples. Odd-length payloads get one
/// zero pad byte while the declared chunk length stays unpadded, matching
/// the decoder's skip logic. Never fails: the buffer's invariants already
/// constrain the bit depth.
#[must_use]
pub fn encode(buffer: &PcmBuffer) -> Vec<u8> {
    let bits = buffer.bits_per_sample();
    let bytes_per_sample = usize::from(bits / 8);
    let data_length = buffer.samples().len() * bytes_per_sample;

    let mut out = Vec::with_capacity(12 + CHUNK_HEADER_LEN + FORMAT_PAYLOAD_LEN as usize + CHUNK_HEADER_LEN + data_length + 1);

    #[allow(clippy::cast_possible_truncation)]
    let data_length_field = data_length as u32;

    out.extend_from_slice(FORM_TAG);
    out.extend_from_slice(&(FORM_LENGTH_BASE + data_length_field).to_le_bytes());
    out.extend_from_slice(CONTAINER_TAG);

    let block_align = buffer.channels() * (bits / 8);
    let byte_rate = buffer.sample_rate() * u32::from(block_align);

    out.extend_from_slice(FORMAT_TAG);
    out.extend_from_slice(&FORMAT_PAYLOAD_LEN.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // linear PCM
    out.extend_from_slice(&buffer.channels().to_le_bytes());
    out.extend_from_slice(&buffer.sample_rate().to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());

    out.extend_from_slice(DATA_TAG);
    out.extend_from_slice(&data_length_field.to_le_bytes());

    // Float-to-int casts saturate, which clamps +1.0 to the integer maximum.
    #[allow(clippy::cast_possible_truncation)]
    for &sample in buffer.samples() {
        match bits {
            16 => {
                let value = (sample * 32_768.0) as i16;
                out.extend_from_slice(&value.to_le_bytes());
            }
            32 => {
                let value = (sample * 2_147_483_648.0) as i32;
                out.extend_from_slice(&value.to_le_bytes());
            }
            // 8-bit writes signed bytes; see the module docs on asymmetry.
            _ => {
                let value = (sample * 128.0) as i8;
                out.push(value.to_le_bytes()[0]);
            }
        }
    }

    if data_length & 1 == 1 {
        out.push(0);
    }

    out
}

/// Parse the fixed-layout PCM fields of a format chunk
fn parse_format(reader: &mut Reader<'_>) -> Result<FormatChunk> {
    let _format_code = reader.u16()?; // not trusted; any code accepted
    let channels = reader.u16()?;
    let sample_rate = reader.u32()?;
    let _byte_rate = reader.u32()?; // recomputed on encode
    let _block_align = reader.u16()?; // recomputed on encode
    let bits_per_sample = reader.u16()?;

    if !SUPPORTED_BIT_DEPTHS.contains(&bits_per_sample) {
        return Err(Error::UnsupportedBitDepth(bits_per_sample));
    }
    if channels == 0 {
        return Err(Error::MalformedContainer(
            "format chunk declares zero channels".to_string(),
        ));
    }

    tracing::debug!(channels, sample_rate, bits_per_sample, "parsed format chunk");

    Ok(FormatChunk {
        channels,
        sample_rate,
        bits_per_sample,
    })
}

/// Convert a data chunk payload to normalized floats
fn convert_payload(format: FormatChunk, payload: &[u8]) -> Result<PcmBuffer> {
    let bits = format.bits_per_sample;
    let bytes_per_sample = usize::from(bits / 8);

    #[allow(clippy::cast_precision_loss)]
    let mut samples: Vec<f32> = match bits {
        16 => payload
            .chunks_exact(bytes_per_sample)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32_768.0)
            .collect(),
        32 => payload
            .chunks_exact(bytes_per_sample)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0)
            .collect(),
        // Legacy convention: 8-bit samples are read unsigned.
        _ => payload.iter().map(|&b| f32::from(b) / 128.0).collect(),
    };

    // Drop a trailing partial frame so the buffer invariant holds.
    let whole = samples.len() - samples.len() % usize::from(format.channels);
    samples.truncate(whole);

    tracing::debug!(
        channels = format.channels,
        sample_rate = format.sample_rate,
        bits_per_sample = bits,
        samples = samples.len(),
        "decoded data chunk"
    );

    PcmBuffer::new(format.sample_rate, format.channels, bits, samples)
}

/// Render a 4-byte tag for error messages
fn print_tag(tag: &[u8; 4]) -> String {
    tag.iter().map(|&b| char::from(b)).collect()
}

/// Cursor over the input bytes with little-endian primitive reads
struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    const fn position(&self) -> usize {
        self.position
    }

    const fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Move to an absolute offset, clamped to the end of the stream
    fn seek(&mut self, position: usize) {
        self.position = position.min(self.bytes.len());
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::MalformedContainer(format!(
                "truncated stream: wanted {count} bytes at offset {}, have {}",
                self.position,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    /// Take up to `count` bytes, fewer when the stream is shorter
    fn take_up_to(&mut self, count: usize) -> &'a [u8] {
        let count = count.min(self.remaining());
        let slice = &self.bytes[self.position..self.position + count];
        self.position += count;
        slice
    }

    fn tag(&mut self) -> Result<[u8; 4]> {
        let bytes = self.take(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
