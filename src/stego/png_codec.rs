//! LSB steganography over PNG carriers.
//!
//! Payload bits are streamed most-significant-first through the red,
//! green, and blue channels of each pixel in row-major order (y outer,
//! x inner), overwriting the least significant bit of each channel.
//! The alpha channel is never touched — its modification is visually
//! detectable.
//!
//! The embedded stream is `[HEADER | data]` with a 16-byte header:
//!
//! ```text
//! [magic "SLSH": 4 bytes][dataLength: u32 BE][checksum8(data): 8 bytes]
//! ```

use std::fs::File;
use std::io::{BufWriter, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::crypto::primitives::{checksum8, checksum8_hex};
use crate::errors::StegoError;

/// Magic bytes framing every embedded payload.
pub const STEGO_MAGIC: [u8; 4] = *b"SLSH";

/// Size of the embedded header in bytes.
pub const HEADER_LEN: usize = 16;

/// Decoded carrier pixels plus enough metadata to re-encode losslessly.
pub(crate) struct Carrier {
    pub width: u32,
    pub height: u32,
    /// 3 for RGB, 4 for RGBA.
    pub channels: usize,
    pub color: png::ColorType,
    pub data: Vec<u8>,
}

impl Carrier {
    /// Usable payload bytes for this carrier's dimensions.
    pub fn capacity(&self) -> usize {
        capacity_bytes(self.width, self.height)
    }
}

/// Usable payload bytes for a W×H carrier: three LSBs per pixel, minus
/// the 16-byte header.
pub fn capacity_bytes(width: u32, height: u32) -> usize {
    (width as usize * height as usize * 3 / 8).saturating_sub(HEADER_LEN)
}

/// Outcome of a successful embed.
#[derive(Debug, Clone)]
pub struct EmbedOutcome {
    pub output_path: PathBuf,
    pub bytes_embedded: usize,
    /// `checksum8` of the embedded data, as 16 hex chars.
    pub checksum: String,
    pub capacity: usize,
}

pub(crate) fn load_carrier_from(reader: impl Read) -> Result<Carrier, StegoError> {
    let decoder = png::Decoder::new(reader);
    let mut reader = decoder
        .read_info()
        .map_err(|e| StegoError::InvalidImage(e.to_string()))?;

    let mut data = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut data)
        .map_err(|e| StegoError::InvalidImage(e.to_string()))?;

    if info.bit_depth != png::BitDepth::Eight {
        return Err(StegoError::InvalidImage(format!(
            "unsupported bit depth {:?}, expected 8",
            info.bit_depth
        )));
    }
    let channels = match info.color_type {
        png::ColorType::Rgba => 4,
        png::ColorType::Rgb => 3,
        other => {
            return Err(StegoError::InvalidImage(format!(
                "unsupported color type {other:?}, expected RGB or RGBA"
            )));
        }
    };

    data.truncate(info.buffer_size());
    Ok(Carrier {
        width: info.width,
        height: info.height,
        channels,
        color: info.color_type,
        data,
    })
}

pub(crate) fn load_carrier(path: &Path) -> Result<Carrier, StegoError> {
    let file = File::open(path).map_err(|e| StegoError::InvalidImage(e.to_string()))?;
    load_carrier_from(file)
}

pub(crate) fn save_carrier(carrier: &Carrier, path: &Path) -> Result<(), StegoError> {
    let file = File::create(path).map_err(|e| StegoError::InvalidImage(e.to_string()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), carrier.width, carrier.height);
    encoder.set_color(carrier.color);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder
        .write_header()
        .map_err(|e| StegoError::InvalidImage(e.to_string()))?;
    writer
        .write_image_data(&carrier.data)
        .map_err(|e| StegoError::InvalidImage(e.to_string()))?;
    writer
        .finish()
        .map_err(|e| StegoError::InvalidImage(e.to_string()))
}

pub(crate) fn encode_carrier(carrier: &Carrier) -> Result<Vec<u8>, StegoError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, carrier.width, carrier.height);
        encoder.set_color(carrier.color);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| StegoError::InvalidImage(e.to_string()))?;
        writer
            .write_image_data(&carrier.data)
            .map_err(|e| StegoError::InvalidImage(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| StegoError::InvalidImage(e.to_string()))?;
    }
    Ok(out)
}

fn build_header(data: &[u8]) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&STEGO_MAGIC);
    header[4..8].copy_from_slice(&(data.len() as u32).to_be_bytes());
    header[8..16].copy_from_slice(&checksum8(data));
    header
}

/// Overwrite carrier LSBs with `header || data`, in place.
fn write_bits(carrier: &mut Carrier, data: &[u8]) -> Result<(), StegoError> {
    let capacity = carrier.capacity();
    if data.len() > capacity {
        return Err(StegoError::CarrierTooSmall {
            needed: data.len(),
            capacity,
        });
    }

    let header = build_header(data);
    let payload = header.iter().chain(data.iter());
    let total_bits = (HEADER_LEN + data.len()) * 8;

    let mut bits = payload.flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1));
    let channels = carrier.channels;
    let mut written = 0usize;

    'pixels: for pixel in carrier.data.chunks_mut(channels) {
        for channel in pixel.iter_mut().take(3) {
            match bits.next() {
                Some(bit) => {
                    *channel = (*channel & 0xFE) | bit;
                    written += 1;
                }
                None => break 'pixels,
            }
        }
    }

    debug_assert_eq!(written, total_bits);
    Ok(())
}

/// Iterator over the LSB stream of a carrier, yielding whole bytes.
struct LsbBytes<'a> {
    carrier: &'a Carrier,
    /// Absolute channel cursor, alpha positions skipped by construction.
    pixel: usize,
    channel: usize,
}

impl<'a> LsbBytes<'a> {
    fn new(carrier: &'a Carrier) -> Self {
        Self {
            carrier,
            pixel: 0,
            channel: 0,
        }
    }

    fn next_byte(&mut self) -> Option<u8> {
        let channels = self.carrier.channels;
        let pixel_count = self.carrier.data.len() / channels;
        let mut byte = 0u8;
        for _ in 0..8 {
            if self.pixel >= pixel_count {
                return None;
            }
            let offset = self.pixel * channels + self.channel;
            byte = (byte << 1) | (self.carrier.data[offset] & 1);
            self.channel += 1;
            if self.channel == 3 {
                self.channel = 0;
                self.pixel += 1;
            }
        }
        Some(byte)
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, StegoError> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.next_byte().ok_or(StegoError::Truncated)?);
        }
        Ok(out)
    }
}

/// Embed `data` into the PNG at `carrier_path`, writing the stego image
/// to `output_path`.
pub fn embed(
    carrier_path: &Path,
    data: &[u8],
    output_path: &Path,
) -> Result<EmbedOutcome, StegoError> {
    let mut carrier = load_carrier(carrier_path)?;
    write_bits(&mut carrier, data)?;
    save_carrier(&carrier, output_path)?;

    Ok(EmbedOutcome {
        output_path: output_path.to_path_buf(),
        bytes_embedded: data.len(),
        checksum: checksum8_hex(data),
        capacity: carrier.capacity(),
    })
}

/// In-memory variant of [`embed`]: takes encoded PNG bytes, returns the
/// re-encoded stego PNG. Used by the cloud pipeline, which never parks
/// carriers on disk.
pub fn embed_bytes(carrier_png: &[u8], data: &[u8]) -> Result<Vec<u8>, StegoError> {
    let mut carrier = load_carrier_from(Cursor::new(carrier_png))?;
    write_bits(&mut carrier, data)?;
    encode_carrier(&carrier)
}

fn extract_from(carrier: &Carrier) -> Result<Vec<u8>, StegoError> {
    let mut lsb = LsbBytes::new(carrier);

    let header = lsb.read_exact(HEADER_LEN)?;
    if header[..4] != STEGO_MAGIC {
        return Err(StegoError::NoPayload);
    }

    let data_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    // A length field the carrier cannot hold means the header itself is
    // damaged; bound the allocation before trusting it.
    if data_len > carrier.capacity() {
        return Err(StegoError::Corrupt);
    }

    let data = lsb.read_exact(data_len)?;
    if checksum8(&data) != header[8..16] {
        return Err(StegoError::Corrupt);
    }
    Ok(data)
}

/// Extract the embedded payload from a stego PNG on disk.
pub fn extract(path: &Path) -> Result<Vec<u8>, StegoError> {
    extract_from(&load_carrier(path)?)
}

/// In-memory variant of [`extract`].
pub fn extract_bytes(stego_png: &[u8]) -> Result<Vec<u8>, StegoError> {
    extract_from(&load_carrier_from(Cursor::new(stego_png))?)
}

/// Probe for the magic without reading the payload.
///
/// Reads exactly the first 32 payload bits; any load failure is `false`.
pub fn has_embedded_data(path: &Path) -> bool {
    let carrier = match load_carrier(path) {
        Ok(c) => c,
        Err(_) => return false,
    };
    let mut lsb = LsbBytes::new(&carrier);
    match lsb.read_exact(4) {
        Ok(magic) => magic == STEGO_MAGIC,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_carrier(width: u32, height: u32, channels: usize) -> Carrier {
        let color = if channels == 4 {
            png::ColorType::Rgba
        } else {
            png::ColorType::Rgb
        };
        Carrier {
            width,
            height,
            channels,
            color,
            data: vec![0x80; width as usize * height as usize * channels],
        }
    }

    #[test]
    fn capacity_formula() {
        // floor(100*100*3 / 8) - 16
        assert_eq!(capacity_bytes(100, 100), 3734);
        assert_eq!(capacity_bytes(800, 600), 179_984);
    }

    #[test]
    fn in_memory_roundtrip_rgba() {
        let mut carrier = flat_carrier(64, 64, 4);
        let data: Vec<u8> = (0..512u32).map(|i| (i * 7 % 256) as u8).collect();
        write_bits(&mut carrier, &data).unwrap();
        assert_eq!(extract_from(&carrier).unwrap(), data);
    }

    #[test]
    fn in_memory_roundtrip_rgb() {
        let mut carrier = flat_carrier(64, 64, 3);
        let data = vec![0xC3u8; 100];
        write_bits(&mut carrier, &data).unwrap();
        assert_eq!(extract_from(&carrier).unwrap(), data);
    }

    #[test]
    fn alpha_channel_is_untouched() {
        let mut carrier = flat_carrier(32, 32, 4);
        write_bits(&mut carrier, &[0xFFu8; 128]).unwrap();
        for pixel in carrier.data.chunks(4) {
            assert_eq!(pixel[3], 0x80, "alpha byte must not change");
        }
    }

    #[test]
    fn pixels_past_the_payload_are_untouched() {
        let mut carrier = flat_carrier(64, 64, 3);
        let original = carrier.data.clone();
        write_bits(&mut carrier, &[0u8; 8]).unwrap();

        let touched_channels = (HEADER_LEN + 8) * 8;
        assert_eq!(carrier.data[touched_channels..], original[touched_channels..]);
    }

    #[test]
    fn over_capacity_is_rejected() {
        let mut carrier = flat_carrier(10, 10, 4);
        let capacity = carrier.capacity();
        let result = write_bits(&mut carrier, &vec![0u8; capacity + 1]);
        assert_eq!(
            result,
            Err(StegoError::CarrierTooSmall {
                needed: capacity + 1,
                capacity
            })
        );
    }

    #[test]
    fn exact_capacity_fits() {
        let mut carrier = flat_carrier(100, 100, 4);
        let data = vec![0x55u8; 3734];
        write_bits(&mut carrier, &data).unwrap();
        assert_eq!(extract_from(&carrier).unwrap(), data);
    }

    #[test]
    fn missing_magic_is_no_payload() {
        let carrier = flat_carrier(32, 32, 4);
        assert_eq!(extract_from(&carrier), Err(StegoError::NoPayload));
    }

    #[test]
    fn tampered_length_is_corrupt_or_truncated() {
        let mut carrier = flat_carrier(32, 32, 4);
        write_bits(&mut carrier, &[0xAAu8; 64]).unwrap();

        // Flip the most significant bit of the length field: bit 32 of
        // the payload stream, i.e. the LSB of channel index 32.
        let channels = carrier.channels;
        let offset = (32 / 3) * channels + (32 % 3);
        carrier.data[offset] ^= 1;

        let result = extract_from(&carrier);
        assert!(
            matches!(result, Err(StegoError::Corrupt) | Err(StegoError::Truncated)),
            "got {result:?}"
        );
    }

    #[test]
    fn tampered_checksum_is_corrupt() {
        let mut carrier = flat_carrier(32, 32, 4);
        write_bits(&mut carrier, &[0xAAu8; 64]).unwrap();

        // First checksum bit is payload bit 64.
        let channels = carrier.channels;
        let offset = (64 / 3) * channels + (64 % 3);
        carrier.data[offset] ^= 1;

        assert_eq!(extract_from(&carrier), Err(StegoError::Corrupt));
    }

    #[test]
    fn encoded_png_roundtrip() {
        let carrier = flat_carrier(48, 48, 4);
        let png_bytes = encode_carrier(&carrier).unwrap();
        let data = vec![0x11u8; 200];

        let stego = embed_bytes(&png_bytes, &data).unwrap();
        assert_eq!(extract_bytes(&stego).unwrap(), data);
    }

    #[test]
    fn tiny_image_cannot_hold_a_header() {
        // 4x4 RGBA = 48 usable bits, less than the 128-bit header.
        let carrier = flat_carrier(4, 4, 4);
        assert_eq!(extract_from(&carrier), Err(StegoError::Truncated));
    }
}
