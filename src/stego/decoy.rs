//! Decoy carrier generation.
//!
//! Carriers are produced on demand — a fresh image per fragment, never
//! reused — and the same generator yields the chaff images uploaded
//! alongside real carriers. A decoy is a smooth two-color gradient with
//! per-channel noise: enough texture to look like a photograph export,
//! no embedded payload.

use std::path::Path;

use rand::rngs::OsRng;
use rand::Rng;

use crate::errors::StegoError;
use crate::stego::png_codec::{encode_carrier, save_carrier, Carrier};

/// Dimension bounds for generated carriers.
const MIN_DIM: u32 = 640;
const MAX_DIM: u32 = 1280;

fn gradient_carrier(width: u32, height: u32) -> Carrier {
    let mut rng = OsRng;
    let from: [u8; 3] = [rng.gen(), rng.gen(), rng.gen()];
    let to: [u8; 3] = [rng.gen(), rng.gen(), rng.gen()];

    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    let span = (width + height - 2).max(1) as f32;
    for y in 0..height {
        for x in 0..width {
            let t = (x + y) as f32 / span;
            for c in 0..3 {
                let base = from[c] as f32 + (to[c] as f32 - from[c] as f32) * t;
                let noise: i16 = rng.gen_range(-2..=2);
                data.push((base as i16 + noise).clamp(0, 255) as u8);
            }
            data.push(255);
        }
    }

    Carrier {
        width,
        height,
        channels: 4,
        color: png::ColorType::Rgba,
        data,
    }
}

/// Generate a decoy PNG with the given dimensions.
pub fn generate_decoy_with_size(path: &Path, width: u32, height: u32) -> Result<(), StegoError> {
    save_carrier(&gradient_carrier(width, height), path)
}

/// Generate a decoy PNG with randomized dimensions.
pub fn generate_decoy(path: &Path) -> Result<(), StegoError> {
    let mut rng = OsRng;
    let width = rng.gen_range(MIN_DIM..=MAX_DIM);
    let height = rng.gen_range(MIN_DIM..=MAX_DIM);
    generate_decoy_with_size(path, width, height)
}

/// In-memory carrier PNG sized to hold at least `payload_len` bytes.
///
/// Picks the smallest bounded dimensions whose capacity covers the
/// payload, then randomizes within the remaining headroom.
pub fn generate_carrier_bytes(payload_len: usize) -> Result<Vec<u8>, StegoError> {
    let mut rng = OsRng;
    // capacity = w*h*3/8 - 16, so w*h must reach this many pixels.
    let needed_pixels = ((payload_len + 16) * 8).div_ceil(3) as u64;

    let mut width = rng.gen_range(MIN_DIM..=MAX_DIM);
    let mut height = rng.gen_range(MIN_DIM..=MAX_DIM);
    while (width as u64) * (height as u64) < needed_pixels {
        if width <= height {
            width = width.saturating_mul(2);
        } else {
            height = height.saturating_mul(2);
        }
    }

    encode_carrier(&gradient_carrier(width, height))
}
