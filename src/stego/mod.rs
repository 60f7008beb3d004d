//! Steganographic codec.
//!
//! This module provides:
//! - LSB embedding and extraction over PNG carriers (`png_codec`)
//! - decoy carrier generation (`decoy`)
//!
//! Only PNG carriers are implemented; JPG is a recognized carrier kind
//! in vault data but the codec rejects it.

pub mod decoy;
pub mod png_codec;

pub use decoy::{generate_carrier_bytes, generate_decoy, generate_decoy_with_size};
pub use png_codec::{
    capacity_bytes, embed, embed_bytes, extract, extract_bytes, has_embedded_data, EmbedOutcome,
    HEADER_LEN, STEGO_MAGIC,
};
