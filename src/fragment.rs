//! Payload fragmenter.
//!
//! An encrypted payload is split into up to 100 length-randomized
//! fragments before steganographic embedding, so no single carrier
//! reveals the payload size. Each fragment is independently decodable:
//! it carries its index, the fragment total, and an 8-byte truncated
//! SHA-256 checksum of its data.
//!
//! Wire layout (16-byte header, big-endian):
//!
//! ```text
//! [index: u16][total: u16][checksum: 8 bytes][dataLength: u32][data]
//! ```

use crate::crypto::primitives::{checksum8, constant_time_eq, random_int};
use crate::errors::FragmentError;

/// Default minimum fragment size (64 KiB).
pub const MIN_CHUNK: usize = 64 * 1024;

/// Default maximum fragment size (512 KiB).
pub const MAX_CHUNK: usize = 512 * 1024;

/// Hard cap on the number of fragments per payload.
pub const MAX_FRAGMENTS: usize = 100;

/// Size of the serialized fragment header.
pub const HEADER_LEN: usize = 16;

/// Fragment size bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentConfig {
    pub min_chunk: usize,
    pub max_chunk: usize,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            min_chunk: MIN_CHUNK,
            max_chunk: MAX_CHUNK,
        }
    }
}

/// One independently decodable slice of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub index: u16,
    pub total: u16,
    pub checksum: [u8; 8],
    pub data: Vec<u8>,
}

impl Fragment {
    fn new(index: u16, total: u16, data: Vec<u8>) -> Self {
        let checksum = checksum8(&data);
        Self {
            index,
            total,
            checksum,
            data,
        }
    }

    /// Serialize to the 16-byte-header wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.total.to_be_bytes());
        out.extend_from_slice(&self.checksum);
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse and verify a serialized fragment.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, FragmentError> {
        if buf.len() < HEADER_LEN {
            return Err(FragmentError::Truncated);
        }

        let index = u16::from_be_bytes([buf[0], buf[1]]);
        let total = u16::from_be_bytes([buf[2], buf[3]]);
        let mut checksum = [0u8; 8];
        checksum.copy_from_slice(&buf[4..12]);
        let data_len = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]) as usize;

        if buf.len() < HEADER_LEN + data_len {
            return Err(FragmentError::Truncated);
        }
        if total == 0 || total as usize > MAX_FRAGMENTS || index >= total {
            return Err(FragmentError::Corrupt(index));
        }

        let data = buf[HEADER_LEN..HEADER_LEN + data_len].to_vec();
        if !constant_time_eq(&checksum8(&data), &checksum) {
            return Err(FragmentError::Corrupt(index));
        }

        Ok(Self {
            index,
            total,
            checksum,
            data,
        })
    }
}

/// Split `payload` into length-randomized fragments.
///
/// Fragment count is `clamp(ceil(len / avgChunk), 2, 100)` with
/// `avgChunk = (min + max) / 2`; each fragment gets the average of the
/// remainder plus uniform jitter, clamped so every non-final fragment
/// stays inside `[min, max]` and the remainder stays allocatable. The
/// final fragment takes whatever is left and may be smaller than `min`.
pub fn split(payload: &[u8], config: &FragmentConfig) -> Result<Vec<Fragment>, FragmentError> {
    let len = payload.len();

    if len > config.max_chunk * MAX_FRAGMENTS {
        return Err(FragmentError::TooMany(MAX_FRAGMENTS));
    }
    if len <= config.min_chunk {
        return Ok(vec![Fragment::new(0, 1, payload.to_vec())]);
    }

    let avg_chunk = (config.min_chunk + config.max_chunk) / 2;
    let count = len.div_ceil(avg_chunk).clamp(2, MAX_FRAGMENTS);
    let variance = (config.max_chunk - config.min_chunk) / 8;

    let mut sizes = Vec::with_capacity(count);
    let mut remaining = len;
    for i in 0..count - 1 {
        let left = count - i;
        let others = left - 1;
        let avg_remaining = remaining / left;

        let jitter = random_int(0, 2 * variance as u64) as i64 - variance as i64;
        let wanted = (avg_remaining as i64 + jitter).max(0) as usize;

        // Keep this fragment in [min, max] while the remainder can still
        // allocate at least min (or, for undersized tails, at least one
        // byte) and at most max per remaining fragment.
        let mut lo = config
            .min_chunk
            .max(remaining.saturating_sub(config.max_chunk * others));
        let mut hi = config
            .max_chunk
            .min(remaining.saturating_sub(config.min_chunk * others));
        if hi < lo {
            hi = config.max_chunk.min(remaining - others);
            lo = lo.min(hi);
        }

        let chunk = wanted.clamp(lo, hi);
        sizes.push(chunk);
        remaining -= chunk;
    }
    sizes.push(remaining);

    let total = count as u16;
    let mut fragments = Vec::with_capacity(count);
    let mut offset = 0;
    for (i, size) in sizes.into_iter().enumerate() {
        fragments.push(Fragment::new(
            i as u16,
            total,
            payload[offset..offset + size].to_vec(),
        ));
        offset += size;
    }
    Ok(fragments)
}

/// Reassemble a complete fragment set into the original payload.
///
/// Requires every index `0..total` exactly once; order does not matter.
/// Fragments are checksum-verified again so in-memory corruption is
/// caught even when the set never went through `from_bytes`.
pub fn reassemble(fragments: &[Fragment]) -> Result<Vec<u8>, FragmentError> {
    let total = match fragments.first() {
        Some(f) => f.total,
        None => return Err(FragmentError::Missing(0)),
    };

    let mut slots: Vec<Option<&Fragment>> = vec![None; total as usize];
    for fragment in fragments {
        if fragment.total != total || fragment.index >= total {
            return Err(FragmentError::Corrupt(fragment.index));
        }
        let slot = &mut slots[fragment.index as usize];
        if slot.is_some() {
            return Err(FragmentError::Duplicate(fragment.index));
        }
        *slot = Some(fragment);
    }

    let mut payload = Vec::with_capacity(fragments.iter().map(|f| f.data.len()).sum());
    for (i, slot) in slots.iter().enumerate() {
        let fragment = slot.ok_or(FragmentError::Missing(i as u16))?;
        if !constant_time_eq(&checksum8(&fragment.data), &fragment.checksum) {
            return Err(FragmentError::Corrupt(fragment.index));
        }
        payload.extend_from_slice(&fragment.data);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> FragmentConfig {
        FragmentConfig {
            min_chunk: 16,
            max_chunk: 64,
        }
    }

    #[test]
    fn small_payload_is_a_single_fragment() {
        let config = tiny_config();
        let fragments = split(&[0xAB; 10], &config).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].index, 0);
        assert_eq!(fragments[0].total, 1);
        assert_eq!(fragments[0].data.len(), 10);
    }

    #[test]
    fn fragment_sizes_respect_bounds() {
        let config = tiny_config();
        let payload: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let fragments = split(&payload, &config).unwrap();

        assert!(fragments.len() >= 2);
        assert!(fragments.len() <= MAX_FRAGMENTS);
        for f in &fragments[..fragments.len() - 1] {
            assert!(f.data.len() >= config.min_chunk);
            assert!(f.data.len() <= config.max_chunk);
        }
        let last = fragments.last().unwrap();
        assert!(last.data.len() <= config.max_chunk);
        assert!(!last.data.is_empty());
    }

    #[test]
    fn split_covers_the_payload_in_order() {
        let config = tiny_config();
        let payload: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
        let fragments = split(&payload, &config).unwrap();
        assert_eq!(reassemble(&fragments).unwrap(), payload);
    }

    #[test]
    fn oversized_payload_is_too_many() {
        let config = tiny_config();
        let payload = vec![0u8; config.max_chunk * MAX_FRAGMENTS + 1];
        assert_eq!(
            split(&payload, &config),
            Err(FragmentError::TooMany(MAX_FRAGMENTS))
        );
    }

    #[test]
    fn wire_roundtrip() {
        let fragment = Fragment::new(3, 7, vec![1, 2, 3, 4, 5]);
        let bytes = fragment.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 5);
        assert_eq!(Fragment::from_bytes(&bytes).unwrap(), fragment);
    }

    #[test]
    fn header_layout_is_big_endian() {
        let fragment = Fragment::new(1, 2, vec![0xFF; 3]);
        let bytes = fragment.to_bytes();
        assert_eq!(&bytes[0..2], &[0x00, 0x01]);
        assert_eq!(&bytes[2..4], &[0x00, 0x02]);
        assert_eq!(&bytes[12..16], &[0x00, 0x00, 0x00, 0x03]);
    }

    #[test]
    fn short_buffer_is_truncated() {
        assert_eq!(
            Fragment::from_bytes(&[0u8; HEADER_LEN - 1]),
            Err(FragmentError::Truncated)
        );

        let fragment = Fragment::new(0, 1, vec![9; 20]);
        let bytes = fragment.to_bytes();
        assert_eq!(
            Fragment::from_bytes(&bytes[..bytes.len() - 1]),
            Err(FragmentError::Truncated)
        );
    }

    #[test]
    fn corrupted_data_is_detected() {
        let fragment = Fragment::new(2, 5, vec![7; 32]);
        let mut bytes = fragment.to_bytes();
        bytes[HEADER_LEN + 4] ^= 0x80;
        assert_eq!(Fragment::from_bytes(&bytes), Err(FragmentError::Corrupt(2)));
    }

    #[test]
    fn zero_total_is_corrupt() {
        let mut bytes = Fragment::new(0, 1, vec![1]).to_bytes();
        bytes[2] = 0;
        bytes[3] = 0;
        assert!(matches!(
            Fragment::from_bytes(&bytes),
            Err(FragmentError::Corrupt(_))
        ));
    }

    #[test]
    fn reassemble_rejects_missing_and_duplicate() {
        let config = tiny_config();
        let payload = vec![0x42u8; 300];
        let fragments = split(&payload, &config).unwrap();
        assert!(fragments.len() >= 3);

        let mut dropped = fragments.clone();
        dropped.remove(1);
        assert_eq!(reassemble(&dropped), Err(FragmentError::Missing(1)));

        let mut duplicated = fragments.clone();
        duplicated.push(fragments[0].clone());
        assert_eq!(reassemble(&duplicated), Err(FragmentError::Duplicate(0)));
    }

    #[test]
    fn reassemble_tolerates_shuffle() {
        let config = tiny_config();
        let payload: Vec<u8> = (0..400u32).map(|i| i as u8).collect();
        let mut fragments = split(&payload, &config).unwrap();
        fragments.reverse();
        assert_eq!(reassemble(&fragments).unwrap(), payload);
    }

    #[test]
    fn empty_payload_roundtrips() {
        let fragments = split(&[], &FragmentConfig::default()).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(reassemble(&fragments).unwrap(), Vec::<u8>::new());
    }
}
