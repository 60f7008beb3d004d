//! Property tests for the universal invariants: envelope round-trip,
//! fragment round-trip, stego round-trip, checksum shape.

use proptest::prelude::*;

use slasshy::crypto::{checksum8_hex, decrypt, encrypt};
use slasshy::fragment::{reassemble, split, Fragment, FragmentConfig};
use slasshy::stego::{embed_bytes, extract_bytes, generate_carrier_bytes};
use slasshy::CryptoError;

proptest! {
    #[test]
    fn envelope_roundtrip(
        key in any::<[u8; 32]>(),
        aad in proptest::collection::vec(any::<u8>(), 0..64),
        plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let payload = encrypt(&plaintext, &key, &aad).unwrap();
        prop_assert_eq!(decrypt(&payload, &key, &aad).unwrap(), plaintext);
    }

    #[test]
    fn envelope_rejects_tampered_aad(
        key in any::<[u8; 32]>(),
        aad in proptest::collection::vec(any::<u8>(), 1..64),
        plaintext in proptest::collection::vec(any::<u8>(), 0..512),
        flip_at in any::<proptest::sample::Index>(),
    ) {
        let payload = encrypt(&plaintext, &key, &aad).unwrap();
        let mut bad_aad = aad.clone();
        let idx = flip_at.index(bad_aad.len());
        bad_aad[idx] ^= 0x01;
        prop_assert_eq!(decrypt(&payload, &key, &bad_aad), Err(CryptoError::Tampered));
    }

    #[test]
    fn fragment_roundtrip(
        payload in proptest::collection::vec(any::<u8>(), 0..8192),
    ) {
        let config = FragmentConfig { min_chunk: 64, max_chunk: 256 };
        let fragments = split(&payload, &config).unwrap();

        prop_assert!(fragments.len() <= 100);
        for fragment in &fragments {
            let wire = fragment.to_bytes();
            prop_assert_eq!(&Fragment::from_bytes(&wire).unwrap(), fragment);
        }
        prop_assert_eq!(reassemble(&fragments).unwrap(), payload);
    }

    #[test]
    fn fragment_sizes_stay_in_bounds(
        payload in proptest::collection::vec(any::<u8>(), 200..8192),
    ) {
        let config = FragmentConfig { min_chunk: 64, max_chunk: 256 };
        let fragments = split(&payload, &config).unwrap();

        for fragment in &fragments[..fragments.len() - 1] {
            prop_assert!(fragment.data.len() >= config.min_chunk);
            prop_assert!(fragment.data.len() <= config.max_chunk);
        }
        prop_assert!(fragments.last().unwrap().data.len() <= config.max_chunk);
    }

    #[test]
    fn checksum_is_always_sixteen_hex_chars(
        data in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let checksum = checksum8_hex(&data);
        prop_assert_eq!(checksum.len(), 16);
        prop_assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

proptest! {
    // Carrier generation dominates runtime; a smaller case count keeps
    // the suite quick while still varying payload sizes.
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn stego_roundtrip_on_generated_carriers(
        payload in proptest::collection::vec(any::<u8>(), 1..512),
    ) {
        let carrier = generate_carrier_bytes(payload.len()).unwrap();
        let stego = embed_bytes(&carrier, &payload).unwrap();
        prop_assert_eq!(extract_bytes(&stego).unwrap(), payload);
    }
}
