//! Integration tests for the PNG stego codec, on real files.

use rand::rngs::OsRng;
use rand::RngCore;
use tempfile::TempDir;

use slasshy::stego::{
    capacity_bytes, embed, extract, generate_decoy_with_size, has_embedded_data,
};
use slasshy::StegoError;

fn random_payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    OsRng.fill_bytes(&mut payload);
    payload
}

// ---------------------------------------------------------------------------
// Bit-exact round-trip
// ---------------------------------------------------------------------------

#[test]
fn gradient_carrier_roundtrip_is_bit_exact() {
    let dir = TempDir::new().unwrap();
    let carrier = dir.path().join("carrier.png");
    let output = dir.path().join("stego.png");

    generate_decoy_with_size(&carrier, 800, 600).expect("generate carrier");
    let payload = random_payload(1024);

    let outcome = embed(&carrier, &payload, &output).expect("embed");
    assert_eq!(outcome.bytes_embedded, 1024);
    assert_eq!(outcome.capacity, capacity_bytes(800, 600));
    assert_eq!(outcome.checksum.len(), 16);

    let extracted = extract(&output).expect("extract");
    assert_eq!(extracted, payload);

    assert!(has_embedded_data(&output));
    assert!(!has_embedded_data(&carrier));
}

#[test]
fn probe_is_false_for_missing_or_non_png_files() {
    let dir = TempDir::new().unwrap();

    assert!(!has_embedded_data(&dir.path().join("nope.png")));

    let not_png = dir.path().join("not.png");
    std::fs::write(&not_png, b"definitely not a png").unwrap();
    assert!(!has_embedded_data(&not_png));
}

// ---------------------------------------------------------------------------
// Capacity boundary
// ---------------------------------------------------------------------------

#[test]
fn capacity_boundary_is_exact_for_100x100() {
    let dir = TempDir::new().unwrap();
    let carrier = dir.path().join("small.png");
    let output = dir.path().join("out.png");
    generate_decoy_with_size(&carrier, 100, 100).expect("generate carrier");

    assert_eq!(capacity_bytes(100, 100), 3734);

    // Exactly at capacity succeeds.
    let full = random_payload(3734);
    embed(&carrier, &full, &output).expect("embed at capacity");
    assert_eq!(extract(&output).expect("extract"), full);

    // One byte past capacity is rejected.
    let over = random_payload(3735);
    let err = embed(&carrier, &over, &output).unwrap_err();
    assert_eq!(
        err,
        StegoError::CarrierTooSmall {
            needed: 3735,
            capacity: 3734
        }
    );
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[test]
fn extract_on_clean_carrier_is_no_payload() {
    let dir = TempDir::new().unwrap();
    let carrier = dir.path().join("clean.png");
    generate_decoy_with_size(&carrier, 120, 80).expect("generate carrier");

    assert_eq!(extract(&carrier), Err(StegoError::NoPayload));
}

#[test]
fn extract_on_invalid_file_is_invalid_image() {
    let dir = TempDir::new().unwrap();
    let bogus = dir.path().join("bogus.png");
    std::fs::write(&bogus, b"\x89PNG\r\n\x1a\ntruncated").unwrap();

    assert!(matches!(extract(&bogus), Err(StegoError::InvalidImage(_))));
}

#[test]
fn embedded_checksum_matches_payload() {
    let dir = TempDir::new().unwrap();
    let carrier = dir.path().join("c.png");
    let output = dir.path().join("o.png");
    generate_decoy_with_size(&carrier, 200, 200).expect("generate carrier");

    let payload = b"known payload".to_vec();
    let outcome = embed(&carrier, &payload, &output).expect("embed");
    assert_eq!(
        outcome.checksum,
        slasshy::crypto::checksum8_hex(&payload)
    );
}

#[test]
fn reembedding_overwrites_the_previous_payload() {
    let dir = TempDir::new().unwrap();
    let carrier = dir.path().join("c.png");
    let first = dir.path().join("first.png");
    let second = dir.path().join("second.png");
    generate_decoy_with_size(&carrier, 160, 160).expect("generate carrier");

    embed(&carrier, b"old payload", &first).expect("embed old");
    embed(&first, b"new payload!", &second).expect("embed new");

    assert_eq!(extract(&second).expect("extract"), b"new payload!");
}
