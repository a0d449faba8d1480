//! End-to-end checks over a synthesized update container: open, validate,
//! extract, re-encrypt, and the failure modes in between.

use tl866_updater::cipher::{encrypt_firmware, KeyTables};
use tl866_updater::device::DeviceVersion;
use tl866_updater::firmware::{Firmware, FirmwareKind, FirmwareSource};
use tl866_updater::serial::{decrypt_serial, encrypt_serial};
use tl866_updater::tables::{XOR_TABLE_A, XOR_TABLE_CS};
use tl866_updater::update::{UpdateContainer, Variant, ENCRYPTED_FIRMWARE_SIZE, UPDATE_DAT_SIZE};
use tl866_updater::validate::FIRMWARE_CRC;
use tl866_updater::{
    Error, FIRMWARE_SIGNATURE, FIRMWARE_SIGNATURE_OFFSET, FLASH_SIZE, SERIAL_LEN, SERIAL_OFFSET,
    UNENCRYPTED_FIRMWARE_SIZE, XOR_TABLE_OFFSET, XOR_TABLE_SIZE,
};

const A_ERASE: u8 = 0x20;
const CS_ERASE: u8 = 0x40;
const A_INDEX: u32 = 0x80;
const CS_INDEX: u32 = 0x1F0;

/// A deterministic firmware payload with the signature in place.
fn build_payload(seed: u8) -> Vec<u8> {
    let mut payload: Vec<u8> = (0..UNENCRYPTED_FIRMWARE_SIZE)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect();
    payload[FIRMWARE_SIGNATURE_OFFSET..].copy_from_slice(&FIRMWARE_SIGNATURE.to_le_bytes());
    payload
}

fn secondary_table(seed: u8) -> [u8; 1024] {
    std::array::from_fn(|i| (i as u8).wrapping_mul(197) ^ seed)
}

/// Assemble a well-formed container around the two payloads.
fn build_container(a_payload: &[u8], cs_payload: &[u8]) -> Vec<u8> {
    let a_secondary = secondary_table(0x55);
    let cs_secondary = secondary_table(0xAA);
    let a_keys = KeyTables {
        primary: &XOR_TABLE_A,
        secondary: &a_secondary,
    };
    let cs_keys = KeyTables {
        primary: &XOR_TABLE_CS,
        secondary: &cs_secondary,
    };

    let mut data = Vec::with_capacity(UPDATE_DAT_SIZE);
    data.extend_from_slice(b"TL8\x03");
    data.extend_from_slice(&FIRMWARE_CRC.checksum(a_payload).to_le_bytes());
    data.extend_from_slice(&[0, A_ERASE, 0, 0]);
    data.extend_from_slice(&FIRMWARE_CRC.checksum(cs_payload).to_le_bytes());
    data.extend_from_slice(&[0, CS_ERASE, 0, 0]);
    data.extend_from_slice(&A_INDEX.to_le_bytes());
    data.extend_from_slice(&XOR_TABLE_A);
    data.extend_from_slice(&a_secondary);
    data.extend_from_slice(&CS_INDEX.to_le_bytes());
    data.extend_from_slice(&XOR_TABLE_CS);
    data.extend_from_slice(&cs_secondary);
    data.extend_from_slice(&encrypt_firmware(a_payload, &a_keys, A_INDEX));
    data.extend_from_slice(&encrypt_firmware(cs_payload, &cs_keys, CS_INDEX));

    assert_eq!(data.len(), UPDATE_DAT_SIZE);
    data
}

fn well_formed() -> Vec<u8> {
    build_container(&build_payload(1), &build_payload(2))
}

#[test]
fn valid_container_opens_and_validates() {
    let firmware = Firmware::from_bytes(&well_formed()).unwrap();
    assert!(firmware.is_valid());
    assert_eq!(firmware.version(), 0x03);
    assert_eq!(firmware.erase_parameter(FirmwareKind::A), A_ERASE);
    assert_eq!(firmware.erase_parameter(FirmwareKind::Cs), CS_ERASE);
    // Header targets version 3 (neither A nor CS code), so custom firmware
    // falls back to the A erase mode.
    assert_eq!(firmware.erase_parameter(FirmwareKind::Custom), A_ERASE);
}

#[test]
fn wrong_size_is_rejected_before_parsing() {
    let data = well_formed();
    for trimmed in [&data[..UPDATE_DAT_SIZE - 1], &data[..1000]] {
        assert!(matches!(
            Firmware::from_bytes(trimmed),
            Err(Error::Filesize { .. })
        ));
    }

    let mut extended = data;
    extended.push(0);
    assert!(matches!(
        Firmware::from_bytes(&extended),
        Err(Error::Filesize {
            actual,
            expected
        }) if actual == UPDATE_DAT_SIZE + 1 && expected == UPDATE_DAT_SIZE
    ));
}

#[test]
fn missing_file_is_an_open_error() {
    assert!(matches!(
        Firmware::open("/nonexistent/update.dat"),
        Err(Error::Open(_))
    ));
}

#[test]
fn bad_magic_is_rejected() {
    let mut data = well_formed();
    data[0] = b'X';
    assert!(matches!(Firmware::from_bytes(&data), Err(Error::Magic)));
}

#[test]
fn corrupted_blob_fails_the_crc_gate() {
    let mut data = well_formed();
    // Offset 0xA1C is the start of the A blob; +8 lands the corruption in the
    // payload bytes of the first block once decrypted.
    data[0xA1C + 8] ^= 0x01;
    match Firmware::from_bytes(&data) {
        Err(Error::Crc {
            variant,
            stored,
            computed,
        }) => {
            assert_eq!(variant, Variant::A);
            assert_ne!(stored, computed);
        }
        other => panic!(
            "expected a CRC error, got {:?}",
            other.err().map(|e| e.to_string())
        ),
    }
}

#[test]
fn missing_signature_fails_despite_matching_crc() {
    // The stored CRC covers the (signature-less) payload, so the CRC gate
    // passes and only the signature check can catch this.
    let mut a_payload = build_payload(1);
    a_payload[FIRMWARE_SIGNATURE_OFFSET..].fill(0);
    let data = build_container(&a_payload, &build_payload(2));

    assert!(matches!(
        Firmware::from_bytes(&data),
        Err(Error::Decryption {
            variant: Variant::A
        })
    ));
}

#[test]
fn extracted_image_has_the_expected_layout() {
    let firmware = Firmware::from_bytes(&well_formed()).unwrap();
    let image = firmware.decrypt_firmware(Variant::A);

    assert_eq!(image.len(), FLASH_SIZE);
    assert_eq!(&image[..UNENCRYPTED_FIRMWARE_SIZE], &build_payload(1)[..]);
    assert_eq!(
        image[FIRMWARE_SIGNATURE_OFFSET..FIRMWARE_SIGNATURE_OFFSET + 4],
        FIRMWARE_SIGNATURE.to_le_bytes()
    );
    assert_eq!(
        &image[XOR_TABLE_OFFSET..XOR_TABLE_OFFSET + XOR_TABLE_SIZE],
        &XOR_TABLE_A[..]
    );
    assert!(image[SERIAL_OFFSET..SERIAL_OFFSET + SERIAL_LEN]
        .iter()
        .all(|&b| b == 0xFF));
}

#[test]
fn get_firmware_matches_decrypt_and_custom_is_identity() {
    let firmware = Firmware::from_bytes(&well_formed()).unwrap();

    let mut out = vec![0u8; FLASH_SIZE];
    firmware.get_firmware(&mut out, FirmwareSource::Cs, DeviceVersion::Tl866cs);
    assert_eq!(out, firmware.decrypt_firmware(Variant::Cs));

    let custom: Vec<u8> = (0..FLASH_SIZE).map(|i| (i % 253) as u8).collect();
    for key in [DeviceVersion::Tl866a, DeviceVersion::Tl866cs] {
        firmware.get_firmware(&mut out, FirmwareSource::Custom(&custom), key);
        assert_eq!(out, custom);
    }
}

#[test]
fn reencryption_reproduces_the_stored_blob() {
    let data = well_formed();
    let firmware = Firmware::from_bytes(&data).unwrap();

    let image = firmware.decrypt_firmware(Variant::A);
    let blob = firmware.encrypt_firmware(&image, DeviceVersion::Tl866a);
    assert_eq!(blob.len(), ENCRYPTED_FIRMWARE_SIZE);
    assert_eq!(blob, &data[0xA1C..0xA1C + ENCRYPTED_FIRMWARE_SIZE]);

    let image = firmware.decrypt_firmware(Variant::Cs);
    let blob = firmware.encrypt_firmware(&image, DeviceVersion::Tl866cs);
    assert_eq!(
        blob,
        &data[0xA1C + ENCRYPTED_FIRMWARE_SIZE..0xA1C + 2 * ENCRYPTED_FIRMWARE_SIZE]
    );
}

#[test]
fn personalization_round_trips_the_serial() {
    let firmware = Firmware::from_bytes(&well_formed()).unwrap();
    let mut image = firmware.decrypt_firmware(Variant::A);

    let mut serial = *b"012345678901234567890123";
    let original = serial;
    encrypt_serial(&mut serial, &image);
    assert_ne!(serial, original);
    image[SERIAL_OFFSET..SERIAL_OFFSET + SERIAL_LEN].copy_from_slice(&serial);

    let mut readback: [u8; SERIAL_LEN] = image[SERIAL_OFFSET..SERIAL_OFFSET + SERIAL_LEN]
        .try_into()
        .unwrap();
    decrypt_serial(&mut readback, &image);
    assert_eq!(readback, original);
}

#[test]
fn open_reads_a_file_from_disk() {
    let path = std::env::temp_dir().join("tlfw-container-test-update.dat");
    std::fs::write(&path, well_formed()).unwrap();
    let firmware = Firmware::open(&path).unwrap();
    assert!(firmware.is_valid());
    std::fs::remove_file(&path).unwrap();

    // The raw parser exposes the same container to inspection tools.
    let container = UpdateContainer::from_bytes(&well_formed()).unwrap();
    assert!(container.magic_ok());
    assert_eq!(container.a.erase, A_ERASE);
    assert_eq!(container.cs.index, CS_INDEX);
}
