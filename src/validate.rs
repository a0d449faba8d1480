//! Integrity checks gating whether a container may be flashed.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::cipher::{self, KeyTables};
use crate::device::{A_BOOTLOADER_CRC, BAD_CRC, CS_BOOTLOADER_CRC};
use crate::update::{UpdateContainer, Variant};
use crate::{Error, FIRMWARE_SIGNATURE, FIRMWARE_SIGNATURE_OFFSET};

/// The CRC32 used throughout: stored payload CRCs and device fingerprints.
pub const FIRMWARE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Check the container magic, then decrypt both variants and check their
/// CRCs and signatures.
///
/// A CRC mismatch means the container itself is corrupt ([`Error::Crc`]); a
/// signature mismatch despite a matching CRC means the cipher material did
/// not fit the blob ([`Error::Decryption`]). Both gates run for both
/// variants so a container is only ever accepted whole.
pub(crate) fn validate(container: &UpdateContainer) -> Result<(), Error> {
    if !container.magic_ok() {
        return Err(Error::Magic);
    }

    for variant in Variant::ALL {
        let record = container.variant(variant);
        let payload =
            cipher::decrypt_firmware(&record.firmware, &KeyTables::from(record), record.index);

        let computed = FIRMWARE_CRC.checksum(&payload);
        if computed != record.crc32 {
            return Err(Error::Crc {
                variant,
                stored: record.crc32,
                computed,
            });
        }

        if !signature_ok(&payload) {
            return Err(Error::Decryption { variant });
        }
    }

    Ok(())
}

/// Whether a decrypted payload (or full flash image) carries the firmware
/// signature at its fixed offset.
pub fn signature_ok(payload: &[u8]) -> bool {
    let Some(bytes) = payload.get(FIRMWARE_SIGNATURE_OFFSET..FIRMWARE_SIGNATURE_OFFSET + 4) else {
        return false;
    };
    u32::from_le_bytes(bytes.try_into().unwrap()) == FIRMWARE_SIGNATURE
}

/// Classify a device's code/serial pair against the known-bad bootloader CRC
/// fingerprints.
///
/// Pure function over constant data; used by the transport layer to refuse
/// flashing a device whose current firmware is already known-corrupt.
pub fn is_bad_crc(device_code: &[u8; 8], serial: &[u8; 24]) -> bool {
    let mut digest = FIRMWARE_CRC.digest();
    digest.update(device_code);
    digest.update(serial);
    matches!(
        digest.finalize(),
        A_BOOTLOADER_CRC | CS_BOOTLOADER_CRC | BAD_CRC
    )
}

#[test]
fn test_signature_ok() {
    let mut payload = vec![0u8; crate::UNENCRYPTED_FIRMWARE_SIZE];
    assert!(!signature_ok(&payload));

    payload[FIRMWARE_SIGNATURE_OFFSET..].copy_from_slice(&FIRMWARE_SIGNATURE.to_le_bytes());
    assert!(signature_ok(&payload));

    // Too short to hold a signature at all.
    assert!(!signature_ok(&payload[..FIRMWARE_SIGNATURE_OFFSET + 2]));
}

#[test]
fn test_is_bad_crc() {
    // No known-bad fingerprint collides with these.
    assert!(!is_bad_crc(&[0u8; 8], &[0u8; 24]));
    assert!(!is_bad_crc(b"00000001", &[0x30; 24]));

    // Consistency with the fingerprint set for arbitrary inputs.
    for seed in 0u8..16 {
        let device_code = [seed; 8];
        let serial = [seed.wrapping_mul(3); 24];
        let mut digest = FIRMWARE_CRC.digest();
        digest.update(&device_code);
        digest.update(&serial);
        let crc = digest.finalize();
        let expected = [A_BOOTLOADER_CRC, CS_BOOTLOADER_CRC, BAD_CRC].contains(&crc);
        assert_eq!(is_bad_crc(&device_code, &serial), expected);
    }
}
