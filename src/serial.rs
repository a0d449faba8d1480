//! Encryption of the 24-byte device serial number.
//!
//! The bootloader keys serial encryption off the XOR table embedded in the
//! firmware image itself (at [`crate::XOR_TABLE_OFFSET`]), so the decrypted
//! flash image is the key material here. The transform is the block cipher's
//! XOR/rotate/swap discipline applied once over the whole 24-byte field.

use crate::cipher;
use crate::{SERIAL_LEN, XOR_TABLE_OFFSET, XOR_TABLE_SIZE};

fn serial_table(firmware: &[u8]) -> &[u8] {
    &firmware[XOR_TABLE_OFFSET..XOR_TABLE_OFFSET + XOR_TABLE_SIZE]
}

/// Encrypt a serial number in place, keyed by the flash image `firmware`.
pub fn encrypt_serial(serial: &mut [u8; SERIAL_LEN], firmware: &[u8]) {
    let table = serial_table(firmware);
    for (byte, key) in serial.iter_mut().zip(table) {
        *byte ^= key;
    }
    cipher::rotate_left3(serial);
    cipher::swap_lanes(serial);
}

/// Decrypt a serial number in place. Exact inverse of [`encrypt_serial`]
/// given the same firmware key material.
pub fn decrypt_serial(serial: &mut [u8; SERIAL_LEN], firmware: &[u8]) {
    let table = serial_table(firmware);
    cipher::swap_lanes(serial);
    cipher::rotate_right3(serial);
    for (byte, key) in serial.iter_mut().zip(table) {
        *byte ^= key;
    }
}

#[cfg(test)]
fn test_image() -> Vec<u8> {
    let mut image = vec![0xFF; crate::FLASH_SIZE];
    let table = &mut image[XOR_TABLE_OFFSET..XOR_TABLE_OFFSET + XOR_TABLE_SIZE];
    for (i, byte) in table.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(167).wrapping_add(13);
    }
    image
}

#[test]
fn test_serial_round_trip() {
    let image = test_image();

    for fill in [0x00, 0x30, 0xFF] {
        let original = [fill; SERIAL_LEN];
        let mut serial = original;
        encrypt_serial(&mut serial, &image);
        assert_ne!(serial, original);
        decrypt_serial(&mut serial, &image);
        assert_eq!(serial, original);
    }

    let original: [u8; SERIAL_LEN] = std::array::from_fn(|i| (i as u8).wrapping_mul(59));
    let mut serial = original;
    decrypt_serial(&mut serial, &image);
    encrypt_serial(&mut serial, &image);
    assert_eq!(serial, original);
}

#[test]
fn test_serial_depends_on_key_material() {
    let image_one = test_image();
    let mut image_two = test_image();
    image_two[XOR_TABLE_OFFSET] ^= 0x80;

    let mut one = [0x30; SERIAL_LEN];
    let mut two = [0x30; SERIAL_LEN];
    encrypt_serial(&mut one, &image_one);
    encrypt_serial(&mut two, &image_two);
    assert_ne!(one, two);
}
