//! The vendor's block obfuscation cipher.
//!
//! Firmware travels in 80-byte blocks. A block is obfuscated in three steps:
//! XOR with a keystream drawn from the variant's two tables at a running
//! index, a 3-bit rotation of the whole block, and a byte swap within every
//! 4-byte lane. Each step is a bijection on the block, so encryption and
//! decryption are exact inverses for any table pair and index.
//!
//! Only 64 of the 80 bytes of a block carry firmware payload; the remaining
//! 16 are filler (0x25D00 encrypted bytes yield exactly 0x1E400 payload
//! bytes). The firmware-level walkers below handle that framing and advance
//! the index by one block size per block.

use crate::update::VariantRecord;

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 80;

/// Payload bytes carried by each block.
pub const BLOCK_PAYLOAD: usize = 64;

/// The XOR table pair keying one variant's transform.
#[derive(Copy, Clone)]
pub struct KeyTables<'a> {
    pub primary: &'a [u8; 256],
    pub secondary: &'a [u8; 1024],
}

impl<'a> From<&'a VariantRecord> for KeyTables<'a> {
    fn from(record: &'a VariantRecord) -> Self {
        KeyTables {
            primary: &record.primary,
            secondary: &record.secondary,
        }
    }
}

impl KeyTables<'_> {
    /// The keystream byte at an absolute stream position.
    fn keystream(&self, pos: u32) -> u8 {
        self.primary[(pos & 0xFF) as usize] ^ self.secondary[(pos & 0x3FF) as usize]
    }
}

fn xor_keystream(data: &mut [u8], keys: &KeyTables, index: u32) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= keys.keystream(index.wrapping_add(i as u32));
    }
}

/// Rotate the whole buffer left by three bits, carrying across byte
/// boundaries.
pub(crate) fn rotate_left3(data: &mut [u8]) {
    let carry = data[0] >> 5;
    for i in 0..data.len() - 1 {
        data[i] = (data[i] << 3) | (data[i + 1] >> 5);
    }
    let last = data.len() - 1;
    data[last] = (data[last] << 3) | carry;
}

/// Inverse of [`rotate_left3`].
pub(crate) fn rotate_right3(data: &mut [u8]) {
    let last = data.len() - 1;
    let carry = data[last] << 5;
    for i in (1..=last).rev() {
        data[i] = (data[i] >> 3) | (data[i - 1] << 5);
    }
    data[0] = (data[0] >> 3) | carry;
}

/// Swap the first and last byte of every 4-byte lane. Self-inverse.
pub(crate) fn swap_lanes(data: &mut [u8]) {
    for lane in data.chunks_exact_mut(4) {
        lane.swap(0, 3);
    }
}

/// Obfuscate one 80-byte block in place.
pub fn encrypt_block(block: &mut [u8], keys: &KeyTables, index: u32) {
    debug_assert_eq!(block.len(), BLOCK_SIZE);
    xor_keystream(block, keys, index);
    rotate_left3(block);
    swap_lanes(block);
}

/// De-obfuscate one 80-byte block in place. Exact inverse of
/// [`encrypt_block`] given the same tables and index.
pub fn decrypt_block(block: &mut [u8], keys: &KeyTables, index: u32) {
    debug_assert_eq!(block.len(), BLOCK_SIZE);
    swap_lanes(block);
    rotate_right3(block);
    xor_keystream(block, keys, index);
}

/// Decrypt a full encrypted blob into its firmware payload.
///
/// `blob` must be a multiple of [`BLOCK_SIZE`]; the container format
/// guarantees this for the stored variants.
pub fn decrypt_firmware(blob: &[u8], keys: &KeyTables, mut index: u32) -> Vec<u8> {
    debug_assert_eq!(blob.len() % BLOCK_SIZE, 0);

    let mut payload = Vec::with_capacity(blob.len() / BLOCK_SIZE * BLOCK_PAYLOAD);
    let mut block = [0u8; BLOCK_SIZE];
    for chunk in blob.chunks_exact(BLOCK_SIZE) {
        block.copy_from_slice(chunk);
        decrypt_block(&mut block, keys, index);
        payload.extend_from_slice(&block[..BLOCK_PAYLOAD]);
        index = index.wrapping_add(BLOCK_SIZE as u32);
    }
    payload
}

/// Encrypt a firmware payload into a blob the container (or device) accepts.
///
/// Exact inverse of [`decrypt_firmware`] over the payload bytes; the filler
/// positions of each block are drawn from the secondary table so the output
/// is deterministic.
pub fn encrypt_firmware(payload: &[u8], keys: &KeyTables, mut index: u32) -> Vec<u8> {
    debug_assert_eq!(payload.len() % BLOCK_PAYLOAD, 0);

    let mut blob = Vec::with_capacity(payload.len() / BLOCK_PAYLOAD * BLOCK_SIZE);
    let mut block = [0u8; BLOCK_SIZE];
    for chunk in payload.chunks_exact(BLOCK_PAYLOAD) {
        block[..BLOCK_PAYLOAD].copy_from_slice(chunk);
        for (i, byte) in block[BLOCK_PAYLOAD..].iter_mut().enumerate() {
            *byte = keys.secondary[(index as usize + i) & 0x3FF];
        }
        encrypt_block(&mut block, keys, index);
        blob.extend_from_slice(&block);
        index = index.wrapping_add(BLOCK_SIZE as u32);
    }
    blob
}

#[cfg(test)]
fn test_keys() -> (Box<[u8; 256]>, Box<[u8; 1024]>) {
    let primary = Box::new(std::array::from_fn(|i| (i as u8).wrapping_mul(37) ^ 0x5C));
    let secondary = Box::new(std::array::from_fn(|i| (i as u8).wrapping_add(91) ^ 0xA3));
    (primary, secondary)
}

#[test]
fn test_rotate_round_trip() {
    let original: [u8; 80] = std::array::from_fn(|i| (i as u8).wrapping_mul(17));

    let mut data = original;
    rotate_left3(&mut data);
    assert_ne!(data, original);
    rotate_right3(&mut data);
    assert_eq!(data, original);

    rotate_right3(&mut data);
    rotate_left3(&mut data);
    assert_eq!(data, original);
}

#[test]
fn test_block_round_trip() {
    let (primary, secondary) = test_keys();
    let keys = KeyTables {
        primary: &primary,
        secondary: &secondary,
    };
    let original: [u8; BLOCK_SIZE] = std::array::from_fn(|i| (i as u8).wrapping_mul(201));

    for index in [0u32, 1, 79, 80, 255, 1023, 0xFFFF_FFF0] {
        let mut block = original;
        encrypt_block(&mut block, &keys, index);
        assert_ne!(block, original);
        decrypt_block(&mut block, &keys, index);
        assert_eq!(block, original);

        // And in the other direction, per the round-trip contract.
        decrypt_block(&mut block, &keys, index);
        encrypt_block(&mut block, &keys, index);
        assert_eq!(block, original);
    }
}

#[test]
fn test_index_changes_keystream() {
    let (primary, secondary) = test_keys();
    let keys = KeyTables {
        primary: &primary,
        secondary: &secondary,
    };

    let mut one = [0u8; BLOCK_SIZE];
    let mut two = [0u8; BLOCK_SIZE];
    encrypt_block(&mut one, &keys, 0);
    encrypt_block(&mut two, &keys, 80);
    assert_ne!(one, two);
}

#[test]
fn test_firmware_round_trip() {
    let (primary, secondary) = test_keys();
    let keys = KeyTables {
        primary: &primary,
        secondary: &secondary,
    };

    let payload: Vec<u8> = (0..BLOCK_PAYLOAD * 7).map(|i| (i % 251) as u8).collect();
    let blob = encrypt_firmware(&payload, &keys, 0x1234);
    assert_eq!(blob.len(), BLOCK_SIZE * 7);
    assert_eq!(decrypt_firmware(&blob, &keys, 0x1234), payload);
}
