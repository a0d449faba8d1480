//! Decoder/encoder for the TL866 programmer's `update.dat` firmware container.
//!
//! The vendor distributes both the TL866A and TL866CS firmware inside a single
//! fixed-size container, obfuscated with a keyed, index-advancing block cipher.
//! This crate parses the container, reverses the cipher to recover a flashable
//! image, verifies the result (CRC32 plus an in-image signature), and performs
//! the inverse transform so that arbitrary firmware can be re-encrypted for
//! writing back to the device.
//!
//! The USB transport and the interactive updater that drive the actual flash
//! operation live outside this crate; the `device` module only carries the
//! protocol constants and report layouts they exchange with this core.

use std::io;

use thiserror::Error;

pub mod cipher;
pub mod device;
pub mod firmware;
pub mod serial;
pub mod tables;
pub mod update;
pub mod validate;

/// Total size of the device's flash, and thus of a full flash image.
pub const FLASH_SIZE: usize = 0x20000;

/// Size of the bootloader region at the start of the flash image.
pub const BOOTLOADER_SIZE: usize = 0x1800;

/// Size of the meaningful firmware payload carried by one container variant.
pub const UNENCRYPTED_FIRMWARE_SIZE: usize = 0x1E400;

/// Offset of the serial-encryption XOR table inside the flash image.
pub const XOR_TABLE_OFFSET: usize = 0x1FC00;

/// Size of the serial-encryption XOR table.
pub const XOR_TABLE_SIZE: usize = 0x100;

/// Offset of the 4-byte signature inside the flash image (the last four bytes
/// of the firmware payload).
pub const FIRMWARE_SIGNATURE_OFFSET: usize = 0x1E3FC;

/// Value a correctly decrypted image carries at [`FIRMWARE_SIGNATURE_OFFSET`].
pub const FIRMWARE_SIGNATURE: u32 = 0x5AA5_AA55;

/// Offset of the device serial number inside the flash image.
pub const SERIAL_OFFSET: usize = 0x1FD00;

/// Length of the device serial number.
pub const SERIAL_LEN: usize = 24;

/// Everything that can go wrong between opening an update container and
/// handing out a verified image.
///
/// All failures are surfaced synchronously; nothing is retried or repaired
/// internally. Corruption detected by CRC or signature is always reported.
#[derive(Error, Debug)]
pub enum Error {
    /// The update file could not be read at all.
    #[error("unable to read the update file: {0}")]
    Open(#[from] io::Error),

    /// The file exists but is not exactly the size of an update container.
    #[error("update file is {actual} bytes, expected {expected}")]
    Filesize { actual: usize, expected: usize },

    /// The container header does not carry the expected magic bytes.
    #[error("not an update container (bad header magic)")]
    Magic,

    /// A variant's decrypted payload does not match its stored CRC32.
    #[error("{variant} firmware CRC32 mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Crc {
        variant: update::Variant,
        stored: u32,
        computed: u32,
    },

    /// A variant's payload passed the CRC gate but its signature bytes are
    /// wrong, which points at mismatched cipher tables rather than a
    /// corrupted file.
    #[error("decrypted {variant} firmware has an invalid signature")]
    Decryption { variant: update::Variant },
}
