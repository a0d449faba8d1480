//! The loaded update session: variant selection and decrypt/encrypt passes.

use std::path::Path;

use crate::cipher::{self, KeyTables};
use crate::device::DeviceVersion;
use crate::update::{UpdateContainer, Variant};
use crate::validate;
use crate::{Error, FLASH_SIZE, UNENCRYPTED_FIRMWARE_SIZE, XOR_TABLE_OFFSET, XOR_TABLE_SIZE};

/// Which image a flashing operation should draw from.
///
/// The stored variants are decrypted on demand; `Custom` is a pass-through
/// so the rest of the pipeline stays uniform when the caller brings its own
/// already-prepared image.
pub enum FirmwareSource<'a> {
    /// The TL866A image stored in the container.
    A,
    /// The TL866CS image stored in the container.
    Cs,
    /// An image the caller prepared, [`FLASH_SIZE`] bytes.
    Custom(&'a [u8]),
}

impl FirmwareSource<'_> {
    pub fn kind(&self) -> FirmwareKind {
        match self {
            FirmwareSource::A => FirmwareKind::A,
            FirmwareSource::Cs => FirmwareKind::Cs,
            FirmwareSource::Custom(_) => FirmwareKind::Custom,
        }
    }
}

/// [`FirmwareSource`] without the payload, for parameter lookups.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FirmwareKind {
    A,
    Cs,
    Custom,
}

/// A validated update container, ready to answer queries for the rest of a
/// flashing session.
///
/// Constructed only by [`Firmware::open`] / [`Firmware::from_bytes`], which
/// run the full validation; a failed open leaves nothing behind. All methods
/// take `&self` and keep the running cipher index in locals, so one instance
/// can serve concurrent readers.
pub struct Firmware {
    container: UpdateContainer,
    valid: bool,
}

impl Firmware {
    /// Open and validate an update container.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_container(UpdateContainer::open(path)?)
    }

    /// Decode and validate an update container already in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        Self::from_container(UpdateContainer::from_bytes(data)?)
    }

    fn from_container(container: UpdateContainer) -> Result<Self, Error> {
        validate::validate(&container)?;
        Ok(Firmware {
            container,
            valid: true,
        })
    }

    /// Whether magic, CRC, and signature checks all passed.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The firmware version byte from the container header.
    pub fn version(&self) -> u8 {
        self.container.version()
    }

    /// The underlying parsed container.
    pub fn container(&self) -> &UpdateContainer {
        &self.container
    }

    /// Erase mode the device requires before the given firmware is written.
    ///
    /// Custom firmware follows the erase mode of the device revision the
    /// container header targets.
    pub fn erase_parameter(&self, kind: FirmwareKind) -> u8 {
        match kind {
            FirmwareKind::A => self.container.a.erase,
            FirmwareKind::Cs => self.container.cs.erase,
            FirmwareKind::Custom => {
                if self.container.version() == u8::from(DeviceVersion::Tl866cs) {
                    self.container.cs.erase
                } else {
                    self.container.a.erase
                }
            }
        }
    }

    /// Produce the flash image to write for the given source.
    ///
    /// For the stored variants, `key` selects which variant's table pair and
    /// index drive the cipher. A custom image is copied unchanged regardless
    /// of `key`.
    ///
    /// `out` must be [`FLASH_SIZE`] bytes, as must a custom image.
    pub fn get_firmware(&self, out: &mut [u8], source: FirmwareSource<'_>, key: DeviceVersion) {
        debug_assert_eq!(out.len(), FLASH_SIZE);
        match source {
            FirmwareSource::A => self.decrypt_with_key(Variant::A, key, out),
            FirmwareSource::Cs => self.decrypt_with_key(Variant::Cs, key, out),
            FirmwareSource::Custom(image) => out.copy_from_slice(image),
        }
    }

    /// Decrypt a stored variant into a fresh flash image, using its own
    /// cipher material.
    pub fn decrypt_firmware(&self, variant: Variant) -> Vec<u8> {
        let mut out = vec![0u8; FLASH_SIZE];
        self.decrypt_with_key(variant, key_for(variant), &mut out);
        out
    }

    /// Re-encrypt a flash image for writing back, using `key`'s table pair
    /// and index. Exact inverse of [`Firmware::decrypt_firmware`] over the
    /// payload region.
    pub fn encrypt_firmware(&self, image: &[u8], key: DeviceVersion) -> Vec<u8> {
        debug_assert_eq!(image.len(), FLASH_SIZE);
        let record = self.container.variant(key.variant());
        cipher::encrypt_firmware(
            &image[..UNENCRYPTED_FIRMWARE_SIZE],
            &KeyTables::from(record),
            record.index,
        )
    }

    fn decrypt_with_key(&self, variant: Variant, key: DeviceVersion, out: &mut [u8]) {
        let blob = &self.container.variant(variant).firmware;
        let record = self.container.variant(key.variant());
        let payload = cipher::decrypt_firmware(blob, &KeyTables::from(record), record.index);

        out.fill(0xFF);
        out[..UNENCRYPTED_FIRMWARE_SIZE].copy_from_slice(&payload);
        // The serial-encryption table the bootloader expects to find in the
        // image; the serial field itself stays blank until personalization.
        out[XOR_TABLE_OFFSET..XOR_TABLE_OFFSET + XOR_TABLE_SIZE].copy_from_slice(&record.primary);
    }
}

fn key_for(variant: Variant) -> DeviceVersion {
    match variant {
        Variant::A => DeviceVersion::Tl866a,
        Variant::Cs => DeviceVersion::Tl866cs,
    }
}
