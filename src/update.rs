//! Parser for the fixed-layout `update.dat` container.
//!
//! The file is a single fixed-size structure: a 4-byte header, per-variant
//! CRC and erase-parameter words, per-variant cipher material (running index
//! plus a 256-byte and a 1024-byte XOR table), and finally the two encrypted
//! firmware blobs. Every field is decoded at its explicit offset with a byte
//! cursor; the in-memory representation never mirrors the file layout.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use bytes::Buf;

use crate::Error;

/// Total size of a well-formed `update.dat`, with no slack.
pub const UPDATE_DAT_SIZE: usize = 312_348;

/// Size of each encrypted firmware blob in the container.
pub const ENCRYPTED_FIRMWARE_SIZE: usize = 0x25D00;

/// First three bytes of the container header; the fourth byte is the
/// firmware version.
pub const CONTAINER_MAGIC: [u8; 3] = *b"TL8";

/// Size of the per-variant primary XOR table.
pub const PRIMARY_TABLE_SIZE: usize = 256;

/// Size of the per-variant secondary XOR table.
pub const SECONDARY_TABLE_SIZE: usize = 1024;

/// The two firmware families bundled in one container.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Variant {
    A,
    Cs,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::A, Variant::Cs];
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::A => write!(f, "TL866A"),
            Variant::Cs => write!(f, "TL866CS"),
        }
    }
}

/// Parse strings like "A" or "CS"
impl FromStr for Variant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Variant::A),
            "CS" => Ok(Variant::Cs),
            other => Err(anyhow::anyhow!("unknown firmware variant {other:?}")),
        }
    }
}

/// Cipher material and encrypted blob for one firmware variant.
pub struct VariantRecord {
    /// CRC32 of the decrypted firmware payload.
    pub crc32: u32,

    /// Erase mode the device requires before this firmware is written.
    pub erase: u8,

    /// Starting value of the running cipher index.
    pub index: u32,

    /// Primary XOR table.
    pub primary: [u8; PRIMARY_TABLE_SIZE],

    /// Secondary XOR table.
    pub secondary: [u8; SECONDARY_TABLE_SIZE],

    /// The encrypted firmware blob, [`ENCRYPTED_FIRMWARE_SIZE`] bytes.
    pub firmware: Vec<u8>,
}

/// An `update.dat` file decoded into memory. Immutable once parsed.
pub struct UpdateContainer {
    /// The raw 4-byte header: magic bytes plus the firmware version.
    pub header: [u8; 4],
    pub a: VariantRecord,
    pub cs: VariantRecord,
}

impl UpdateContainer {
    /// Read and decode an update container from disk.
    ///
    /// Fails with [`Error::Open`] if the file cannot be read and with
    /// [`Error::Filesize`] if it is not exactly [`UPDATE_DAT_SIZE`] bytes.
    /// No partial result is observable on failure.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let data = fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Decode an update container from a byte buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() != UPDATE_DAT_SIZE {
            return Err(Error::Filesize {
                actual: data.len(),
                expected: UPDATE_DAT_SIZE,
            });
        }

        let mut buf = data;

        let mut header = [0u8; 4];
        buf.copy_to_slice(&mut header);

        let a_crc32 = buf.get_u32_le();
        let a_erase = read_erase(&mut buf);
        let cs_crc32 = buf.get_u32_le();
        let cs_erase = read_erase(&mut buf);

        let (a_index, a_primary, a_secondary) = read_cipher_material(&mut buf);
        let (cs_index, cs_primary, cs_secondary) = read_cipher_material(&mut buf);

        let mut a_firmware = vec![0u8; ENCRYPTED_FIRMWARE_SIZE];
        buf.copy_to_slice(&mut a_firmware);
        let mut cs_firmware = vec![0u8; ENCRYPTED_FIRMWARE_SIZE];
        buf.copy_to_slice(&mut cs_firmware);

        debug_assert!(!buf.has_remaining());

        Ok(UpdateContainer {
            header,
            a: VariantRecord {
                crc32: a_crc32,
                erase: a_erase,
                index: a_index,
                primary: a_primary,
                secondary: a_secondary,
                firmware: a_firmware,
            },
            cs: VariantRecord {
                crc32: cs_crc32,
                erase: cs_erase,
                index: cs_index,
                primary: cs_primary,
                secondary: cs_secondary,
                firmware: cs_firmware,
            },
        })
    }

    pub fn variant(&self, variant: Variant) -> &VariantRecord {
        match variant {
            Variant::A => &self.a,
            Variant::Cs => &self.cs,
        }
    }

    /// The firmware version byte from the header.
    pub fn version(&self) -> u8 {
        self.header[3]
    }

    /// Whether the header carries the container magic.
    pub fn magic_ok(&self) -> bool {
        self.header[..3] == CONTAINER_MAGIC
    }
}

/// The erase parameter sits in the second byte of a 4-byte word; the other
/// three bytes are alignment padding in the original layout.
fn read_erase(buf: &mut &[u8]) -> u8 {
    buf.advance(1);
    let erase = buf.get_u8();
    buf.advance(2);
    erase
}

fn read_cipher_material(
    buf: &mut &[u8],
) -> (u32, [u8; PRIMARY_TABLE_SIZE], [u8; SECONDARY_TABLE_SIZE]) {
    let index = buf.get_u32_le();
    let mut primary = [0u8; PRIMARY_TABLE_SIZE];
    buf.copy_to_slice(&mut primary);
    let mut secondary = [0u8; SECONDARY_TABLE_SIZE];
    buf.copy_to_slice(&mut secondary);
    (index, primary, secondary)
}

#[test]
fn test_layout_offsets() -> Result<(), Error> {
    let mut data = vec![0u8; UPDATE_DAT_SIZE];
    data[..4].copy_from_slice(b"TL8\x05");
    data[0x004..0x008].copy_from_slice(&0xAABBCCDD_u32.to_le_bytes());
    data[0x009] = 0x20; // A erase
    data[0x00C..0x010].copy_from_slice(&0x11223344_u32.to_le_bytes());
    data[0x011] = 0x40; // CS erase
    data[0x014..0x018].copy_from_slice(&7_u32.to_le_bytes());
    data[0x018] = 0xA1; // first byte of the A primary table
    data[0x118] = 0xA2; // first byte of the A secondary table
    data[0x518..0x51C].copy_from_slice(&9_u32.to_le_bytes());
    data[0x51C] = 0xC1;
    data[0x61C] = 0xC2;
    data[0xA1C] = 0xF1; // first byte of the A blob
    data[0xA1C + ENCRYPTED_FIRMWARE_SIZE] = 0xF2; // first byte of the CS blob

    let container = UpdateContainer::from_bytes(&data)?;
    assert!(container.magic_ok());
    assert_eq!(container.version(), 0x05);
    assert_eq!(container.a.crc32, 0xAABBCCDD);
    assert_eq!(container.a.erase, 0x20);
    assert_eq!(container.a.index, 7);
    assert_eq!(container.a.primary[0], 0xA1);
    assert_eq!(container.a.secondary[0], 0xA2);
    assert_eq!(container.cs.crc32, 0x11223344);
    assert_eq!(container.cs.erase, 0x40);
    assert_eq!(container.cs.index, 9);
    assert_eq!(container.cs.primary[0], 0xC1);
    assert_eq!(container.cs.secondary[0], 0xC2);
    assert_eq!(container.a.firmware[0], 0xF1);
    assert_eq!(container.cs.firmware[0], 0xF2);
    Ok(())
}

#[test]
fn test_exact_size_required() {
    for len in [0, UPDATE_DAT_SIZE - 1, UPDATE_DAT_SIZE + 1] {
        let data = vec![0u8; len];
        match UpdateContainer::from_bytes(&data) {
            Err(Error::Filesize { actual, expected }) => {
                assert_eq!(actual, len);
                assert_eq!(expected, UPDATE_DAT_SIZE);
            }
            _ => panic!("expected a filesize error for {len} bytes"),
        }
    }
}
