//! Device-side records and protocol constants.
//!
//! The USB transport that actually talks to the programmer lives outside this
//! crate; these are the constants and fixed-layout reports exchanged at that
//! boundary. Reports are consumed read-only, for variant/version selection
//! and bad-CRC classification.

use std::str::FromStr;

use bytes::Buf;

use crate::update::Variant;

/// Command bytes understood by the bootloader.
pub const WRITE_COMMAND: u8 = 0xAA;
pub const ERASE_COMMAND: u8 = 0xCC;
pub const RESET_COMMAND: u8 = 0xFF;
pub const REPORT_COMMAND: u8 = 0x00;

/// Sub-commands understood by the dumper firmware.
pub const DUMPER_READ_FLASH: u8 = 0x01;
pub const DUMPER_WRITE_BOOTLOADER: u8 = 0x02;
pub const DUMPER_WRITE_CONFIG: u8 = 0x03;
pub const DUMPER_WRITE_INFO: u8 = 0x04;
pub const DUMPER_INFO: u8 = 0x05;

/// USB identity of the programmer.
pub const TL866_VID: u16 = 0x04D8;
pub const TL866_PID: u16 = 0xE11C;

/// Bootloader CRC of a factory TL866A.
pub const A_BOOTLOADER_CRC: u32 = 0x1B89_60EF;

/// Bootloader CRC of a factory TL866CS.
pub const CS_BOOTLOADER_CRC: u32 = 0xFB3D_ED05;

/// CRC fingerprint of a known-corrupt bootloader.
pub const BAD_CRC: u32 = 0xC8C2_F013;

pub const TL866_REPORT_SIZE: usize = 44;
pub const DUMPER_REPORT_SIZE: usize = 34;

/// Hardware revision families of the programmer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceVersion {
    Tl866a,
    Tl866cs,
}

impl DeviceVersion {
    /// The firmware variant matching this revision.
    pub fn variant(self) -> Variant {
        match self {
            DeviceVersion::Tl866a => Variant::A,
            DeviceVersion::Tl866cs => Variant::Cs,
        }
    }
}

impl From<DeviceVersion> for u8 {
    fn from(value: DeviceVersion) -> Self {
        match value {
            DeviceVersion::Tl866a => 1,
            DeviceVersion::Tl866cs => 2,
        }
    }
}

impl TryFrom<u8> for DeviceVersion {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Tl866a),
            2 => Ok(Self::Tl866cs),
            _ => Err(()),
        }
    }
}

/// Parse strings like "A" or "CS"
impl FromStr for DeviceVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(DeviceVersion::Tl866a),
            "CS" => Ok(DeviceVersion::Tl866cs),
            other => Err(anyhow::anyhow!("unknown device version {other:?}")),
        }
    }
}

/// Which mode the device reports itself to be running in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    Normal,
    Bootloader,
}

impl From<DeviceStatus> for u8 {
    fn from(value: DeviceStatus) -> Self {
        match value {
            DeviceStatus::Normal => 1,
            DeviceStatus::Bootloader => 2,
        }
    }
}

impl TryFrom<u8> for DeviceStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Normal),
            2 => Ok(Self::Bootloader),
            _ => Err(()),
        }
    }
}

/// Status record returned by the device in both normal and bootloader mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tl866Report {
    pub echo: u8,
    pub device_status: u8,
    pub report_size: u16,
    pub firmware_version_minor: u8,
    pub firmware_version_major: u8,
    pub device_version: u8,
    pub device_code: [u8; 8],
    pub serial_number: [u8; 24],
    pub hardware_version: u8,
    pub flags: [u8; 4],
}

impl Tl866Report {
    /// Decode a report from a byte slice.
    pub fn decode(mut buf: &[u8]) -> Option<Self> {
        if buf.len() < TL866_REPORT_SIZE {
            return None;
        }

        let echo = buf.get_u8();
        let device_status = buf.get_u8();
        let report_size = buf.get_u16_le();
        let firmware_version_minor = buf.get_u8();
        let firmware_version_major = buf.get_u8();
        let device_version = buf.get_u8();
        let mut device_code = [0u8; 8];
        buf.copy_to_slice(&mut device_code);
        let mut serial_number = [0u8; 24];
        buf.copy_to_slice(&mut serial_number);
        let hardware_version = buf.get_u8();
        let mut flags = [0u8; 4];
        buf.copy_to_slice(&mut flags);

        Some(Tl866Report {
            echo,
            device_status,
            report_size,
            firmware_version_minor,
            firmware_version_major,
            device_version,
            device_code,
            serial_number,
            hardware_version,
            flags,
        })
    }

    pub fn version(&self) -> Option<DeviceVersion> {
        self.device_version.try_into().ok()
    }

    pub fn status(&self) -> Option<DeviceStatus> {
        self.device_status.try_into().ok()
    }
}

/// Identity record returned by the dumper firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumperReport {
    pub device_code: [u8; 8],
    pub serial_number: [u8; 24],
    pub bootloader_version: u8,
    pub cp_bit: u8,
}

impl DumperReport {
    /// Decode a report from a byte slice.
    pub fn decode(mut buf: &[u8]) -> Option<Self> {
        if buf.len() < DUMPER_REPORT_SIZE {
            return None;
        }

        let mut device_code = [0u8; 8];
        buf.copy_to_slice(&mut device_code);
        let mut serial_number = [0u8; 24];
        buf.copy_to_slice(&mut serial_number);
        let bootloader_version = buf.get_u8();
        let cp_bit = buf.get_u8();

        Some(DumperReport {
            device_code,
            serial_number,
            bootloader_version,
            cp_bit,
        })
    }

    pub fn bootloader(&self) -> Option<DeviceVersion> {
        self.bootloader_version.try_into().ok()
    }
}

#[test]
fn test_decode_tl866_report() {
    let mut raw = vec![0u8; TL866_REPORT_SIZE];
    raw[0] = REPORT_COMMAND;
    raw[1] = DeviceStatus::Normal.into();
    raw[2..4].copy_from_slice(&44u16.to_le_bytes());
    raw[4] = 0x56;
    raw[5] = 0x03;
    raw[6] = DeviceVersion::Tl866a.into();
    raw[7..15].copy_from_slice(b"00000001");
    raw[15..39].copy_from_slice(&[0x30; 24]);
    raw[39] = 255;

    let report = Tl866Report::decode(&raw).unwrap();
    assert_eq!(report.status(), Some(DeviceStatus::Normal));
    assert_eq!(report.report_size, 44);
    assert_eq!(report.firmware_version_major, 3);
    assert_eq!(report.firmware_version_minor, 0x56);
    assert_eq!(report.version(), Some(DeviceVersion::Tl866a));
    assert_eq!(&report.device_code, b"00000001");
    assert_eq!(report.hardware_version, 255);

    assert!(Tl866Report::decode(&raw[..TL866_REPORT_SIZE - 1]).is_none());
}

#[test]
fn test_decode_dumper_report() {
    let mut raw = vec![0u8; DUMPER_REPORT_SIZE];
    raw[0..8].copy_from_slice(b"TL866CS ");
    raw[8..32].copy_from_slice(&[0x41; 24]);
    raw[32] = DeviceVersion::Tl866cs.into();
    raw[33] = 1;

    let report = DumperReport::decode(&raw).unwrap();
    assert_eq!(report.bootloader(), Some(DeviceVersion::Tl866cs));
    assert_eq!(report.cp_bit, 1);

    assert!(DumperReport::decode(&raw[..DUMPER_REPORT_SIZE - 1]).is_none());
}

#[test]
fn test_version_codes() {
    assert_eq!(u8::from(DeviceVersion::Tl866a), 1);
    assert_eq!(u8::from(DeviceVersion::Tl866cs), 2);
    assert_eq!(DeviceVersion::try_from(2), Ok(DeviceVersion::Tl866cs));
    assert_eq!(DeviceVersion::try_from(0), Err(()));
    assert_eq!(DeviceStatus::try_from(2), Ok(DeviceStatus::Bootloader));
    assert_eq!(DeviceStatus::try_from(3), Err(()));
}
