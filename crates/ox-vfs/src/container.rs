//! Content container codec
//!
//! A container file is a fixed-layout big-endian header followed by the
//! package's data region. The header carries the metadata games see when
//! enumerating content: content type, display name, owning title, and an
//! embedded thumbnail. The writable data region lives in a sibling
//! `<package>.data/` directory on the host.
//!
//! Signature and hash blocks of the on-console format are not emulated;
//! their space is kept as reserved padding so field offsets stay put.

use ox_core::error::VfsError;
use ox_core::text;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::device::Device;

/// Total header length. Files smaller than this are not containers.
pub const HEADER_LEN: usize = 0x4000;

/// Maximum embedded thumbnail size in bytes.
pub const THUMB_MAX_LEN: usize = 0x3D00;

/// Extension appended to a package path to form its data directory.
pub const DATA_EXTENSION: &str = ".data";

const MAGIC_CON: [u8; 4] = *b"CON ";
const MAGIC_LIVE: [u8; 4] = *b"LIVE";
const MAGIC_PIRS: [u8; 4] = *b"PIRS";

const NAME_FIELD_LEN: usize = 256; // 128 UTF-16 units

const OFFSET_CONTENT_TYPE: usize = 0x004;
const OFFSET_DISPLAY_NAME: usize = 0x008;
const OFFSET_TITLE_NAME: usize = 0x108;
const OFFSET_EXECUTION_INFO: usize = 0x208;
const OFFSET_THUMB_LEN: usize = 0x220;
const OFFSET_THUMB: usize = 0x224;

/// Returns true if the first bytes of a file carry a container magic.
/// Locally created packages write `CON `; `LIVE` and `PIRS` packages from
/// real consoles are accepted as well.
pub fn is_container_magic(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }
    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    magic == MAGIC_CON || magic == MAGIC_LIVE || magic == MAGIC_PIRS
}

/// Data directory for a package path (`<package>.data`).
pub fn data_directory(package_path: &Path) -> PathBuf {
    let mut raw = package_path.as_os_str().to_os_string();
    raw.push(DATA_EXTENSION);
    PathBuf::from(raw)
}

/// Read and parse a container header from disk.
pub fn read_header(package_path: &Path) -> Result<ContainerHeader, VfsError> {
    let mut file = std::fs::File::open(package_path)?;
    let mut buf = vec![0u8; HEADER_LEN];
    file.read_exact(&mut buf)
        .map_err(|_| VfsError::InvalidContainer("truncated header".to_string()))?;
    ContainerHeader::read_from(&buf)
}

/// Execution metadata of the title that owns a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionInfo {
    pub media_id: u32,
    pub version: u32,
    pub base_version: u32,
    pub title_id: u32,
    pub platform: u8,
    pub executable_type: u8,
    pub disc_number: u8,
    pub disc_count: u8,
    pub save_game_id: u32,
}

/// Parsed container header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerHeader {
    pub content_type: u32,
    pub display_name: String,
    pub title_name: String,
    pub execution_info: ExecutionInfo,
    pub thumbnail: Vec<u8>,
}

impl ContainerHeader {
    /// A header with default (empty) metadata, as stamped before a freshly
    /// created package copies the title's info in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a header from at least `HEADER_LEN` bytes.
    pub fn read_from(buf: &[u8]) -> Result<Self, VfsError> {
        if buf.len() < HEADER_LEN {
            return Err(VfsError::InvalidContainer(format!(
                "header is {} bytes, expected {}",
                buf.len(),
                HEADER_LEN
            )));
        }
        if !is_container_magic(buf) {
            return Err(VfsError::InvalidContainer("bad magic".to_string()));
        }

        let content_type = read_u32(buf, OFFSET_CONTENT_TYPE);
        let display_name =
            text::read_utf16_fixed(&buf[OFFSET_DISPLAY_NAME..OFFSET_DISPLAY_NAME + NAME_FIELD_LEN]);
        let title_name =
            text::read_utf16_fixed(&buf[OFFSET_TITLE_NAME..OFFSET_TITLE_NAME + NAME_FIELD_LEN]);

        let execution_info = ExecutionInfo {
            media_id: read_u32(buf, OFFSET_EXECUTION_INFO),
            version: read_u32(buf, OFFSET_EXECUTION_INFO + 0x4),
            base_version: read_u32(buf, OFFSET_EXECUTION_INFO + 0x8),
            title_id: read_u32(buf, OFFSET_EXECUTION_INFO + 0xC),
            platform: buf[OFFSET_EXECUTION_INFO + 0x10],
            executable_type: buf[OFFSET_EXECUTION_INFO + 0x11],
            disc_number: buf[OFFSET_EXECUTION_INFO + 0x12],
            disc_count: buf[OFFSET_EXECUTION_INFO + 0x13],
            save_game_id: read_u32(buf, OFFSET_EXECUTION_INFO + 0x14),
        };

        let thumb_len = read_u32(buf, OFFSET_THUMB_LEN) as usize;
        if thumb_len > THUMB_MAX_LEN {
            return Err(VfsError::InvalidContainer(format!(
                "thumbnail length {} exceeds {}",
                thumb_len, THUMB_MAX_LEN
            )));
        }
        let thumbnail = buf[OFFSET_THUMB..OFFSET_THUMB + thumb_len].to_vec();

        Ok(Self {
            content_type,
            display_name,
            title_name,
            execution_info,
            thumbnail,
        })
    }

    /// Serialize the header into its fixed on-disk layout.
    pub fn write_to(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC_CON);
        write_u32(&mut buf, OFFSET_CONTENT_TYPE, self.content_type);
        text::write_utf16_fixed(
            &mut buf[OFFSET_DISPLAY_NAME..OFFSET_DISPLAY_NAME + NAME_FIELD_LEN],
            &self.display_name,
        );
        text::write_utf16_fixed(
            &mut buf[OFFSET_TITLE_NAME..OFFSET_TITLE_NAME + NAME_FIELD_LEN],
            &self.title_name,
        );

        let info = &self.execution_info;
        write_u32(&mut buf, OFFSET_EXECUTION_INFO, info.media_id);
        write_u32(&mut buf, OFFSET_EXECUTION_INFO + 0x4, info.version);
        write_u32(&mut buf, OFFSET_EXECUTION_INFO + 0x8, info.base_version);
        write_u32(&mut buf, OFFSET_EXECUTION_INFO + 0xC, info.title_id);
        buf[OFFSET_EXECUTION_INFO + 0x10] = info.platform;
        buf[OFFSET_EXECUTION_INFO + 0x11] = info.executable_type;
        buf[OFFSET_EXECUTION_INFO + 0x12] = info.disc_number;
        buf[OFFSET_EXECUTION_INFO + 0x13] = info.disc_count;
        write_u32(&mut buf, OFFSET_EXECUTION_INFO + 0x14, info.save_game_id);

        let thumb_len = self.thumbnail.len().min(THUMB_MAX_LEN);
        write_u32(&mut buf, OFFSET_THUMB_LEN, thumb_len as u32);
        buf[OFFSET_THUMB..OFFSET_THUMB + thumb_len].copy_from_slice(&self.thumbnail[..thumb_len]);

        buf
    }
}

/// A container mounted as a virtual device. File paths below the device
/// root resolve into the package's host data directory.
pub struct ContainerDevice {
    device_path: String,
    package_path: PathBuf,
    header: ContainerHeader,
}

impl ContainerDevice {
    /// Open an existing package file.
    pub fn open(device_path: String, package_path: PathBuf) -> Result<Self, VfsError> {
        let header = read_header(&package_path)?;
        Ok(Self {
            device_path,
            package_path,
            header,
        })
    }

    /// Create a new package file, writing the given header.
    pub fn create(
        device_path: String,
        package_path: PathBuf,
        header: ContainerHeader,
    ) -> Result<Self, VfsError> {
        std::fs::write(&package_path, header.write_to())?;
        tracing::debug!("Wrote container header to {}", package_path.display());

        Ok(Self {
            device_path,
            package_path,
            header,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn package_path(&self) -> &Path {
        &self.package_path
    }

    /// Host directory holding the package's writable data region.
    pub fn data_path(&self) -> PathBuf {
        data_directory(&self.package_path)
    }
}

impl Device for ContainerDevice {
    fn device_path(&self) -> &str {
        &self.device_path
    }

    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let relative = relative.replace('\\', "/");
        let relative = relative.trim_start_matches('/');
        Some(self.data_path().join(relative))
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ContainerHeader {
        ContainerHeader {
            content_type: 1,
            display_name: "Campaign Save".to_string(),
            title_name: "Example Title".to_string(),
            execution_info: ExecutionInfo {
                media_id: 0x12345678,
                version: 0x00010002,
                base_version: 0x00010000,
                title_id: 0x415607E6,
                platform: 2,
                executable_type: 1,
                disc_number: 1,
                disc_count: 1,
                save_game_id: 7,
            },
            thumbnail: vec![0x89, b'P', b'N', b'G'],
        }
    }

    #[test]
    fn test_header_round_trip() {
        let header = sample_header();
        let bytes = header.write_to();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert!(is_container_magic(&bytes));

        let parsed = ContainerHeader::read_from(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_magic_variants() {
        assert!(is_container_magic(b"CON \0\0"));
        assert!(is_container_magic(b"LIVE\0\0"));
        assert!(is_container_magic(b"PIRS\0\0"));
        assert!(!is_container_magic(b"XDBF\0\0"));
        assert!(!is_container_magic(b"CO"));
    }

    #[test]
    fn test_read_rejects_bad_magic() {
        let mut bytes = sample_header().write_to();
        bytes[0..4].copy_from_slice(b"NOPE");
        let err = ContainerHeader::read_from(&bytes).unwrap_err();
        assert!(matches!(err, VfsError::InvalidContainer(_)));
    }

    #[test]
    fn test_read_rejects_truncated() {
        let bytes = sample_header().write_to();
        let err = ContainerHeader::read_from(&bytes[..512]).unwrap_err();
        assert!(matches!(err, VfsError::InvalidContainer(_)));
    }

    #[test]
    fn test_write_truncates_oversized_thumbnail() {
        let mut header = sample_header();
        header.thumbnail = vec![0xFF; THUMB_MAX_LEN + 100];
        let parsed = ContainerHeader::read_from(&header.write_to()).unwrap();
        assert_eq!(parsed.thumbnail.len(), THUMB_MAX_LEN);
    }

    #[test]
    fn test_device_create_open_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let package_path = dir.path().join("Save01");

        let device = ContainerDevice::create(
            "\\Device\\Content\\1\\".to_string(),
            package_path.clone(),
            sample_header(),
        )
        .unwrap();
        assert_eq!(device.device_path(), "\\Device\\Content\\1\\");

        let reopened =
            ContainerDevice::open("\\Device\\Content\\2\\".to_string(), package_path.clone())
                .unwrap();
        assert_eq!(reopened.header().display_name, "Campaign Save");

        let resolved = reopened.resolve("\\save\\slot0.dat").unwrap();
        assert_eq!(resolved, data_directory(&package_path).join("save/slot0.dat"));
    }

    #[test]
    fn test_data_directory_suffix() {
        let path = data_directory(Path::new("/content/415607E6/00000001/Save01"));
        assert_eq!(
            path,
            PathBuf::from("/content/415607E6/00000001/Save01.data")
        );
    }
}
