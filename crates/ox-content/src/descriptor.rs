//! Content descriptors and their console ABI encoding
//!
//! A descriptor identifies one package independent of whether it is open.
//! On the wire it is a fixed-width big-endian record so titles can pass it
//! through the system-call layer unchanged.

use ox_core::error::ContentError;
use ox_core::text;

/// Content package type.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Game save data
    SavedGame = 0x0000_0001,
    /// Downloadable/marketplace content
    Marketplace = 0x0000_0002,
    /// Publisher-pushed content
    Publisher = 0x0000_0003,
    /// Profile records
    Profile = 0x0001_0000,
}

impl ContentType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x0000_0001 => Some(Self::SavedGame),
            0x0000_0002 => Some(Self::Marketplace),
            0x0000_0003 => Some(Self::Publisher),
            0x0001_0000 => Some(Self::Profile),
            _ => None,
        }
    }
}

/// Wire layout, all fields big-endian:
///
/// | offset | size | field                         |
/// |--------|------|-------------------------------|
/// | 0x000  | 4    | device id                     |
/// | 0x004  | 4    | content type                  |
/// | 0x008  | 256  | display name (128 u16 units)  |
/// | 0x108  | 42   | file name (NUL padded)        |
/// | 0x132  | 2    | padding                       |
pub const RECORD_LEN: usize = 308;

/// Aggregate records append the owning title id.
pub const AGGREGATE_RECORD_LEN: usize = RECORD_LEN + 4;

const DISPLAY_NAME_LEN: usize = 256;
const FILE_NAME_LEN: usize = 42;
const OFFSET_CONTENT_TYPE: usize = 0x004;
const OFFSET_DISPLAY_NAME: usize = 0x008;
const OFFSET_FILE_NAME: usize = 0x108;
const OFFSET_TITLE_ID: usize = RECORD_LEN;

/// Identifies one content package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    /// Opaque tag assigned by the caller during enumeration.
    pub device_id: u32,
    pub content_type: ContentType,
    /// Shown in content pickers; capped at 128 UTF-16 units on the wire.
    pub display_name: String,
    /// On-disk package file name; capped at 42 bytes on the wire.
    pub file_name: String,
}

impl ContentDescriptor {
    pub fn new(
        device_id: u32,
        content_type: ContentType,
        display_name: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            device_id,
            content_type,
            display_name: display_name.into(),
            file_name: file_name.into(),
        }
    }

    /// Encode into the wire record. `buf` must hold `RECORD_LEN` bytes.
    pub fn write(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= RECORD_LEN);

        buf[0..4].copy_from_slice(&self.device_id.to_be_bytes());
        buf[OFFSET_CONTENT_TYPE..OFFSET_CONTENT_TYPE + 4]
            .copy_from_slice(&(self.content_type as u32).to_be_bytes());
        text::write_utf16_fixed(
            &mut buf[OFFSET_DISPLAY_NAME..OFFSET_DISPLAY_NAME + DISPLAY_NAME_LEN],
            &self.display_name,
        );

        let name_bytes = self.file_name.as_bytes();
        let name_len = name_bytes.len().min(FILE_NAME_LEN);
        buf[OFFSET_FILE_NAME..OFFSET_FILE_NAME + name_len]
            .copy_from_slice(&name_bytes[..name_len]);
        for slot in &mut buf[OFFSET_FILE_NAME + name_len..RECORD_LEN] {
            *slot = 0;
        }
    }

    /// Decode from a wire record.
    pub fn read(buf: &[u8]) -> Result<Self, ContentError> {
        if buf.len() < RECORD_LEN {
            return Err(ContentError::InvalidDescriptor(format!(
                "record is {} bytes, expected {}",
                buf.len(),
                RECORD_LEN
            )));
        }

        let device_id = read_u32(buf, 0);
        let raw_type = read_u32(buf, OFFSET_CONTENT_TYPE);
        let content_type = ContentType::from_u32(raw_type).ok_or_else(|| {
            ContentError::InvalidDescriptor(format!("unknown content type {:#X}", raw_type))
        })?;

        let display_name =
            text::read_utf16_fixed(&buf[OFFSET_DISPLAY_NAME..OFFSET_DISPLAY_NAME + DISPLAY_NAME_LEN]);

        let name_field = &buf[OFFSET_FILE_NAME..OFFSET_FILE_NAME + FILE_NAME_LEN];
        let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(FILE_NAME_LEN);
        let file_name = String::from_utf8_lossy(&name_field[..name_len]).to_string();

        Ok(Self {
            device_id,
            content_type,
            display_name,
            file_name,
        })
    }
}

/// Descriptor variant used by cross-title enumeration; carries the owning
/// title id after the base record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateContentDescriptor {
    pub descriptor: ContentDescriptor,
    pub title_id: u32,
}

impl AggregateContentDescriptor {
    /// Encode into the aggregate wire record. `buf` must hold
    /// `AGGREGATE_RECORD_LEN` bytes.
    pub fn write(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= AGGREGATE_RECORD_LEN);
        self.descriptor.write(buf);
        buf[OFFSET_TITLE_ID..OFFSET_TITLE_ID + 4].copy_from_slice(&self.title_id.to_be_bytes());
    }

    /// Decode from an aggregate wire record.
    pub fn read(buf: &[u8]) -> Result<Self, ContentError> {
        if buf.len() < AGGREGATE_RECORD_LEN {
            return Err(ContentError::InvalidDescriptor(format!(
                "aggregate record is {} bytes, expected {}",
                buf.len(),
                AGGREGATE_RECORD_LEN
            )));
        }

        Ok(Self {
            descriptor: ContentDescriptor::read(buf)?,
            title_id: read_u32(buf, OFFSET_TITLE_ID),
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}
