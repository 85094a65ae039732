//! GPD record files
//!
//! A GPD file is an entry-keyed record blob, big-endian throughout.
//! Per-title files hold achievement records, images, and the title name;
//! the dashboard file (reserved title id) holds one title-played record
//! per title the profile has ever seen.
//!
//! File layout:
//!
//! ```text
//! 0x00  magic "XDBF"
//! 0x04  version (0x10000)
//! 0x08  entry count
//! 0x0C  entry table: namespace u16, id u64, offset u32, length u32
//! ....  data heap (offsets relative to heap start)
//! ```

use bitflags::bitflags;
use ox_core::error::ProfileError;
use ox_core::text;

/// Reserved title id of the dashboard aggregate record.
pub const DASHBOARD_TITLE_ID: u32 = 0xFFFE07D1;

/// Entry id shared by the title's own icon (Image namespace) and name
/// (String namespace).
pub const TITLE_INFO_ID: u64 = 0x8000;

const MAGIC: [u8; 4] = *b"XDBF";
const VERSION: u32 = 0x10000;
const FILE_HEADER_LEN: usize = 12;
const ENTRY_LEN: usize = 18;

/// Entry namespaces.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpdNamespace {
    Achievement = 1,
    Image = 2,
    Setting = 3,
    Title = 4,
    String = 5,
}

/// One raw entry: a namespace/id key and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub namespace: u16,
    pub id: u64,
    pub data: Vec<u8>,
}

bitflags! {
    /// Achievement record flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AchievementFlags: u32 {
        const TYPE_MASK = 0x0000_0007;
        const SHOW_UNACHIEVED = 0x0000_0008;
        const ACHIEVED_ONLINE = 0x0001_0000;
        const ACHIEVED = 0x0002_0000;
    }
}

/// One achievement record.
///
/// Payload layout: a 0x1C-byte fixed part (struct size, id, image id,
/// gamerscore, flags, unlock time) followed by three NUL-terminated
/// UTF-16BE strings (label, unlocked description, locked description).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Achievement {
    pub id: u32,
    pub image_id: u32,
    pub gamerscore: u32,
    pub flags: AchievementFlags,
    pub unlock_time: u64,
    pub label: String,
    pub description: String,
    pub unachieved_description: String,
}

impl Achievement {
    const FIXED_LEN: usize = 0x1C;

    pub fn is_unlocked(&self) -> bool {
        self.flags
            .intersects(AchievementFlags::ACHIEVED | AchievementFlags::ACHIEVED_ONLINE)
    }

    /// Mark the achievement unlocked at the given FILETIME.
    pub fn unlock(&mut self, time: u64) {
        self.flags |= AchievementFlags::ACHIEVED;
        self.unlock_time = time;
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::FIXED_LEN + (self.label.len() + 2) * 2);
        out.extend_from_slice(&(Self::FIXED_LEN as u32).to_be_bytes());
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.image_id.to_be_bytes());
        out.extend_from_slice(&self.gamerscore.to_be_bytes());
        out.extend_from_slice(&self.flags.bits().to_be_bytes());
        out.extend_from_slice(&self.unlock_time.to_be_bytes());
        out.extend_from_slice(&text::encode_utf16_nul(&self.label));
        out.extend_from_slice(&text::encode_utf16_nul(&self.description));
        out.extend_from_slice(&text::encode_utf16_nul(&self.unachieved_description));
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self, ProfileError> {
        if data.len() < Self::FIXED_LEN {
            return Err(ProfileError::Malformed(format!(
                "achievement record is {} bytes, expected at least {}",
                data.len(),
                Self::FIXED_LEN
            )));
        }

        let mut record = Self {
            id: read_u32(data, 0x04),
            image_id: read_u32(data, 0x08),
            gamerscore: read_u32(data, 0x0C),
            flags: AchievementFlags::from_bits_retain(read_u32(data, 0x10)),
            unlock_time: read_u64(data, 0x14),
            ..Default::default()
        };

        let mut rest = &data[Self::FIXED_LEN..];
        let (label, consumed) = text::decode_utf16_nul(rest);
        record.label = label;
        rest = &rest[consumed..];
        let (description, consumed) = text::decode_utf16_nul(rest);
        record.description = description;
        rest = &rest[consumed..];
        let (unachieved, _) = text::decode_utf16_nul(rest);
        record.unachieved_description = unachieved;

        Ok(record)
    }
}

/// One title-played record, stored in the dashboard file.
///
/// Payload layout: a 0x20-byte fixed part (title id, achievement and
/// gamerscore counters, flags, last-played FILETIME) followed by the
/// NUL-terminated UTF-16BE title name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitlePlayed {
    pub title_id: u32,
    pub achievements_possible: u32,
    pub achievements_earned: u32,
    pub gamerscore_total: u32,
    pub gamerscore_earned: u32,
    pub flags: u32,
    pub last_played: u64,
    pub title_name: String,
}

impl TitlePlayed {
    const FIXED_LEN: usize = 0x20;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::FIXED_LEN + (self.title_name.len() + 2) * 2);
        out.extend_from_slice(&self.title_id.to_be_bytes());
        out.extend_from_slice(&self.achievements_possible.to_be_bytes());
        out.extend_from_slice(&self.achievements_earned.to_be_bytes());
        out.extend_from_slice(&self.gamerscore_total.to_be_bytes());
        out.extend_from_slice(&self.gamerscore_earned.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.last_played.to_be_bytes());
        out.extend_from_slice(&text::encode_utf16_nul(&self.title_name));
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self, ProfileError> {
        if data.len() < Self::FIXED_LEN {
            return Err(ProfileError::Malformed(format!(
                "title record is {} bytes, expected at least {}",
                data.len(),
                Self::FIXED_LEN
            )));
        }

        let (title_name, _) = text::decode_utf16_nul(&data[Self::FIXED_LEN..]);

        Ok(Self {
            title_id: read_u32(data, 0x00),
            achievements_possible: read_u32(data, 0x04),
            achievements_earned: read_u32(data, 0x08),
            gamerscore_total: read_u32(data, 0x0C),
            gamerscore_earned: read_u32(data, 0x10),
            flags: read_u32(data, 0x14),
            last_played: read_u64(data, 0x18),
            title_name,
        })
    }
}

/// An in-memory GPD file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpdFile {
    entries: Vec<Entry>,
}

impl GpdFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a GPD file from its durable byte form.
    pub fn read(buf: &[u8]) -> Result<Self, ProfileError> {
        if buf.len() < FILE_HEADER_LEN {
            return Err(ProfileError::Malformed("truncated file header".to_string()));
        }
        if buf[0..4] != MAGIC {
            return Err(ProfileError::Malformed("bad magic".to_string()));
        }
        let version = read_u32(buf, 4);
        if version != VERSION {
            return Err(ProfileError::Malformed(format!(
                "unsupported version {:#X}",
                version
            )));
        }

        let count = read_u32(buf, 8) as usize;
        let table_len = count
            .checked_mul(ENTRY_LEN)
            .ok_or_else(|| ProfileError::Malformed("entry count overflow".to_string()))?;
        let heap_start = FILE_HEADER_LEN + table_len;
        if heap_start > buf.len() {
            return Err(ProfileError::Malformed("entry table out of range".to_string()));
        }
        let heap = &buf[heap_start..];

        let mut entries = Vec::with_capacity(count);
        for index in 0..count {
            let base = FILE_HEADER_LEN + index * ENTRY_LEN;
            let namespace = u16::from_be_bytes([buf[base], buf[base + 1]]);
            let id = read_u64(buf, base + 2);
            let offset = read_u32(buf, base + 10) as usize;
            let length = read_u32(buf, base + 14) as usize;

            let end = offset
                .checked_add(length)
                .filter(|&end| end <= heap.len())
                .ok_or_else(|| {
                    ProfileError::Malformed(format!("entry {} data out of range", index))
                })?;

            entries.push(Entry {
                namespace,
                id,
                data: heap[offset..end].to_vec(),
            });
        }

        Ok(Self { entries })
    }

    /// Size of the serialized file in bytes.
    pub fn compute_size(&self) -> usize {
        FILE_HEADER_LEN
            + self.entries.len() * ENTRY_LEN
            + self.entries.iter().map(|e| e.data.len()).sum::<usize>()
    }

    /// Serialize into the durable byte form. The buffer is pre-sized from
    /// `compute_size` and filled in place, so a failure here leaves
    /// nothing half-written.
    pub fn serialize(&self) -> Result<Vec<u8>, ProfileError> {
        if self.entries.len() as u64 > u32::MAX as u64 {
            return Err(ProfileError::Serialization("too many entries".to_string()));
        }
        let heap_size: usize = self.entries.iter().map(|e| e.data.len()).sum();
        if heap_size as u64 > u32::MAX as u64 {
            return Err(ProfileError::Serialization("data heap too large".to_string()));
        }

        let size = self.compute_size();
        let mut buf = vec![0u8; size];

        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&VERSION.to_be_bytes());
        buf[8..12].copy_from_slice(&(self.entries.len() as u32).to_be_bytes());

        let heap_start = FILE_HEADER_LEN + self.entries.len() * ENTRY_LEN;
        let mut data_offset = 0usize;
        for (index, entry) in self.entries.iter().enumerate() {
            let base = FILE_HEADER_LEN + index * ENTRY_LEN;
            buf[base..base + 2].copy_from_slice(&entry.namespace.to_be_bytes());
            buf[base + 2..base + 10].copy_from_slice(&entry.id.to_be_bytes());
            buf[base + 10..base + 14].copy_from_slice(&(data_offset as u32).to_be_bytes());
            buf[base + 14..base + 18].copy_from_slice(&(entry.data.len() as u32).to_be_bytes());

            let start = heap_start + data_offset;
            buf[start..start + entry.data.len()].copy_from_slice(&entry.data);
            data_offset += entry.data.len();
        }

        Ok(buf)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Look up an entry by namespace and id.
    pub fn entry(&self, namespace: u16, id: u64) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.namespace == namespace && e.id == id)
    }

    /// Insert or replace an entry, keyed by namespace and id. Replacement
    /// keeps the entry's position.
    pub fn update_entry(&mut self, entry: Entry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.namespace == entry.namespace && e.id == entry.id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Parse one achievement record by id.
    pub fn achievement(&self, id: u32) -> Option<Achievement> {
        let entry = self.entry(GpdNamespace::Achievement as u16, u64::from(id))?;
        match Achievement::from_bytes(&entry.data) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Dropping malformed achievement {}: {}", id, e);
                None
            }
        }
    }

    /// Parse every achievement record, dropping malformed ones.
    pub fn achievements(&self) -> Vec<Achievement> {
        self.entries
            .iter()
            .filter(|e| e.namespace == GpdNamespace::Achievement as u16)
            .filter_map(|e| match Achievement::from_bytes(&e.data) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!("Dropping malformed achievement {}: {}", e.id, err);
                    None
                }
            })
            .collect()
    }

    /// Insert or replace an achievement record.
    pub fn update_achievement(&mut self, record: &Achievement) {
        self.update_entry(Entry {
            namespace: GpdNamespace::Achievement as u16,
            id: u64::from(record.id),
            data: record.to_bytes(),
        });
    }

    /// Parse one title-played record by title id.
    pub fn title(&self, title_id: u32) -> Option<TitlePlayed> {
        let entry = self.entry(GpdNamespace::Title as u16, u64::from(title_id))?;
        match TitlePlayed::from_bytes(&entry.data) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Dropping malformed title record {:08X}: {}", title_id, e);
                None
            }
        }
    }

    /// Parse every title-played record, dropping malformed ones.
    pub fn titles(&self) -> Vec<TitlePlayed> {
        self.entries
            .iter()
            .filter(|e| e.namespace == GpdNamespace::Title as u16)
            .filter_map(|e| match TitlePlayed::from_bytes(&e.data) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!("Dropping malformed title record {:X}: {}", e.id, err);
                    None
                }
            })
            .collect()
    }

    /// Insert or replace a title-played record.
    pub fn update_title(&mut self, record: &TitlePlayed) {
        self.update_entry(Entry {
            namespace: GpdNamespace::Title as u16,
            id: u64::from(record.title_id),
            data: record.to_bytes(),
        });
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}
