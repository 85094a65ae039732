//! Title achievement definition payloads
//!
//! The authoritative achievement table ships inside a title's resources.
//! The host extracts it at boot and hands it over for reconciliation
//! against the profile's persisted records.

use crate::gpd::Achievement;

/// Achievement and image data supplied by a booting title.
#[derive(Debug, Clone, Default)]
pub struct SpaData {
    pub title_id: u32,
    pub title_name: String,
    /// Achievement definitions in the title's default locale.
    pub achievements: Vec<Achievement>,
    /// Image blobs keyed by image id. The entry at
    /// [`crate::gpd::TITLE_INFO_ID`] is the title's own icon.
    pub images: Vec<(u64, Vec<u8>)>,
}

impl SpaData {
    pub fn new(title_id: u32, title_name: impl Into<String>) -> Self {
        Self {
            title_id,
            title_name: title_name.into(),
            achievements: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Look up an image blob by id.
    pub fn image(&self, id: u64) -> Option<&[u8]> {
        self.images
            .iter()
            .find(|(image_id, _)| *image_id == id)
            .map(|(_, data)| data.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_lookup() {
        let mut spa = SpaData::new(0x415607E6, "Example Title");
        spa.images.push((101, vec![1, 2, 3]));

        assert_eq!(spa.image(101), Some([1u8, 2, 3].as_slice()));
        assert_eq!(spa.image(999), None);
    }
}
