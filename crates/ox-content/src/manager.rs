//! Content manager
//!
//! Resolves deterministic package storage paths, opens and closes
//! container-backed virtual devices under exclusive mount names, and
//! manages sidecar thumbnail files.
//!
//! Storage layout under the content root:
//!
//! ```text
//! <root>/<title_id_hex>/<content_type_hex>/<file_name>        package file
//! <root>/<title_id_hex>/<content_type_hex>/<file_name>.data/  data region
//! <root>/<title_id_hex>/profile/<user_name>/                  loose files
//! ```

use crate::descriptor::{ContentDescriptor, ContentType};
use crate::package::ContentPackage;
use crate::title::TitleContext;
use ox_core::error::ContentError;
use ox_vfs::container::{self, ContainerHeader, HEADER_LEN};
use ox_vfs::device::DeviceRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

const THUMBNAIL_FILE_NAME: &str = "__thumbnail.png";

const GAME_USER_CONTENT_DIR_NAME: &str = "profile";

/// Manages the on-disk package store and the table of open packages.
///
/// At most one package may be open per mount name; the table enforces it
/// under a single lock held for the duration of each operation.
pub struct ContentManager {
    registry: Arc<DeviceRegistry>,
    title: Arc<TitleContext>,
    root_path: PathBuf,
    open_packages: Mutex<HashMap<String, ContentPackage>>,
}

impl ContentManager {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        title: Arc<TitleContext>,
        root_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            title,
            root_path: root_path.into(),
            open_packages: Mutex::new(HashMap::new()),
        }
    }

    /// Package root for a content type:
    /// `content_root/<title_id>/<content_type>`, both fixed-width hex.
    pub fn resolve_package_root(&self, content_type: ContentType) -> PathBuf {
        let title_id = format!("{:08X}", self.title.title_id());
        let type_name = format!("{:08X}", content_type as u32);
        self.root_path.join(title_id).join(type_name)
    }

    /// Full path of a descriptor's package file.
    pub fn resolve_package_path(&self, descriptor: &ContentDescriptor) -> PathBuf {
        self.resolve_package_root(descriptor.content_type)
            .join(&descriptor.file_name)
    }

    /// Per-game per-profile directory for loose files outside any
    /// container: `content_root/<title_id>/profile/<user_name>`.
    pub fn resolve_game_user_content_path(&self) -> PathBuf {
        let title_id = format!("{:08X}", self.title.title_id());
        self.root_path
            .join(title_id)
            .join(GAME_USER_CONTENT_DIR_NAME)
            .join(self.title.user_name())
    }

    /// Enumerate valid packages of one content type. Files that are too
    /// small or fail the magic check are skipped, not reported as errors;
    /// anything else in the directory is foreign data.
    pub fn list_content(&self, device_id: u32, content_type: ContentType) -> Vec<ContentDescriptor> {
        let mut result = Vec::new();

        let package_root = self.resolve_package_root(content_type);
        let entries = match std::fs::read_dir(&package_root) {
            Ok(entries) => entries,
            Err(_) => return result,
        };

        for entry in entries.flatten() {
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }
            if (metadata.len() as usize) < HEADER_LEN {
                // Too small to be a valid package
                continue;
            }

            let path = entry.path();
            if !has_container_magic(&path) {
                continue;
            }

            let header = match container::read_header(&path) {
                Ok(header) => header,
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let header_type = match ContentType::from_u32(header.content_type) {
                Some(header_type) => header_type,
                None => {
                    tracing::debug!(
                        "Skipping {}: unknown content type {:#X}",
                        path.display(),
                        header.content_type
                    );
                    continue;
                }
            };

            result.push(ContentDescriptor {
                device_id,
                content_type: header_type,
                display_name: header.display_name,
                file_name: entry.file_name().to_string_lossy().to_string(),
            });
        }

        result
    }

    /// Whether a package file exists on disk. Does not validate contents.
    pub fn content_exists(&self, descriptor: &ContentDescriptor) -> bool {
        self.resolve_package_path(descriptor).exists()
    }

    /// Create a new package and mount it under `root_name`.
    pub fn create_content(
        &self,
        root_name: &str,
        descriptor: &ContentDescriptor,
    ) -> Result<(), ContentError> {
        let mut open_packages = self.open_packages.lock();

        if open_packages.contains_key(root_name) {
            // Already content open with this root name.
            return Err(ContentError::AlreadyExists(root_name.to_string()));
        }

        let package_path = self.resolve_package_path(descriptor);
        if package_path.exists() {
            return Err(ContentError::AlreadyExists(
                package_path.display().to_string(),
            ));
        }

        let package_data = container::data_directory(&package_path);
        std::fs::create_dir_all(&package_data).map_err(|e| {
            ContentError::AccessDenied(format!("{}: {}", package_data.display(), e))
        })?;

        let package = ContentPackage::new(
            self.registry.clone(),
            &self.title,
            root_name,
            descriptor,
            &package_path,
            true,
        )?;
        open_packages.insert(root_name.to_string(), package);

        Ok(())
    }

    /// Open an existing package and mount it under `root_name`.
    pub fn open_content(
        &self,
        root_name: &str,
        descriptor: &ContentDescriptor,
    ) -> Result<(), ContentError> {
        let mut open_packages = self.open_packages.lock();

        if open_packages.contains_key(root_name) {
            // Already content open with this root name.
            return Err(ContentError::AlreadyExists(root_name.to_string()));
        }

        let package_path = self.resolve_package_path(descriptor);
        if !package_path.exists() {
            // Does not exist, must be created.
            return Err(ContentError::NotFound(package_path.display().to_string()));
        }

        let package = ContentPackage::new(
            self.registry.clone(),
            &self.title,
            root_name,
            descriptor,
            &package_path,
            false,
        )?;
        open_packages.insert(root_name.to_string(), package);

        Ok(())
    }

    /// Unmount the package open under `root_name`, releasing its device
    /// and link registrations.
    pub fn close_content(&self, root_name: &str) -> Result<(), ContentError> {
        let mut open_packages = self.open_packages.lock();

        match open_packages.remove(root_name) {
            Some(_package) => Ok(()),
            None => Err(ContentError::NotFound(root_name.to_string())),
        }
    }

    /// Header metadata of the package currently open under `root_name`.
    pub fn open_content_header(&self, root_name: &str) -> Result<ContainerHeader, ContentError> {
        let open_packages = self.open_packages.lock();
        open_packages
            .get(root_name)
            .map(|package| package.header().clone())
            .ok_or_else(|| ContentError::NotFound(root_name.to_string()))
    }

    /// Read the sidecar thumbnail for a package.
    pub fn get_content_thumbnail(
        &self,
        descriptor: &ContentDescriptor,
    ) -> Result<Vec<u8>, ContentError> {
        let _open_packages = self.open_packages.lock();

        let package_data = container::data_directory(&self.resolve_package_path(descriptor));
        let thumb_path = package_data.join(THUMBNAIL_FILE_NAME);
        if !thumb_path.exists() {
            return Err(ContentError::NotFound(thumb_path.display().to_string()));
        }

        Ok(std::fs::read(&thumb_path)?)
    }

    /// Write the sidecar thumbnail for a package.
    pub fn set_content_thumbnail(
        &self,
        descriptor: &ContentDescriptor,
        buffer: Vec<u8>,
    ) -> Result<(), ContentError> {
        let _open_packages = self.open_packages.lock();

        let package_data = container::data_directory(&self.resolve_package_path(descriptor));
        std::fs::create_dir_all(&package_data)?;
        std::fs::write(package_data.join(THUMBNAIL_FILE_NAME), buffer)?;

        Ok(())
    }

    /// Remove a package file and its data directory.
    pub fn delete_content(&self, descriptor: &ContentDescriptor) -> Result<(), ContentError> {
        let _open_packages = self.open_packages.lock();

        let package_path = self.resolve_package_path(descriptor);
        let package_data = container::data_directory(&package_path);

        let mut removed = false;
        if package_path.is_file() {
            std::fs::remove_file(&package_path)?;
            removed = true;
        }
        if package_data.is_dir() {
            std::fs::remove_dir_all(&package_data)?;
            removed = true;
        }

        if removed {
            tracing::info!("Deleted content package {}", package_path.display());
            Ok(())
        } else {
            Err(ContentError::NotFound(package_path.display().to_string()))
        }
    }
}

fn has_container_magic(path: &std::path::Path) -> bool {
    let mut magic = [0u8; 4];
    match std::fs::File::open(path) {
        Ok(mut file) => file.read_exact(&mut magic).is_ok() && container::is_container_magic(&magic),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::TitleState;

    fn test_manager(root: &std::path::Path) -> ContentManager {
        let title = Arc::new(TitleContext::new());
        title.set_title(TitleState {
            title_id: 0x415607E6,
            title_name: "Example Title".to_string(),
            user_name: "Player1".to_string(),
            ..Default::default()
        });
        ContentManager::new(Arc::new(DeviceRegistry::new()), title, root)
    }

    fn save_descriptor(file_name: &str) -> ContentDescriptor {
        ContentDescriptor::new(1, ContentType::SavedGame, "Campaign Save", file_name)
    }

    #[test]
    fn test_resolve_paths_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let descriptor = save_descriptor("Save01");

        let root = manager.resolve_package_root(ContentType::SavedGame);
        assert_eq!(root, dir.path().join("415607E6").join("00000001"));
        assert_eq!(
            manager.resolve_package_root(ContentType::Profile),
            dir.path().join("415607E6").join("00010000")
        );

        let path = manager.resolve_package_path(&descriptor);
        assert_eq!(path, root.join("Save01"));
        assert_eq!(path, manager.resolve_package_path(&descriptor));

        assert_eq!(
            manager.resolve_game_user_content_path(),
            dir.path().join("415607E6").join("profile").join("Player1")
        );
    }

    #[test]
    fn test_create_duplicate_mount_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());

        manager.create_content("save", &save_descriptor("Save01")).unwrap();

        // Same mount name, different descriptor: still refused.
        let err = manager
            .create_content("save", &save_descriptor("Save02"))
            .unwrap_err();
        assert!(matches!(err, ContentError::AlreadyExists(_)));

        let err = manager
            .open_content("save", &save_descriptor("Save01"))
            .unwrap_err();
        assert!(matches!(err, ContentError::AlreadyExists(_)));
    }

    #[test]
    fn test_create_existing_package_on_disk_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let descriptor = save_descriptor("Save01");

        manager.create_content("save", &descriptor).unwrap();
        manager.close_content("save").unwrap();

        // No mount is open, but the file exists on disk.
        let err = manager.create_content("save", &descriptor).unwrap_err();
        assert!(matches!(err, ContentError::AlreadyExists(_)));
    }

    #[test]
    fn test_create_close_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let descriptor = save_descriptor("Save01");

        manager.create_content("save", &descriptor).unwrap();
        manager.close_content("save").unwrap();
        manager.open_content("save", &descriptor).unwrap();

        let header = manager.open_content_header("save").unwrap();
        assert_eq!(header.display_name, "Campaign Save");
        assert_eq!(header.title_name, "Example Title");
        assert_eq!(header.content_type, ContentType::SavedGame as u32);

        manager.close_content("save").unwrap();
    }

    #[test]
    fn test_open_missing_and_close_missing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());

        let err = manager
            .open_content("save", &save_descriptor("Nothing"))
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));

        let err = manager.close_content("save").unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));
    }

    #[test]
    fn test_close_releases_mount_name() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let descriptor = save_descriptor("Save01");

        manager.create_content("save", &descriptor).unwrap();
        manager.close_content("save").unwrap();
        manager.open_content("save", &descriptor).unwrap();
        manager.close_content("save").unwrap();
    }

    #[test]
    fn test_list_content_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());

        manager.create_content("save", &save_descriptor("Save01")).unwrap();
        manager.close_content("save").unwrap();

        let package_root = manager.resolve_package_root(ContentType::SavedGame);
        std::fs::write(package_root.join("empty"), b"").unwrap();
        std::fs::write(package_root.join("junk"), vec![0xCCu8; HEADER_LEN]).unwrap();

        let listed = manager.list_content(7, ContentType::SavedGame);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].device_id, 7);
        assert_eq!(listed[0].file_name, "Save01");
        assert_eq!(listed[0].display_name, "Campaign Save");
        assert_eq!(listed[0].content_type, ContentType::SavedGame);
    }

    #[test]
    fn test_list_content_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        assert!(manager.list_content(0, ContentType::Marketplace).is_empty());
    }

    #[test]
    fn test_content_exists() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let descriptor = save_descriptor("Save01");

        assert!(!manager.content_exists(&descriptor));
        manager.create_content("save", &descriptor).unwrap();
        assert!(manager.content_exists(&descriptor));
        manager.close_content("save").unwrap();
        assert!(manager.content_exists(&descriptor));
    }

    #[test]
    fn test_thumbnail_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let descriptor = save_descriptor("Save01");

        let err = manager.get_content_thumbnail(&descriptor).unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));

        let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A];
        manager.set_content_thumbnail(&descriptor, png.clone()).unwrap();
        assert_eq!(manager.get_content_thumbnail(&descriptor).unwrap(), png);
    }

    #[test]
    fn test_delete_content() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let descriptor = save_descriptor("Save01");

        let err = manager.delete_content(&descriptor).unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));

        manager.create_content("save", &descriptor).unwrap();
        manager.close_content("save").unwrap();

        manager.delete_content(&descriptor).unwrap();
        assert!(!manager.content_exists(&descriptor));
        assert!(!container::data_directory(&manager.resolve_package_path(&descriptor)).exists());

        let err = manager.open_content("save", &descriptor).unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));
    }
}
