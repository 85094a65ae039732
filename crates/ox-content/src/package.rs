//! Content packages
//!
//! A package binds one container file, mounted under one symbolic-link
//! root name, to one registered virtual device. It owns both
//! registrations for its entire lifetime; dropping the package releases
//! them.

use crate::descriptor::ContentDescriptor;
use crate::title::TitleContext;
use ox_core::error::ContentError;
use ox_vfs::container::{self, ContainerDevice, ContainerHeader, THUMB_MAX_LEN};
use ox_vfs::device::DeviceRegistry;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// Device ids are never reused while the process runs, so rapid
// close/reopen cycles cannot collide on a stale registration.
static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(1);

/// A live, mounted content package.
pub struct ContentPackage {
    registry: Arc<DeviceRegistry>,
    device: Arc<ContainerDevice>,
    root_name: String,
    device_path: String,
}

impl std::fmt::Debug for ContentPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentPackage")
            .field("root_name", &self.root_name)
            .field("device_path", &self.device_path)
            .finish()
    }
}

impl ContentPackage {
    pub(crate) fn new(
        registry: Arc<DeviceRegistry>,
        title: &TitleContext,
        root_name: &str,
        descriptor: &ContentDescriptor,
        package_path: &Path,
        create: bool,
    ) -> Result<Self, ContentError> {
        let device_id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        let device_path = format!("\\Device\\Content\\{}\\", device_id);

        let device = if create {
            let mut header = ContainerHeader::new();
            header.content_type = descriptor.content_type as u32;
            header.display_name = descriptor.display_name.clone();
            header.title_name = title.title_name();
            header.execution_info = title.execution_info();
            if let Some(icon) = title.icon() {
                if icon.len() <= THUMB_MAX_LEN {
                    header.thumbnail = icon;
                }
            }

            let device =
                ContainerDevice::create(device_path.clone(), package_path.to_path_buf(), header)?;

            let package_data = container::data_directory(package_path);
            if !package_data.exists() {
                std::fs::create_dir_all(&package_data).map_err(|e| {
                    ContentError::AccessDenied(format!("{}: {}", package_data.display(), e))
                })?;
            }
            device
        } else {
            ContainerDevice::open(device_path.clone(), package_path.to_path_buf())?
        };

        let device = Arc::new(device);
        registry.register_device(device.clone())?;

        let link_name = format!("{}:", root_name);
        if let Err(e) = registry.register_symbolic_link(&link_name, &device_path) {
            let _ = registry.unregister_device(&device_path);
            return Err(e.into());
        }

        tracing::info!(
            "Mounted {} as {} ({})",
            package_path.display(),
            link_name,
            device_path
        );

        Ok(Self {
            registry,
            device,
            root_name: root_name.to_string(),
            device_path,
        })
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn header(&self) -> &ContainerHeader {
        self.device.header()
    }
}

impl Drop for ContentPackage {
    fn drop(&mut self) {
        // The link must go away first so it never points at a missing
        // device.
        let link_name = format!("{}:", self.root_name);
        if let Err(e) = self.registry.unregister_symbolic_link(&link_name) {
            tracing::warn!("Failed to unregister {}: {}", link_name, e);
        }
        if let Err(e) = self.registry.unregister_device(&self.device_path) {
            tracing::warn!("Failed to unregister {}: {}", self.device_path, e);
        }

        tracing::debug!("Unmounted {}", link_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ContentType;
    use crate::title::TitleState;

    fn test_title() -> TitleContext {
        let title = TitleContext::new();
        title.set_title(TitleState {
            title_id: 0x415607E6,
            title_name: "Example Title".to_string(),
            user_name: "Player1".to_string(),
            ..Default::default()
        });
        title
    }

    #[test]
    fn test_create_registers_device_and_link() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DeviceRegistry::new());
        let title = test_title();
        let descriptor =
            ContentDescriptor::new(1, ContentType::SavedGame, "Campaign Save", "Save01");

        let package = ContentPackage::new(
            registry.clone(),
            &title,
            "save",
            &descriptor,
            &dir.path().join("Save01"),
            true,
        )
        .unwrap();

        let device_path = registry.resolve_link("save:").unwrap();
        assert_eq!(device_path, package.device_path());
        assert!(registry.device(&device_path).is_some());
        assert_eq!(package.header().display_name, "Campaign Save");
        assert!(container::data_directory(&dir.path().join("Save01")).is_dir());

        drop(package);
        assert!(registry.resolve_link("save:").is_none());
        assert!(registry.device(&device_path).is_none());
    }

    #[test]
    fn test_device_paths_not_reused_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DeviceRegistry::new());
        let title = test_title();
        let descriptor =
            ContentDescriptor::new(1, ContentType::SavedGame, "Campaign Save", "Save01");
        let package_path = dir.path().join("Save01");

        let first = ContentPackage::new(
            registry.clone(),
            &title,
            "save",
            &descriptor,
            &package_path,
            true,
        )
        .unwrap();
        let first_path = first.device_path().to_string();
        drop(first);

        let second = ContentPackage::new(
            registry.clone(),
            &title,
            "save",
            &descriptor,
            &package_path,
            false,
        )
        .unwrap();
        assert_ne!(second.device_path(), first_path);
    }

    #[test]
    fn test_open_missing_package_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DeviceRegistry::new());
        let title = test_title();
        let descriptor =
            ContentDescriptor::new(1, ContentType::SavedGame, "Campaign Save", "Missing");

        let err = ContentPackage::new(
            registry,
            &title,
            "save",
            &descriptor,
            &dir.path().join("Missing"),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ContentError::Vfs(_)));
    }
}
