//! Virtual device registry
//!
//! A global namespace mapping kernel device paths to device handlers and
//! mount names (symbolic links) to device paths. Content packages register
//! themselves here for the duration of their lifetime.

use ox_core::error::VfsError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A mounted virtual device backed by host storage.
pub trait Device: Send + Sync {
    /// Kernel path the device is registered under, e.g. `\Device\Content\1\`.
    fn device_path(&self) -> &str;

    /// Resolve a path relative to the device root to a host path.
    fn resolve(&self, relative: &str) -> Option<PathBuf>;
}

/// Registry of devices and the symbolic links pointing at them.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Arc<dyn Device>>>,
    links: RwLock<HashMap<String, String>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under its kernel path.
    pub fn register_device(&self, device: Arc<dyn Device>) -> Result<(), VfsError> {
        let mut devices = self.devices.write();
        let path = device.device_path().to_string();
        if devices.contains_key(&path) {
            return Err(VfsError::DeviceExists(path));
        }

        tracing::debug!("Registered device {}", path);
        devices.insert(path, device);
        Ok(())
    }

    /// Remove a device registration.
    pub fn unregister_device(&self, device_path: &str) -> Result<(), VfsError> {
        let mut devices = self.devices.write();
        if devices.remove(device_path).is_none() {
            return Err(VfsError::DeviceNotFound(device_path.to_string()));
        }

        tracing::debug!("Unregistered device {}", device_path);
        Ok(())
    }

    /// Bind a symbolic link name (e.g. `save:`) to a device path.
    pub fn register_symbolic_link(&self, name: &str, device_path: &str) -> Result<(), VfsError> {
        let mut links = self.links.write();
        if links.contains_key(name) {
            return Err(VfsError::LinkExists(name.to_string()));
        }

        tracing::debug!("Registered symbolic link {} -> {}", name, device_path);
        links.insert(name.to_string(), device_path.to_string());
        Ok(())
    }

    /// Remove a symbolic link binding.
    pub fn unregister_symbolic_link(&self, name: &str) -> Result<(), VfsError> {
        let mut links = self.links.write();
        if links.remove(name).is_none() {
            return Err(VfsError::LinkNotFound(name.to_string()));
        }

        tracing::debug!("Unregistered symbolic link {}", name);
        Ok(())
    }

    /// Device path a symbolic link points at.
    pub fn resolve_link(&self, name: &str) -> Option<String> {
        self.links.read().get(name).cloned()
    }

    /// Device registered under a kernel path.
    pub fn device(&self, device_path: &str) -> Option<Arc<dyn Device>> {
        self.devices.read().get(device_path).cloned()
    }

    /// Resolve a link-qualified virtual path (`save:\dir\file.dat`) to a
    /// host path.
    pub fn resolve_path(&self, virtual_path: &str) -> Option<PathBuf> {
        let (link, relative) = match virtual_path.split_once('\\') {
            Some((link, rest)) => (link, rest),
            None => (virtual_path, ""),
        };

        let device_path = self.resolve_link(link)?;
        let device = self.device(&device_path)?;
        device.resolve(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDevice {
        device_path: String,
        root: PathBuf,
    }

    impl Device for FakeDevice {
        fn device_path(&self) -> &str {
            &self.device_path
        }

        fn resolve(&self, relative: &str) -> Option<PathBuf> {
            Some(self.root.join(relative.replace('\\', "/")))
        }
    }

    fn fake(path: &str) -> Arc<dyn Device> {
        Arc::new(FakeDevice {
            device_path: path.to_string(),
            root: PathBuf::from("/tmp/pkg"),
        })
    }

    #[test]
    fn test_register_and_unregister_device() {
        let registry = DeviceRegistry::new();
        registry.register_device(fake("\\Device\\Content\\1\\")).unwrap();
        assert!(registry.device("\\Device\\Content\\1\\").is_some());

        registry.unregister_device("\\Device\\Content\\1\\").unwrap();
        assert!(registry.device("\\Device\\Content\\1\\").is_none());
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let registry = DeviceRegistry::new();
        registry.register_device(fake("\\Device\\Content\\1\\")).unwrap();
        let err = registry
            .register_device(fake("\\Device\\Content\\1\\"))
            .unwrap_err();
        assert!(matches!(err, VfsError::DeviceExists(_)));
    }

    #[test]
    fn test_duplicate_link_rejected() {
        let registry = DeviceRegistry::new();
        registry
            .register_symbolic_link("save:", "\\Device\\Content\\1\\")
            .unwrap();
        let err = registry
            .register_symbolic_link("save:", "\\Device\\Content\\2\\")
            .unwrap_err();
        assert!(matches!(err, VfsError::LinkExists(_)));
    }

    #[test]
    fn test_unregister_missing() {
        let registry = DeviceRegistry::new();
        assert!(matches!(
            registry.unregister_device("\\Device\\Content\\9\\"),
            Err(VfsError::DeviceNotFound(_))
        ));
        assert!(matches!(
            registry.unregister_symbolic_link("save:"),
            Err(VfsError::LinkNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_path_through_link() {
        let registry = DeviceRegistry::new();
        registry.register_device(fake("\\Device\\Content\\1\\")).unwrap();
        registry
            .register_symbolic_link("save:", "\\Device\\Content\\1\\")
            .unwrap();

        let resolved = registry.resolve_path("save:\\slot0.dat").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/pkg/slot0.dat"));

        assert!(registry.resolve_path("dlc:\\pack1").is_none());
    }
}
