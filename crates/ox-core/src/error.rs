//! Error types for the oxide-360 storage subsystem

use thiserror::Error;

/// Main error type for the subsystem
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("VFS error: {0}")]
    Vfs(#[from] VfsError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Virtual device registry and container errors
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("Device already registered at {0}")]
    DeviceExists(String),

    #[error("No device registered at {0}")]
    DeviceNotFound(String),

    #[error("Symbolic link already registered: {0}")]
    LinkExists(String),

    #[error("No symbolic link registered for {0}")]
    LinkNotFound(String),

    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content manager and package errors
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("VFS error: {0}")]
    Vfs(#[from] VfsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Profile and GPD store errors
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Malformed GPD data: {0}")]
    Malformed(String),

    #[error("GPD serialization failed: {0}")]
    Serialization(String),

    #[error("No title is currently active")]
    NoCurrentTitle,

    #[error("No record loaded for title {0:08X}")]
    UnknownTitle(u32),

    #[error("No achievement {ach_id} in title {title_id:08X}")]
    UnknownAchievement { title_id: u32, ach_id: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for subsystem operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ContentError::AlreadyExists("save".to_string());
        assert_eq!(format!("{}", err), "Already exists: save");

        let err = ProfileError::UnknownTitle(0x415607E6);
        assert_eq!(format!("{}", err), "No record loaded for title 415607E6");

        let err = ProfileError::UnknownAchievement {
            title_id: 0x415607E6,
            ach_id: 12,
        };
        assert_eq!(
            format!("{}", err),
            "No achievement 12 in title 415607E6"
        );
    }

    #[test]
    fn test_error_conversion() {
        let vfs_err = VfsError::LinkExists("save:".to_string());
        let content_err: ContentError = vfs_err.into();
        assert!(matches!(content_err, ContentError::Vfs(_)));

        let emu_err: EmulatorError = content_err.into();
        assert!(matches!(emu_err, EmulatorError::Content(_)));
    }
}
