//! Host execution context
//!
//! What the host reports about the signed-in user and the currently
//! running title. The content manager reads this when resolving storage
//! paths and stamping headers for freshly created packages.

use ox_vfs::container::ExecutionInfo;
use parking_lot::RwLock;

/// Snapshot of the running title and signed-in user.
#[derive(Debug, Clone, Default)]
pub struct TitleState {
    pub title_id: u32,
    pub title_name: String,
    pub execution_info: ExecutionInfo,
    /// Icon extracted from the title's embedded resource table, if any.
    pub icon: Option<Vec<u8>>,
    /// Gamertag of the signed-in profile.
    pub user_name: String,
}

/// Shared view of the running title, updated by the host on title boot.
#[derive(Default)]
pub struct TitleContext {
    inner: RwLock<TitleState>,
}

impl TitleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot on title boot.
    pub fn set_title(&self, state: TitleState) {
        tracing::info!(
            "Active title is now {:08X} ({})",
            state.title_id,
            state.title_name
        );
        *self.inner.write() = state;
    }

    pub fn set_user_name(&self, user_name: impl Into<String>) {
        self.inner.write().user_name = user_name.into();
    }

    pub fn title_id(&self) -> u32 {
        self.inner.read().title_id
    }

    pub fn title_name(&self) -> String {
        self.inner.read().title_name.clone()
    }

    pub fn execution_info(&self) -> ExecutionInfo {
        self.inner.read().execution_info
    }

    pub fn icon(&self) -> Option<Vec<u8>> {
        self.inner.read().icon.clone()
    }

    pub fn user_name(&self) -> String {
        self.inner.read().user_name.clone()
    }
}
