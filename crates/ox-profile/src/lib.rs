//! User profile and achievement storage for oxide-360
//!
//! Maintains the per-user database of title-played records and per-title
//! achievement records, reconciling the achievement definitions a title
//! ships against the locally persisted records, and keeping the
//! cross-title dashboard aggregate consistent.

pub mod gpd;
pub mod profile;
pub mod settings;
pub mod spa;

pub use gpd::{
    Achievement, AchievementFlags, Entry, GpdFile, GpdNamespace, TitlePlayed, DASHBOARD_TITLE_ID,
};
pub use profile::UserProfile;
pub use settings::{Setting, SettingStore, SettingValue};
pub use spa::SpaData;
