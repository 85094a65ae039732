//! User profile and achievement record store
//!
//! One `UserProfile` owns the signed-in user's settings, the dashboard
//! aggregate record, and every loaded per-title GPD. All mutation happens
//! under a single lock held for the duration of each operation.

use crate::gpd::{
    Achievement, Entry, GpdFile, GpdNamespace, TitlePlayed, DASHBOARD_TITLE_ID, TITLE_INFO_ID,
};
use crate::settings::{setting_id, Setting, SettingStore};
use crate::spa::SpaData;
use ox_core::error::ProfileError;
use ox_core::text;
use ox_core::time::host_system_time;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const DEFAULT_XUID: u64 = 0xBABE_BABE_BABE_BABE;

/// A signed-in user profile.
pub struct UserProfile {
    xuid: u64,
    gamertag: String,
    profile_dir: PathBuf,
    inner: Mutex<ProfileState>,
}

struct ProfileState {
    settings: SettingStore,
    dash_gpd: GpdFile,
    title_gpds: HashMap<u32, GpdFile>,
    /// Title targeted by unlock calls; an id plus a table lookup, never a
    /// held reference.
    current_title_id: Option<u32>,
}

impl UserProfile {
    /// Construct the profile, seed its default settings, and eagerly load
    /// any GPD records found in `profile_dir`.
    pub fn new(profile_dir: impl Into<PathBuf>, gamertag: impl Into<String>) -> Self {
        let profile_dir = profile_dir.into();

        let mut state = ProfileState {
            settings: SettingStore::new(),
            dash_gpd: GpdFile::new(),
            title_gpds: HashMap::new(),
            current_title_id: None,
        };
        seed_default_settings(&mut state.settings);
        load_gpd_files(&mut state, &profile_dir);

        Self {
            xuid: DEFAULT_XUID,
            gamertag: gamertag.into(),
            profile_dir,
            inner: Mutex::new(state),
        }
    }

    pub fn xuid(&self) -> u64 {
        self.xuid
    }

    pub fn gamertag(&self) -> &str {
        &self.gamertag
    }

    /// Reconcile a booting title's achievement definitions against the
    /// persisted records, creating them on first encounter, and make the
    /// title current for subsequent unlock calls.
    pub fn set_title_spa_data(&self, spa: &SpaData) -> Result<(), ProfileError> {
        let mut guard = self.inner.lock();
        let ProfileState {
            dash_gpd,
            title_gpds,
            current_title_id,
            ..
        } = &mut *guard;

        let spa_title = spa.title_id;

        if let Some(title_gpd) = title_gpds.get_mut(&spa_title) {
            info!("Loaded existing GPD for title {:08X}", spa_title);

            let mut always_update_title = false;
            let mut title_info = match dash_gpd.title(spa_title) {
                Some(title_info) => title_info,
                None => {
                    // A per-title GPD without a dashboard record is an
                    // invariant violation; synthesize one and keep going.
                    error!(
                        "GPD for title {:08X} exists but the dashboard has no record for it, \
                         synthesizing one",
                        spa_title
                    );
                    always_update_title = true;
                    TitlePlayed {
                        title_id: spa_title,
                        title_name: spa.title_name.clone(),
                        ..Default::default()
                    }
                }
            };
            title_info.last_played = host_system_time();

            // Pick up achievements the persisted record is missing
            // (added in title updates etc.)
            let mut ach_updated = false;
            for definition in &spa.achievements {
                let ach_exists = title_gpd.achievement(definition.id).is_some();
                if ach_exists && !always_update_title {
                    continue;
                }

                title_info.achievements_possible += 1;
                title_info.gamerscore_total += definition.gamerscore;

                if !ach_exists {
                    debug!(
                        "Adding achievement {} ({}) missing from the persisted record",
                        definition.id, definition.label
                    );
                    ach_updated = true;
                    title_gpd.update_achievement(definition);
                }
            }

            dash_gpd.update_title(&title_info);

            // Only rewrite the per-title record if achievements changed;
            // the dashboard always changes (last played).
            if ach_updated {
                update_gpd_inner(&self.profile_dir, dash_gpd, spa_title, title_gpd)?;
            }
            write_gpd_file(&self.profile_dir, DASHBOARD_TITLE_ID, dash_gpd)?;
        } else {
            info!("Creating new GPD for title {:08X}", spa_title);

            let mut title_info = TitlePlayed {
                title_id: spa_title,
                title_name: spa.title_name.clone(),
                last_played: host_system_time(),
                ..Default::default()
            };

            let mut title_gpd = GpdFile::new();
            for definition in &spa.achievements {
                title_gpd.update_achievement(definition);
                title_info.achievements_possible += 1;
                title_info.gamerscore_total += definition.gamerscore;
            }

            // Best-effort copies of achievement art and the title's own
            // icon and name.
            for definition in &spa.achievements {
                if let Some(image) = spa.image(u64::from(definition.image_id)) {
                    title_gpd.update_entry(Entry {
                        namespace: GpdNamespace::Image as u16,
                        id: u64::from(definition.image_id),
                        data: image.to_vec(),
                    });
                }
            }
            if let Some(icon) = spa.image(TITLE_INFO_ID) {
                title_gpd.update_entry(Entry {
                    namespace: GpdNamespace::Image as u16,
                    id: TITLE_INFO_ID,
                    data: icon.to_vec(),
                });
            }
            if !spa.title_name.is_empty() {
                title_gpd.update_entry(Entry {
                    namespace: GpdNamespace::String as u16,
                    id: TITLE_INFO_ID,
                    data: text::encode_utf16_nul(&spa.title_name),
                });
            }

            dash_gpd.update_title(&title_info);

            let title_gpd = title_gpds.entry(spa_title).or_insert(title_gpd);
            update_gpd_inner(&self.profile_dir, dash_gpd, spa_title, title_gpd)?;
            write_gpd_file(&self.profile_dir, DASHBOARD_TITLE_ID, dash_gpd)?;
        }

        *current_title_id = Some(spa_title);

        if let Some(title_gpd) = title_gpds.get(&spa_title) {
            for record in title_gpd.achievements() {
                debug!(
                    "{} - {} - {} GS - {}",
                    record.id,
                    record.label,
                    record.gamerscore,
                    if record.is_unlocked() { "unlocked" } else { "locked" }
                );
            }
            if let Some(title_info) = dash_gpd.title(spa_title) {
                info!(
                    "Title {:08X}: {}/{} achievements unlocked, {}/{} gamerscore",
                    spa_title,
                    title_info.achievements_earned,
                    title_info.achievements_possible,
                    title_info.gamerscore_earned,
                    title_info.gamerscore_total
                );
            }
        }

        Ok(())
    }

    /// Persist one title's record. For non-dashboard titles the dashboard
    /// totals are recomputed and the dashboard is rewritten only when a
    /// total actually changed.
    pub fn update_gpd(&self, title_id: u32) -> Result<(), ProfileError> {
        let mut guard = self.inner.lock();
        let ProfileState {
            dash_gpd,
            title_gpds,
            ..
        } = &mut *guard;

        if title_id == DASHBOARD_TITLE_ID {
            return write_gpd_file(&self.profile_dir, DASHBOARD_TITLE_ID, dash_gpd);
        }

        let title_gpd = title_gpds
            .get(&title_id)
            .ok_or(ProfileError::UnknownTitle(title_id))?;
        update_gpd_inner(&self.profile_dir, dash_gpd, title_id, title_gpd)
    }

    /// Persist the current title's record.
    pub fn update_title_gpd(&self) -> Result<(), ProfileError> {
        let mut guard = self.inner.lock();
        let title_id = guard.current_title_id.ok_or(ProfileError::NoCurrentTitle)?;
        let ProfileState {
            dash_gpd,
            title_gpds,
            ..
        } = &mut *guard;

        let title_gpd = title_gpds
            .get(&title_id)
            .ok_or(ProfileError::UnknownTitle(title_id))?;
        update_gpd_inner(&self.profile_dir, dash_gpd, title_id, title_gpd)?;

        debug!("Updated title {:08X} GPD", title_id);
        Ok(())
    }

    /// Persist every loaded record. Failures are logged per title and do
    /// not stop the sweep.
    pub fn update_all_gpds(&self) -> Result<(), ProfileError> {
        let mut guard = self.inner.lock();
        let ProfileState {
            dash_gpd,
            title_gpds,
            ..
        } = &mut *guard;

        for (&title_id, title_gpd) in title_gpds.iter() {
            if let Err(e) = update_gpd_inner(&self.profile_dir, dash_gpd, title_id, title_gpd) {
                error!("Failed to update GPD for title {:08X}: {}", title_id, e);
            }
        }

        Ok(())
    }

    /// Unlock an achievement on the current title and persist the change.
    /// Unlocking an already-unlocked achievement is a no-op.
    pub fn unlock_achievement(&self, ach_id: u32) -> Result<Achievement, ProfileError> {
        let mut guard = self.inner.lock();
        let title_id = guard.current_title_id.ok_or(ProfileError::NoCurrentTitle)?;
        let ProfileState {
            dash_gpd,
            title_gpds,
            ..
        } = &mut *guard;

        let title_gpd = title_gpds
            .get_mut(&title_id)
            .ok_or(ProfileError::UnknownTitle(title_id))?;
        let mut record = title_gpd
            .achievement(ach_id)
            .ok_or(ProfileError::UnknownAchievement { title_id, ach_id })?;

        if record.is_unlocked() {
            return Ok(record);
        }

        record.unlock(host_system_time());
        title_gpd.update_achievement(&record);
        update_gpd_inner(&self.profile_dir, dash_gpd, title_id, title_gpd)?;

        info!(
            "Unlocked achievement {} ({}) on title {:08X}, {} GS",
            record.id, record.label, title_id, record.gamerscore
        );
        Ok(record)
    }

    /// Insert or replace a setting, preserving enumeration order on
    /// replacement.
    pub fn add_setting(&self, setting: Setting) {
        self.inner.lock().settings.add(setting);
    }

    /// Look up a setting by id.
    pub fn get_setting(&self, setting_id: u32) -> Option<Setting> {
        self.inner.lock().settings.get(setting_id).cloned()
    }

    /// Settings in enumeration order.
    pub fn settings(&self) -> Vec<Setting> {
        self.inner.lock().settings.iter().cloned().collect()
    }

    /// Title-played records from the dashboard aggregate.
    pub fn titles_played(&self) -> Vec<TitlePlayed> {
        self.inner.lock().dash_gpd.titles()
    }

    /// Achievement records of one loaded title.
    pub fn achievements(&self, title_id: u32) -> Vec<Achievement> {
        self.inner
            .lock()
            .title_gpds
            .get(&title_id)
            .map(|gpd| gpd.achievements())
            .unwrap_or_default()
    }

    pub fn current_title_id(&self) -> Option<u32> {
        self.inner.lock().current_title_id
    }
}

fn gpd_file_name(title_id: u32) -> String {
    format!("{:08X}.gpd", title_id)
}

/// Serialize a record and write it out. The byte form is computed in full
/// before the file is touched.
fn write_gpd_file(profile_dir: &Path, title_id: u32, gpd: &GpdFile) -> Result<(), ProfileError> {
    let bytes = gpd.serialize()?;

    if !profile_dir.exists() {
        std::fs::create_dir_all(profile_dir)?;
    }

    let path = profile_dir.join(gpd_file_name(title_id));
    std::fs::write(&path, &bytes)?;

    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Persist one title's record; when its achievement totals no longer match
/// the dashboard's cached record, update and persist the dashboard too.
fn update_gpd_inner(
    profile_dir: &Path,
    dash_gpd: &mut GpdFile,
    title_id: u32,
    gpd: &GpdFile,
) -> Result<(), ProfileError> {
    write_gpd_file(profile_dir, title_id, gpd)?;

    if title_id == DASHBOARD_TITLE_ID {
        return Ok(());
    }

    let mut title_info = match dash_gpd.title(title_id) {
        Some(title_info) => title_info,
        None => return Ok(()),
    };

    let mut possible = 0u32;
    let mut earned = 0u32;
    let mut gamerscore_total = 0u32;
    let mut gamerscore_earned = 0u32;
    for record in gpd.achievements() {
        possible += 1;
        gamerscore_total += record.gamerscore;
        if record.is_unlocked() {
            earned += 1;
            gamerscore_earned += record.gamerscore;
        }
    }

    let changed = possible != title_info.achievements_possible
        || earned != title_info.achievements_earned
        || gamerscore_total != title_info.gamerscore_total
        || gamerscore_earned != title_info.gamerscore_earned;
    if changed {
        title_info.achievements_possible = possible;
        title_info.achievements_earned = earned;
        title_info.gamerscore_total = gamerscore_total;
        title_info.gamerscore_earned = gamerscore_earned;

        dash_gpd.update_title(&title_info);
        write_gpd_file(profile_dir, DASHBOARD_TITLE_ID, dash_gpd)?;
    }

    Ok(())
}

/// Load the dashboard record and every per-title record it lists. Missing
/// or unreadable files are logged and skipped.
fn load_gpd_files(state: &mut ProfileState, profile_dir: &Path) {
    info!("Loading profile GPDs from {}", profile_dir.display());

    let dash_path = profile_dir.join(gpd_file_name(DASHBOARD_TITLE_ID));
    let bytes = match std::fs::read(&dash_path) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(
                "No dashboard GPD at {}, starting with a blank one",
                dash_path.display()
            );
            return;
        }
    };

    match GpdFile::read(&bytes) {
        Ok(gpd) => state.dash_gpd = gpd,
        Err(e) => {
            error!("Failed to read dashboard GPD: {}", e);
            return;
        }
    }

    for title in state.dash_gpd.titles() {
        let path = profile_dir.join(gpd_file_name(title.title_id));
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    "Failed to open GPD for title {:08X} ({}): {}",
                    title.title_id, title.title_name, e
                );
                continue;
            }
        };

        match GpdFile::read(&bytes) {
            Ok(gpd) => {
                state.title_gpds.insert(title.title_id, gpd);
            }
            Err(e) => {
                error!(
                    "Failed to read GPD for title {:08X} ({}): {}",
                    title.title_id, title.title_name, e
                );
            }
        }
    }

    info!("Loaded {} profile GPDs", state.title_gpds.len() + 1);
}

fn seed_default_settings(settings: &mut SettingStore) {
    settings.add(Setting::int32(setting_id::GAMER_YAXIS_INVERSION, 0));
    settings.add(Setting::int32(setting_id::OPTION_CONTROLLER_VIBRATION, 3));
    settings.add(Setting::int32(setting_id::GAMERCARD_ZONE, 0));
    settings.add(Setting::int32(setting_id::GAMERCARD_REGION, 0));
    settings.add(Setting::int32(setting_id::GAMERCARD_CRED, 0xFA));
    settings.add(Setting::float(setting_id::GAMERCARD_REP, 0.0));
    settings.add(Setting::int32(setting_id::OPTION_VOICE_MUTED, 0));
    settings.add(Setting::int32(setting_id::OPTION_VOICE_THRU_SPEAKERS, 0));
    settings.add(Setting::int32(setting_id::OPTION_VOICE_VOLUME, 0x64));
    settings.add(Setting::unicode(setting_id::GAMERCARD_MOTTO, ""));
    settings.add(Setting::int32(setting_id::GAMERCARD_TITLES_PLAYED, 1));
    settings.add(Setting::int32(setting_id::GAMERCARD_ACHIEVEMENTS_EARNED, 0));
    settings.add(Setting::int32(setting_id::GAMER_DIFFICULTY, 0));
    settings.add(Setting::int32(setting_id::GAMER_CONTROL_SENSITIVITY, 0));
    settings.add(Setting::int32(setting_id::GAMER_PREFERRED_COLOR_FIRST, 0xFFFF_0000));
    settings.add(Setting::int32(setting_id::GAMER_PREFERRED_COLOR_SECOND, 0xFF00_FF00));
    settings.add(Setting::int32(setting_id::GAMER_ACTION_AUTO_AIM, 1));
    settings.add(Setting::int32(setting_id::GAMER_ACTION_AUTO_CENTER, 0));
    settings.add(Setting::int32(setting_id::GAMER_ACTION_MOVEMENT_CONTROL, 0));
    settings.add(Setting::int32(setting_id::GAMER_RACE_TRANSMISSION, 0));
    settings.add(Setting::int32(setting_id::GAMER_RACE_CAMERA_LOCATION, 0));
    settings.add(Setting::int32(setting_id::GAMER_RACE_BRAKE_CONTROL, 0));
    settings.add(Setting::int32(setting_id::GAMER_RACE_ACCELERATOR_CONTROL, 0));
    settings.add(Setting::int32(setting_id::GAMERCARD_TITLE_CRED_EARNED, 0));
    settings.add(Setting::int32(
        setting_id::GAMERCARD_TITLE_ACHIEVEMENTS_EARNED,
        0,
    ));

    // Titles ask for the picture key once one is present.
    settings.add(Setting::unicode(
        setting_id::GAMERCARD_PICTURE_KEY,
        "gamercard_picture_key",
    ));

    settings.add(Setting::binary(setting_id::TITLE_SPECIFIC1));
    settings.add(Setting::binary(setting_id::TITLE_SPECIFIC2));
    settings.add(Setting::binary(setting_id::TITLE_SPECIFIC3));
}
