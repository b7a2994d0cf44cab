//! The boundary to the user's persisted settings.
//!
//! The monitor only ever reads a fresh `Settings` snapshot at the start of each
//! tick. Writes come from the user through the presentation layer.

use crate::calendar::Settings;
use crate::common::CalendarId;
use crate::error::Result;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

pub trait SettingsStore: Send + Sync {
    fn settings(&self) -> Settings;

    fn set_skip_without_location(&self, skip: bool);

    fn set_selected_calendars(&self, ids: HashSet<CalendarId>);

    /// Adds `id` to the selection, or removes it if already selected.
    /// Returns whether the calendar is selected afterwards.
    fn toggle_calendar(&self, id: &CalendarId) -> bool;

    /// Records the preference and registers or unregisters the login item.
    /// A registration failure is logged and otherwise ignored.
    fn set_open_at_login(&self, enabled: bool);
}

/// Registers the application to start at login.
pub trait LoginItems: Send + Sync {
    fn set_enabled(&self, enabled: bool) -> Result<()>;
}

/// Login-item registration for platforms without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoginItems;

impl LoginItems for NoLoginItems {
    fn set_enabled(&self, enabled: bool) -> Result<()> {
        info!("Login item registration not supported here (requested: {}).", enabled);
        Ok(())
    }
}

/// Settings kept in memory for the lifetime of the process.
pub struct MemorySettingsStore {
    settings: RwLock<Settings>,
    login_items: Arc<dyn LoginItems>,
}

impl MemorySettingsStore {
    pub fn new(initial: Settings) -> Self {
        Self::with_login_items(initial, Arc::new(NoLoginItems))
    }

    pub fn with_login_items(initial: Settings, login_items: Arc<dyn LoginItems>) -> Self {
        Self {
            settings: RwLock::new(initial),
            login_items,
        }
    }

    fn update(&self, change: impl FnOnce(&mut Settings)) {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        change(&mut settings);
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_skip_without_location(&self, skip: bool) {
        self.update(|s| s.skip_events_without_location_or_link = skip);
    }

    fn set_selected_calendars(&self, ids: HashSet<CalendarId>) {
        self.update(|s| s.selected_calendar_ids = ids);
    }

    fn toggle_calendar(&self, id: &CalendarId) -> bool {
        let mut selected = false;
        self.update(|s| {
            if !s.selected_calendar_ids.remove(id) {
                s.selected_calendar_ids.insert(id.clone());
                selected = true;
            }
        });
        selected
    }

    fn set_open_at_login(&self, enabled: bool) {
        self.update(|s| s.open_at_login = enabled);
        if let Err(e) = self.login_items.set_enabled(enabled) {
            warn!("Failed to update login item: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HyperalertError;

    struct BrokenLoginItems;

    impl LoginItems for BrokenLoginItems {
        fn set_enabled(&self, _enabled: bool) -> Result<()> {
            Err(HyperalertError::LoginItem("service unavailable".to_string()))
        }
    }

    #[test]
    fn toggle_adds_then_removes() {
        let store = MemorySettingsStore::default();
        let work = CalendarId::from("work");
        assert!(store.toggle_calendar(&work));
        assert!(store.settings().selected_calendar_ids.contains(&work));
        assert!(!store.toggle_calendar(&work));
        assert!(store.settings().selected_calendar_ids.is_empty());
    }

    #[test]
    fn snapshots_do_not_see_later_writes() {
        let store = MemorySettingsStore::default();
        let before = store.settings();
        store.set_skip_without_location(true);
        assert!(!before.skip_events_without_location_or_link);
        assert!(store.settings().skip_events_without_location_or_link);
    }

    #[test]
    fn login_item_failure_is_not_fatal() {
        let store = MemorySettingsStore::with_login_items(
            Settings::default(),
            Arc::new(BrokenLoginItems),
        );
        store.set_open_at_login(true);
        assert!(store.settings().open_at_login);
    }
}
