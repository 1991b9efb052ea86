//! Runtime-mutable preferences

use std::sync::atomic::{AtomicBool, Ordering};

use crate::Preferences;

/// Preferences held in atomics, seeded at startup and toggled at runtime
#[derive(Debug)]
pub struct AtomicPreferences {
    show_cancelled: AtomicBool,
    notifications_enabled: AtomicBool,
}

impl AtomicPreferences {
    pub fn new(show_cancelled: bool, notifications_enabled: bool) -> Self {
        Self {
            show_cancelled: AtomicBool::new(show_cancelled),
            notifications_enabled: AtomicBool::new(notifications_enabled),
        }
    }

    pub fn set_show_cancelled(&self, value: bool) {
        self.show_cancelled.store(value, Ordering::SeqCst);
    }

    /// Returns the previous value
    pub fn set_notifications_enabled(&self, value: bool) -> bool {
        self.notifications_enabled.swap(value, Ordering::SeqCst)
    }
}

impl Default for AtomicPreferences {
    fn default() -> Self {
        Self::new(false, true)
    }
}

impl Preferences for AtomicPreferences {
    fn show_cancelled(&self) -> bool {
        self.show_cancelled.load(Ordering::SeqCst)
    }

    fn notifications_enabled(&self) -> bool {
        self.notifications_enabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_toggle() {
        let prefs = AtomicPreferences::default();
        assert!(!prefs.show_cancelled());
        assert!(prefs.notifications_enabled());

        assert!(prefs.set_notifications_enabled(false));
        assert!(!prefs.notifications_enabled());
        assert!(!prefs.set_notifications_enabled(true));

        prefs.set_show_cancelled(true);
        assert!(prefs.show_cancelled());
    }
}
