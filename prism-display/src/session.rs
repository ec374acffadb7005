//! Session facade
//!
//! The process-wide entry point of the engine. Owns the settings engine
//! behind one mutex so that applies, reverts and background retries are
//! strictly serialized, runs crash recovery at startup, and restores the
//! display state when the host winds down.

use crate::adapter::DisplayAdapter;
use crate::audio::AudioSessionProvider;
use crate::config::{LaunchSession, VideoConfig};
use crate::error::ApplyResult;
use crate::persistence::JournalStore;
use crate::retry::RetryTimer;
use crate::settings::SettingsEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Manages the display state for the streaming host.
///
/// One instance exists per process, created during host startup and shared
/// via [`Arc`].
pub struct Session {
    settings: Arc<Mutex<SettingsEngine>>,
    timer: RetryTimer,
    adapter: Arc<dyn DisplayAdapter>,
}

impl Session {
    /// Creates the session. `journal_path` is where the original display
    /// settings are persisted between runs.
    pub fn new(
        adapter: Arc<dyn DisplayAdapter>,
        audio_provider: Arc<dyn AudioSessionProvider>,
        journal_path: impl Into<PathBuf>,
    ) -> Arc<Self> {
        let store = JournalStore::new(journal_path);
        let settings = Arc::new(Mutex::new(SettingsEngine::new(
            Arc::clone(&adapter),
            store,
            audio_provider,
        )));
        let timer = RetryTimer::spawn(Arc::clone(&settings));

        Arc::new(Self {
            settings,
            timer,
            adapter,
        })
    }

    /// Initializes the session: logs the available devices and reverts
    /// whatever a previous run may have left behind (crash recovery).
    ///
    /// The returned guard restores the display state on
    /// [`SessionGuard::shutdown`] when the session winds down.
    pub async fn init(self: &Arc<Self>) -> SessionGuard {
        let devices = self.adapter.enum_available_devices().await;
        if !devices.is_empty() {
            let summary: Vec<String> = devices
                .iter()
                .map(|(id, info)| format!("{id} ({})", info.friendly_name))
                .collect();
            info!(devices = ?summary, "available display devices");
        }

        self.restore_state().await;

        SessionGuard {
            session: Arc::clone(self),
            restored: false,
        }
    }

    /// Prepares the display device for a streaming session.
    ///
    /// On failure the partial changes are rolled back immediately; if that
    /// rollback fails too, the retry timer keeps at it in the background.
    pub async fn configure_display(
        &self,
        config: &VideoConfig,
        launch_session: &LaunchSession,
    ) -> ApplyResult {
        if !config.output_name.is_empty() {
            let display_name = self.adapter.display_name(&config.output_name).await;
            if !display_name.is_empty() {
                debug!(device_id = %config.output_name, display = %display_name, "configuring display device");
            }
        }

        let mut settings = self.settings.lock().await;
        let result = settings.apply_config(config, launch_session).await;

        let state_clean = match result {
            Ok(()) => true,
            Err(_) => settings.revert_settings().await,
        };
        if state_clean {
            self.timer.disarm(&mut settings);
        } else {
            self.timer.arm(&mut settings);
        }

        result
    }

    /// Tries to restore the previous display state.
    ///
    /// Never fails from the caller's perspective: what cannot be restored
    /// now (an unplugged display, for example) is retried in the background.
    pub async fn restore_state(&self) {
        let mut settings = self.settings.lock().await;
        if settings.revert_settings().await {
            self.timer.disarm(&mut settings);
        } else {
            warn!("failed to restore the display state, will retry in the background");
            self.timer.arm(&mut settings);
        }
    }

    /// Makes one last revert attempt, then unconditionally forgets all
    /// persistent state.
    pub async fn reset_persistence(&self) {
        let mut settings = self.settings.lock().await;
        self.timer.disarm(&mut settings);
        settings.reset_persistence().await;
    }
}

/// Restores the original display state when the session winds down.
///
/// The guard is held as long as the session may have display changes
/// outstanding. [`SessionGuard::shutdown`] restores the state and awaits
/// the result; dropping the guard without it does not revert (an async
/// restore cannot run inside `drop`), but nothing is lost: the journal
/// stays on disk and the next [`Session::init`] restores from it.
pub struct SessionGuard {
    session: Arc<Session>,
    restored: bool,
}

impl SessionGuard {
    /// Restores the display state and disarms the guard.
    pub async fn shutdown(mut self) {
        self.restored = true;
        self.session.restore_state().await;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.restored {
            warn!("session guard dropped without shutdown, display state will be restored on the next start");
        }
    }
}
