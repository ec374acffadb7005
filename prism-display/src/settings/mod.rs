//! The settings engine
//!
//! Applies a parsed plan to the display devices in a fixed stage order
//! (topology, primary display, display modes, HDR) and records the original
//! value of everything it touches in the journal, so the changes can be
//! reverted later, by this process or, after a crash, by the next one.

mod apply;
mod revert;
mod topology;

use crate::adapter::DisplayAdapter;
use crate::audio::{AudioSessionGuard, AudioSessionProvider};
use crate::config::{DevicePrep, LaunchSession, ParsedPlan, VideoConfig};
use crate::error::{ApplyError, ApplyResult};
use crate::persistence::{JournalStore, PersistentData};
use apply::{
    handle_display_mode_configuration, handle_hdr_state_configuration,
    handle_primary_display_configuration,
};
use revert::try_revert_settings;
use std::sync::Arc;
use tokio::time::Instant;
use topology::{plan_topology, PlannedTopology, TopologyPlan};
use tracing::{debug, error, info, warn};

/// Applies and reverts display device configurations.
///
/// Not synchronized on its own; the session facade serializes access behind
/// a single mutex. The retry timer deadline is kept here for the same
/// reason: everything the timer reads or writes sits under that one mutex.
pub struct SettingsEngine {
    adapter: Arc<dyn DisplayAdapter>,
    store: JournalStore,
    audio_provider: Arc<dyn AudioSessionProvider>,
    persistent_data: Option<PersistentData>,
    audio_session: Option<Box<dyn AudioSessionGuard>>,

    /// When the retry timer should attempt the next revert. `None` while
    /// the timer is disarmed.
    pub(crate) next_wake_up: Option<Instant>,
}

impl SettingsEngine {
    pub fn new(
        adapter: Arc<dyn DisplayAdapter>,
        store: JournalStore,
        audio_provider: Arc<dyn AudioSessionProvider>,
    ) -> Self {
        Self {
            adapter,
            store,
            audio_provider,
            persistent_data: None,
            audio_session: None,
            next_wake_up: None,
        }
    }

    /// Parses the configuration against the session parameters and tries to
    /// apply it.
    pub async fn apply_config(
        &mut self,
        config: &VideoConfig,
        session: &LaunchSession,
    ) -> ApplyResult {
        info!("applying configuration to the display device");
        let plan = match ParsedPlan::new(config, session) {
            Ok(plan) => plan,
            Err(err) => {
                error!(%err, "failed to parse the display device configuration");
                return Err(ApplyError::ConfigParse);
            }
        };

        let display_may_change = plan.device_prep == DevicePrep::EnsureOnlyDisplay;
        if display_may_change && self.audio_session.is_none() {
            // The current default audio device is likely to disappear
            // together with the displays, so the sink is captured up front
            // and held until the changes are reverted.
            debug!("capturing audio sink before changing the display");
            self.audio_session = Some(self.audio_provider.capture_sink());
        }

        let result = self.apply_plan(&plan).await;

        if result.is_ok() {
            if !display_may_change && self.audio_session.is_some() {
                debug!("releasing captured audio sink");
                self.audio_session = None;
            }
            info!("display device configuration applied");
        }

        result
    }

    async fn apply_plan(&mut self, plan: &ParsedPlan) -> ApplyResult {
        // The original settings serve as the base: either the journaled
        // ones from the first apply of this session, or the current ones.
        // New settings are overlaid on that base, so consecutive applies
        // never accumulate and anything no longer configured falls back to
        // its original on its own.
        let adapter = Arc::clone(&self.adapter);
        let previous_topology = self
            .persistent_data
            .as_ref()
            .map(|data| data.topology.clone());

        let planned =
            match plan_topology(adapter.as_ref(), plan, previous_topology.as_ref()).await? {
                TopologyPlan::Ready(planned) => planned,
                TopologyPlan::RevertRequired => {
                    let audio_was_captured = self.audio_session.is_some();
                    if !self.revert_settings().await {
                        return Err(ApplyError::Revert);
                    }
                    if audio_was_captured && self.audio_session.is_none() {
                        self.audio_session = Some(self.audio_provider.capture_sink());
                    }

                    match plan_topology(adapter.as_ref(), plan, None).await? {
                        TopologyPlan::Ready(planned) => planned,
                        // Not reachable without a journal; fail cleanly.
                        TopologyPlan::RevertRequired => return Err(ApplyError::Topology),
                    }
                }
            };

        let had_journal = self.persistent_data.is_some();
        let mut data = self.persistent_data.take().unwrap_or_else(|| PersistentData {
            topology: planned.topology_data.clone(),
            ..Default::default()
        });

        let stage_result =
            run_stages(adapter.as_ref(), &self.store, plan, &planned, &mut data).await;
        self.persistent_data = Some(data);

        // The journal is persisted (or, once empty, retired) on success and
        // on error alike.
        let persist_result = self.persist_journal(had_journal).await;
        stage_result.and(persist_result)
    }

    async fn persist_journal(&mut self, had_journal: bool) -> ApplyResult {
        let contains_modifications = self
            .persistent_data
            .as_ref()
            .is_some_and(|data| data.contains_modifications());

        if contains_modifications {
            if let Some(data) = self.persistent_data.as_ref() {
                if let Err(err) = self.store.save(data).await {
                    error!(%err, "failed to save the display settings journal");
                    return Err(ApplyError::FileSave);
                }
            }
            return Ok(());
        }

        if self.persistent_data.is_some() {
            if had_journal {
                // The previous journal has been fully absorbed; a revert
                // clears the remaining bookkeeping and removes the file.
                if !self.revert_settings().await {
                    return Err(ApplyError::Revert);
                }
            } else {
                self.persistent_data = None;
            }
        }

        Ok(())
    }

    /// Reverts the applied settings, from memory or from the journal file.
    /// Returns `true` when nothing is left to revert.
    pub async fn revert_settings(&mut self) -> bool {
        if self.persistent_data.is_none() {
            info!("loading persistent display device settings");
            self.persistent_data = self.store.load().await;
        }

        let Some(data) = self.persistent_data.as_mut() else {
            return true;
        };

        info!("reverting display device settings");
        let adapter = Arc::clone(&self.adapter);
        if !try_revert_settings(adapter.as_ref(), data).await {
            // Keep whatever could not be restored for the next attempt.
            if let Err(err) = self.store.save(data).await {
                warn!(%err, "failed to re-save the display settings journal");
            }
            error!("failed to revert display device settings");
            return false;
        }

        if let Err(err) = self.store.delete().await {
            warn!(%err, "failed to remove the display settings journal");
        }
        self.persistent_data = None;

        if self.audio_session.take().is_some() {
            debug!("releasing captured audio sink");
        }

        info!("display device configuration reset");
        true
    }

    /// Makes one last revert attempt, then drops all persistent state
    /// unconditionally.
    pub async fn reset_persistence(&mut self) {
        info!("purging persistent display device data (trying to revert settings one last time)");
        if !self.revert_settings().await {
            info!("failed to revert settings, proceeding to reset persistence");
        }

        if let Err(err) = self.store.delete().await {
            warn!(%err, "failed to remove the display settings journal");
        }
        self.persistent_data = None;
        self.audio_session = None;
    }
}

/// Runs the primary, mode and HDR stages in order, recording each stage's
/// original values in `data` and checkpointing the journal after every
/// successful stage, so that a crash mid-apply still leaves a revertable
/// journal on disk.
async fn run_stages(
    adapter: &dyn DisplayAdapter,
    store: &JournalStore,
    plan: &ParsedPlan,
    planned: &PlannedTopology,
    data: &mut PersistentData,
) -> ApplyResult {
    let metadata = &planned.metadata;
    checkpoint(store, data).await;

    let previous_primary_display = data.original_primary_display.clone();
    data.original_primary_display = handle_primary_display_configuration(
        adapter,
        plan.device_prep,
        &previous_primary_display,
        metadata,
    )
    .await?;
    checkpoint(store, data).await;

    let previous_modes = data.original_modes.clone();
    data.original_modes = handle_display_mode_configuration(
        adapter,
        plan.resolution,
        plan.refresh_rate,
        &previous_modes,
        metadata,
    )
    .await?;
    checkpoint(store, data).await;

    let previous_hdr_states = data.original_hdr_states.clone();
    data.original_hdr_states = handle_hdr_state_configuration(
        adapter,
        plan.change_hdr_state,
        &previous_hdr_states,
        metadata,
    )
    .await?;

    Ok(())
}

/// Best-effort journal write between stages; the authoritative save (with
/// error mapping) happens when the apply finishes.
async fn checkpoint(store: &JournalStore, data: &PersistentData) {
    if !data.contains_modifications() {
        return;
    }

    if let Err(err) = store.save(data).await {
        warn!(%err, "failed to checkpoint the display settings journal");
    }
}
