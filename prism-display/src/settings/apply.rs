//! Stage handlers for applying a parsed plan
//!
//! Each handler overlays the plan onto the "original" values (the journaled
//! ones when a previous apply recorded them, the current ones otherwise) and
//! returns what must be journaled for the revert. Applying repeatedly
//! therefore never accumulates state: settings that are no longer
//! configured fall back to their originals.

use crate::adapter::DisplayAdapter;
use crate::config::DevicePrep;
use crate::error::ApplyError;
use crate::settings::topology::TopologyMetadata;
use crate::topology::device_ids;
use crate::types::{DeviceId, DeviceModeMap, HdrState, HdrStateMap, RefreshRate, Resolution};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info};

/// Settle time before newly enabled displays accept their real HDR state.
const HDR_BLANK_DELAY: Duration = Duration::from_millis(1500);

async fn current_primary_display(
    adapter: &dyn DisplayAdapter,
    metadata: &TopologyMetadata,
) -> DeviceId {
    for group in &metadata.current_topology {
        for device_id in group {
            if adapter.is_primary(device_id).await {
                return device_id.clone();
            }
        }
    }

    DeviceId::new()
}

fn determine_new_primary_display(
    original_primary_display: &str,
    metadata: &TopologyMetadata,
) -> DeviceId {
    if metadata.primary_device_requested {
        // No device was specified, so the original primary display keeps
        // its role.
        return original_primary_display.to_string();
    }

    // Promoting one device of a mirror group promotes the whole group.
    metadata.duplicated_devices[0].clone()
}

/// Primary stage. Returns the primary display to be journaled: the original
/// one while a change is outstanding, empty otherwise.
pub(crate) async fn handle_primary_display_configuration(
    adapter: &dyn DisplayAdapter,
    device_prep: DevicePrep,
    previous_primary_display: &str,
    metadata: &TopologyMetadata,
) -> Result<DeviceId, ApplyError> {
    if device_prep == DevicePrep::EnsurePrimary {
        let original_primary_display = if previous_primary_display.is_empty() {
            current_primary_display(adapter, metadata).await
        } else {
            previous_primary_display.to_string()
        };
        let new_primary_display = determine_new_primary_display(&original_primary_display, metadata);

        debug!(device_id = %new_primary_display, "changing primary display");
        if !adapter.set_as_primary(&new_primary_display).await {
            error!("failed to change primary display");
            return Err(ApplyError::PrimaryDisplay);
        }

        return Ok(original_primary_display);
    }

    if !previous_primary_display.is_empty() {
        debug!(device_id = %previous_primary_display, "changing primary display back");
        if !adapter.set_as_primary(previous_primary_display).await {
            error!("failed to restore primary display");
            return Err(ApplyError::PrimaryDisplay);
        }
    }

    Ok(DeviceId::new())
}

fn determine_new_display_modes(
    resolution: Option<Resolution>,
    refresh_rate: Option<RefreshRate>,
    original_display_modes: &DeviceModeMap,
    metadata: &TopologyMetadata,
) -> DeviceModeMap {
    let mut new_modes = original_display_modes.clone();

    if let Some(resolution) = resolution {
        // Devices in a mirror group share a framebuffer source; their
        // resolutions must match no matter what.
        for device_id in &metadata.duplicated_devices {
            new_modes.entry(device_id.clone()).or_default().resolution = resolution;
        }
    }

    if let Some(refresh_rate) = refresh_rate {
        if metadata.primary_device_requested {
            // No specific device was requested, so the whole primary mirror
            // group gets the new refresh rate.
            for device_id in &metadata.duplicated_devices {
                new_modes.entry(device_id.clone()).or_default().refresh_rate = refresh_rate;
            }
        } else {
            // Mirror siblings may support different refresh rates, so only
            // the requested device is touched.
            new_modes
                .entry(metadata.duplicated_devices[0].clone())
                .or_default()
                .refresh_rate = refresh_rate;
        }
    }

    new_modes
}

fn all_modes_match(requested: &DeviceModeMap, current: &DeviceModeMap) -> bool {
    requested.iter().all(|(device_id, requested_mode)| {
        current
            .get(device_id)
            .is_some_and(|mode| mode.fuzzy_eq(requested_mode))
    })
}

/// Sets the modes and verifies that the OS honored them (within the fuzzy
/// refresh-rate tolerance).
///
/// The first attempt lets the OS adjust the request, which fails for custom
/// modes configured outside the standard lists; those are retried without
/// the adjustment flag. When neither attempt verifies, the pre-apply modes
/// are restored on a best-effort basis.
pub(crate) async fn set_modes_validated(
    adapter: &dyn DisplayAdapter,
    modes: &DeviceModeMap,
    device_ids: &HashSet<DeviceId>,
) -> bool {
    let pre_apply_modes = adapter.current_display_modes(device_ids).await;
    if pre_apply_modes.is_empty() {
        error!("failed to get current display modes");
        return false;
    }

    if !adapter.set_display_modes(modes, true).await {
        error!("failed to set display modes");
        return false;
    }

    let current_modes = adapter.current_display_modes(device_ids).await;
    if !current_modes.is_empty() {
        if all_modes_match(modes, &current_modes) {
            return true;
        }

        info!("failed to change display modes using OS recommended modes, trying to set modes more strictly");
        if adapter.set_display_modes(modes, false).await {
            let current_modes = adapter.current_display_modes(device_ids).await;
            if !current_modes.is_empty() && all_modes_match(modes, &current_modes) {
                return true;
            }
        }
    }

    // Both attempts came up short; try to undo whatever was changed.
    adapter.set_display_modes(&pre_apply_modes, true).await;
    error!("failed to set display modes completely");
    false
}

/// Mode stage. Returns the modes to be journaled: the originals while a
/// change is outstanding, empty otherwise.
pub(crate) async fn handle_display_mode_configuration(
    adapter: &dyn DisplayAdapter,
    resolution: Option<Resolution>,
    refresh_rate: Option<RefreshRate>,
    previous_display_modes: &DeviceModeMap,
    metadata: &TopologyMetadata,
) -> Result<DeviceModeMap, ApplyError> {
    let ids = device_ids(&metadata.current_topology);

    if resolution.is_some() || refresh_rate.is_some() {
        let original_display_modes = if previous_display_modes.is_empty() {
            let current_modes = adapter.current_display_modes(&ids).await;
            if current_modes.is_empty() {
                error!("failed to get current display modes");
                return Err(ApplyError::Modes);
            }
            current_modes
        } else {
            previous_display_modes.clone()
        };

        let new_display_modes =
            determine_new_display_modes(resolution, refresh_rate, &original_display_modes, metadata);

        debug!(modes = ?new_display_modes, "changing display modes");
        if !set_modes_validated(adapter, &new_display_modes, &ids).await {
            return Err(ApplyError::Modes);
        }

        return Ok(original_display_modes);
    }

    if !previous_display_modes.is_empty() {
        debug!(modes = ?previous_display_modes, "changing display modes back");
        if !set_modes_validated(adapter, previous_display_modes, &ids).await {
            return Err(ApplyError::Modes);
        }
    }

    Ok(DeviceModeMap::new())
}

/// Toggles the HDR state of newly enabled devices to the opposite of their
/// target state, waits out the settle delay, and leaves the final states to
/// the caller.
///
/// Some newly enabled displays (virtual HDR displays in particular) come up
/// with blown-out colors; toggling HDR once they have settled clears it up.
pub(crate) async fn blank_hdr_states(
    adapter: &dyn DisplayAdapter,
    states: &HdrStateMap,
    newly_enabled_devices: &HashSet<DeviceId>,
) -> bool {
    let mut toggled_states = states.clone();
    let mut state_changed = false;

    for device_id in newly_enabled_devices {
        if let Some(state) = toggled_states.get_mut(device_id) {
            match state {
                HdrState::Enabled => {
                    *state = HdrState::Disabled;
                    state_changed = true;
                }
                HdrState::Disabled => {
                    *state = HdrState::Enabled;
                    state_changed = true;
                }
                HdrState::Unknown => {}
            }
        }
    }

    if state_changed {
        debug!(
            delay_ms = HDR_BLANK_DELAY.as_millis() as u64,
            "toggling HDR states for newly enabled devices before applying the final states"
        );
        if !adapter.set_hdr_states(&toggled_states).await {
            return false;
        }

        tokio::time::sleep(HDR_BLANK_DELAY).await;
    }

    true
}

fn determine_new_hdr_states(
    change_hdr_state: Option<bool>,
    original_hdr_states: &HdrStateMap,
    metadata: &TopologyMetadata,
) -> HdrStateMap {
    let mut new_states = original_hdr_states.clone();

    if let Some(enable) = change_hdr_state {
        let end_state = if enable {
            HdrState::Enabled
        } else {
            HdrState::Disabled
        };

        let mut try_update = |device_id: &DeviceId| {
            if let Some(state) = new_states.get_mut(device_id) {
                if *state != HdrState::Unknown {
                    *state = end_state;
                }
            }
        };

        if metadata.primary_device_requested {
            // All the duplicated devices are primary displays; the state
            // change applies to every one of them.
            for device_id in &metadata.duplicated_devices {
                try_update(device_id);
            }
        } else {
            // Mirror siblings may differ in HDR support, so only the
            // requested device is touched.
            try_update(&metadata.duplicated_devices[0]);
        }
    }

    new_states
}

/// HDR stage. Returns the states to be journaled: the originals while a
/// change is outstanding, empty otherwise.
pub(crate) async fn handle_hdr_state_configuration(
    adapter: &dyn DisplayAdapter,
    change_hdr_state: Option<bool>,
    previous_hdr_states: &HdrStateMap,
    metadata: &TopologyMetadata,
) -> Result<HdrStateMap, ApplyError> {
    let ids = device_ids(&metadata.current_topology);

    if change_hdr_state.is_some() {
        let original_hdr_states = if previous_hdr_states.is_empty() {
            let current_states = adapter.current_hdr_states(&ids).await;
            if current_states.is_empty() {
                error!("failed to get current HDR states");
                return Err(ApplyError::HdrStates);
            }
            current_states
        } else {
            previous_hdr_states.clone()
        };

        let new_hdr_states =
            determine_new_hdr_states(change_hdr_state, &original_hdr_states, metadata);

        debug!(states = ?new_hdr_states, "changing HDR states");
        if !blank_hdr_states(adapter, &new_hdr_states, &metadata.newly_enabled_devices).await
            || !adapter.set_hdr_states(&new_hdr_states).await
        {
            error!("failed to change HDR states");
            return Err(ApplyError::HdrStates);
        }

        return Ok(original_hdr_states);
    }

    if !previous_hdr_states.is_empty() {
        debug!(states = ?previous_hdr_states, "changing HDR states back");
        if !blank_hdr_states(adapter, previous_hdr_states, &metadata.newly_enabled_devices).await
            || !adapter.set_hdr_states(previous_hdr_states).await
        {
            error!("failed to restore HDR states");
            return Err(ApplyError::HdrStates);
        }
    }

    Ok(HdrStateMap::new())
}
