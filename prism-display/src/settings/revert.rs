//! Reverting journaled display changes
//!
//! The OS persists modes, primary and HDR settings keyed by the active
//! topology. Undoing them therefore means re-entering the topology they
//! were captured under, restoring in reverse apply order, and only then
//! returning to the initial topology.

use crate::adapter::DisplayAdapter;
use crate::persistence::PersistentData;
use crate::settings::apply::{blank_hdr_states, set_modes_validated};
use crate::topology::{device_ids, newly_enabled_devices, Topology};
use crate::types::DeviceId;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Undoes whatever the journal records, clearing each field as its restore
/// succeeds. Returns `false` when any part could not be restored; the
/// partially-cleared journal is then the caller's to re-save.
pub(crate) async fn try_revert_settings(
    adapter: &dyn DisplayAdapter,
    data: &mut PersistentData,
) -> bool {
    if !data.contains_modifications() {
        return true;
    }

    let have_changes_for_modified_topology = !data.original_primary_display.is_empty()
        || !data.original_modes.is_empty()
        || !data.original_hdr_states.is_empty();

    let mut newly_enabled: HashSet<DeviceId> = HashSet::new();
    let mut partially_failed = false;
    let mut topology_restored = false;
    let mut current_topology = adapter.current_topology().await;

    if have_changes_for_modified_topology {
        if adapter.set_topology(&data.topology.modified).await {
            newly_enabled.extend(newly_enabled_devices(
                &current_topology,
                &data.topology.modified,
            ));
            current_topology = data.topology.modified.clone();
            topology_restored = true;

            if !data.original_hdr_states.is_empty() {
                debug!(states = ?data.original_hdr_states, "changing back the HDR states");
                if adapter.set_hdr_states(&data.original_hdr_states).await {
                    data.original_hdr_states.clear();
                } else {
                    partially_failed = true;
                }
            }

            if !data.original_modes.is_empty() {
                debug!(modes = ?data.original_modes, "changing back the display modes");
                let ids = device_ids(&current_topology);
                if set_modes_validated(adapter, &data.original_modes, &ids).await {
                    data.original_modes.clear();
                } else {
                    partially_failed = true;
                }
            }

            if !data.original_primary_display.is_empty() {
                debug!(device_id = %data.original_primary_display, "changing back the primary display");
                if adapter.set_as_primary(&data.original_primary_display).await {
                    data.original_primary_display.clear();
                } else {
                    partially_failed = true;
                }
            }
        } else {
            warn!("cannot switch to the modified topology to undo changes");
            partially_failed = true;
        }
    }

    if adapter.set_topology(&data.topology.initial).await {
        newly_enabled.extend(newly_enabled_devices(
            &current_topology,
            &data.topology.initial,
        ));
        current_topology = data.topology.initial.clone();
        topology_restored = true;
    } else {
        warn!("failed to switch back to the initial topology");
        partially_failed = true;
    }

    if !topology_restored {
        // Last ditch: whatever happens, the user must not be left staring
        // at a blank screen.
        if let Some(extended) = activate_all_devices(adapter).await {
            newly_enabled.extend(newly_enabled_devices(&current_topology, &extended));
            current_topology = extended;
        }
    }

    if !newly_enabled.is_empty() {
        // Devices that were just re-enabled may need the HDR settle toggle;
        // best effort only.
        let ids = device_ids(&current_topology);
        let current_hdr_states = adapter.current_hdr_states(&ids).await;

        debug!("trying to fix HDR states (if needed)");
        blank_hdr_states(adapter, &current_hdr_states, &newly_enabled).await;
        adapter.set_hdr_states(&current_hdr_states).await;
    }

    !partially_failed
}

/// Activates every enumerable device as its own extended display.
async fn activate_all_devices(adapter: &dyn DisplayAdapter) -> Option<Topology> {
    let devices = adapter.enum_available_devices().await;
    if devices.is_empty() {
        warn!("no devices available for the extended fallback topology");
        return None;
    }

    let extended: Topology = devices.keys().map(|id| vec![id.clone()]).collect();
    warn!(topology = ?extended, "no journaled topology could be restored, activating all devices");
    if adapter.set_topology(&extended).await {
        Some(extended)
    } else {
        None
    }
}
