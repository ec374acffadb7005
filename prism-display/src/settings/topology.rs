//! Topology planning for a streaming session
//!
//! Works out which topology the session has to enter, given the parsed
//! plan, the topology that is currently active and any topology recorded in
//! the journal by a previous apply.

use crate::adapter::DisplayAdapter;
use crate::config::{DevicePrep, ParsedPlan};
use crate::error::ApplyError;
use crate::topology::{
    contains_device, is_topology_the_same, is_topology_valid, newly_enabled_devices,
    Topology, TopologyData,
};
use crate::types::{DeviceId, DeviceState};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Snapshot of the topology change that was just taken care of. Later
/// stages use it to decide which devices to touch.
#[derive(Debug, Clone)]
pub(crate) struct TopologyMetadata {
    /// The topology that is now active (the planned final topology).
    pub current_topology: Topology,

    /// Devices activated by the topology change.
    pub newly_enabled_devices: HashSet<DeviceId>,

    /// Whether the user left the device choice to "whichever is primary".
    pub primary_device_requested: bool,

    /// The resolved device followed by every device mirroring it. The
    /// requested device is always at the front.
    pub duplicated_devices: Vec<DeviceId>,
}

/// A successfully planned (and entered) topology.
#[derive(Debug, Clone)]
pub(crate) struct PlannedTopology {
    pub topology_data: TopologyData,
    pub metadata: TopologyMetadata,
}

/// Outcome of planning.
#[derive(Debug, Clone)]
pub(crate) enum TopologyPlan {
    Ready(PlannedTopology),
    /// A journal exists whose modified topology is incompatible with the
    /// topology this session needs. Every journaled change must be reverted
    /// before planning can be retried.
    RevertRequired,
}

/// Plans the topology for the session and enters it if it differs from the
/// current one.
///
/// `previous` is the topology data of an existing journal, if any. When the
/// journaled modified topology no longer matches what this session needs,
/// the planner bails out with [`TopologyPlan::RevertRequired`] without
/// touching the system; the caller reverts and plans again with `None`.
pub(crate) async fn plan_topology(
    adapter: &dyn DisplayAdapter,
    config: &ParsedPlan,
    previous: Option<&TopologyData>,
) -> Result<TopologyPlan, ApplyError> {
    let primary_device_requested = config.device_id.is_empty();
    let requested_device_id = match find_available_device(adapter, &config.device_id).await {
        Some(device_id) => device_id,
        None => return Err(ApplyError::Topology),
    };

    let current_topology = match current_validated_topology(adapter).await {
        Some(topology) => topology,
        None => return Err(ApplyError::Topology),
    };

    // The requested device may belong to a duplicated display, in which case
    // every mirror sibling has to be taken into account as well.
    let mut duplicated_devices = duplicate_devices(&requested_device_id, &current_topology);
    let final_topology = determine_final_topology(
        config.device_prep,
        primary_device_requested,
        &duplicated_devices,
        &current_topology,
    );

    if let Some(previous) = previous {
        // Skipping the topology change is only safe when we would end up in
        // the topology the journaled originals were captured under.
        if !is_topology_the_same(&previous.modified, &final_topology) {
            warn!("previously configured topology does not match the new one, reverting previous changes");
            return Ok(TopologyPlan::RevertRequired);
        }
    }

    if !is_topology_the_same(&current_topology, &final_topology) {
        info!(topology = ?final_topology, "changing display topology");
        if !adapter.set_topology(&final_topology).await {
            error!("failed to change display topology");
            return Err(ApplyError::Topology);
        }

        // Mirror pairings may have changed together with the topology.
        duplicated_devices = duplicate_devices(&requested_device_id, &final_topology);
    }

    // Mainly covers DevicePrep::NoOperation, where the device still has to
    // be active for the session to make sense.
    if !contains_device(&final_topology, &requested_device_id) {
        error!(device_id = %requested_device_id, "device is not active");
        return Err(ApplyError::Topology);
    }

    let initial_topology = determine_initial_topology(previous, &current_topology);
    Ok(TopologyPlan::Ready(PlannedTopology {
        topology_data: TopologyData {
            initial: initial_topology,
            modified: final_topology.clone(),
        },
        metadata: TopologyMetadata {
            newly_enabled_devices: newly_enabled_devices(&current_topology, &final_topology),
            current_topology: final_topology,
            primary_device_requested,
            duplicated_devices,
        },
    }))
}

/// Verifies that the specified (or, for an empty id, a primary) device is
/// available and returns its id.
async fn find_available_device(adapter: &dyn DisplayAdapter, device_id: &str) -> Option<DeviceId> {
    let devices = adapter.enum_available_devices().await;
    if devices.is_empty() {
        error!("display device list is empty");
        return None;
    }

    let summary: Vec<String> = devices
        .iter()
        .map(|(id, info)| format!("{id} ({})", info.friendly_name))
        .collect();
    info!(devices = ?summary, "available display devices");

    let found = devices.into_iter().find(|(id, info)| {
        if device_id.is_empty() {
            info.device_state == DeviceState::Primary
        } else {
            id == device_id
        }
    });

    match found {
        Some((id, _)) => Some(id),
        None => {
            let wanted = if device_id.is_empty() { "PRIMARY" } else { device_id };
            error!(device_id = %wanted, "device not found in the list of available devices");
            None
        }
    }
}

async fn current_validated_topology(adapter: &dyn DisplayAdapter) -> Option<Topology> {
    let topology = adapter.current_topology().await;
    if !is_topology_valid(&topology) {
        error!("display topology is invalid");
        return None;
    }

    debug!(topology = ?topology, "current display topology");
    Some(topology)
}

/// The device followed by its mirror siblings in the topology. Only the
/// device itself when it is inactive.
fn duplicate_devices(device_id: &str, topology: &Topology) -> Vec<DeviceId> {
    let mut duplicated = vec![device_id.to_string()];

    for group in topology {
        if group.iter().any(|id| id == device_id) {
            duplicated.extend(group.iter().filter(|id| *id != device_id).cloned());
            break;
        }
    }

    duplicated
}

/// Decides what the final topology should look like for the requested
/// device preparation.
fn determine_final_topology(
    device_prep: DevicePrep,
    primary_device_requested: bool,
    duplicated_devices: &[DeviceId],
    current_topology: &Topology,
) -> Topology {
    match device_prep {
        DevicePrep::NoOperation => current_topology.clone(),
        DevicePrep::EnsureActive | DevicePrep::EnsurePrimary => {
            if primary_device_requested
                || contains_device(current_topology, &duplicated_devices[0])
            {
                // Already active, nothing to do.
                current_topology.clone()
            } else {
                // Extend the desktop with the device; the least surprising
                // way to activate it.
                let mut topology = current_topology.clone();
                topology.push(vec![duplicated_devices[0].clone()]);
                topology
            }
        }
        DevicePrep::EnsureOnlyDisplay => {
            if primary_device_requested {
                if current_topology.len() > 1 {
                    // Other groups exist next to the primary one; keep the
                    // whole primary mirror group and drop the rest.
                    vec![duplicated_devices.to_vec()]
                } else {
                    current_topology.clone()
                }
            } else if !contains_device(current_topology, &duplicated_devices[0])
                || duplicated_devices.len() > 1
                || current_topology.len() > 1
            {
                // The device is inactive, duplicated, or has company; it
                // must end up as the only active display.
                vec![vec![duplicated_devices[0].clone()]]
            } else {
                current_topology.clone()
            }
        }
    }
}

/// Keeps the journaled initial topology when the user did not disturb our
/// work between sessions, i.e. the journaled modified topology is still the
/// one that is active. Otherwise the current topology becomes the new
/// initial.
fn determine_initial_topology(
    previous: Option<&TopologyData>,
    current_topology: &Topology,
) -> Topology {
    if let Some(previous) = previous {
        if is_topology_the_same(&previous.modified, current_topology) {
            return previous.initial.clone();
        }
    }

    current_topology.clone()
}
