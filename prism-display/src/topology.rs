//! Active display topology
//!
//! A topology is the set of enabled displays partitioned into mirror
//! groups: `[[A], [B, C]]` means A is extended while B and C duplicate each
//! other. The OS decides placement, so ordering carries no meaning and
//! equality is defined over the sort-normalized form.

use crate::types::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Enabled devices partitioned into mirror groups.
pub type Topology = Vec<Vec<DeviceId>>;

/// The OS settings UI does not render mirror groups larger than this, and
/// behavior above it is undefined, so it is enforced as a hard limit.
const MAX_MIRROR_GROUP_SIZE: usize = 2;

/// Topology snapshots recorded in the journal.
///
/// `initial` existed before the first successful apply of the session;
/// `modified` was active when the journaled originals were captured. They
/// can be equal when no topology change was necessary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyData {
    pub initial: Topology,
    pub modified: Topology,
}

/// Validates the topology shape: non-empty, no empty groups, no group above
/// the mirror limit, no device appearing twice.
pub fn is_topology_valid(topology: &Topology) -> bool {
    if topology.is_empty() {
        warn!("topology input is empty");
        return false;
    }

    let mut device_ids = HashSet::new();
    for group in topology {
        if group.is_empty() || group.len() > MAX_MIRROR_GROUP_SIZE {
            warn!("topology group is invalid");
            return false;
        }

        for device_id in group {
            if !device_ids.insert(device_id) {
                warn!("duplicate device ids found");
                return false;
            }
        }
    }

    true
}

/// Whether the system would consider the two topologies the same.
///
/// Groups and the outer list are compared as unordered sets: the topologies
/// are equal iff their sort-normalized forms are equal.
pub fn is_topology_the_same(a: &Topology, b: &Topology) -> bool {
    fn normalized(topology: &Topology) -> Topology {
        let mut copy = topology.clone();
        for group in &mut copy {
            group.sort();
        }
        copy.sort();
        copy
    }

    normalized(a) == normalized(b)
}

/// Every device id present in the topology.
pub fn device_ids(topology: &Topology) -> HashSet<DeviceId> {
    topology.iter().flatten().cloned().collect()
}

/// Device ids found in the new topology that were absent from the previous
/// one.
pub fn newly_enabled_devices(previous: &Topology, new: &Topology) -> HashSet<DeviceId> {
    let previous_ids = device_ids(previous);
    device_ids(new)
        .into_iter()
        .filter(|id| !previous_ids.contains(id))
        .collect()
}

/// Whether the device is active somewhere in the topology.
pub fn contains_device(topology: &Topology, device_id: &str) -> bool {
    topology.iter().flatten().any(|id| id == device_id)
}
