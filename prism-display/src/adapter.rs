//! Display-control adapter contract
//!
//! The engine drives the OS display configuration exclusively through this
//! trait. A platform adapter (the Windows one lives in the host repository)
//! implements it over the native display APIs; tests implement it with an
//! in-memory fake.
//!
//! Failures are reported in-band the way the platform APIs do: empty maps
//! and `false` returns. Adapters retry transient query errors internally,
//! so the engine only ever sees final outcomes.

use crate::topology::Topology;
use crate::types::{DeviceId, DeviceInfoMap, DeviceModeMap, HdrStateMap};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Debug;

/// Driver over the OS display configuration.
///
/// Every setter is idempotent with respect to re-applying the value it just
/// set.
#[async_trait]
pub trait DisplayAdapter: Send + Sync + Debug {
    /// Enumerates the devices available in the system, active or not.
    /// Empty on failure.
    async fn enum_available_devices(&self) -> DeviceInfoMap;

    /// Display name associated with the device. Empty if the id is unknown
    /// or the device is inactive.
    async fn display_name(&self, device_id: &str) -> String;

    /// Currently active topology. Empty on failure.
    async fn current_topology(&self) -> Topology;

    /// Tries to enter the topology, verifying the outcome afterward. When
    /// the verification finds a different topology than requested the
    /// adapter restores the previous one and returns `false`.
    async fn set_topology(&self, topology: &Topology) -> bool;

    /// Current display modes for the given devices. Empty if any of the
    /// devices does not have a mode.
    async fn current_display_modes(&self, device_ids: &HashSet<DeviceId>) -> DeviceModeMap;

    /// One attempt at setting the display modes.
    ///
    /// With `allow_os_adjustments` the OS may snap the request to the
    /// closest mode it considers valid; without it, custom modes configured
    /// outside the standard lists are accepted verbatim. Devices sharing a
    /// mirror group must all be present in `modes` with equal resolutions.
    async fn set_display_modes(&self, modes: &DeviceModeMap, allow_os_adjustments: bool) -> bool;

    /// Whether the device is currently a primary display.
    async fn is_primary(&self, device_id: &str) -> bool;

    /// Promotes the device to primary. Mirror siblings become primary with
    /// it.
    async fn set_as_primary(&self, device_id: &str) -> bool;

    /// Current HDR states for the given devices. A device that is inactive
    /// or does not expose HDR reports [`HdrState::Unknown`].
    ///
    /// [`HdrState::Unknown`]: crate::types::HdrState::Unknown
    async fn current_hdr_states(&self, device_ids: &HashSet<DeviceId>) -> HdrStateMap;

    /// Applies the HDR states. `Unknown` entries are ignored.
    async fn set_hdr_states(&self, states: &HdrStateMap) -> bool;
}
