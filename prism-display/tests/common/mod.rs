//! In-memory display adapter for integration tests
//!
//! Simulates the OS side of the [`DisplayAdapter`] contract: a set of
//! devices, an active topology, per-device modes and HDR states, and a
//! primary display. Every adapter call is recorded so tests can assert on
//! ordering, and failures can be injected per operation.

#![allow(dead_code)]

use async_trait::async_trait;
use prism_display::topology::{is_topology_the_same, is_topology_valid};
use prism_display::{
    DeviceId, DeviceInfo, DeviceInfoMap, DeviceModeMap, DeviceState, DisplayAdapter, DisplayMode,
    HdrState, HdrStateMap, RefreshRate, Resolution, Topology,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// One simulated monitor.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub friendly_name: String,
    /// `None` when the device has no HDR support; `Some(enabled)` otherwise.
    pub hdr: Option<bool>,
    pub mode: DisplayMode,
}

/// Injected failures, applied per adapter operation.
#[derive(Debug, Default, Clone)]
pub struct Failures {
    pub set_topology: bool,
    pub set_modes: bool,
    /// Fail only attempts made without OS adjustments.
    pub set_modes_strict: bool,
    pub set_primary: bool,
    pub set_hdr: bool,
}

/// Recorded adapter call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    EnumAvailableDevices,
    CurrentTopology,
    SetTopology(Topology),
    CurrentDisplayModes,
    SetDisplayModes {
        modes: DeviceModeMap,
        allow_os_adjustments: bool,
    },
    IsPrimary(DeviceId),
    SetAsPrimary(DeviceId),
    CurrentHdrStates,
    SetHdrStates(HdrStateMap),
}

#[derive(Debug, Default)]
pub struct MockState {
    pub devices: std::collections::BTreeMap<DeviceId, DeviceSpec>,
    pub topology: Topology,
    pub primary: DeviceId,
    pub failures: Failures,
    /// When set, modes applied with OS adjustments get their refresh rate
    /// snapped to this value, simulating the OS treating the request as a
    /// suggestion.
    pub snap_refresh_rate: Option<RefreshRate>,
    pub calls: Vec<Call>,
}

impl MockState {
    fn is_active(&self, device_id: &str) -> bool {
        self.topology.iter().flatten().any(|id| id == device_id)
    }

    fn primary_group(&self) -> Option<&Vec<DeviceId>> {
        self.topology
            .iter()
            .find(|group| group.iter().any(|id| *id == self.primary))
    }

    fn is_primary(&self, device_id: &str) -> bool {
        self.primary_group()
            .is_some_and(|group| group.iter().any(|id| id == device_id))
    }

    fn hdr_state(&self, device_id: &str) -> HdrState {
        if !self.is_active(device_id) {
            return HdrState::Unknown;
        }

        match self.devices.get(device_id).and_then(|spec| spec.hdr) {
            Some(true) => HdrState::Enabled,
            Some(false) => HdrState::Disabled,
            None => HdrState::Unknown,
        }
    }

    /// Full observable state, for before/after comparisons in tests.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            topology: normalized(&self.topology),
            primary: self.primary.clone(),
            modes: self
                .devices
                .iter()
                .map(|(id, spec)| (id.clone(), spec.mode))
                .collect(),
            hdr: self
                .devices
                .keys()
                .map(|id| (id.clone(), self.hdr_state(id)))
                .collect(),
        }
    }
}

/// Makes engine logs visible in test output when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Sort-normalized copy for order-insensitive comparisons.
pub fn normalized(topology: &Topology) -> Topology {
    let mut copy = topology.clone();
    for group in &mut copy {
        group.sort();
    }
    copy.sort();
    copy
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub topology: Topology,
    pub primary: DeviceId,
    pub modes: DeviceModeMap,
    pub hdr: HdrStateMap,
}

#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl DisplayAdapter for MockAdapter {
    async fn enum_available_devices(&self) -> DeviceInfoMap {
        self.record(Call::EnumAvailableDevices);
        let state = self.state();

        state
            .devices
            .iter()
            .map(|(id, spec)| {
                let device_state = if state.is_primary(id) {
                    DeviceState::Primary
                } else if state.is_active(id) {
                    DeviceState::Active
                } else {
                    DeviceState::Inactive
                };

                let info = DeviceInfo {
                    display_name: if state.is_active(id) {
                        format!(r"\\.\DISPLAY_{id}")
                    } else {
                        String::new()
                    },
                    friendly_name: spec.friendly_name.clone(),
                    device_state,
                    hdr_state: state.hdr_state(id),
                };
                (id.clone(), info)
            })
            .collect()
    }

    async fn display_name(&self, device_id: &str) -> String {
        let state = self.state();
        if state.is_active(device_id) {
            format!(r"\\.\DISPLAY_{device_id}")
        } else {
            String::new()
        }
    }

    async fn current_topology(&self) -> Topology {
        self.record(Call::CurrentTopology);
        self.state().topology.clone()
    }

    async fn set_topology(&self, topology: &Topology) -> bool {
        self.record(Call::SetTopology(topology.clone()));
        let mut state = self.state();

        if !is_topology_valid(topology) {
            return false;
        }
        if topology
            .iter()
            .flatten()
            .any(|id| !state.devices.contains_key(id))
        {
            return false;
        }
        if is_topology_the_same(&state.topology, topology) {
            return true;
        }
        if state.failures.set_topology {
            return false;
        }

        state.topology = topology.clone();
        if !state.is_active(&state.primary.clone()) {
            // The OS always designates some primary display.
            state.primary = topology[0][0].clone();
        }
        true
    }

    async fn current_display_modes(&self, device_ids: &HashSet<DeviceId>) -> DeviceModeMap {
        self.record(Call::CurrentDisplayModes);
        let state = self.state();

        let mut modes = DeviceModeMap::new();
        for id in device_ids {
            if !state.is_active(id) {
                return DeviceModeMap::new();
            }
            match state.devices.get(id) {
                Some(spec) => {
                    modes.insert(id.clone(), spec.mode);
                }
                None => return DeviceModeMap::new(),
            }
        }
        modes
    }

    async fn set_display_modes(&self, modes: &DeviceModeMap, allow_os_adjustments: bool) -> bool {
        self.record(Call::SetDisplayModes {
            modes: modes.clone(),
            allow_os_adjustments,
        });
        let mut state = self.state();

        if modes.is_empty() {
            return false;
        }
        if state.failures.set_modes {
            return false;
        }
        if !allow_os_adjustments && state.failures.set_modes_strict {
            return false;
        }

        // Devices sharing a mirror group must all be provided, with equal
        // resolutions.
        for group in &state.topology {
            let provided: Vec<_> = group.iter().filter(|id| modes.contains_key(*id)).collect();
            if provided.is_empty() {
                continue;
            }
            if provided.len() != group.len() {
                return false;
            }
            let first = modes[provided[0]].resolution;
            if provided.iter().any(|id| modes[*id].resolution != first) {
                return false;
            }
        }

        if modes.keys().any(|id| !state.is_active(id)) {
            return false;
        }

        let snap = state.snap_refresh_rate;
        for (id, mode) in modes {
            let mut applied = *mode;
            if allow_os_adjustments {
                if let Some(snapped) = snap {
                    applied.refresh_rate = snapped;
                }
            }
            if let Some(spec) = state.devices.get_mut(id) {
                spec.mode = applied;
            }
        }
        true
    }

    async fn is_primary(&self, device_id: &str) -> bool {
        self.record(Call::IsPrimary(device_id.to_string()));
        self.state().is_primary(device_id)
    }

    async fn set_as_primary(&self, device_id: &str) -> bool {
        self.record(Call::SetAsPrimary(device_id.to_string()));
        let mut state = self.state();

        if state.failures.set_primary || !state.is_active(device_id) {
            return false;
        }
        state.primary = device_id.to_string();
        true
    }

    async fn current_hdr_states(&self, device_ids: &HashSet<DeviceId>) -> HdrStateMap {
        self.record(Call::CurrentHdrStates);
        let state = self.state();

        let mut states = HdrStateMap::new();
        for id in device_ids {
            if !state.devices.contains_key(id) {
                return HdrStateMap::new();
            }
            states.insert(id.clone(), state.hdr_state(id));
        }
        states
    }

    async fn set_hdr_states(&self, states: &HdrStateMap) -> bool {
        self.record(Call::SetHdrStates(states.clone()));
        let mut state = self.state();

        if state.failures.set_hdr {
            return false;
        }

        for (id, hdr) in states {
            let enable = match hdr {
                HdrState::Unknown => continue,
                HdrState::Enabled => true,
                HdrState::Disabled => false,
            };
            let active = state.is_active(id);
            if let Some(spec) = state.devices.get_mut(id) {
                if active && spec.hdr.is_some() {
                    spec.hdr = Some(enable);
                }
            }
        }
        true
    }
}

pub fn mode(width: u32, height: u32, numerator: u32, denominator: u32) -> DisplayMode {
    DisplayMode {
        resolution: Resolution { width, height },
        refresh_rate: RefreshRate {
            numerator,
            denominator,
        },
    }
}

pub fn topo(groups: &[&[&str]]) -> Topology {
    groups
        .iter()
        .map(|group| group.iter().map(|id| id.to_string()).collect())
        .collect()
}

pub fn device(friendly_name: &str, mode: DisplayMode, hdr: Option<bool>) -> DeviceSpec {
    DeviceSpec {
        friendly_name: friendly_name.to_string(),
        hdr,
        mode,
    }
}

/// A single active full-HD monitor "A", no HDR, primary.
pub fn single_monitor_state() -> MockState {
    let mut state = MockState::default();
    state
        .devices
        .insert("A".to_string(), device("Monitor A", mode(1920, 1080, 60, 1), None));
    state.topology = topo(&[&["A"]]);
    state.primary = "A".to_string();
    state
}
