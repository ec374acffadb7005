//! Display configuration engine for the Prism streaming host
//!
//! For the duration of a streaming session the engine reshapes the host's
//! monitor configuration to what the client asked for: topology (which
//! displays are enabled and which mirror each other), per-device display
//! modes, HDR states and the primary display. Afterward it reliably reverts
//! every change, surviving crashes, user tampering and transient driver
//! failures along the way.
//!
//! The OS persists modes, primary and HDR settings keyed by the active
//! topology, which shapes the whole engine: originals can only be restored
//! under the topology they were captured in, so the journal records both
//! the initial and the modified topology and the revert engine steps back
//! through them in reverse apply order.
//!
//! The host talks to the engine through [`Session`]; the OS is reached
//! exclusively through the [`DisplayAdapter`] trait, implemented by a
//! platform adapter in the host repository and by in-memory fakes in tests.

pub mod adapter;
pub mod audio;
pub mod config;
pub mod error;
pub mod persistence;
pub mod session;
pub mod settings;
pub mod topology;
pub mod types;

mod retry;

pub use adapter::DisplayAdapter;
pub use audio::{AudioSessionGuard, AudioSessionProvider, NullAudioProvider};
pub use config::{
    DevicePrep, HdrPrep, LaunchSession, ParsedPlan, RefreshRateChange, ResolutionChange,
    VideoConfig,
};
pub use error::{apply_result_code, ApplyError, ApplyResult, ParseError, PersistenceError};
pub use persistence::{JournalStore, PersistentData};
pub use session::{Session, SessionGuard};
pub use settings::SettingsEngine;
pub use topology::{is_topology_the_same, is_topology_valid, Topology, TopologyData};
pub use types::{
    DeviceId, DeviceInfo, DeviceInfoMap, DeviceModeMap, DeviceState, DisplayMode, HdrState,
    HdrStateMap, RefreshRate, Resolution,
};
