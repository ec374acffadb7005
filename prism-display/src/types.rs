//! Core data model for display devices
//!
//! Shared value types used across the engine: device identity, display
//! modes with exact rational refresh rates, HDR and activation states.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque, semi-stable identifier of a display device.
///
/// Adapters derive it from the monitor EDID plus the stable portion of the
/// OS instance id, falling back to the monitor device path. The id survives
/// reboots and driver reinstalls, but may change when a monitor is physically
/// moved to a different port.
pub type DeviceId = String;

/// Activation state of a display device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Inactive,
    Active,
    /// Several devices can be primary at once when they belong to the same
    /// mirror group.
    Primary,
}

/// HDR state of a display device.
///
/// `Unknown` means the state could not be retrieved from the system, either
/// because the device does not expose HDR or because it is inactive.
/// Requested state maps may contain `Unknown` entries; adapters ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdrState {
    Unknown,
    Disabled,
    Enabled,
}

/// Information about an available display device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Name used by the system for the logical display this device drives.
    /// Empty for inactive devices, which can map to several display names.
    pub display_name: String,

    /// Human-readable device name.
    pub friendly_name: String,

    /// Current activation state.
    pub device_state: DeviceState,

    /// Current HDR state.
    pub hdr_state: HdrState,
}

/// Display resolution in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Refresh rate kept as an exact rational so that values like `59.995`
/// round-trip through the journal without loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl RefreshRate {
    /// Rate for a whole number of hertz.
    pub fn from_whole(hz: u32) -> Self {
        Self {
            numerator: hz,
            denominator: 1,
        }
    }

    /// Fuzzy equality: the rates are considered equal when they are within
    /// 1.0 Hz of each other. Used exclusively to validate that the OS honored
    /// a mode request; journaled values always compare exactly.
    pub fn fuzzy_eq(&self, other: &RefreshRate) -> bool {
        const MAX_DIFF_HZ: f32 = 1.0;
        if self.denominator == 0 || other.denominator == 0 {
            return false;
        }

        let a = self.numerator as f32 / self.denominator as f32;
        let b = other.numerator as f32 / other.denominator as f32;
        (a - b).abs() <= MAX_DIFF_HZ
    }
}

/// Resolution plus refresh rate of an active display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub resolution: Resolution,
    pub refresh_rate: RefreshRate,
}

impl DisplayMode {
    /// Exact resolution match combined with [`RefreshRate::fuzzy_eq`].
    pub fn fuzzy_eq(&self, other: &DisplayMode) -> bool {
        self.resolution == other.resolution && self.refresh_rate.fuzzy_eq(&other.refresh_rate)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Display for RefreshRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resolution, self.refresh_rate)
    }
}

/// Device id to device info, ordered for predictable logs.
pub type DeviceInfoMap = BTreeMap<DeviceId, DeviceInfo>;

/// Device id to display mode, ordered for predictable logs and JSON output.
pub type DeviceModeMap = BTreeMap<DeviceId, DisplayMode>;

/// Device id to HDR state, ordered for predictable logs and JSON output.
pub type HdrStateMap = BTreeMap<DeviceId, HdrState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_rate_fuzzy_eq_within_one_hertz() {
        let requested = RefreshRate {
            numerator: 5994,
            denominator: 100,
        };
        let reported = RefreshRate {
            numerator: 59940,
            denominator: 1000,
        };
        assert!(requested.fuzzy_eq(&reported));

        let snapped = RefreshRate::from_whole(60);
        assert!(requested.fuzzy_eq(&snapped));

        let too_far = RefreshRate::from_whole(62);
        assert!(!requested.fuzzy_eq(&too_far));
    }

    #[test]
    fn refresh_rate_fuzzy_eq_rejects_zero_denominator() {
        let valid = RefreshRate::from_whole(60);
        let broken = RefreshRate {
            numerator: 60,
            denominator: 0,
        };
        assert!(!valid.fuzzy_eq(&broken));
        assert!(!broken.fuzzy_eq(&valid));
    }

    #[test]
    fn display_mode_fuzzy_eq_requires_exact_resolution() {
        let a = DisplayMode {
            resolution: Resolution {
                width: 3840,
                height: 2160,
            },
            refresh_rate: RefreshRate::from_whole(60),
        };
        let mut b = a;
        b.refresh_rate = RefreshRate {
            numerator: 59995,
            denominator: 1000,
        };
        assert!(a.fuzzy_eq(&b));

        b.resolution.width = 1920;
        assert!(!a.fuzzy_eq(&b));
    }

    #[test]
    fn hdr_state_serializes_to_lowercase_strings() {
        assert_eq!(
            serde_json::to_string(&HdrState::Unknown).unwrap(),
            "\"unknown\""
        );
        assert_eq!(
            serde_json::to_string(&HdrState::Disabled).unwrap(),
            "\"disabled\""
        );
        assert_eq!(
            serde_json::to_string(&HdrState::Enabled).unwrap(),
            "\"enabled\""
        );
    }
}
