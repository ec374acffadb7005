//! Parsing of the user video configuration
//!
//! Translates the user's display preferences plus the parameters negotiated
//! with the client into a validated [`ParsedPlan`] the settings engine can
//! act on. Parsing fails closed: any error aborts the apply before the
//! engine touches the system.

use crate::error::ParseError;
use crate::types::{DeviceId, RefreshRate, Resolution};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the streamed display device should be prepared for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePrep {
    /// The user keeps the device active themselves.
    #[default]
    NoOperation,
    /// Activate the device if needed.
    EnsureActive,
    /// Activate the device if needed and make it the primary display.
    EnsurePrimary,
    /// Deactivate every other display and keep only the requested one.
    EnsureOnlyDisplay,
}

impl DevicePrep {
    /// Maps a configuration view string to the option. Case-sensitive;
    /// unknown strings fall back to [`DevicePrep::NoOperation`].
    pub fn from_view(value: &str) -> Self {
        match value {
            "ensure_active" => DevicePrep::EnsureActive,
            "ensure_primary" => DevicePrep::EnsurePrimary,
            "ensure_only_display" => DevicePrep::EnsureOnlyDisplay,
            _ => DevicePrep::NoOperation,
        }
    }
}

/// How the resolution of the streamed display should change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChange {
    /// Keep the current resolution.
    #[default]
    NoOperation,
    /// Use the resolution requested by the client.
    Automatic,
    /// Use the resolution from [`VideoConfig::manual_resolution`].
    Manual,
}

impl ResolutionChange {
    /// Maps a configuration view string to the option. Case-sensitive;
    /// unknown strings fall back to [`ResolutionChange::NoOperation`].
    pub fn from_view(value: &str) -> Self {
        match value {
            "automatic" => ResolutionChange::Automatic,
            "manual" => ResolutionChange::Manual,
            _ => ResolutionChange::NoOperation,
        }
    }
}

/// How the refresh rate of the streamed display should change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshRateChange {
    /// Keep the current refresh rate.
    #[default]
    NoOperation,
    /// Match the FPS value requested by the client.
    Automatic,
    /// Use the rate from [`VideoConfig::manual_refresh_rate`].
    Manual,
}

impl RefreshRateChange {
    /// Maps a configuration view string to the option. Case-sensitive;
    /// unknown strings fall back to [`RefreshRateChange::NoOperation`].
    pub fn from_view(value: &str) -> Self {
        match value {
            "automatic" => RefreshRateChange::Automatic,
            "manual" => RefreshRateChange::Manual,
            _ => RefreshRateChange::NoOperation,
        }
    }
}

/// Whether the engine should switch the HDR state for the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HdrPrep {
    /// The user switches HDR manually.
    #[default]
    NoOperation,
    /// Follow the client's HDR request, if the display supports it.
    Automatic,
}

impl HdrPrep {
    /// Maps a configuration view string to the option. Case-sensitive;
    /// unknown strings fall back to [`HdrPrep::NoOperation`].
    pub fn from_view(value: &str) -> Self {
        match value {
            "automatic" => HdrPrep::Automatic,
            _ => HdrPrep::NoOperation,
        }
    }
}

/// The user's video configuration slice that drives display preparation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Device id of the display to stream. Empty selects whichever display
    /// is currently primary.
    #[serde(default)]
    pub output_name: DeviceId,

    #[serde(default)]
    pub display_device_prep: DevicePrep,

    #[serde(default)]
    pub resolution_change: ResolutionChange,

    /// Resolution string in `WIDTHxHEIGHT` form, used with
    /// [`ResolutionChange::Manual`].
    #[serde(default)]
    pub manual_resolution: String,

    #[serde(default)]
    pub refresh_rate_change: RefreshRateChange,

    /// Refresh rate string like `60` or `59.95`, used with
    /// [`RefreshRateChange::Manual`].
    #[serde(default)]
    pub manual_refresh_rate: String,

    #[serde(default)]
    pub hdr_prep: HdrPrep,
}

/// Parameters negotiated with the client when it launches a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSession {
    pub width: i32,
    pub height: i32,
    pub fps: i32,
    pub enable_hdr: bool,
    /// The client-side "optimize game settings" switch. The client's
    /// resolution is only honored when it is set.
    pub enable_sops: bool,
}

/// Validated plan produced from [`VideoConfig`] and [`LaunchSession`],
/// ready to be applied by the settings engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPlan {
    /// Target device. Empty means "whichever display is primary".
    pub device_id: DeviceId,

    pub device_prep: DevicePrep,

    /// `None` leaves the resolution unchanged.
    pub resolution: Option<Resolution>,

    /// `None` leaves the refresh rate unchanged.
    pub refresh_rate: Option<RefreshRate>,

    /// `None` leaves the HDR state unchanged.
    pub change_hdr_state: Option<bool>,
}

impl ParsedPlan {
    /// Parses the configuration against the session parameters.
    pub fn new(config: &VideoConfig, session: &LaunchSession) -> Result<Self, ParseError> {
        Ok(Self {
            device_id: config.output_name.clone(),
            device_prep: config.display_device_prep,
            resolution: parse_resolution(config, session)?,
            refresh_rate: parse_refresh_rate(config, session)?,
            change_hdr_state: parse_hdr(config, session),
        })
    }
}

fn parse_resolution(
    config: &VideoConfig,
    session: &LaunchSession,
) -> Result<Option<Resolution>, ParseError> {
    match config.resolution_change {
        ResolutionChange::NoOperation => Ok(None),
        ResolutionChange::Automatic => {
            if !session.enable_sops {
                // The client opted out of having its settings applied.
                debug!("client did not enable \"optimize game settings\", leaving resolution as-is");
                return Ok(None);
            }

            if session.width >= 0 && session.height >= 0 {
                Ok(Some(Resolution {
                    width: session.width as u32,
                    height: session.height as u32,
                }))
            } else {
                Err(ParseError::InvalidClientResolution {
                    width: session.width,
                    height: session.height,
                })
            }
        }
        ResolutionChange::Manual => {
            let trimmed = config.manual_resolution.trim();
            let pattern = Regex::new(r"^(\d+)x(\d+)$").unwrap();
            let captures = pattern
                .captures(trimmed)
                .ok_or_else(|| ParseError::MalformedResolution(trimmed.to_owned()))?;

            let out_of_range = || ParseError::NumberOutOfRange(trimmed.to_owned());
            Ok(Some(Resolution {
                width: captures[1].parse().map_err(|_| out_of_range())?,
                height: captures[2].parse().map_err(|_| out_of_range())?,
            }))
        }
    }
}

fn parse_refresh_rate(
    config: &VideoConfig,
    session: &LaunchSession,
) -> Result<Option<RefreshRate>, ParseError> {
    match config.refresh_rate_change {
        RefreshRateChange::NoOperation => Ok(None),
        RefreshRateChange::Automatic => {
            if session.fps >= 0 {
                Ok(Some(RefreshRate::from_whole(session.fps as u32)))
            } else {
                Err(ParseError::InvalidClientFps(session.fps))
            }
        }
        RefreshRateChange::Manual => {
            let trimmed = config.manual_refresh_rate.trim();
            let pattern = Regex::new(r"^(\d+)(?:\.(\d+))?$").unwrap();
            let captures = pattern
                .captures(trimmed)
                .ok_or_else(|| ParseError::MalformedRefreshRate(trimmed.to_owned()))?;

            let out_of_range = || ParseError::NumberOutOfRange(trimmed.to_owned());
            let rate = match captures.get(2) {
                Some(fraction) => {
                    // The decimal point is dropped and the denominator scaled
                    // to match: 59.995 becomes 59995/1000.
                    let digits = format!("{}{}", &captures[1], fraction.as_str());
                    let numerator: u32 = digits.parse().map_err(|_| out_of_range())?;
                    let denominator = 10u32
                        .checked_pow(fraction.as_str().len() as u32)
                        .ok_or_else(out_of_range)?;
                    RefreshRate {
                        numerator,
                        denominator,
                    }
                }
                None => {
                    RefreshRate::from_whole(captures[1].parse().map_err(|_| out_of_range())?)
                }
            };

            Ok(Some(rate))
        }
    }
}

fn parse_hdr(config: &VideoConfig, session: &LaunchSession) -> Option<bool> {
    match config.hdr_prep {
        HdrPrep::NoOperation => None,
        HdrPrep::Automatic => Some(session.enable_hdr),
    }
}
