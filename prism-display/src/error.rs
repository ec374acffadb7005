//! Error types for the display configuration engine
//!
//! All errors are values: failures are typed by the stage that produced
//! them and mapped to user-visible numeric codes. Logging is advisory only;
//! nothing in the engine propagates errors through panics.

use thiserror::Error;

/// Outcome of a display configuration request.
pub type ApplyResult = std::result::Result<(), ApplyError>;

/// Failure of a display configuration request, typed by the failing stage.
///
/// The numeric codes exposed by [`ApplyError::code`] are part of the
/// user-visible contract: clients report them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// The user's video configuration could not be parsed against the
    /// client session parameters.
    #[error("failed to parse the display device configuration")]
    ConfigParse,

    /// The requested display topology could not be entered.
    #[error("failed to change the display topology")]
    Topology,

    /// The primary display could not be changed.
    #[error("failed to change the primary display")]
    PrimaryDisplay,

    /// The requested display modes were rejected by the system.
    #[error("failed to change the display modes")]
    Modes,

    /// The requested HDR states were rejected by the system.
    #[error("failed to change the HDR states")]
    HdrStates,

    /// The journal with the original settings could not be saved.
    #[error("failed to save the display settings to a file")]
    FileSave,

    /// A revert performed on behalf of this request failed; the journal is
    /// kept on disk so that it can be retried.
    #[error("failed to revert the changes made to the display devices")]
    Revert,
}

impl ApplyError {
    /// User-visible numeric code of this failure. Success is `0`.
    pub fn code(&self) -> u32 {
        match self {
            ApplyError::ConfigParse => 700,
            ApplyError::Topology => 701,
            ApplyError::PrimaryDisplay => 702,
            ApplyError::Modes => 703,
            ApplyError::HdrStates => 704,
            ApplyError::FileSave => 705,
            ApplyError::Revert => 706,
        }
    }
}

/// Numeric code for an [`ApplyResult`]: `0` on success, the stage code
/// otherwise.
pub fn apply_result_code(result: &ApplyResult) -> u32 {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

/// Failure to parse the user's video configuration against the client
/// launch session. Any parse error aborts the apply with
/// [`ApplyError::ConfigParse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The client sent a negative width or height.
    #[error("resolution provided by the client session is invalid: {width}x{height}")]
    InvalidClientResolution { width: i32, height: i32 },

    /// The client sent a negative FPS value.
    #[error("FPS value provided by the client session is invalid: {0}")]
    InvalidClientFps(i32),

    /// The manual resolution string does not match `WIDTHxHEIGHT`.
    #[error("manual resolution must match a \"WIDTHxHEIGHT\" pattern: {0:?}")]
    MalformedResolution(String),

    /// The manual refresh rate string does not match `123` or `123.456`.
    #[error("manual refresh rate must look like \"123\" or \"123.456\": {0:?}")]
    MalformedRefreshRate(String),

    /// A parsed number does not fit the value range.
    #[error("number out of range in {0:?}")]
    NumberOutOfRange(String),
}

/// Failure of the on-disk journal store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
