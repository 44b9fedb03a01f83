//! Outcome of a session command.
//!
//! Commands whose preconditions do not hold leave the session untouched and
//! say why, instead of failing. Real failures (device lock, backend, I/O)
//! are reported as errors.

use std::fmt;

/// Result of a command that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The command changed the session.
    Applied,
    /// The command was a no-op.
    Ignored(Ignored),
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        self == Outcome::Applied
    }
}

/// Why a command was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// `setup` has not run (or `remove_view` already did).
    NotConfigured,
    /// The session was set up for the other capture mode.
    WrongMode,
    /// The session has no output of the required kind.
    NoOutput,
    AlreadyRecording,
    NotRecording,
    /// The gesture's behaviour was not installed at setup.
    GestureDisabled,
    /// Gesture input was not usable (non-finite or non-positive scale).
    InvalidGesture,
    /// No device is available for the command.
    NoDevice,
    /// The active device cannot do what the command asks.
    Unsupported,
}

impl fmt::Display for Ignored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Ignored::NotConfigured => "session is not configured",
            Ignored::WrongMode => "session is in the other capture mode",
            Ignored::NoOutput => "session has no matching output",
            Ignored::AlreadyRecording => "a recording is already in progress",
            Ignored::NotRecording => "no recording in progress",
            Ignored::GestureDisabled => "gesture is disabled",
            Ignored::InvalidGesture => "gesture input is invalid",
            Ignored::NoDevice => "no suitable device",
            Ignored::Unsupported => "not supported by the active device",
        };
        f.write_str(reason)
    }
}

impl From<Ignored> for Outcome {
    fn from(reason: Ignored) -> Self {
        Outcome::Ignored(reason)
    }
}
