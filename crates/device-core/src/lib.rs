//! camkit device core contracts.
//!
//! This crate contains backend-neutral camera data structures used by
//! the platform and capture crates without coupling to a concrete OS
//! media framework.

use serde::{Deserialize, Serialize};

/// Smallest zoom factor a session will apply (no magnification).
pub const MIN_ZOOM_FACTOR: f64 = 1.0;

/// Largest zoom factor a session will apply.
pub const MAX_ZOOM_FACTOR: f64 = 4.0;

/// Clamp a zoom factor into `[MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR]`.
pub fn clamp_zoom(factor: f64) -> f64 {
    factor.clamp(MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR)
}

/// Kind of media a capture device produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

/// Physical facing of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Front,
    Back,
    /// Plugged-in camera with no fixed orientation (USB webcam).
    External,
    #[default]
    Unspecified,
}

impl Facing {
    /// The facing a camera toggle switches to. Only a back camera flips
    /// to the front; everything else flips to the back.
    pub fn opposite(self) -> Facing {
        match self {
            Facing::Back => Facing::Front,
            _ => Facing::Back,
        }
    }
}

/// Information about a capture device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    /// Backend-specific identifier (e.g. `/dev/video0`).
    pub id: String,
    /// Human readable name.
    pub name: String,
    pub kind: MediaKind,
    pub facing: Facing,
}

impl DeviceInfo {
    pub fn video(id: impl Into<String>, name: impl Into<String>, facing: Facing) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: MediaKind::Video,
            facing,
        }
    }

    pub fn audio(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: MediaKind::Audio,
            facing: Facing::Unspecified,
        }
    }
}

/// Capture authorization as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    NotDetermined,
    Restricted,
}

impl AuthorizationStatus {
    pub fn is_authorized(self) -> bool {
        self == AuthorizationStatus::Authorized
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Locked,
    AutoFocus,
    #[default]
    ContinuousAutoFocus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExposureMode {
    Locked,
    AutoExpose,
    #[default]
    ContinuousAutoExposure,
}

/// Normalized coordinate used to steer focus/exposure.
/// `(0, 0)` is the top-left of the frame, `(1, 1)` the bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub x: f64,
    pub y: f64,
}

impl PointOfInterest {
    pub const CENTER: PointOfInterest = PointOfInterest { x: 0.5, y: 0.5 };
}

/// What a device can do while locked for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub focus_point_of_interest: bool,
    pub exposure_point_of_interest: bool,
    pub continuous_autofocus: bool,
    /// Largest zoom factor the hardware accepts.
    pub max_zoom_factor: f64,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            focus_point_of_interest: false,
            exposure_point_of_interest: false,
            continuous_autofocus: false,
            max_zoom_factor: MIN_ZOOM_FACTOR,
        }
    }
}

/// Mutable device state written during a configuration lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub focus_mode: FocusMode,
    pub focus_point: Option<PointOfInterest>,
    pub exposure_mode: ExposureMode,
    pub exposure_point: Option<PointOfInterest>,
    pub zoom_factor: f64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            focus_mode: FocusMode::default(),
            focus_point: None,
            exposure_mode: ExposureMode::default(),
            exposure_point: None,
            zoom_factor: MIN_ZOOM_FACTOR,
        }
    }
}

/// Size of a preview surface in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

impl SurfaceSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Normalize a point on a surface to a point of interest in `[0.0, 1.0]`.
pub fn normalize_point(x: f64, y: f64, surface: SurfaceSize) -> PointOfInterest {
    let nx = x / surface.width.max(1.0);
    let ny = y / surface.height.max(1.0);
    PointOfInterest {
        x: if nx.is_finite() { nx.clamp(0.0, 1.0) } else { 0.5 },
        y: if ny.is_finite() { ny.clamp(0.0, 1.0) } else { 0.5 },
    }
}
