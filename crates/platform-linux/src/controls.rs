//! V4L2 camera controls through `v4l2-ctl`.
//!
//! Zoom and autofocus are plain integer/boolean controls on UVC cameras.
//! The tool is used instead of raw ioctls so no unsafe code is needed.

use std::process::Command;

use camkit_common::error::{CamError, CamResult};
use camkit_device_core::{MAX_ZOOM_FACTOR, MIN_ZOOM_FACTOR};

/// Control names used by the Linux backend.
pub const ZOOM_CONTROL: &str = "zoom_absolute";
pub const CONTINUOUS_FOCUS_CONTROLS: [&str; 2] = ["focus_automatic_continuous", "focus_auto"];

/// Integer range advertised for one control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRange {
    pub min: i64,
    pub max: i64,
    pub default: i64,
}

/// Controls a device advertises, parsed from `v4l2-ctl --list-ctrls`.
#[derive(Debug, Clone, Default)]
pub struct ControlSet {
    pub zoom: Option<ControlRange>,
    /// Name of the continuous autofocus control, if any.
    pub continuous_focus: Option<&'static str>,
}

impl ControlSet {
    pub fn parse(list_ctrls: &str) -> Self {
        Self {
            zoom: parse_control_range(list_ctrls, ZOOM_CONTROL),
            continuous_focus: CONTINUOUS_FOCUS_CONTROLS
                .into_iter()
                .find(|name| control_line(list_ctrls, name).is_some()),
        }
    }
}

/// Query the controls of a device.
pub fn query_controls(device: &str) -> CamResult<ControlSet> {
    let output = Command::new("v4l2-ctl")
        .args(["--device", device, "--list-ctrls"])
        .output()
        .map_err(|e| CamError::platform(format!("v4l2-ctl unavailable: {e}")))?;

    if !output.status.success() {
        return Err(CamError::device(format!(
            "v4l2-ctl --list-ctrls failed for {device}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(ControlSet::parse(&String::from_utf8_lossy(&output.stdout)))
}

/// Write a batch of controls to a device.
pub fn set_controls(device: &str, values: &[(&str, i64)]) -> CamResult<()> {
    if values.is_empty() {
        return Ok(());
    }

    let assignments = values
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(",");

    tracing::debug!(device, controls = %assignments, "Writing V4L2 controls");

    let output = Command::new("v4l2-ctl")
        .args(["--device", device, "--set-ctrl", &assignments])
        .output()
        .map_err(|e| CamError::platform(format!("v4l2-ctl unavailable: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(CamError::device(format!(
            "Failed to set {assignments} on {device}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Map a zoom factor linearly onto a control range.
pub fn zoom_to_control(factor: f64, range: ControlRange) -> i64 {
    let factor = factor.clamp(MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR);
    let fraction = (factor - MIN_ZOOM_FACTOR) / (MAX_ZOOM_FACTOR - MIN_ZOOM_FACTOR);
    range.min + ((range.max - range.min) as f64 * fraction).round() as i64
}

/// Parse `min=`/`max=`/`default=` for one control of `--list-ctrls` output.
pub fn parse_control_range(list_ctrls: &str, control: &str) -> Option<ControlRange> {
    let line = control_line(list_ctrls, control)?;
    let field = |key: &str| -> Option<i64> {
        line.split_whitespace()
            .find_map(|token| token.strip_prefix(key))
            .and_then(|value| value.parse().ok())
    };

    let min = field("min=")?;
    let max = field("max=")?;
    Some(ControlRange {
        min,
        max,
        default: field("default=").unwrap_or(min),
    })
}

fn control_line<'a>(list_ctrls: &'a str, control: &str) -> Option<&'a str> {
    list_ctrls
        .lines()
        .find(|line| line.split_whitespace().next() == Some(control))
}
