//! V4L2 camera discovery.
//!
//! Strategy:
//! 1. Enumerate `/dev/video0`-`/dev/video63`
//! 2. Read the sysfs name (`/sys/class/video4linux/videoN/name`) for each
//!    node that exists
//! 3. Keep nodes that report Video Capture through `v4l2-ctl --info`; when
//!    the tool is missing, keep nodes whose sysfs `index` is 0 (the other
//!    indices of a UVC camera are metadata nodes)
//! 4. Infer the facing from the device name

use std::path::Path;

use camkit_device_core::{DeviceInfo, Facing};

const MAX_VIDEO_NODES: u32 = 64;

/// Enumerate V4L2 capture devices.
pub fn detect_video_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for idx in 0..MAX_VIDEO_NODES {
        let dev_path = format!("/dev/video{idx}");
        if !Path::new(&dev_path).exists() {
            continue;
        }

        let sysfs_dir = format!("/sys/class/video4linux/video{idx}");
        let name = std::fs::read_to_string(format!("{sysfs_dir}/name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("Video device {idx}"));

        let is_capture = match probe_v4l2_capture_capability(&dev_path) {
            Some(capture) => capture,
            None => sysfs_node_index(&sysfs_dir).unwrap_or(0) == 0,
        };
        if !is_capture {
            tracing::debug!(device = %dev_path, name = %name, "Skipping non-capture V4L2 node");
            continue;
        }

        let facing = facing_from_name(&name);
        tracing::debug!(device = %dev_path, name = %name, ?facing, "Found camera");
        devices.push(DeviceInfo::video(dev_path, name, facing));
    }

    devices
}

/// Enumerate audio capture devices.
///
/// Audio is captured from the sound server's default source, so there is
/// exactly one logical device whenever a sound server socket is present.
pub fn detect_audio_devices() -> Vec<DeviceInfo> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_default();
    let has_server = !runtime_dir.is_empty()
        && (Path::new(&runtime_dir).join("pulse").exists()
            || Path::new(&runtime_dir).join("pipewire-0").exists());

    if has_server || Path::new("/proc/asound/cards").exists() {
        vec![DeviceInfo::audio("default", "Default microphone")]
    } else {
        Vec::new()
    }
}

/// Guess a camera's facing from its reported name.
pub fn facing_from_name(name: &str) -> Facing {
    let name = name.to_lowercase();
    let back_keywords = ["rear", "back", "world"];
    let front_keywords = ["front", "user", "integrated", "facetime", "internal"];

    if back_keywords.iter().any(|kw| name.contains(kw)) {
        Facing::Back
    } else if front_keywords.iter().any(|kw| name.contains(kw)) {
        Facing::Front
    } else {
        Facing::External
    }
}

fn sysfs_node_index(sysfs_dir: &str) -> Option<u32> {
    std::fs::read_to_string(format!("{sysfs_dir}/index"))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Use `v4l2-ctl` to check if a device reports Video Capture capability.
/// Returns `Some(true)` if it does, `Some(false)` if it doesn't,
/// `None` if v4l2-ctl is not available.
fn probe_v4l2_capture_capability(dev_path: &str) -> Option<bool> {
    let output = std::process::Command::new("v4l2-ctl")
        .args(["--device", dev_path, "--info"])
        .output()
        .ok()?;

    if !output.status.success() {
        return Some(false);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(reports_video_capture(&stdout))
}

/// Whether `v4l2-ctl --info` output lists Video Capture in its device caps.
fn reports_video_capture(info: &str) -> bool {
    let info = info.to_lowercase();
    match info.find("device caps") {
        Some(pos) => info[pos..].contains("video capture"),
        None => info.contains("video capture"),
    }
}
