//! Camera authorization probing and guidance for Linux.
//!
//! Linux has no consent prompt for V4L2 devices: access is granted by
//! file permissions on `/dev/video*` (usually the `video` group). The
//! authorization status is derived from whether those nodes can be opened.

use std::path::Path;

use camkit_device_core::{AuthorizationStatus, MediaKind};

/// A system capability that camkit may need.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Current authorization for a media kind.
pub fn authorization_status(kind: MediaKind) -> AuthorizationStatus {
    match kind {
        MediaKind::Video => video_authorization(),
        MediaKind::Audio => {
            if crate::devices::detect_audio_devices().is_empty() {
                AuthorizationStatus::NotDetermined
            } else {
                AuthorizationStatus::Authorized
            }
        }
    }
}

fn video_authorization() -> AuthorizationStatus {
    let nodes: Vec<String> = (0..64)
        .map(|idx| format!("/dev/video{idx}"))
        .filter(|path| Path::new(path).exists())
        .collect();

    classify_access(nodes.iter().map(|path| can_open(path)))
}

/// Fold per-node access results into one status: any readable node
/// authorizes, nodes that all refuse access are denied, no nodes at all
/// is undetermined.
fn classify_access(results: impl IntoIterator<Item = bool>) -> AuthorizationStatus {
    let mut seen = false;
    for readable in results {
        if readable {
            return AuthorizationStatus::Authorized;
        }
        seen = true;
    }
    if seen {
        AuthorizationStatus::Denied
    } else {
        AuthorizationStatus::NotDetermined
    }
}

fn can_open(path: &str) -> bool {
    std::fs::OpenOptions::new().read(true).open(path).is_ok()
}

/// Check all capabilities and report status.
pub fn check_capabilities() -> Vec<Capability> {
    vec![
        check_camera_device(),
        check_camera_access(),
        check_control_tool(),
        check_audio_access(),
    ]
}

/// Check if a camera node exists.
fn check_camera_device() -> Capability {
    let available = !crate::devices::detect_video_devices().is_empty();

    Capability {
        name: "Camera Device".to_string(),
        description: "Video4Linux capture device (/dev/video*)".to_string(),
        available,
        required: true,
        fix_instructions: if available {
            None
        } else {
            Some(
                "Connect a camera and verify /dev/video* exists (v4l2-ctl --list-devices)"
                    .to_string(),
            )
        },
    }
}

/// Check if the user can open camera nodes.
fn check_camera_access() -> Capability {
    let available = video_authorization().is_authorized();

    Capability {
        name: "Camera Access".to_string(),
        description: "Read access to camera device nodes".to_string(),
        available,
        required: true,
        fix_instructions: if available {
            None
        } else {
            Some("Add user to video group: sudo usermod -aG video $USER (logout required)".to_string())
        },
    }
}

/// Check whether `v4l2-ctl` is installed for zoom/focus control.
fn check_control_tool() -> Capability {
    let available = std::process::Command::new("v4l2-ctl")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    Capability {
        name: "Camera Controls".to_string(),
        description: "v4l2-ctl for zoom and autofocus control".to_string(),
        available,
        required: false,
        fix_instructions: if available {
            None
        } else {
            Some("Install v4l-utils: sudo apt install v4l-utils".to_string())
        },
    }
}

/// Check audio capture capability.
fn check_audio_access() -> Capability {
    let available = !crate::devices::detect_audio_devices().is_empty();

    Capability {
        name: "Audio Capture".to_string(),
        description: "PulseAudio/PipeWire microphone capture".to_string(),
        available,
        required: false,
        fix_instructions: if available {
            None
        } else {
            Some("Install PipeWire: sudo apt install pipewire pipewire-pulse".to_string())
        },
    }
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("camkit System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_readable_node_authorizes() {
        assert_eq!(
            classify_access([false, true, false]),
            AuthorizationStatus::Authorized
        );
    }

    #[test]
    fn unreadable_nodes_are_denied() {
        assert_eq!(classify_access([false, false]), AuthorizationStatus::Denied);
    }

    #[test]
    fn no_nodes_is_not_determined() {
        assert_eq!(
            classify_access(std::iter::empty()),
            AuthorizationStatus::NotDetermined
        );
    }
}
