//! camkit Linux platform integration
//!
//! Platform-specific implementations for Linux:
//! - **Devices:** V4L2 camera discovery through `/dev/video*` and sysfs
//! - **Permissions:** Camera authorization probing and user guidance
//! - **Controls:** Zoom/focus writes through `v4l2-ctl`

pub mod controls;
pub mod devices;
pub mod permissions;

pub use devices::*;
