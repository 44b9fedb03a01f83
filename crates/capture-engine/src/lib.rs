//! camkit Capture Engine
//!
//! Camera capture sessions: device lookup, session configuration for photo
//! or video, pinch/tap/double-tap gestures, recording with a per-second
//! timer, single-shot photos, and file storage for the results.
//!
//! # Architecture
//!
//! ```text
//!   caller ──commands──▶ SessionHandle task ──events──▶ observers
//!                              │
//!                              ▼
//!                        CaptureSession
//!            ┌─────────────────┼──────────────────┐
//!            ▼                 ▼                  ▼
//!   GestureController  RecordingController  PhotoCaptureController
//!                              │
//!                              ▼
//!   DeviceRegistry ◀── CaptureBackend ──▶ CapturePipeline ──▶ MediaStore
//!                    (gstreamer | simulated)
//! ```

pub mod backend;
pub mod device;
pub mod gesture;
pub mod handle;
pub mod outcome;
pub mod photo;
pub mod pipeline;
pub mod preview;
pub mod recording;
pub mod registry;
pub mod session;
pub mod storage;

pub use backend::{create_backend, CaptureBackend, LinuxBackend, SimulatedBackend};
pub use gesture::{Gesture, GestureConfig, PinchPhase};
pub use handle::SessionHandle;
pub use outcome::{Ignored, Outcome};
pub use photo::CapturedPhoto;
pub use preview::{OffscreenSurface, PreviewSurface};
pub use registry::DeviceRegistry;
pub use recording::RecordingState;
pub use session::*;
pub use storage::MediaStore;
