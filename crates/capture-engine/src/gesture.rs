//! Gesture translation.
//!
//! Raw touch gestures on the preview surface become camera commands:
//! a single tap focuses, a pinch zooms, a double tap toggles the camera.
//! Each behaviour is installed independently at setup.
//!
//! Zoom is relative: a pinch's scale multiplies the factor committed when
//! the pinch began, and the result is clamped to
//! `[MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR]`.

use camkit_common::config::GestureDefaults;
use camkit_device_core::{
    clamp_zoom, normalize_point, PointOfInterest, SurfaceSize, MIN_ZOOM_FACTOR,
};

use crate::outcome::Ignored;

/// Which gesture behaviours are installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureConfig {
    pub focus: bool,
    pub zoom: bool,
    pub toggle: bool,
}

impl Default for GestureConfig {
    fn default() -> Self {
        GestureDefaults::default().into()
    }
}

impl From<GestureDefaults> for GestureConfig {
    fn from(defaults: GestureDefaults) -> Self {
        Self {
            focus: defaults.focus,
            zoom: defaults.zoom,
            toggle: defaults.toggle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinchPhase {
    Began,
    Changed,
    Ended,
}

/// A raw gesture on the preview surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// Single tap at a surface point.
    Tap { x: f64, y: f64 },
    DoubleTap,
    /// Pinch with its scale relative to the start of the gesture.
    Pinch { phase: PinchPhase, scale: f64 },
}

/// What a gesture asks the camera to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraCommand {
    Focus(PointOfInterest),
    Zoom { factor: f64, phase: PinchPhase },
    ToggleCamera,
}

/// Committed zoom factor plus the baseline the current pinch scales.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    pub factor: f64,
    pub baseline: f64,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            factor: MIN_ZOOM_FACTOR,
            baseline: MIN_ZOOM_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GestureController {
    config: GestureConfig,
    zoom: ZoomState,
}

impl GestureController {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            zoom: ZoomState::default(),
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn zoom(&self) -> ZoomState {
        self.zoom
    }

    /// Translate a gesture into a command.
    pub fn interpret(
        &mut self,
        gesture: Gesture,
        surface: SurfaceSize,
    ) -> Result<CameraCommand, Ignored> {
        match gesture {
            Gesture::Tap { x, y } => {
                if !self.config.focus {
                    return Err(Ignored::GestureDisabled);
                }
                Ok(CameraCommand::Focus(normalize_point(x, y, surface)))
            }
            Gesture::DoubleTap => {
                if !self.config.toggle {
                    return Err(Ignored::GestureDisabled);
                }
                Ok(CameraCommand::ToggleCamera)
            }
            Gesture::Pinch { phase, scale } => {
                if !self.config.zoom {
                    return Err(Ignored::GestureDisabled);
                }
                if !scale.is_finite() || scale <= 0.0 {
                    return Err(Ignored::InvalidGesture);
                }
                if phase == PinchPhase::Began {
                    self.zoom.baseline = self.zoom.factor;
                }
                Ok(CameraCommand::Zoom {
                    factor: clamp_zoom(self.zoom.baseline * scale),
                    phase,
                })
            }
        }
    }

    /// Record the zoom factor the device accepted.
    pub fn commit_zoom(&mut self, factor: f64) {
        if factor.is_finite() {
            self.zoom.factor = clamp_zoom(factor);
        }
    }

    /// End of a pinch: later pinches compose from the committed factor.
    pub fn finish_pinch(&mut self) {
        self.zoom.baseline = self.zoom.factor;
    }

    /// Back to no magnification (new device or teardown).
    pub fn reset_zoom(&mut self) {
        self.zoom = ZoomState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camkit_device_core::MAX_ZOOM_FACTOR;
    use proptest::prelude::*;

    const SURFACE: SurfaceSize = SurfaceSize {
        width: 400.0,
        height: 800.0,
    };

    fn all_enabled() -> GestureController {
        GestureController::new(GestureConfig {
            focus: true,
            zoom: true,
            toggle: true,
        })
    }

    fn pinch(ctl: &mut GestureController, phase: PinchPhase, scale: f64) -> f64 {
        match ctl.interpret(Gesture::Pinch { phase, scale }, SURFACE) {
            Ok(CameraCommand::Zoom { factor, .. }) => {
                ctl.commit_zoom(factor);
                if phase == PinchPhase::Ended {
                    ctl.finish_pinch();
                }
                factor
            }
            other => panic!("expected zoom, got {other:?}"),
        }
    }

    #[test]
    fn default_config_installs_zoom_and_toggle_only() {
        let mut ctl = GestureController::new(GestureConfig::default());
        assert_eq!(
            ctl.interpret(Gesture::Tap { x: 1.0, y: 1.0 }, SURFACE),
            Err(Ignored::GestureDisabled)
        );
        assert_eq!(
            ctl.interpret(Gesture::DoubleTap, SURFACE),
            Ok(CameraCommand::ToggleCamera)
        );
    }

    #[test]
    fn tap_maps_to_normalized_point() {
        let mut ctl = all_enabled();
        assert_eq!(
            ctl.interpret(Gesture::Tap { x: 100.0, y: 600.0 }, SURFACE),
            Ok(CameraCommand::Focus(PointOfInterest { x: 0.25, y: 0.75 }))
        );
    }

    #[test]
    fn pinches_compose_from_last_committed_zoom() {
        let mut ctl = all_enabled();
        pinch(&mut ctl, PinchPhase::Began, 1.0);
        pinch(&mut ctl, PinchPhase::Changed, 1.5);
        assert_eq!(pinch(&mut ctl, PinchPhase::Ended, 2.0), 2.0);

        pinch(&mut ctl, PinchPhase::Began, 1.0);
        assert_eq!(pinch(&mut ctl, PinchPhase::Ended, 1.5), 3.0);
        assert_eq!(ctl.zoom().baseline, 3.0);
    }

    #[test]
    fn zoom_clamps_at_both_ends() {
        let mut ctl = all_enabled();
        pinch(&mut ctl, PinchPhase::Began, 1.0);
        assert_eq!(pinch(&mut ctl, PinchPhase::Ended, 10.0), MAX_ZOOM_FACTOR);

        pinch(&mut ctl, PinchPhase::Began, 1.0);
        assert_eq!(pinch(&mut ctl, PinchPhase::Ended, 0.01), MIN_ZOOM_FACTOR);
    }

    #[test]
    fn uncommitted_zoom_leaves_state_unchanged() {
        let mut ctl = all_enabled();
        pinch(&mut ctl, PinchPhase::Began, 1.0);
        pinch(&mut ctl, PinchPhase::Ended, 2.0);

        // Device write fails: the command is produced but never committed.
        ctl.interpret(
            Gesture::Pinch {
                phase: PinchPhase::Began,
                scale: 1.0,
            },
            SURFACE,
        )
        .unwrap();
        ctl.interpret(
            Gesture::Pinch {
                phase: PinchPhase::Ended,
                scale: 2.0,
            },
            SURFACE,
        )
        .unwrap();
        ctl.finish_pinch();
        assert_eq!(ctl.zoom().factor, 2.0);
        assert_eq!(ctl.zoom().baseline, 2.0);
    }

    #[test]
    fn invalid_scales_are_rejected() {
        let mut ctl = all_enabled();
        for scale in [f64::NAN, f64::INFINITY, 0.0, -2.0] {
            assert_eq!(
                ctl.interpret(
                    Gesture::Pinch {
                        phase: PinchPhase::Changed,
                        scale
                    },
                    SURFACE
                ),
                Err(Ignored::InvalidGesture)
            );
        }
    }

    fn phase_strategy() -> impl Strategy<Value = PinchPhase> {
        prop_oneof![
            Just(PinchPhase::Began),
            Just(PinchPhase::Changed),
            Just(PinchPhase::Ended),
        ]
    }

    proptest! {
        #[test]
        fn zoom_factor_stays_in_bounds(
            steps in proptest::collection::vec((phase_strategy(), 1e-6f64..1e6), 1..64)
        ) {
            let mut ctl = all_enabled();
            for (phase, scale) in steps {
                if let Ok(CameraCommand::Zoom { factor, .. }) =
                    ctl.interpret(Gesture::Pinch { phase, scale }, SURFACE)
                {
                    prop_assert!((MIN_ZOOM_FACTOR..=MAX_ZOOM_FACTOR).contains(&factor));
                    ctl.commit_zoom(factor);
                    if phase == PinchPhase::Ended {
                        ctl.finish_pinch();
                    }
                }
                let zoom = ctl.zoom();
                prop_assert!((MIN_ZOOM_FACTOR..=MAX_ZOOM_FACTOR).contains(&zoom.factor));
                prop_assert!((MIN_ZOOM_FACTOR..=MAX_ZOOM_FACTOR).contains(&zoom.baseline));
            }
        }
    }
}
