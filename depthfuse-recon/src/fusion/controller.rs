//! Tracking state machine around a fusion engine

use crate::fusion::engine::{Alignment, FusionEngine, FusionError};
use crate::ingest::{ColorImage, DepthImage};
use depthfuse_data::SurfaceCloud;
use glam::Affine3A;
use tracing::{info, warn};

/// Where the controller stands after the last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionState {
    /// Nothing integrated since construction or the last reset.
    #[default]
    Idle,
    /// The last update converged.
    Tracking,
    /// The last update diverged.
    Failed,
}

/// What happens to the volume when tracking is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Start over from an empty volume on the next frame.
    ResetOnFailure,
    /// Keep the volume and retry from the last good pose.
    #[default]
    KeepVolume,
}

/// Per-update outcome as seen by the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionOutcome {
    Tracked,
    Lost { reset: bool },
}

impl FusionOutcome {
    pub fn is_tracked(self) -> bool {
        matches!(self, FusionOutcome::Tracked)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionCounters {
    pub successes: u64,
    pub failures: u64,
    pub resets: u64,
}

/// Owns an engine and the tracking state around it.
#[derive(Debug, Clone)]
pub struct FusionController<E: FusionEngine> {
    engine: E,
    state: FusionState,
    policy: ResetPolicy,
    counters: FusionCounters,
}

impl<E: FusionEngine> FusionController<E> {
    pub fn new(engine: E, policy: ResetPolicy) -> Self {
        Self {
            engine,
            state: FusionState::Idle,
            policy,
            counters: FusionCounters::default(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn state(&self) -> FusionState {
        self.state
    }

    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    pub fn counters(&self) -> FusionCounters {
        self.counters
    }

    /// Feed one frame to the engine.
    ///
    /// Engine misuse (wrong frame size, missing color) is returned as an error
    /// and leaves the state unchanged.
    pub fn update(
        &mut self,
        depth: &DepthImage,
        color: Option<&ColorImage>,
    ) -> Result<FusionOutcome, FusionError> {
        match self.engine.update(depth, color)? {
            Alignment::Converged => {
                self.state = FusionState::Tracking;
                self.counters.successes += 1;
                Ok(FusionOutcome::Tracked)
            }
            Alignment::Diverged => {
                self.counters.failures += 1;
                let reset = self.policy == ResetPolicy::ResetOnFailure;
                if reset {
                    warn!("tracking lost, resetting volume");
                    self.engine.reset();
                    self.counters.resets += 1;
                    self.state = FusionState::Idle;
                } else {
                    warn!("tracking lost, keeping volume");
                    self.state = if self.engine.is_empty() {
                        FusionState::Idle
                    } else {
                        FusionState::Failed
                    };
                }
                Ok(FusionOutcome::Lost { reset })
            }
        }
    }

    /// Empty the volume and return to `Idle`.
    pub fn reset(&mut self) {
        info!("fusion reset");
        self.engine.reset();
        self.counters.resets += 1;
        self.state = FusionState::Idle;
    }

    /// Shaded surface from the current pose; `None` while `Idle`.
    pub fn render(&self) -> Option<ColorImage> {
        if self.state == FusionState::Idle {
            return None;
        }
        self.engine.render()
    }

    pub fn cloud(&self) -> SurfaceCloud {
        self.engine.cloud()
    }

    pub fn pose(&self) -> Affine3A {
        self.engine.pose()
    }

    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::engines::DepthFusion;
    use crate::geometry::ReconstructionParams;
    use crate::ingest::{CameraIntrinsic, uniform_depth};

    fn controller(policy: ResetPolicy) -> FusionController<DepthFusion> {
        let intrinsic = CameraIntrinsic::new(50.0, 50.0, 31.5, 23.5, 64, 48);
        FusionController::new(DepthFusion::new(ReconstructionParams::precise(intrinsic)), policy)
    }

    #[test]
    fn test_starts_idle_without_render() {
        let c = controller(ResetPolicy::default());
        assert_eq!(c.state(), FusionState::Idle);
        assert_eq!(c.policy(), ResetPolicy::KeepVolume);
        assert!(c.render().is_none());
        assert!(c.cloud().is_empty());
    }

    #[test]
    fn test_flat_plane_tracks_every_frame() {
        let mut c = controller(ResetPolicy::KeepVolume);
        let depth = uniform_depth(64, 48, 600);
        for _ in 0..10 {
            assert_eq!(c.update(&depth, None).unwrap(), FusionOutcome::Tracked);
            assert_eq!(c.state(), FusionState::Tracking);
            assert!(c.render().is_some());
        }
        assert_eq!(c.counters().successes, 10);
        assert_eq!(c.counters().failures, 0);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut c = controller(ResetPolicy::KeepVolume);
        c.update(&uniform_depth(64, 48, 600), None).unwrap();
        c.reset();
        assert_eq!(c.state(), FusionState::Idle);
        assert!(c.render().is_none());
        assert!(c.cloud().is_empty());
        assert_eq!(c.counters().resets, 1);
    }

    #[test]
    fn test_failure_with_reset_policy_empties_volume() {
        let mut c = controller(ResetPolicy::ResetOnFailure);
        c.update(&uniform_depth(64, 48, 600), None).unwrap();
        let outcome = c.update(&uniform_depth(64, 48, 2500), None).unwrap();
        assert_eq!(outcome, FusionOutcome::Lost { reset: true });
        assert_eq!(c.state(), FusionState::Idle);
        assert!(c.is_empty());
        assert_eq!(c.counters().resets, 1);

        // Next frame starts a fresh volume
        assert_eq!(
            c.update(&uniform_depth(64, 48, 2500), None).unwrap(),
            FusionOutcome::Tracked
        );
    }

    #[test]
    fn test_failure_keeping_volume_leaves_cloud_unchanged() {
        let mut c = controller(ResetPolicy::KeepVolume);
        c.update(&uniform_depth(64, 48, 600), None).unwrap();
        let before = c.cloud();

        let outcome = c.update(&uniform_depth(64, 48, 0), None).unwrap();
        assert_eq!(outcome, FusionOutcome::Lost { reset: false });
        assert_eq!(c.state(), FusionState::Failed);
        assert_eq!(c.cloud(), before);
        assert!(c.render().is_some());

        // Recovers once the scene is back
        assert_eq!(
            c.update(&uniform_depth(64, 48, 600), None).unwrap(),
            FusionOutcome::Tracked
        );
        assert_eq!(c.state(), FusionState::Tracking);
    }

    #[test]
    fn test_first_frame_outside_volume_counts_as_failure() {
        let mut c = controller(ResetPolicy::KeepVolume);
        let outcome = c.update(&uniform_depth(64, 48, 300), None).unwrap();
        assert_eq!(outcome, FusionOutcome::Lost { reset: false });
        assert_eq!(c.state(), FusionState::Idle);
        assert!(c.render().is_none());
        assert_eq!(c.counters().successes, 0);
        assert_eq!(c.counters().failures, 1);
    }

    #[test]
    fn test_engine_error_keeps_state() {
        let mut c = controller(ResetPolicy::KeepVolume);
        assert!(c.update(&uniform_depth(10, 10, 600), None).is_err());
        assert_eq!(c.state(), FusionState::Idle);
        assert_eq!(c.counters(), FusionCounters::default());
    }
}
