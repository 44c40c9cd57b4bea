//! Pick-and-place execution.
//!
//! A move is at most two transfers: the occupant of the destination (if any) to
//! the discard location, then the moving piece to its destination. Every
//! transfer is a pick phase followed by a place phase. All travel between
//! squares happens at the safe transit height; only vertical moves leave it.
//!
//! The pick phase is the [`PickState`] machine. A rejected grasp lowers the
//! target by one [`GraspLadder`] step and tries again until the ladder runs out.

use std::sync::Arc;
use std::time::Duration;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::drivers::{GripperDriver, ManipulatorDriver, MotionService};
use crate::error::{Error, Result};
use crate::geometry::{OrientationVector, Pose};
use crate::resolver::{CoordinateResolver, Target};
use crate::snapshot::BoardSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Clearance used for all square-to-square travel.
    pub safe_height: f64,
    /// Release height over the discard location.
    pub discard_height: f64,
    /// Finger opening before a grasp and for releasing.
    pub ready_width: f64,
    /// A grasp is only believed when the fingers stay wider than this.
    pub min_grasp_aperture: f64,
    pub descent_step: f64,
    /// Lowest height a grasp may be attempted at (the board surface).
    pub height_floor: f64,
    pub grasp_settle_ms: u64,
    /// Targets past this x are approached with a tilted tool.
    pub tilt_start_x: f64,
    pub tilt_per_unit: f64,
    pub reference_frame: String,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            safe_height: 200.0,
            discard_height: 300.0,
            ready_width: 450.0,
            min_grasp_aperture: 20.0,
            descent_step: 10.0,
            height_floor: 0.0,
            grasp_settle_ms: 300,
            tilt_start_x: 300.0,
            tilt_per_unit: 0.001,
            reference_frame: "world".to_string(),
        }
    }
}

/// Height schedule for repeated grasp attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraspLadder {
    height: f64,
    step: f64,
    floor: f64,
}

impl GraspLadder {
    /// Starts at `start`, clamped so the first attempt is never below `floor`.
    ///
    /// `None` unless every input is finite and `step` is positive, since the
    /// ladder could otherwise never reach the floor.
    pub fn new(start: f64, step: f64, floor: f64) -> Option<Self> {
        if !(start.is_finite() && floor.is_finite() && step.is_finite() && step > 0.0) {
            return None;
        }
        Some(Self {
            height: start.max(floor),
            step,
            floor,
        })
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Lowers the target by one step; `None` once that would pass the floor.
    pub fn step_down(&mut self) -> Option<f64> {
        let next = self.height - self.step;
        if next < self.floor {
            return None;
        }
        self.height = next;
        Some(next)
    }
}

/// One grasp try.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraspAttempt {
    pub height: f64,
    pub aperture: f64,
    /// What the gripper itself claimed.
    pub reported: bool,
    pub accepted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickState {
    Positioning,
    Descending,
    Grasping,
    Verifying { reported: bool },
    Retrying,
    Succeeded,
    Failed,
}

/// What happened during one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReport {
    pub from: Target,
    pub to: Target,
    pub attempts: Vec<GraspAttempt>,
}

impl TransferReport {
    pub fn retries(&self) -> usize {
        self.attempts.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveReport {
    /// Transfer of the piece that was standing on the destination.
    pub displacement: Option<TransferReport>,
    pub transfer: TransferReport,
}

pub struct MoveExecutor {
    motion: Arc<dyn MotionService>,
    manipulator: Arc<dyn ManipulatorDriver>,
    gripper: Arc<dyn GripperDriver>,
    resolver: CoordinateResolver,
    settings: MotionSettings,
    reference_theta: f64,
}

impl MoveExecutor {
    pub fn new(
        motion: Arc<dyn MotionService>,
        manipulator: Arc<dyn ManipulatorDriver>,
        gripper: Arc<dyn GripperDriver>,
        resolver: CoordinateResolver,
        settings: MotionSettings,
    ) -> Self {
        Self {
            motion,
            manipulator,
            gripper,
            resolver,
            settings,
            reference_theta: 0.0,
        }
    }

    /// Tool rotation to keep for every pose, normally taken from the homed arm.
    pub fn set_reference_theta(&mut self, theta: f64) {
        self.reference_theta = theta;
    }

    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    /// Moves the piece on `from` to `to`, clearing `to` first if something stands there.
    ///
    /// Both ends are resolved before the arm moves at all.
    #[tracing::instrument(skip_all, fields(from = %from, to = %to))]
    pub async fn move_piece(
        &self,
        snapshot: &BoardSnapshot,
        from: Target,
        to: Target,
    ) -> Result<MoveReport> {
        info!("moving piece");
        let pick_point = self.resolver.resolve(snapshot, from)?;
        let place_point = self.resolver.resolve(snapshot, to)?;

        let mut displacement = None;
        if let Target::Square(dest) = to {
            let occupant = snapshot.get(dest);
            if occupant.occupancy().is_occupied() && to != from {
                info!("position {dest} already has a piece ({}), will move", occupant.label());
                let discard = self.resolver.discard_point();
                let report = self
                    .transfer((to, place_point), (Target::Discard, discard))
                    .await
                    .inspect_err(|err| warn!("can't move piece out of the way: {err}"))?;
                displacement = Some(report);
            }
        }

        let transfer = self.transfer((from, pick_point), (to, place_point)).await?;
        Ok(MoveReport {
            displacement,
            transfer,
        })
    }

    async fn transfer(
        &self,
        (from, pick_point): (Target, Point3<f64>),
        (to, place_point): (Target, Point3<f64>),
    ) -> Result<TransferReport> {
        let (attempts, grasp_height) = self.pick(from, pick_point).await?;
        let release_height = match to {
            Target::Discard => self.settings.discard_height,
            Target::Square(_) => grasp_height,
        };
        self.place(place_point, release_height).await?;

        Ok(TransferReport { from, to, attempts })
    }

    /// Runs the pick state machine; returns every attempt and the height the piece was held at.
    async fn pick(&self, from: Target, at: Point3<f64>) -> Result<(Vec<GraspAttempt>, f64)> {
        let s = &self.settings;
        let mut ladder = GraspLadder::new(at.z, s.descent_step, s.height_floor)
            .ok_or_else(|| Error::Perception {
                label: from.to_string(),
                reason: "no finite grasp height",
            })?;
        let mut attempts = Vec::new();
        let mut state = PickState::Positioning;

        loop {
            debug!(?state, height = ladder.height(), "pick");
            state = match state {
                PickState::Positioning => {
                    self.ready_gripper().await?;
                    self.move_gripper(at.x, at.y, s.safe_height, "transit").await?;
                    PickState::Descending
                }
                PickState::Descending => {
                    self.move_gripper(at.x, at.y, ladder.height(), "descend").await?;
                    PickState::Grasping
                }
                PickState::Grasping => {
                    let reported = self.gripper.grasp().await.map_err(Error::motion("grasp"))?;
                    tokio::time::sleep(Duration::from_millis(s.grasp_settle_ms)).await;
                    PickState::Verifying { reported }
                }
                PickState::Verifying { reported } => {
                    let aperture = self
                        .manipulator
                        .query_gripper_opening()
                        .await
                        .map_err(Error::motion("read gripper opening"))?;
                    let accepted = reported && aperture > s.min_grasp_aperture;
                    if reported && !accepted {
                        warn!(aperture, "grab said we got it, but the fingers closed too far");
                    }
                    attempts.push(GraspAttempt {
                        height: ladder.height(),
                        aperture,
                        reported,
                        accepted,
                    });
                    if accepted {
                        PickState::Succeeded
                    } else {
                        PickState::Retrying
                    }
                }
                PickState::Retrying => match ladder.step_down() {
                    Some(height) => {
                        warn!(height, "didn't grab, going to try a little lower");
                        self.ready_gripper().await?;
                        PickState::Descending
                    }
                    None => PickState::Failed,
                },
                PickState::Succeeded => {
                    self.move_gripper(at.x, at.y, s.safe_height, "ascend").await?;
                    return Ok((attempts, ladder.height()));
                }
                PickState::Failed => {
                    return Err(Error::Grasp {
                        label: from.to_string(),
                        attempts: attempts.len(),
                        floor: s.height_floor,
                    });
                }
            };
        }
    }

    async fn place(&self, at: Point3<f64>, height: f64) -> Result<()> {
        let s = &self.settings;
        self.move_gripper(at.x, at.y, s.safe_height, "transit").await?;
        self.move_gripper(at.x, at.y, height, "descend").await?;
        self.ready_gripper().await?;
        self.move_gripper(at.x, at.y, s.safe_height, "ascend").await
    }

    async fn ready_gripper(&self) -> Result<()> {
        self.manipulator
            .set_gripper_opening(self.settings.ready_width)
            .await
            .map_err(Error::motion("open gripper"))
    }

    async fn move_gripper(&self, x: f64, y: f64, z: f64, action: &'static str) -> Result<()> {
        let pose = self.pose_at(Point3::new(x, y, z));
        self.motion
            .move_to(&pose, &self.settings.reference_frame)
            .await
            .map_err(Error::motion(action))
    }

    /// Downward tool pose; targets far out in x get a slight tilt toward +x.
    pub fn pose_at(&self, position: Point3<f64>) -> Pose {
        let mut orientation = OrientationVector::downward(self.reference_theta);
        if position.x > self.settings.tilt_start_x {
            let s = &self.settings;
            orientation.ox = (position.x - s.tilt_start_x) * s.tilt_per_unit;
        }
        Pose::new(position, orientation)
    }
}
