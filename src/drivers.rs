//! Contracts for the hardware and services the pipeline drives.
//!
//! Implementations live with the host robot runtime; the crate only ever talks
//! to these traits. Every call is awaited before the next one is issued.

use async_trait::async_trait;

use crate::geometry::Pose;
use crate::scanner::Capture;

/// Failure reported by an external collaborator.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// Acquires one aligned image + point cloud capture of the board.
#[async_trait]
pub trait SensorCapture: Send + Sync {
    async fn capture(&self) -> Result<Capture, DriverError>;
}

/// Arm-side control of the gripper fingers.
#[async_trait]
pub trait ManipulatorDriver: Send + Sync {
    /// Drives the fingers to an absolute opening width.
    async fn set_gripper_opening(&self, width: f64) -> Result<(), DriverError>;

    /// Measured distance between the fingers.
    async fn query_gripper_opening(&self) -> Result<f64, DriverError>;
}

#[async_trait]
pub trait GripperDriver: Send + Sync {
    async fn open(&self) -> Result<(), DriverError>;

    /// Closes on whatever is between the fingers; `true` when the gripper
    /// believes it holds something.
    async fn grasp(&self) -> Result<bool, DriverError>;
}

/// Collision-aware motion planning for the gripper frame.
#[async_trait]
pub trait MotionService: Send + Sync {
    async fn move_to(&self, destination: &Pose, reference_frame: &str) -> Result<(), DriverError>;

    async fn current_pose(&self, reference_frame: &str) -> Result<Pose, DriverError>;
}

/// Switch that parks the arm at a named staging position.
#[async_trait]
pub trait HomingSwitch: Send + Sync {
    async fn set_staging_position(&self, slot: u32) -> Result<(), DriverError>;
}
