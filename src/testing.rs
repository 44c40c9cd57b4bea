//! Fakes and fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use shakmaty::uci::UciMove;
use shakmaty::Square;

use crate::drivers::{
    DriverError, GripperDriver, HomingSwitch, ManipulatorDriver, MotionService, SensorCapture,
};
use crate::engine::ChessEngine;
use crate::error::Result;
use crate::game::Position;
use crate::geometry::{CameraGeometry, OrientationVector, Pose};
use crate::scanner::{Capture, ColoredPoint, Image, PointCloud};
use crate::snapshot::{BoardSnapshot, Occupancy, SquareObservation};
use crate::store::PositionStore;

/// Camera-to-board distance of the synthetic rig.
pub const BOARD_DEPTH: f64 = 1000.0;
pub const PIECE_HEIGHT: f64 = 50.0;
/// World-frame spacing of squares in [`synthetic_snapshot`].
pub const SQUARE_PITCH: f64 = 50.0;

const IMAGE: Image = Image {
    width: 100,
    height: 80,
};

fn synthetic_geometry() -> CameraGeometry {
    // looking straight down from BOARD_DEPTH above the world origin
    CameraGeometry {
        fx: 500.0,
        fy: 500.0,
        cx: 50.0,
        cy: 40.0,
        camera_to_world: Isometry3::from_parts(
            Translation3::new(0.0, 0.0, BOARD_DEPTH),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI),
        ),
    }
}

/// Capture of a board with the given pieces standing on it.
pub fn synthetic_capture(pieces: &[(Square, Occupancy)]) -> Capture {
    let geometry = synthetic_geometry();
    let unproject = |u: f64, v: f64, depth: f64| {
        Point3::new(
            (u - geometry.cx) * depth / geometry.fx,
            (v - geometry.cy) * depth / geometry.fy,
            depth,
        )
    };

    let side = IMAGE.width.min(IMAGE.height) as f64;
    let cell = side / 8.0;
    let x_offset = (IMAGE.width as f64 - side) / 2.0;

    let mut points = Vec::new();
    for idx in 0..64u32 {
        let square = Square::new(idx);
        let (file, rank) = ((idx % 8) as f64, (idx / 8) as f64);
        let u0 = x_offset + (7.0 - file) * cell;
        let v0 = rank * cell;

        for du in [2.0, 5.0, 8.0] {
            for dv in [2.0, 5.0, 8.0] {
                points.push(ColoredPoint::new(
                    unproject(u0 + du, v0 + dv, BOARD_DEPTH),
                    Some([90, 90, 90]),
                ));
            }
        }

        let color = match pieces.iter().find(|(sq, _)| *sq == square) {
            Some((_, Occupancy::White)) => [230, 230, 230],
            Some((_, Occupancy::Black)) => [30, 30, 30],
            _ => continue,
        };
        for du in [3.0, 4.0, 5.0, 6.0] {
            for dv in [3.0, 4.0, 5.0, 6.0] {
                points.push(ColoredPoint::new(
                    unproject(u0 + du, v0 + dv, BOARD_DEPTH - PIECE_HEIGHT),
                    Some(color),
                ));
            }
        }
    }

    Capture {
        image: IMAGE,
        cloud: PointCloud::from(points),
        geometry,
    }
}

/// The starting layout: white on ranks 1-2, black on ranks 7-8.
pub fn starting_layout() -> Vec<(Square, Occupancy)> {
    (0..64u32)
        .filter_map(|idx| match idx / 8 {
            0 | 1 => Some((Square::new(idx), Occupancy::White)),
            6 | 7 => Some((Square::new(idx), Occupancy::Black)),
            _ => None,
        })
        .collect()
}

/// World-frame snapshot built directly, without going through the scanner.
///
/// Each piece's top sits slightly off the square center so blended
/// coordinates are distinguishable.
pub fn synthetic_snapshot(pieces: &[(Square, Occupancy, f64)]) -> BoardSnapshot {
    let observations = (0..64u32)
        .map(|idx| {
            let square = Square::new(idx);
            let cx = (idx % 8) as f64 * SQUARE_PITCH;
            let cy = (idx / 8) as f64 * SQUARE_PITCH;
            let corners = [(-10.0, -10.0), (-10.0, 10.0), (10.0, -10.0), (10.0, 10.0), (0.0, 0.0)];
            let mut region: Vec<Point3<f64>> = corners
                .iter()
                .map(|(dx, dy)| Point3::new(cx + dx, cy + dy, 0.0))
                .collect();
            let occupancy = match pieces.iter().find(|(sq, _, _)| *sq == square) {
                Some(&(_, occupancy, height)) => {
                    region.push(Point3::new(cx + 6.0, cy + 3.0, height));
                    occupancy
                }
                None => Occupancy::Empty,
            };
            SquareObservation::new(square, occupancy, region)
        })
        .collect();
    BoardSnapshot::new(observations).expect("synthetic snapshot covers every square")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Capture,
    MoveTo(Point3<f64>),
    SetOpening(f64),
    QueryOpening,
    Open,
    Grasp,
    Staging(u32),
    CurrentPose,
}

/// One fake standing in for every hardware collaborator; records each call.
#[derive(Default)]
pub struct FakeRig {
    calls: Mutex<Vec<Call>>,
    apertures: Mutex<VecDeque<f64>>,
    grasp_reports: Mutex<VecDeque<bool>>,
    captures: Mutex<VecDeque<Capture>>,
    moves_before_failure: Mutex<Option<usize>>,
    homing_fails: Mutex<bool>,
}

impl FakeRig {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn moves(&self) -> Vec<Point3<f64>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::MoveTo(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    /// Apertures returned by successive queries; 30 once exhausted.
    pub fn queue_apertures(&self, values: &[f64]) {
        self.apertures.lock().unwrap().extend(values);
    }

    /// Grasp results for successive grasps; `true` once exhausted.
    pub fn queue_grasp_reports(&self, values: &[bool]) {
        self.grasp_reports.lock().unwrap().extend(values);
    }

    /// Captures returned by successive snapshots; the last one repeats.
    pub fn queue_captures(&self, captures: Vec<Capture>) {
        *self.captures.lock().unwrap() = captures.into();
    }

    /// Lets `n` moves succeed, then fails every further move.
    pub fn fail_move_after(&self, n: usize) {
        *self.moves_before_failure.lock().unwrap() = Some(n);
    }

    pub fn fail_homing(&self) {
        *self.homing_fails.lock().unwrap() = true;
    }
}

#[async_trait]
impl SensorCapture for FakeRig {
    async fn capture(&self) -> Result<Capture, DriverError> {
        self.record(Call::Capture);
        let mut captures = self.captures.lock().unwrap();
        let capture = if captures.len() > 1 {
            captures.pop_front()
        } else {
            captures.front().cloned()
        };
        Ok(capture.unwrap_or_else(|| synthetic_capture(&starting_layout())))
    }
}

#[async_trait]
impl ManipulatorDriver for FakeRig {
    async fn set_gripper_opening(&self, width: f64) -> Result<(), DriverError> {
        self.record(Call::SetOpening(width));
        Ok(())
    }

    async fn query_gripper_opening(&self) -> Result<f64, DriverError> {
        self.record(Call::QueryOpening);
        Ok(self.apertures.lock().unwrap().pop_front().unwrap_or(30.0))
    }
}

#[async_trait]
impl GripperDriver for FakeRig {
    async fn open(&self) -> Result<(), DriverError> {
        self.record(Call::Open);
        Ok(())
    }

    async fn grasp(&self) -> Result<bool, DriverError> {
        self.record(Call::Grasp);
        Ok(self.grasp_reports.lock().unwrap().pop_front().unwrap_or(true))
    }
}

#[async_trait]
impl MotionService for FakeRig {
    async fn move_to(&self, destination: &Pose, _reference_frame: &str) -> Result<(), DriverError> {
        {
            let mut budget = self.moves_before_failure.lock().unwrap();
            match budget.as_mut() {
                Some(0) => return Err("unreachable pose".into()),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.record(Call::MoveTo(destination.position));
        Ok(())
    }

    async fn current_pose(&self, _reference_frame: &str) -> Result<Pose, DriverError> {
        self.record(Call::CurrentPose);
        Ok(Pose::new(Point3::new(0.0, 0.0, 500.0), OrientationVector::downward(90.0)))
    }
}

#[async_trait]
impl HomingSwitch for FakeRig {
    async fn set_staging_position(&self, slot: u32) -> Result<(), DriverError> {
        self.record(Call::Staging(slot));
        if *self.homing_fails.lock().unwrap() {
            return Err("staging switch offline".into());
        }
        Ok(())
    }
}

/// In-memory position store counting writes.
#[derive(Default)]
pub struct MemoryStore {
    fen: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn with_fen(fen: &str) -> Self {
        Self {
            fen: Mutex::new(Some(fen.to_string())),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn fen(&self) -> Option<String> {
        self.fen.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl PositionStore for MemoryStore {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.fen())
    }

    fn write(&self, fen: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.fen.lock().unwrap() = Some(fen.to_string());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Engine answering with a fixed list of moves, repeating the last one.
pub struct FixedEngine {
    moves: VecDeque<UciMove>,
    submitted: Arc<Mutex<Vec<String>>>,
}

impl FixedEngine {
    pub fn new(moves: &[&str]) -> Self {
        Self {
            moves: moves.iter().map(|m| m.parse().expect("valid uci")).collect(),
            submitted: Arc::default(),
        }
    }

    /// FENs the engine has been asked about.
    pub fn submitted(&self) -> Arc<Mutex<Vec<String>>> {
        self.submitted.clone()
    }
}

#[async_trait]
impl ChessEngine for FixedEngine {
    async fn submit_position(&mut self, position: &Position) -> Result<()> {
        self.submitted.lock().unwrap().push(position.fen());
        Ok(())
    }

    async fn best_move(&mut self, _budget: Duration) -> Result<UciMove> {
        let mv = if self.moves.len() > 1 {
            self.moves.pop_front()
        } else {
            self.moves.front().cloned()
        };
        mv.ok_or_else(|| crate::error::Error::Engine("no moves scripted".to_string()))
    }
}
