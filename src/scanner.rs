//! Turns one camera capture into a [`BoardSnapshot`].
//!
//! The camera sees the whole board centered in its frame. The shorter image side
//! spans the board, which is cut into an 8x8 grid of equal cells; file `a` is at
//! the right edge and rank 1 at the top. Every point of the cloud is projected
//! into the image and bucketed into the cell it lands in. Each cell's points
//! are classified in the camera frame, then moved into the world frame for the
//! resolver.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use shakmaty::Square;
use tracing::debug;

use crate::error::Result;
use crate::geometry::CameraGeometry;
use crate::snapshot::{BoardSnapshot, Occupancy, SquareObservation};

/// Frame dimensions of the color image the cloud is aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub width: u32,
    pub height: u32,
}

/// A camera-frame point with an optional RGB sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColoredPoint {
    pub position: Point3<f64>,
    pub color: Option<[u8; 3]>,
}

impl ColoredPoint {
    pub fn new(position: Point3<f64>, color: Option<[u8; 3]>) -> Self {
        Self { position, color }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<ColoredPoint>,
}

impl From<Vec<ColoredPoint>> for PointCloud {
    fn from(points: Vec<ColoredPoint>) -> Self {
        Self { points }
    }
}

/// Everything one sensor capture delivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub image: Image,
    pub cloud: PointCloud,
    pub geometry: CameraGeometry,
}

/// Thresholds for the occupancy classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// How far above the deepest surface of a cell a point must sit to count as piece.
    pub piece_band: f64,
    /// Cells with this many qualifying points or fewer are empty.
    pub min_piece_points: usize,
    /// Mean brightness at or above which a piece is white.
    pub white_brightness: f64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            piece_band: 20.0,
            min_piece_points: 10,
            white_brightness: 128.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoardScanner {
    settings: ScannerSettings,
}

impl BoardScanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self { settings }
    }

    #[tracing::instrument(skip_all, fields(points = capture.cloud.points.len()))]
    pub fn scan(&self, capture: &Capture) -> Result<BoardSnapshot> {
        let Capture {
            image,
            cloud,
            geometry,
        } = capture;

        let side = image.width.min(image.height) as f64;
        let cell = side / 8.0;
        let x_offset = (image.width as f64 - side) / 2.0;
        let y_offset = (image.height as f64 - side) / 2.0;
        debug!(cell, x_offset, y_offset, "board grid");

        let mut cells: Vec<Vec<ColoredPoint>> = vec![Vec::new(); 64];
        for point in &cloud.points {
            // dropped samples come back as inf or NaN depth
            if !point.position.coords.iter().all(|c| c.is_finite()) {
                continue;
            }
            let Some((u, v)) = geometry.project(&point.position) else {
                continue;
            };
            let col = ((u - x_offset) / cell).floor();
            let row = ((v - y_offset) / cell).floor();
            if !(0.0..8.0).contains(&col) || !(0.0..8.0).contains(&row) {
                continue;
            }
            // column 0 is file h, row 0 is rank 1
            let file = 7 - col as usize;
            let rank = row as usize;
            cells[rank * 8 + file].push(*point);
        }

        let observations = cells
            .into_iter()
            .enumerate()
            .map(|(idx, region)| {
                let square = Square::new(idx as u32);
                let occupancy = estimate_occupancy(&region, &self.settings);
                debug!(square = %square, ?occupancy, points = region.len(), "classified");
                let world = region
                    .iter()
                    .map(|p| geometry.to_world(&p.position))
                    .collect();
                SquareObservation::new(square, occupancy, world)
            })
            .collect();

        BoardSnapshot::new(observations)
    }
}

/// Classifies one cell from its camera-frame points.
///
/// Only colored points at least `piece_band` closer to the camera than the
/// deepest point of the cell are considered; they belong to whatever stands on
/// the square rather than to the square itself.
pub fn estimate_occupancy(region: &[ColoredPoint], settings: &ScannerSettings) -> Occupancy {
    let Some(max_depth) = region
        .iter()
        .map(|p| p.position.z)
        .max_by(|a, b| a.total_cmp(b))
    else {
        return Occupancy::Empty;
    };
    let cutoff = max_depth - settings.piece_band;

    let mut total = [0.0f64; 3];
    let mut count = 0usize;
    for p in region {
        if p.position.z >= cutoff {
            continue;
        }
        if let Some([r, g, b]) = p.color {
            total[0] += r as f64;
            total[1] += g as f64;
            total[2] += b as f64;
            count += 1;
        }
    }

    if count <= settings.min_piece_points {
        return Occupancy::Empty;
    }

    let n = count as f64;
    let brightness = (total[0] / n + total[1] / n + total[2] / n) / 3.0;
    if brightness >= settings.white_brightness {
        Occupancy::White
    } else {
        Occupancy::Black
    }
}
