//! Per-square observations produced by one board capture.

use std::fmt;

use nalgebra::Point3;
use shakmaty::Square;

use crate::error::{Error, Result};
use crate::geometry::{centroid, highest};

/// What occupies a square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occupancy {
    Empty,
    White,
    Black,
}

impl Occupancy {
    /// Numeric code used in observation labels.
    pub fn code(self) -> u8 {
        match self {
            Occupancy::Empty => 0,
            Occupancy::White => 1,
            Occupancy::Black => 2,
        }
    }

    pub fn is_occupied(self) -> bool {
        self != Occupancy::Empty
    }
}

/// One square of one capture.
#[derive(Debug, Clone)]
pub struct SquareObservation {
    square: Square,
    occupancy: Occupancy,
    region: Vec<Point3<f64>>,
    center: Option<Point3<f64>>,
    peak: Option<Point3<f64>>,
}

impl SquareObservation {
    /// Builds an observation from its world-frame region; center and peak are derived here.
    pub fn new(square: Square, occupancy: Occupancy, region: Vec<Point3<f64>>) -> Self {
        let center = centroid(&region);
        let peak = highest(&region);
        Self {
            square,
            occupancy,
            region,
            center,
            peak,
        }
    }

    pub fn square(&self) -> Square {
        self.square
    }

    pub fn occupancy(&self) -> Occupancy {
        self.occupancy
    }

    pub fn region(&self) -> &[Point3<f64>] {
        &self.region
    }

    pub fn center(&self) -> Option<Point3<f64>> {
        self.center
    }

    pub fn peak(&self) -> Option<Point3<f64>> {
        self.peak
    }

    /// `"<square>-<code>"`, e.g. `e4-1` for a white piece on e4.
    pub fn label(&self) -> String {
        format!("{}-{}", self.square, self.occupancy.code())
    }
}

/// Exactly 64 observations, one per square, indexed a1..h8.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    squares: Vec<SquareObservation>,
}

impl BoardSnapshot {
    /// Fails unless the observations cover every square exactly once.
    pub fn new(observations: Vec<SquareObservation>) -> Result<Self> {
        let mut slots: Vec<Option<SquareObservation>> = vec![None; 64];
        for obs in observations {
            let slot = &mut slots[usize::from(obs.square)];
            if slot.is_some() {
                return Err(Error::Perception {
                    label: obs.square.to_string(),
                    reason: "square observed twice in one capture",
                });
            }
            *slot = Some(obs);
        }

        let mut squares = Vec::with_capacity(64);
        for (idx, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(obs) => squares.push(obs),
                None => {
                    return Err(Error::Perception {
                        label: Square::new(idx as u32).to_string(),
                        reason: "square missing from capture",
                    })
                }
            }
        }
        Ok(Self { squares })
    }

    pub fn get(&self, square: Square) -> &SquareObservation {
        &self.squares[usize::from(square)]
    }

    pub fn is_occupied(&self, square: Square) -> bool {
        self.get(square).occupancy.is_occupied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SquareObservation> {
        self.squares.iter()
    }
}

impl fmt::Display for BoardSnapshot {
    /// Renders the board rank 8 first, `.` for empty, `W`/`B` for pieces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            for file in 0..8 {
                let c = match self.squares[rank * 8 + file].occupancy {
                    Occupancy::Empty => '.',
                    Occupancy::White => 'W',
                    Occupancy::Black => 'B',
                };
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
