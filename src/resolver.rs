//! Square label to 3D target point.

use std::fmt;
use std::str::FromStr;

use nalgebra::Point3;
use shakmaty::Square;

use crate::error::{Error, Result};
use crate::snapshot::BoardSnapshot;

/// Label of the off-board discard location.
pub const DISCARD_LABEL: &str = "-";

/// Where a piece is picked from or put down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Square(Square),
    Discard,
}

impl FromStr for Target {
    type Err = Error;

    /// Accepts `-`, a bare square (`e4`) or an observation label (`e4-1`).
    fn from_str(label: &str) -> Result<Self> {
        if label == DISCARD_LABEL {
            return Ok(Target::Discard);
        }
        let name = label.split('-').next().unwrap_or_default();
        name.parse::<Square>()
            .map(Target::Square)
            .map_err(|_| Error::Perception {
                label: label.to_string(),
                reason: "not a square label",
            })
    }
}

impl From<Square> for Target {
    fn from(square: Square) -> Self {
        Target::Square(square)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Square(sq) => write!(f, "{sq}"),
            Target::Discard => f.write_str(DISCARD_LABEL),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateResolver {
    discard_point: Point3<f64>,
}

impl CoordinateResolver {
    pub fn new(discard_point: Point3<f64>) -> Self {
        Self { discard_point }
    }

    pub fn discard_point(&self) -> Point3<f64> {
        self.discard_point
    }

    /// Point to approach for `target`.
    ///
    /// Empty squares resolve to the centroid of their region. Occupied squares
    /// resolve to the top of the piece: z from the highest point, x/y halfway
    /// between the centroid and that point since a piece's top rarely sits over
    /// the middle of its square.
    pub fn resolve(&self, snapshot: &BoardSnapshot, target: Target) -> Result<Point3<f64>> {
        let square = match target {
            Target::Discard => return Ok(self.discard_point),
            Target::Square(sq) => sq,
        };

        let obs = snapshot.get(square);
        let no_points = || Error::Perception {
            label: obs.label(),
            reason: "no points observed on square",
        };
        let center = obs.center().ok_or_else(no_points)?;
        let point = if obs.occupancy().is_occupied() {
            let peak = obs.peak().ok_or_else(no_points)?;
            Point3::new(
                (center.x + peak.x) / 2.0,
                (center.y + peak.y) / 2.0,
                peak.z,
            )
        } else {
            center
        };

        if !point.coords.iter().all(|c| c.is_finite()) {
            return Err(Error::Perception {
                label: obs.label(),
                reason: "non-finite coordinates",
            });
        }
        Ok(point)
    }
}

impl Default for CoordinateResolver {
    fn default() -> Self {
        Self::new(Point3::new(400.0, -400.0, 400.0))
    }
}
