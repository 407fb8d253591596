//! Planes in Hesse normal form with a numerical tolerance band.
//!
//! A plane stores its (not necessarily unit) normal, its offset, and a
//! tolerance proportional to the squared normal length. Side queries answer
//! −1/0/+1; queries inside the tolerance band are re-evaluated exactly over
//! the stored floating-point plane.

use nalgebra::Vector3;

use crate::geometry::exact::{ExactScalar, ExactVector};

/// A plane `{ x : normal · x = offset }` with a tolerance band.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Plane normal; not normalized unless the constructor was asked to.
    pub normal: Vector3<f64>,
    /// Signed offset along the normal.
    pub offset: f64,
    /// Half-width of the uncertainty band around `offset`.
    pub tolerance: f64,
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vector3::zeros(),
            offset: 0.0,
            tolerance: 0.0,
        }
    }
}

impl Plane {
    /// Relative tolerance applied to the squared normal length.
    pub const RELATIVE_TOLERANCE: f64 = 1e-9;

    /// Builds the plane spanned by two direction vectors through `position`.
    ///
    /// With `normalize` set, the normal is scaled to unit length and the
    /// tolerance becomes the fixed relative value.
    #[must_use]
    pub fn from_directions(
        direction_1: Vector3<f64>,
        direction_2: Vector3<f64>,
        position: Vector3<f64>,
        normalize: bool,
    ) -> Self {
        let mut normal = direction_1.cross(&direction_2);
        let mut tolerance = normal.dot(&normal) * Self::RELATIVE_TOLERANCE;
        if normalize {
            normal /= normal.norm();
            tolerance = Self::RELATIVE_TOLERANCE;
        }
        let offset = normal.dot(&position);
        Self {
            normal,
            offset,
            tolerance,
        }
    }

    /// Negates normal and offset, swapping the two half spaces.
    pub fn flip(&mut self) {
        self.normal = -self.normal;
        self.offset = -self.offset;
    }

    /// Reorients the plane so that `point` lies on the positive side.
    pub fn define_upper_side(&mut self, point: Vector3<f64>) {
        if point.dot(&self.normal) + self.tolerance < self.offset {
            self.flip();
        }
    }

    /// Returns +1 if the two points lie on the same side of the plane, −1 if
    /// they lie on different sides, and 0 if at least one lies in the plane.
    ///
    /// When either dot product lands inside the tolerance band the decision
    /// is made exactly over the stored plane coefficients.
    #[must_use]
    pub fn orientation(&self, point_1: Vector3<f64>, point_2: Vector3<f64>) -> i32 {
        let dot_1 = point_1.dot(&self.normal);
        let dot_2 = point_2.dot(&self.normal);
        if dot_1 > self.offset + self.tolerance {
            if dot_2 < self.offset - self.tolerance {
                -1
            } else if dot_2 > self.offset + self.tolerance {
                1
            } else {
                self.orientation_exact(point_1, point_2)
            }
        } else if dot_1 < self.offset - self.tolerance {
            if dot_2 > self.offset + self.tolerance {
                -1
            } else if dot_2 < self.offset - self.tolerance {
                1
            } else {
                self.orientation_exact(point_1, point_2)
            }
        } else {
            self.orientation_exact(point_1, point_2)
        }
    }

    /// Strict same-side test.
    #[must_use]
    pub fn truly_on_same_side(&self, point_1: Vector3<f64>, point_2: Vector3<f64>) -> bool {
        self.orientation(point_1, point_2) > 0
    }

    /// Strict different-side test.
    #[must_use]
    pub fn truly_on_different_sides(&self, point_1: Vector3<f64>, point_2: Vector3<f64>) -> bool {
        self.orientation(point_1, point_2) < 0
    }

    /// Non-strict same-side test (in-plane counts as same side).
    #[must_use]
    pub fn on_same_side(&self, point_1: Vector3<f64>, point_2: Vector3<f64>) -> bool {
        self.orientation(point_1, point_2) >= 0
    }

    /// Exact re-evaluation of [`Plane::orientation`] over the stored
    /// floating-point coefficients.
    #[must_use]
    pub fn orientation_exact(&self, point_1: Vector3<f64>, point_2: Vector3<f64>) -> i32 {
        let normal = ExactVector::from_f64(self.normal);
        let offset = ExactScalar::from_f64(self.offset);
        let dot_1 = normal.dot(&ExactVector::from_f64(point_1));
        let dot_2 = normal.dot(&ExactVector::from_f64(point_2));
        dot_1.compare(&offset) * dot_2.compare(&offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy_plane() -> Plane {
        Plane::from_directions(
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::zeros(),
            false,
        )
    }

    #[test]
    fn side_queries() {
        let plane = xy_plane();
        let above = Vector3::new(0.3, 0.3, 1.0);
        let below = Vector3::new(0.3, 0.3, -1.0);
        let within = Vector3::new(5.0, -2.0, 0.0);

        assert_eq!(plane.orientation(above, above), 1);
        assert_eq!(plane.orientation(above, below), -1);
        assert_eq!(plane.orientation(above, within), 0);
        assert!(plane.truly_on_same_side(below, below));
        assert!(plane.truly_on_different_sides(above, below));
        assert!(plane.on_same_side(above, within));
    }

    #[test]
    fn near_plane_points_use_exact_path() {
        let plane = xy_plane();
        // Far below the float tolerance of the plane, yet exactly signed.
        let barely_above = Vector3::new(0.0, 0.0, 1e-300);
        let barely_below = Vector3::new(0.0, 0.0, -1e-300);
        assert_eq!(plane.orientation(barely_above, barely_below), -1);
        assert_eq!(plane.orientation(barely_above, barely_above), 1);
    }

    #[test]
    fn define_upper_side_flips_when_needed() {
        let mut plane = xy_plane();
        let below = Vector3::new(0.0, 0.0, -2.0);
        plane.define_upper_side(below);
        assert!(below.dot(&plane.normal) > plane.offset);
    }
}
