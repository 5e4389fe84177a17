//! Math type re-exports and bounding volumes.

pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

/// Time value used for sample selection (seconds).
pub type Chrono = f64;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Inverted box that grows on the first expand.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    /// Smallest box containing all points, or a zero box at the origin.
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let mut bounds = Self::empty();
        for p in points {
            bounds.expand(*p);
        }
        bounds
    }

    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_from_points() {
        let b = Bounds::from_points(&[Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 1.0, -2.0)]);
        assert_eq!(b.min, Vec3::new(-1.0, 0.0, -2.0));
        assert_eq!(b.max, Vec3::new(3.0, 1.0, 2.0));
    }

    #[test]
    fn test_bounds_empty_points() {
        let b = Bounds::from_points(&[]);
        assert_eq!(b, Bounds::default());
    }
}
