use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{geometry::Point, Result, VisualiserError};

/// Radius every shape starts with.
pub const SPAWN_RADIUS: f32 = 30.0;
/// Lifespan every shape starts with. Doubles as the solid-mode alpha scale.
pub const INITIAL_LIFESPAN: f32 = 255.0;
/// Shapes at or below this lifespan are dropped after a kinetics pass.
pub const REMOVAL_THRESHOLD: f32 = 1.0;
pub const MIN_VERTICES: u8 = 3;
pub const MAX_VERTICES: u8 = 10;

/// 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::new(rng.random(), rng.random(), rng.random())
    }
}

/// A single polygon particle.
///
/// Position, vertex count and both colours are fixed at creation; only the
/// particle system advances `radius` and `lifespan`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    position: Point,
    radius: f32,
    vertex_count: u8,
    primary_color: Rgb,
    secondary_color: Rgb,
    lifespan: f32,
}

impl Shape {
    /// Builds a freshly spawned shape with explicit attributes.
    pub fn new(position: Point, vertex_count: u8, primary: Rgb, secondary: Rgb) -> Result<Self> {
        if !(MIN_VERTICES..=MAX_VERTICES).contains(&vertex_count) {
            return Err(VisualiserError::InvalidVertexCount(vertex_count));
        }

        Ok(Self {
            position,
            radius: SPAWN_RADIUS,
            vertex_count,
            primary_color: primary,
            secondary_color: secondary,
            lifespan: INITIAL_LIFESPAN,
        })
    }

    /// Builds a freshly spawned shape with a random polygon and palette.
    pub fn random<R: Rng>(position: Point, rng: &mut R) -> Self {
        Self {
            position,
            radius: SPAWN_RADIUS,
            vertex_count: rng.random_range(MIN_VERTICES..=MAX_VERTICES),
            primary_color: Rgb::random(rng),
            secondary_color: Rgb::random(rng),
            lifespan: INITIAL_LIFESPAN,
        }
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn vertex_count(&self) -> u8 {
        self.vertex_count
    }

    pub fn primary_color(&self) -> Rgb {
        self.primary_color
    }

    pub fn secondary_color(&self) -> Rgb {
        self.secondary_color
    }

    pub fn lifespan(&self) -> f32 {
        self.lifespan
    }

    pub fn is_alive(&self) -> bool {
        self.lifespan > REMOVAL_THRESHOLD
    }

    /// One kinetics step. The radius is not clamped and turns negative once
    /// the constant shrink outweighs growth.
    pub(crate) fn advance(&mut self, intensity: f32, rhythm_factor: f32, decay_rate: f32) {
        self.radius += intensity * rhythm_factor * self.radius - 1.0;
        self.lifespan *= decay_rate;
    }

    #[cfg(test)]
    pub(crate) fn with_state(mut self, radius: f32, lifespan: f32) -> Self {
        self.radius = radius;
        self.lifespan = lifespan;
        self
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn random_shapes_stay_within_vertex_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let shape = Shape::random(Point::new(1.0, 2.0), &mut rng);
            assert!((MIN_VERTICES..=MAX_VERTICES).contains(&shape.vertex_count()));
            assert_eq!(shape.radius(), SPAWN_RADIUS);
            assert_eq!(shape.lifespan(), INITIAL_LIFESPAN);
            assert_eq!(shape.position(), Point::new(1.0, 2.0));
        }
    }

    #[test]
    fn rejects_out_of_range_vertex_counts() {
        let err = Shape::new(Point::default(), 2, Rgb::default(), Rgb::default()).unwrap_err();
        assert!(matches!(err, VisualiserError::InvalidVertexCount(2)));
        assert!(Shape::new(Point::default(), 11, Rgb::default(), Rgb::default()).is_err());
        assert!(Shape::new(Point::default(), 10, Rgb::default(), Rgb::default()).is_ok());
    }

    #[test]
    fn advance_grows_and_decays() {
        let mut shape = Shape::new(Point::default(), 5, Rgb::default(), Rgb::default()).unwrap();
        shape.advance(1.0, 0.05, 0.5);

        assert!((shape.radius() - 30.5).abs() < 1e-5);
        assert!((shape.lifespan() - 127.5).abs() < 1e-5);
    }

    #[test]
    fn radius_can_go_negative_without_intensity() {
        let mut shape = Shape::new(Point::default(), 3, Rgb::default(), Rgb::default())
            .unwrap()
            .with_state(0.5, 200.0);
        shape.advance(0.0, 0.05, 0.98);
        assert!(shape.radius() < 0.0);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let shape = Shape::new(Point::new(4.0, 5.0), 6, Rgb::new(1, 2, 3), Rgb::new(4, 5, 6)).unwrap();
        let json = serde_json::to_value(&shape).unwrap();
        assert_eq!(json["vertexCount"], 6);
        assert_eq!(json["primaryColor"]["g"], 2);
        assert_eq!(json["lifespan"], 255.0);
    }
}
