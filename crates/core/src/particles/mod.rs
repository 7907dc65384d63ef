use rand::{rngs::StdRng, SeedableRng};

use crate::{
    audio::AudioFrame,
    config::Settings,
    geometry::{CanvasSize, Point},
    shape::Shape,
};

/// Owner of the shape population.
///
/// Shapes are kept in spawn order (most recent last). The population bound is
/// applied on spawn only; kinetics passes remove shapes purely by lifespan.
/// Every mutating operation takes the settings snapshot it should run
/// against.
#[derive(Debug)]
pub struct ParticleSystem {
    shapes: Vec<Shape>,
    spawn_point: Point,
    rng: StdRng,
}

impl ParticleSystem {
    pub fn new(canvas: CanvasSize) -> Self {
        Self::with_rng(canvas, StdRng::from_os_rng())
    }

    /// Deterministic variant used for reproducible renders and tests.
    pub fn with_seed(canvas: CanvasSize, seed: u64) -> Self {
        Self::with_rng(canvas, StdRng::seed_from_u64(seed))
    }

    fn with_rng(canvas: CanvasSize, rng: StdRng) -> Self {
        Self {
            shapes: Vec::new(),
            spawn_point: canvas.center(),
            rng,
        }
    }

    /// Appends a new random shape at `(x, y)` and evicts the oldest shapes
    /// once the population exceeds `max_shapes`.
    pub fn spawn(&mut self, x: f32, y: f32, settings: &Settings) {
        self.shapes.push(Shape::random(Point::new(x, y), &mut self.rng));

        if self.shapes.len() > settings.max_shapes {
            let overflow = self.shapes.len() - settings.max_shapes;
            self.shapes.drain(..overflow);
            tracing::trace!(evicted = overflow, "population bound reached");
        }
    }

    /// Grows or shrinks every radius, decays every lifespan, then drops the
    /// shapes that faded out.
    pub fn apply_kinetics(&mut self, rhythm_intensity: f32, settings: &Settings) {
        for shape in &mut self.shapes {
            shape.advance(rhythm_intensity, settings.rhythm_factor, settings.decay_rate);
        }

        let before = self.shapes.len();
        self.shapes.retain(Shape::is_alive);
        let expired = before - self.shapes.len();
        if expired > 0 {
            tracing::trace!(expired, remaining = self.shapes.len(), "shapes faded out");
        }
    }

    /// Handles one analysis frame: a beat spawns at the canvas centre, then
    /// the whole population (new shape included) advances by one step.
    pub fn on_frame(&mut self, frame: &AudioFrame, settings: &Settings) {
        if frame.is_beat {
            let Point { x, y } = self.spawn_point;
            self.spawn(x, y, settings);
        }
        self.apply_kinetics(frame.rhythm_intensity, settings);
    }

    pub fn reset(&mut self) {
        self.shapes.clear();
    }

    /// Moves the spawn point to the centre of the new canvas. Existing shapes
    /// keep their positions.
    pub fn resize(&mut self, canvas: CanvasSize) {
        self.spawn_point = canvas.center();
    }

    pub fn spawn_point(&self) -> Point {
        self.spawn_point
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::shape::{INITIAL_LIFESPAN, SPAWN_RADIUS};

    const BEAT: AudioFrame = AudioFrame {
        is_beat: true,
        rhythm_intensity: 0.0,
    };

    fn system() -> ParticleSystem {
        ParticleSystem::with_seed(CanvasSize::new(800, 600), 42)
    }

    fn settings(max_shapes: usize) -> Settings {
        Settings {
            max_shapes,
            ..Settings::default()
        }
    }

    #[test]
    fn beat_frames_spawn_at_canvas_center() {
        let mut particles = system();
        let settings = Settings::default();
        particles.on_frame(&BEAT, &settings);

        assert_eq!(particles.len(), 1);
        assert_eq!(particles.shapes()[0].position(), Point::new(400.0, 300.0));
    }

    #[test]
    fn three_back_to_back_beats_fill_population() {
        let mut particles = system();
        let settings = settings(3);
        for _ in 0..3 {
            particles.spawn(400.0, 300.0, &settings);
        }

        assert_eq!(particles.len(), 3);
        for shape in particles.shapes() {
            assert_eq!(shape.lifespan(), INITIAL_LIFESPAN);
            assert_eq!(shape.radius(), SPAWN_RADIUS);
        }
    }

    #[test]
    fn spawning_past_bound_evicts_oldest_first() {
        let mut particles = system();
        let settings = settings(2);
        let mut spawned = Vec::new();
        for _ in 0..3 {
            particles.spawn(0.0, 0.0, &settings);
            spawned.push(particles.shapes().last().cloned().unwrap());
        }

        assert_eq!(particles.shapes(), &spawned[1..]);
    }

    #[test]
    fn decay_never_trims_by_count() {
        let mut particles = system();
        for _ in 0..50 {
            particles.spawn(0.0, 0.0, &settings(50));
        }

        particles.apply_kinetics(0.0, &settings(10));
        assert_eq!(particles.len(), 50);
    }

    #[test]
    fn sustained_intensity_scenario() {
        let mut particles = system();
        let settings = Settings {
            rhythm_factor: 0.05,
            decay_rate: 0.98,
            ..Settings::default()
        };
        particles.on_frame(&BEAT, &settings);

        let mut expected_radius = SPAWN_RADIUS - 1.0;
        for _ in 0..50 {
            particles.on_frame(
                &AudioFrame {
                    is_beat: false,
                    rhythm_intensity: 1.0,
                },
                &settings,
            );
            expected_radius += 1.0 * 0.05 * expected_radius - 1.0;
        }

        // The beat frame itself decays once, so 51 steps in total.
        let expected_lifespan = 255.0 * 0.98f64.powi(51);
        let shape = &particles.shapes()[0];
        assert!(
            (shape.lifespan() as f64 - expected_lifespan).abs() < 0.05,
            "lifespan {}",
            shape.lifespan()
        );
        assert!((shape.radius() - expected_radius).abs() < 1e-2);
        assert!(shape.radius() > SPAWN_RADIUS);
    }

    #[test]
    fn beat_spawn_is_aged_by_the_same_frame() {
        let mut particles = system();
        let settings = Settings::default();
        particles.on_frame(&BEAT, &settings);

        let shape = &particles.shapes()[0];
        assert!((shape.lifespan() - INITIAL_LIFESPAN * 0.98).abs() < 1e-3);
        assert!((shape.radius() - (SPAWN_RADIUS - 1.0)).abs() < 1e-5);
    }

    #[test]
    fn kinetics_use_the_snapshot_they_are_given() {
        let mut particles = system();
        particles.spawn(0.0, 0.0, &Settings::default());
        particles.apply_kinetics(
            0.0,
            &Settings {
                decay_rate: 0.5,
                ..Settings::default()
            },
        );

        assert!((particles.shapes()[0].lifespan() - 127.5).abs() < 1e-4);
    }

    #[test]
    fn reset_then_beat_starts_fresh() {
        let mut particles = system();
        let settings = Settings::default();
        for _ in 0..5 {
            particles.on_frame(&BEAT, &settings);
        }
        particles.reset();
        assert!(particles.is_empty());

        particles.spawn(1.0, 1.0, &settings);
        let shape = &particles.shapes()[0];
        assert_eq!(shape.radius(), SPAWN_RADIUS);
        assert_eq!(shape.lifespan(), INITIAL_LIFESPAN);
    }

    #[test]
    fn resize_moves_spawn_point_only() {
        let mut particles = system();
        particles.spawn(400.0, 300.0, &Settings::default());
        particles.resize(CanvasSize::new(1920, 1080));

        assert_eq!(particles.spawn_point(), Point::new(960.0, 540.0));
        assert_eq!(particles.shapes()[0].position(), Point::new(400.0, 300.0));
    }

    proptest! {
        #[test]
        fn consecutive_beats_keep_most_recent(beats in 0usize..400, max_shapes in 10usize..=200) {
            let mut particles = system();
            let settings = settings(max_shapes);
            let mut spawned = Vec::new();
            for _ in 0..beats {
                particles.spawn(400.0, 300.0, &settings);
                spawned.push(particles.shapes().last().cloned().unwrap());
            }

            let expected = beats.min(max_shapes);
            prop_assert_eq!(particles.len(), expected);
            prop_assert_eq!(particles.shapes(), &spawned[beats - expected..]);
        }

        #[test]
        fn lifespan_follows_geometric_decay(decay_rate in 0.9f32..0.999) {
            let mut particles = system();
            let settings = Settings { decay_rate, ..Settings::default() };
            particles.spawn(0.0, 0.0, &settings);

            let mut lifespan = INITIAL_LIFESPAN;
            let mut ticks = 0u32;
            loop {
                particles.apply_kinetics(0.0, &settings);
                lifespan *= decay_rate;
                ticks += 1;

                let closed_form = INITIAL_LIFESPAN as f64 * (decay_rate as f64).powi(ticks as i32);
                if lifespan <= 1.0 {
                    prop_assert!(particles.is_empty());
                    prop_assert!(closed_form <= 1.0 + 1e-3);
                    break;
                }

                prop_assert_eq!(particles.len(), 1);
                let actual = particles.shapes()[0].lifespan();
                prop_assert_eq!(actual, lifespan);
                prop_assert!((actual as f64 - closed_form).abs() / closed_form < 1e-3);
            }
        }

        #[test]
        fn radius_grows_iff_growth_outweighs_shrink(
            intensity in 0.0f32..1.0,
            rhythm_factor in 0.005f32..0.2,
            radius in 1.0f32..400.0,
        ) {
            let mut particles = system();
            let settings = Settings { rhythm_factor, ..Settings::default() };
            particles.spawn(0.0, 0.0, &settings);
            particles.shapes[0] = particles.shapes[0].clone().with_state(radius, INITIAL_LIFESPAN);

            particles.apply_kinetics(intensity, &settings);
            let next = particles.shapes()[0].radius();
            prop_assert_eq!(next, radius + (intensity * rhythm_factor * radius - 1.0));
            if intensity * rhythm_factor * radius >= 1.0 {
                prop_assert!(next >= radius);
            } else {
                prop_assert!(next <= radius);
            }
        }
    }
}
