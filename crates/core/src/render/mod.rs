//! Stateless polygon renderer and the draw-surface seam it targets.

mod pixmap;

use std::f32::consts::TAU;

use crate::{
    config::Settings,
    geometry::{CanvasSize, Point},
    shape::{Rgb, Shape, INITIAL_LIFESPAN, MAX_VERTICES},
    Result,
};

pub use pixmap::PixmapSurface;

/// Stroke width used when the configured width is zero or NaN.
pub const FALLBACK_LINE_WIDTH: f32 = 2.0;
/// Gradient strokes stay fully opaque above this lifespan.
pub const GRADIENT_OPAQUE_LIFESPAN: f32 = 180.0;
/// Lifespan divisor for the gradient fade.
pub const GRADIENT_FADE_SPAN: f32 = 120.0;
/// Gradient strokes never fade below this alpha.
pub const GRADIENT_MIN_ALPHA: f32 = 0.6;

/// Colour with a floating point alpha. Surfaces clamp alpha to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn from_rgb(rgb: Rgb, a: f32) -> Self {
        Self {
            r: rgb.r,
            g: rgb.g,
            b: rgb.b,
            a,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrokePaint {
    Solid(Rgba),
    /// Linear gradient between two points, clamped beyond either end.
    Gradient {
        start: Point,
        end: Point,
        from: Rgba,
        to: Rgba,
    },
}

/// A closed polygon outline ready to be stroked.
#[derive(Debug, Clone, Copy)]
pub struct PolygonStroke<'a> {
    pub points: &'a [Point],
    pub width: f32,
    pub paint: StrokePaint,
}

/// Target the renderer draws into.
pub trait DrawSurface {
    /// Clears the surface for a new frame. Fails with
    /// [`crate::VisualiserError::SurfaceUnavailable`] when there is nothing to
    /// draw on.
    fn begin_frame(&mut self) -> Result<()>;

    fn stroke_polygon(&mut self, stroke: &PolygonStroke<'_>) -> Result<()>;

    fn resize(&mut self, _size: CanvasSize) {}
}

/// Render parameters taken from one settings snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStyle {
    pub gradient_enabled: bool,
    pub line_width: f32,
}

impl RenderStyle {
    pub fn stroke_width(&self) -> f32 {
        if self.line_width == 0.0 || self.line_width.is_nan() {
            FALLBACK_LINE_WIDTH
        } else {
            self.line_width
        }
    }
}

impl From<&Settings> for RenderStyle {
    fn from(settings: &Settings) -> Self {
        Self {
            gradient_enabled: settings.gradient_enabled,
            line_width: settings.line_width,
        }
    }
}

/// Draws a population snapshot. Holds no state between frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    /// Clears the surface and strokes every shape in population order, so
    /// later shapes land on top. Returns the number of shapes drawn.
    pub fn draw_frame<S>(&self, shapes: &[Shape], style: RenderStyle, surface: &mut S) -> Result<usize>
    where
        S: DrawSurface + ?Sized,
    {
        surface.begin_frame()?;

        let width = style.stroke_width();
        let mut points = Vec::with_capacity(MAX_VERTICES as usize);
        for shape in shapes {
            fill_polygon_points(shape, &mut points);
            surface.stroke_polygon(&PolygonStroke {
                points: &points,
                width,
                paint: stroke_paint(shape, style.gradient_enabled),
            })?;
        }

        Ok(shapes.len())
    }
}

/// Vertices evenly spaced on the shape's circle, starting at angle zero.
pub fn polygon_points(shape: &Shape) -> Vec<Point> {
    let mut points = Vec::with_capacity(shape.vertex_count() as usize);
    fill_polygon_points(shape, &mut points);
    points
}

fn fill_polygon_points(shape: &Shape, points: &mut Vec<Point>) {
    points.clear();
    let center = shape.position();
    let radius = shape.radius();
    let count = shape.vertex_count() as usize;
    points.extend((0..count).map(|i| {
        let angle = TAU * i as f32 / count as f32;
        Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
    }));
}

pub fn stroke_paint(shape: &Shape, gradient_enabled: bool) -> StrokePaint {
    let lifespan = shape.lifespan();
    if !gradient_enabled {
        return StrokePaint::Solid(Rgba::from_rgb(shape.primary_color(), solid_alpha(lifespan)));
    }

    let alpha = gradient_alpha(lifespan);
    let center = shape.position();
    let radius = shape.radius();
    StrokePaint::Gradient {
        start: Point::new(center.x - radius, center.y),
        end: Point::new(center.x + radius, center.y),
        from: Rgba::from_rgb(shape.primary_color(), alpha),
        to: Rgba::from_rgb(shape.secondary_color(), alpha),
    }
}

pub fn solid_alpha(lifespan: f32) -> f32 {
    lifespan / INITIAL_LIFESPAN
}

pub fn gradient_alpha(lifespan: f32) -> f32 {
    if lifespan > GRADIENT_OPAQUE_LIFESPAN {
        1.0
    } else {
        (lifespan / GRADIENT_FADE_SPAN).max(GRADIENT_MIN_ALPHA)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::VisualiserError;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct RecordedStroke {
        pub points: Vec<Point>,
        pub width: f32,
        pub paint: StrokePaint,
    }

    /// Surface double that keeps every completed frame.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSurface {
        pub frames: Vec<Vec<RecordedStroke>>,
        pub unavailable: bool,
        pub resized_to: Option<CanvasSize>,
    }

    impl DrawSurface for RecordingSurface {
        fn begin_frame(&mut self) -> Result<()> {
            if self.unavailable {
                return Err(VisualiserError::SurfaceUnavailable);
            }
            self.frames.push(Vec::new());
            Ok(())
        }

        fn stroke_polygon(&mut self, stroke: &PolygonStroke<'_>) -> Result<()> {
            let frame = self
                .frames
                .last_mut()
                .ok_or(VisualiserError::SurfaceUnavailable)?;
            frame.push(RecordedStroke {
                points: stroke.points.to_vec(),
                width: stroke.width,
                paint: stroke.paint,
            });
            Ok(())
        }

        fn resize(&mut self, size: CanvasSize) {
            self.resized_to = Some(size);
        }
    }
}
