use std::path::Path;

use tiny_skia::{
    Color, GradientStop, LinearGradient, Paint, PathBuilder, Pixmap, Shader, SpreadMode, Stroke,
    Transform,
};

use super::{DrawSurface, PolygonStroke, Rgba, StrokePaint};
use crate::{
    geometry::{CanvasSize, Point},
    shape::Rgb,
    Result, VisualiserError,
};

/// CPU raster surface backed by a `tiny-skia` pixmap.
///
/// A zero-sized canvas has no pixmap; frames drawn while in that state fail
/// with [`VisualiserError::SurfaceUnavailable`].
pub struct PixmapSurface {
    pixmap: Option<Pixmap>,
    background: Rgb,
}

impl PixmapSurface {
    pub fn new(size: CanvasSize, background: Rgb) -> Self {
        Self {
            pixmap: Pixmap::new(size.width, size.height),
            background,
        }
    }

    pub fn is_available(&self) -> bool {
        self.pixmap.is_some()
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    pub fn size(&self) -> Option<CanvasSize> {
        self.pixmap
            .as_ref()
            .map(|pixmap| CanvasSize::new(pixmap.width(), pixmap.height()))
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let pixmap = self
            .pixmap
            .as_ref()
            .ok_or(VisualiserError::SurfaceUnavailable)?;
        pixmap
            .save_png(path)
            .map_err(|err| VisualiserError::msg(format!("failed to write {}: {err}", path.display())))
    }

    fn target(&mut self) -> Result<&mut Pixmap> {
        self.pixmap.as_mut().ok_or(VisualiserError::SurfaceUnavailable)
    }
}

impl DrawSurface for PixmapSurface {
    fn begin_frame(&mut self) -> Result<()> {
        let Rgb { r, g, b } = self.background;
        self.target()?.fill(Color::from_rgba8(r, g, b, 255));
        Ok(())
    }

    fn stroke_polygon(&mut self, stroke: &PolygonStroke<'_>) -> Result<()> {
        let pixmap = self.target()?;
        // Collapsed polygons (e.g. radius zero) have no outline to stroke.
        let Some(path) = closed_path(stroke.points) else {
            return Ok(());
        };

        let paint = Paint {
            shader: shader(&stroke.paint),
            anti_alias: true,
            ..Paint::default()
        };
        let style = Stroke {
            width: stroke.width,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint, &style, Transform::identity(), None);
        Ok(())
    }

    fn resize(&mut self, size: CanvasSize) {
        self.pixmap = Pixmap::new(size.width, size.height);
        if self.pixmap.is_none() {
            tracing::debug!(width = size.width, height = size.height, "surface collapsed");
        }
    }
}

impl std::fmt::Debug for PixmapSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixmapSurface")
            .field("size", &self.size())
            .field("background", &self.background)
            .finish()
    }
}

fn closed_path(points: &[Point]) -> Option<tiny_skia::Path> {
    let (first, rest) = points.split_first()?;
    let mut builder = PathBuilder::new();
    builder.move_to(first.x, first.y);
    for point in rest {
        builder.line_to(point.x, point.y);
    }
    builder.close();
    builder.finish()
}

fn shader(paint: &StrokePaint) -> Shader<'static> {
    match *paint {
        StrokePaint::Solid(color) => Shader::SolidColor(to_color(color)),
        StrokePaint::Gradient {
            start,
            end,
            from,
            to,
        } => LinearGradient::new(
            tiny_skia::Point::from_xy(start.x, start.y),
            tiny_skia::Point::from_xy(end.x, end.y),
            vec![
                GradientStop::new(0.0, to_color(from)),
                GradientStop::new(1.0, to_color(to)),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        )
        .unwrap_or(Shader::SolidColor(to_color(from))),
    }
}

fn to_color(color: Rgba) -> Color {
    let alpha = (color.a.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color::from_rgba8(color.r, color.g, color.b, alpha)
}
