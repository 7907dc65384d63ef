use std::{
    path::Path,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{geometry::CanvasSize, shape::Rgb, Result, VisualiserError};

/// Top-level configuration structure for the application, loadable from a
/// JSON preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub settings: Settings,
    pub canvas: CanvasConfig,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    /// Parses a preset and rejects settings outside the documented ranges.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.settings.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        tracing::debug!(path = %path.display(), "loaded preset");
        Ok(config)
    }
}

/// User-tunable parameters read by the particle system and the renderer.
///
/// The core never clamps these; keeping writes inside the documented bounds is
/// the writer's job (see [`Settings::validate`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Scales how strongly rhythm intensity grows the radius, `[0.005, 0.2]`.
    pub rhythm_factor: f32,
    /// Per-frame lifespan multiplier, `[0.9, 0.999]`.
    pub decay_rate: f32,
    /// Population bound applied when spawning, `[10, 200]`.
    pub max_shapes: usize,
    /// Stroke width in pixels, `[1, 20]`.
    pub line_width: f32,
    pub gradient_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rhythm_factor: 0.05,
            decay_rate: 0.98,
            max_shapes: 50,
            line_width: 2.0,
            gradient_enabled: false,
        }
    }
}

impl Settings {
    pub const RHYTHM_FACTOR_RANGE: (f32, f32) = (0.005, 0.2);
    pub const DECAY_RATE_RANGE: (f32, f32) = (0.9, 0.999);
    pub const MAX_SHAPES_RANGE: (usize, usize) = (10, 200);
    pub const LINE_WIDTH_RANGE: (f32, f32) = (1.0, 20.0);

    /// Checks every field against the bounds exposed by the settings surface.
    pub fn validate(&self) -> Result<()> {
        check_range(
            "rhythmFactor",
            self.rhythm_factor as f64,
            Self::RHYTHM_FACTOR_RANGE.0 as f64,
            Self::RHYTHM_FACTOR_RANGE.1 as f64,
        )?;
        check_range(
            "decayRate",
            self.decay_rate as f64,
            Self::DECAY_RATE_RANGE.0 as f64,
            Self::DECAY_RATE_RANGE.1 as f64,
        )?;
        check_range(
            "maxShapes",
            self.max_shapes as f64,
            Self::MAX_SHAPES_RANGE.0 as f64,
            Self::MAX_SHAPES_RANGE.1 as f64,
        )?;
        check_range(
            "lineWidth",
            self.line_width as f64,
            Self::LINE_WIDTH_RANGE.0 as f64,
            Self::LINE_WIDTH_RANGE.1 as f64,
        )
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    // Written so that NaN fails as well.
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(VisualiserError::InvalidSetting {
            field,
            value,
            min,
            max,
        })
    }
}

/// Drawable area and the colour it is cleared to each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub background: Rgb,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        let size = CanvasSize::default();
        Self {
            width: size.width,
            height: size.height,
            background: Rgb::new(17, 24, 39),
        }
    }
}

impl CanvasConfig {
    pub fn size(&self) -> CanvasSize {
        CanvasSize::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackConfig {
    /// Start in the running state.
    pub autoplay: bool,
    /// Render ticks per second; `0` leaves ticking entirely to the host.
    pub frame_rate: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            autoplay: true,
            frame_rate: 60,
        }
    }
}

impl PlaybackConfig {
    pub fn frame_interval(&self) -> Option<Duration> {
        (self.frame_rate > 0).then(|| Duration::from_secs_f64(1.0 / self.frame_rate as f64))
    }
}

/// Shared, externally written settings.
///
/// Readers take a copy with [`ConfigStore::snapshot`] once per operation, so a
/// single kinetics or render pass never observes two values of a field.
#[derive(Debug, Default)]
pub struct ConfigStore {
    settings: RwLock<Settings>,
}

impl ConfigStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn snapshot(&self) -> Settings {
        // Settings are plain values, so a writer that panicked mid-update
        // still leaves a usable copy behind.
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replace(&self, settings: Settings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut *guard);
    }
}
