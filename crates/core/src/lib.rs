//! Core library for the Shape Visualiser application.
//!
//! Analysis frames (beat flag + rhythm intensity) spawn and evolve a bounded
//! population of polygon shapes, and a frame-paced renderer draws whatever
//! population currently exists. Each module owns one subsystem; the
//! [`engine`] ties them together behind a single-owner worker thread.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod particles;
pub mod render;
pub mod scheduler;
pub mod shape;

pub use audio::{AudioFrame, Delivery, FrameSubscription, StreamEvent};
pub use config::{AppConfig, CanvasConfig, ConfigStore, PlaybackConfig, Settings};
pub use engine::{EngineStatus, StreamHealth, Visualiser, VisualiserOptions};
pub use error::{Result, VisualiserError};
pub use geometry::{CanvasSize, Point};
pub use particles::ParticleSystem;
pub use render::{DrawSurface, PixmapSurface, PolygonStroke, RenderStyle, Renderer, Rgba, StrokePaint};
pub use scheduler::{AnimationScheduler, FramePacing, FrameRequest, PlaybackState, TickOutcome};
pub use shape::{Rgb, Shape};
