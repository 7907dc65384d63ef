use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    config::{PlaybackConfig, Settings},
    particles::ParticleSystem,
    render::{DrawSurface, RenderStyle, Renderer},
    VisualiserError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Stopped,
    Running,
}

/// Handle for a render that has been asked for but not yet performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest(u64);

/// Where render ticks come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePacing {
    /// The engine ticks itself at a fixed interval while running.
    Fixed(Duration),
    /// Only explicit host ticks render.
    Manual,
}

impl From<&PlaybackConfig> for FramePacing {
    fn from(config: &PlaybackConfig) -> Self {
        config
            .frame_interval()
            .map(FramePacing::Fixed)
            .unwrap_or(FramePacing::Manual)
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    /// A frame was drawn with this many shapes.
    Drawn(usize),
    /// Stopped, or no render was pending.
    Idle,
    /// The draw was abandoned; the scheduler keeps ticking.
    Skipped(VisualiserError),
}

/// Play/pause state machine that owns the render cadence.
///
/// While running there is always exactly one pending [`FrameRequest`]; a tick
/// consumes it, draws, and requests the next one. Pausing drops the pending
/// request so no draw can sneak in until playback resumes. Kinetics never run
/// here: they advance only when analysis frames arrive.
#[derive(Debug)]
pub struct AnimationScheduler {
    state: PlaybackState,
    pending: Option<FrameRequest>,
    next_request: u64,
    frames_drawn: u64,
    frames_skipped: u64,
}

impl Default for AnimationScheduler {
    fn default() -> Self {
        Self::new(PlaybackState::Stopped)
    }
}

impl AnimationScheduler {
    pub fn new(state: PlaybackState) -> Self {
        let mut scheduler = Self {
            state: PlaybackState::Stopped,
            pending: None,
            next_request: 0,
            frames_drawn: 0,
            frames_skipped: 0,
        };
        if state == PlaybackState::Running {
            scheduler.play();
        }
        scheduler
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PlaybackState::Running
    }

    pub fn pending_request(&self) -> Option<FrameRequest> {
        self.pending
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Stopped → Running. Returns whether the state changed.
    pub fn play(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = PlaybackState::Running;
        self.pending = Some(self.request_frame());
        tracing::debug!("playback started");
        true
    }

    /// Running → Stopped, cancelling the pending render. Returns whether the
    /// state changed.
    pub fn pause(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state = PlaybackState::Stopped;
        if let Some(request) = self.pending.take() {
            tracing::trace!(?request, "cancelled pending render");
        }
        tracing::debug!("playback paused");
        true
    }

    /// Empties the population without touching the playback state.
    pub fn reset(&self, particles: &mut ParticleSystem) {
        let cleared = particles.len();
        particles.reset();
        tracing::debug!(cleared, state = ?self.state, "population reset");
    }

    /// Handles one host frame tick.
    pub fn tick<S>(
        &mut self,
        particles: &ParticleSystem,
        settings: &Settings,
        renderer: &Renderer,
        surface: &mut S,
    ) -> TickOutcome
    where
        S: DrawSurface + ?Sized,
    {
        let Some(request) = self.pending.take() else {
            return TickOutcome::Idle;
        };
        // Queue the follow-up first so a failed draw does not stall the loop.
        self.pending = Some(self.request_frame());

        match renderer.draw_frame(particles.shapes(), RenderStyle::from(settings), surface) {
            Ok(shapes) => {
                self.frames_drawn += 1;
                tracing::trace!(?request, shapes, "frame drawn");
                TickOutcome::Drawn(shapes)
            }
            Err(err) => {
                self.frames_skipped += 1;
                TickOutcome::Skipped(err)
            }
        }
    }

    fn request_frame(&mut self) -> FrameRequest {
        self.next_request += 1;
        FrameRequest(self.next_request)
    }
}
