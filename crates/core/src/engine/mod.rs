//! Single-owner visualiser engine.
//!
//! A worker thread owns the population, the scheduler and the draw surface.
//! Analysis frames, render ticks, play/pause, resets and resizes all reach it
//! through one FIFO command queue, so frame handling and drawing never overlap
//! and every reset is a distinct, ordered event.

use std::{
    ops::ControlFlow,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Instant,
};

use crossbeam_channel::{bounded, never, select, tick, unbounded, Receiver, Sender};
use serde::Serialize;

use crate::{
    audio::{AudioFrame, Delivery, FrameSubscription, StreamEvent},
    config::{AppConfig, ConfigStore},
    geometry::{CanvasSize, Point},
    particles::ParticleSystem,
    render::{DrawSurface, Renderer},
    scheduler::{AnimationScheduler, FramePacing, PlaybackState, TickOutcome},
    shape::Shape,
    Result, VisualiserError,
};

/// Startup parameters for [`Visualiser::spawn`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualiserOptions {
    pub canvas: CanvasSize,
    pub pacing: FramePacing,
    pub autoplay: bool,
    /// Seeds shape randomisation for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for VisualiserOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl VisualiserOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            canvas: config.canvas.size(),
            pacing: FramePacing::from(&config.playback),
            autoplay: config.playback.autoplay,
            seed: None,
        }
    }
}

/// Health of the attached analysis stream as last reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum StreamHealth {
    Detached,
    Live,
    /// The producer hung up. The population stays frozen as it was.
    Ended,
    /// The producer reported an error. The population stays frozen as it was.
    Failed(String),
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: PlaybackState,
    pub shapes: Vec<Shape>,
    pub spawn_point: Point,
    pub frames_received: u64,
    pub frames_drawn: u64,
    pub frames_skipped: u64,
    pub resets: u64,
    pub stream: StreamHealth,
}

enum Command {
    Frame(AudioFrame),
    StreamAttached,
    StreamFailed(String),
    StreamEnded,
    StreamDetached,
    Tick,
    Play,
    Pause,
    Reset,
    Resize(CanvasSize),
    Status(Sender<EngineStatus>),
    Shutdown,
}

impl From<Delivery> for Command {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Frame(frame) => Command::Frame(frame),
            Delivery::Failed(reason) => Command::StreamFailed(reason),
            Delivery::Ended => Command::StreamEnded,
        }
    }
}

type Deliver = Box<dyn FnMut(Delivery) -> Result<()> + Send>;

/// Handle to a running engine.
///
/// Dropping the handle detaches the stream and stops the worker; use
/// [`Visualiser::shutdown`] to get the draw surface back.
pub struct Visualiser<S> {
    commands: Sender<Command>,
    worker: Option<JoinHandle<S>>,
    subscription: Option<FrameSubscription>,
    config: Arc<ConfigStore>,
}

impl<S> Visualiser<S>
where
    S: DrawSurface + Send + 'static,
{
    pub fn spawn(config: Arc<ConfigStore>, surface: S, options: VisualiserOptions) -> Result<Self> {
        let (commands, inbox) = unbounded();
        let particles = match options.seed {
            Some(seed) => ParticleSystem::with_seed(options.canvas, seed),
            None => ParticleSystem::new(options.canvas),
        };
        let state = if options.autoplay {
            PlaybackState::Running
        } else {
            PlaybackState::Stopped
        };

        let mut worker = Worker {
            inbox,
            ticker: never(),
            config: config.clone(),
            particles,
            scheduler: AnimationScheduler::new(state),
            renderer: Renderer::new(),
            surface,
            pacing: options.pacing,
            frames_received: 0,
            resets: 0,
            stream: StreamHealth::Detached,
        };
        worker.sync_ticker();

        let worker = thread::Builder::new()
            .name("visualiser".to_string())
            .spawn(move || worker.run())?;

        tracing::info!(
            width = options.canvas.width,
            height = options.canvas.height,
            pacing = ?options.pacing,
            ?state,
            "visualiser started"
        );

        Ok(Self {
            commands,
            worker: Some(worker),
            subscription: None,
            config,
        })
    }
}

impl<S> Visualiser<S> {
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Attaches to an analysis stream, replacing any previous subscription.
    pub fn subscribe(&mut self, stream: Receiver<StreamEvent>) -> Result<()> {
        self.subscribe_with(move |deliver| FrameSubscription::attach(stream, deliver))
    }

    fn subscribe_with<A>(&mut self, attach: A) -> Result<()>
    where
        A: FnOnce(Deliver) -> Result<FrameSubscription>,
    {
        self.unsubscribe()?;
        // Queued ahead of anything the forwarder delivers, so a short stream
        // cannot end before it is marked live.
        self.send(Command::StreamAttached)?;

        let sink = self.commands.clone();
        let deliver: Deliver = Box::new(move |delivery: Delivery| {
            sink.send(Command::from(delivery))
                .map_err(|_| VisualiserError::EngineStopped)
        });
        match attach(deliver) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "failed to attach analysis stream");
                self.send(Command::StreamDetached)?;
                Err(err)
            }
        }
    }

    /// Detaches from the current stream, if any. Returns once the forwarder
    /// has exited.
    pub fn unsubscribe(&mut self) -> Result<()> {
        if self.detach_stream()? {
            self.send(Command::StreamDetached)?;
        }
        Ok(())
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .map(FrameSubscription::is_attached)
            .unwrap_or(false)
    }

    /// Feeds a frame directly, bypassing any stream.
    pub fn push_frame(&self, frame: AudioFrame) -> Result<()> {
        self.send(Command::Frame(frame))
    }

    /// Host-driven render tick.
    pub fn tick(&self) -> Result<()> {
        self.send(Command::Tick)
    }

    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// One-shot population reset.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    pub fn resize(&self, size: CanvasSize) -> Result<()> {
        self.send(Command::Resize(size))
    }

    /// Queries the worker. Every command sent before this call has been
    /// handled by the time the status is returned.
    pub fn status(&self) -> Result<EngineStatus> {
        let (reply, status) = bounded(1);
        self.send(Command::Status(reply))?;
        status.recv().map_err(|_| VisualiserError::EngineStopped)
    }

    /// Detaches from the stream, stops the worker and hands back the surface.
    pub fn shutdown(mut self) -> Result<S> {
        self.detach_stream()?;
        self.stop_worker()?.ok_or(VisualiserError::EngineStopped)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| VisualiserError::EngineStopped)
    }

    fn detach_stream(&mut self) -> Result<bool> {
        match self.subscription.take() {
            Some(subscription) => {
                subscription.detach()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn stop_worker(&mut self) -> Result<Option<S>> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        // The worker may already be gone; joining still reaps it.
        let _ = self.commands.send(Command::Shutdown);
        let surface = worker
            .join()
            .map_err(|_| VisualiserError::msg("visualiser worker panicked"))?;
        tracing::info!("visualiser stopped");
        Ok(Some(surface))
    }
}

impl<S> Drop for Visualiser<S> {
    fn drop(&mut self) {
        if let Err(err) = self.detach_stream() {
            tracing::warn!(%err, "failed to detach analysis stream");
        }
        if let Err(err) = self.stop_worker() {
            tracing::warn!(%err, "failed to stop visualiser worker");
        }
    }
}

impl<S> std::fmt::Debug for Visualiser<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualiser")
            .field("running", &self.worker.is_some())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

struct Worker<S> {
    inbox: Receiver<Command>,
    ticker: Receiver<Instant>,
    config: Arc<ConfigStore>,
    particles: ParticleSystem,
    scheduler: AnimationScheduler,
    renderer: Renderer,
    surface: S,
    pacing: FramePacing,
    frames_received: u64,
    resets: u64,
    stream: StreamHealth,
}

impl<S: DrawSurface> Worker<S> {
    fn run(mut self) -> S {
        loop {
            let inbox = self.inbox.clone();
            let ticker = self.ticker.clone();
            let flow = select! {
                recv(inbox) -> command => match command {
                    Ok(command) => self.handle(command),
                    Err(_) => ControlFlow::Break(()),
                },
                recv(ticker) -> _ => {
                    self.render();
                    ControlFlow::Continue(())
                }
            };
            if flow.is_break() {
                break;
            }
        }

        tracing::debug!(
            frames_received = self.frames_received,
            frames_drawn = self.scheduler.frames_drawn(),
            "visualiser worker exiting"
        );
        self.surface
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Frame(frame) => {
                let settings = self.config.snapshot();
                self.particles.on_frame(&frame, &settings);
                self.frames_received += 1;
                tracing::trace!(
                    beat = frame.is_beat,
                    intensity = frame.rhythm_intensity,
                    shapes = self.particles.len(),
                    "frame applied"
                );
            }
            Command::StreamAttached => self.stream = StreamHealth::Live,
            Command::StreamFailed(reason) => {
                tracing::warn!(%reason, "analysis stream failed, holding current shapes");
                self.stream = StreamHealth::Failed(reason);
            }
            Command::StreamEnded => {
                tracing::warn!("analysis stream ended, holding current shapes");
                self.stream = StreamHealth::Ended;
            }
            Command::StreamDetached => self.stream = StreamHealth::Detached,
            Command::Tick => self.render(),
            Command::Play => {
                if self.scheduler.play() {
                    self.sync_ticker();
                }
            }
            Command::Pause => {
                if self.scheduler.pause() {
                    self.sync_ticker();
                }
            }
            Command::Reset => {
                self.scheduler.reset(&mut self.particles);
                self.resets += 1;
            }
            Command::Resize(size) => {
                self.particles.resize(size);
                self.surface.resize(size);
                tracing::debug!(width = size.width, height = size.height, "canvas resized");
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn render(&mut self) {
        let settings = self.config.snapshot();
        let outcome = self.scheduler.tick(
            &self.particles,
            &settings,
            &self.renderer,
            &mut self.surface,
        );
        match outcome {
            TickOutcome::Skipped(VisualiserError::SurfaceUnavailable) => {
                tracing::debug!("surface unavailable, frame skipped");
            }
            TickOutcome::Skipped(err) => tracing::warn!(%err, "frame skipped"),
            TickOutcome::Drawn(_) | TickOutcome::Idle => {}
        }
    }

    /// Self-paced ticking only runs while playing; pausing swaps in a channel
    /// that never fires.
    fn sync_ticker(&mut self) {
        self.ticker = match self.pacing {
            FramePacing::Fixed(interval) if self.scheduler.is_running() => tick(interval),
            _ => never(),
        };
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.scheduler.state(),
            shapes: self.particles.shapes().to_vec(),
            spawn_point: self.particles.spawn_point(),
            frames_received: self.frames_received,
            frames_drawn: self.scheduler.frames_drawn(),
            frames_skipped: self.scheduler.frames_skipped(),
            resets: self.resets,
            stream: self.stream.clone(),
        }
    }
}
