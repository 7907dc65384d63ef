mod signal;

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use shape_visualiser_core::{
    AppConfig, AudioFrame, ConfigStore, FramePacing, PixmapSurface, StreamEvent, StreamHealth,
    Visualiser, VisualiserError, VisualiserOptions,
};
use tracing_subscriber::EnvFilter;

use crate::signal::SyntheticBeat;

fn main() -> shape_visualiser_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            input,
            output,
            status,
            common,
        } => run_replay(&input, &output, status.as_deref(), &common),
        Commands::Demo {
            seconds,
            bpm,
            output,
            common,
        } => run_demo(seconds, bpm, &output, &common),
    }
}

fn run_replay(
    input: &Path,
    output: &Path,
    status_path: Option<&Path>,
    common: &CommonArgs,
) -> shape_visualiser_core::Result<()> {
    tracing::info!(?input, ?output, "replaying analysis frames");

    let config = common.load_config()?;
    let options = VisualiserOptions {
        pacing: FramePacing::Manual,
        autoplay: true,
        seed: common.seed,
        ..VisualiserOptions::from_config(&config)
    };
    let mut visualiser = spawn_visualiser(&config, options)?;

    let (stream_tx, stream_rx) = crossbeam_channel::unbounded();
    visualiser.subscribe(stream_rx)?;

    let reader: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };

    let frames = forward_lines(reader, |frame| {
        stream_tx
            .send(StreamEvent::Frame(frame))
            .map_err(|_| VisualiserError::EngineStopped)
    })?;
    drop(stream_tx);

    wait_for_stream_end(&visualiser)?;
    visualiser.tick()?;
    let status = visualiser.status()?;
    tracing::info!(frames, shapes = status.shapes.len(), "replay finished");

    if let Some(path) = status_path {
        std::fs::write(path, serde_json::to_vec_pretty(&status)?)?;
    }

    let surface = visualiser.shutdown()?;
    surface.save_png(output)
}

fn run_demo(
    seconds: f32,
    bpm: f32,
    output: &Path,
    common: &CommonArgs,
) -> shape_visualiser_core::Result<()> {
    if !(bpm > 0.0) {
        return Err(VisualiserError::msg("bpm must be positive"));
    }
    let duration = demo_duration(seconds)?;
    tracing::info!(seconds, bpm, ?output, "running synthetic demo");

    let config = common.load_config()?;
    let options = VisualiserOptions {
        seed: common.seed,
        ..VisualiserOptions::from_config(&config)
    };
    let mut visualiser = spawn_visualiser(&config, options)?;

    let (stream_tx, stream_rx) = crossbeam_channel::bounded(64);
    visualiser.subscribe(stream_rx)?;

    let producer = thread::spawn(move || {
        signal::stream_for(SyntheticBeat::new(bpm), &stream_tx, duration)
    });
    let frames = producer
        .join()
        .map_err(|_| VisualiserError::msg("synthetic stream thread panicked"))?;

    wait_for_stream_end(&visualiser)?;
    // Make sure the last population is on the canvas even when paused.
    visualiser.play()?;
    visualiser.tick()?;
    let status = visualiser.status()?;
    tracing::info!(
        frames,
        drawn = status.frames_drawn,
        shapes = status.shapes.len(),
        "demo finished"
    );

    let surface = visualiser.shutdown()?;
    surface.save_png(output)
}

/// Decodes JSON-lines frames into `sink`. Blank lines are ignored and lines
/// that are not JSON objects are logged and skipped. Returns the number of
/// frames forwarded.
fn forward_lines<R, F>(reader: R, mut sink: F) -> shape_visualiser_core::Result<u64>
where
    R: BufRead,
    F: FnMut(AudioFrame) -> shape_visualiser_core::Result<()>,
{
    let mut frames = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match AudioFrame::from_json(&line) {
            Ok(frame) => {
                sink(frame)?;
                frames += 1;
            }
            Err(err) => tracing::warn!(line = index + 1, %err, "skipping unreadable frame"),
        }
    }
    Ok(frames)
}

fn demo_duration(seconds: f32) -> shape_visualiser_core::Result<Duration> {
    if !(seconds > 0.0) {
        return Err(VisualiserError::msg("seconds must be positive"));
    }
    Duration::try_from_secs_f32(seconds)
        .map_err(|err| VisualiserError::msg(format!("invalid demo length {seconds}: {err}")))
}

fn spawn_visualiser(
    config: &AppConfig,
    options: VisualiserOptions,
) -> shape_visualiser_core::Result<Visualiser<PixmapSurface>> {
    let store = Arc::new(ConfigStore::new(config.settings));
    let surface = PixmapSurface::new(config.canvas.size(), config.canvas.background);
    Visualiser::spawn(store, surface, options)
}

fn wait_for_stream_end<S>(visualiser: &Visualiser<S>) -> shape_visualiser_core::Result<()> {
    loop {
        match visualiser.status()?.stream {
            StreamHealth::Live => thread::sleep(Duration::from_millis(5)),
            StreamHealth::Failed(reason) => {
                tracing::warn!(%reason, "analysis stream failed, rendering what arrived");
                return Ok(());
            }
            StreamHealth::Ended | StreamHealth::Detached => return Ok(()),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive shape visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a recorded stream of analysis frames (one JSON object per line).
    Replay {
        /// Frame file, or `-` for stdin.
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the final canvas as PNG.
        #[arg(short, long)]
        output: PathBuf,
        /// Optional path for a JSON dump of the final engine status.
        #[arg(long)]
        status: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Drive the visualiser from a synthetic metronome.
    Demo {
        /// How long to stream for.
        #[arg(long, default_value_t = 5.0)]
        seconds: f32,
        /// Tempo of the synthetic beat.
        #[arg(long, default_value_t = 120.0)]
        bpm: f32,
        /// Where to write the last rendered frame as PNG.
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Preset file with settings, canvas and playback options.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Seed for reproducible shapes.
    #[arg(long)]
    seed: Option<u64>,
}

impl CommonArgs {
    fn load_config(&self) -> shape_visualiser_core::Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::load(path),
            None => Ok(AppConfig::default()),
        }
    }
}
