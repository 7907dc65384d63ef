//! Synthetic analysis stream used by the `demo` command.

use std::{
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;
use shape_visualiser_core::{AudioFrame, StreamEvent};

/// Samples per analysis block and the rate they are captured at.
const BLOCK_SAMPLES: u32 = 1024;
const SAMPLE_RATE: u32 = 44_100;

/// Metronome that emits one beat per period and an intensity pulse that
/// decays between beats.
#[derive(Debug, Clone)]
pub struct SyntheticBeat {
    frame_period: f32,
    beat_period: f32,
    elapsed: f32,
    next_beat: f32,
}

impl SyntheticBeat {
    pub fn new(bpm: f32) -> Self {
        Self {
            frame_period: BLOCK_SAMPLES as f32 / SAMPLE_RATE as f32,
            beat_period: 60.0 / bpm,
            elapsed: 0.0,
            next_beat: 0.0,
        }
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f32(self.frame_period)
    }
}

impl Iterator for SyntheticBeat {
    type Item = AudioFrame;

    fn next(&mut self) -> Option<AudioFrame> {
        let is_beat = self.elapsed >= self.next_beat;
        if is_beat {
            self.next_beat += self.beat_period;
        }

        let phase = (self.elapsed / self.beat_period).fract();
        let rhythm_intensity = (1.0 - phase).powi(2);
        self.elapsed += self.frame_period;

        Some(AudioFrame {
            is_beat,
            rhythm_intensity,
        })
    }
}

/// Pushes frames in real time until `duration` has passed or the consumer
/// hangs up. Returns the number of frames sent.
pub fn stream_for(source: SyntheticBeat, sink: &Sender<StreamEvent>, duration: Duration) -> u64 {
    let period = source.frame_period();
    let started = Instant::now();
    let mut sent = 0;

    for frame in source {
        if started.elapsed() >= duration {
            break;
        }
        if sink.send(StreamEvent::Frame(frame)).is_err() {
            tracing::debug!("synthetic stream consumer went away");
            break;
        }
        sent += 1;
        thread::sleep(period);
    }

    sent
}
