use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Result, VisualiserError};

/// Per-frame analysis result pushed by the audio backend.
///
/// Missing, `null` or mistyped fields decode to their defaults (`false` /
/// `0.0`) and loosely typed values are coerced (`1` is a beat, `"0.5"` is an
/// intensity), so a malformed frame still advances the simulation. Both the camelCase schema
/// and the backend's snake_case payload (`is_beat` / `rhythm_factor`) are
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFrame {
    #[serde(
        rename = "isBeat",
        alias = "is_beat",
        deserialize_with = "lenient_bool"
    )]
    pub is_beat: bool,
    #[serde(
        rename = "rhythmIntensity",
        alias = "rhythm_intensity",
        alias = "rhythm_factor",
        deserialize_with = "lenient_f32"
    )]
    pub rhythm_intensity: f32,
}

impl AudioFrame {
    pub const fn beat(rhythm_intensity: f32) -> Self {
        Self {
            is_beat: true,
            rhythm_intensity,
        }
    }

    pub const fn quiet(rhythm_intensity: f32) -> Self {
        Self {
            is_beat: false,
            rhythm_intensity,
        }
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn lenient_f32<'de, D>(deserializer: D) -> std::result::Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if flag { 1.0 } else { 0.0 }),
        _ => None,
    };
    Ok(value
        .map(|n| n as f32)
        .filter(|n| n.is_finite())
        .unwrap_or_default())
}

/// Item carried by an inbound analysis stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Frame(AudioFrame),
    /// The producer reported an error. Forwarding stops here and anything
    /// sent afterwards is ignored.
    Failed(String),
}

/// What a subscription hands to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Frame(AudioFrame),
    Failed(String),
    /// The producer hung up; nothing further will arrive.
    Ended,
}

/// Live attachment to an analysis stream.
///
/// A dedicated forwarder thread pulls events in arrival order and hands them
/// one at a time to the consumer callback. Nothing is filtered or buffered
/// beyond the channel itself. Detaching (explicitly or on drop) blocks until
/// the forwarder has exited.
#[derive(Debug)]
pub struct FrameSubscription {
    stop: Option<Sender<()>>,
    forwarder: Option<JoinHandle<()>>,
}

impl FrameSubscription {
    /// Starts forwarding `stream` into `deliver`. Forwarding stops when the
    /// subscription is detached, the stream fails or disconnects, or `deliver`
    /// returns an error.
    pub fn attach<F>(stream: Receiver<StreamEvent>, deliver: F) -> Result<Self>
    where
        F: FnMut(Delivery) -> Result<()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let forwarder = thread::Builder::new()
            .name("frame-subscription".to_string())
            .spawn(move || forward(stream, stop_rx, deliver))?;

        tracing::debug!("attached to analysis stream");
        Ok(Self {
            stop: Some(stop_tx),
            forwarder: Some(forwarder),
        })
    }

    pub fn is_attached(&self) -> bool {
        self.forwarder
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stops forwarding and waits for the forwarder thread to exit.
    pub fn detach(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        // Dropping the sender wakes the forwarder's stop branch.
        self.stop.take();
        match self.forwarder.take() {
            Some(handle) => {
                handle
                    .join()
                    .map_err(|_| VisualiserError::msg("frame subscription thread panicked"))?;
                tracing::debug!("detached from analysis stream");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(%err, "failed to detach frame subscription cleanly");
        }
    }
}

fn forward<F>(stream: Receiver<StreamEvent>, stop: Receiver<()>, mut deliver: F)
where
    F: FnMut(Delivery) -> Result<()>,
{
    loop {
        select! {
            recv(stop) -> _ => return,
            recv(stream) -> event => {
                let frame = match event {
                    Ok(StreamEvent::Frame(frame)) => frame,
                    Ok(StreamEvent::Failed(reason)) => {
                        tracing::debug!(%reason, "analysis stream failed, forwarding stopped");
                        let _ = deliver(Delivery::Failed(reason));
                        return;
                    }
                    Err(_) => {
                        let _ = deliver(Delivery::Ended);
                        return;
                    }
                };

                if let Err(err) = deliver(Delivery::Frame(frame)) {
                    tracing::debug!(%err, "frame consumer went away");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use super::*;

    #[test]
    fn decodes_both_field_spellings() {
        let camel = AudioFrame::from_json(r#"{"isBeat": true, "rhythmIntensity": 0.4}"#).unwrap();
        let backend = AudioFrame::from_json(r#"{"is_beat": true, "rhythm_factor": 0.4}"#).unwrap();

        assert_eq!(camel, AudioFrame::beat(0.4));
        assert_eq!(backend, camel);
    }

    #[test]
    fn missing_or_null_fields_default() {
        assert_eq!(AudioFrame::from_json("{}").unwrap(), AudioFrame::quiet(0.0));
        assert_eq!(
            AudioFrame::from_json(r#"{"isBeat": null, "rhythmIntensity": 0.7}"#).unwrap(),
            AudioFrame::quiet(0.7)
        );
        assert_eq!(
            AudioFrame::from_json(r#"{"is_beat": true}"#).unwrap(),
            AudioFrame::beat(0.0)
        );
    }

    #[test]
    fn garbage_payloads_are_errors() {
        assert!(matches!(
            AudioFrame::from_json("not json"),
            Err(VisualiserError::Json(_))
        ));
    }

    #[test]
    fn mistyped_fields_fall_back_or_coerce() {
        assert_eq!(
            AudioFrame::from_json(r#"{"isBeat": 1, "rhythmIntensity": "0.5"}"#).unwrap(),
            AudioFrame::beat(0.5)
        );
        assert_eq!(
            AudioFrame::from_json(r#"{"isBeat": 0, "rhythmIntensity": "loud"}"#).unwrap(),
            AudioFrame::quiet(0.0)
        );
        assert_eq!(
            AudioFrame::from_json(r#"{"is_beat": "", "rhythm_factor": [1, 2]}"#).unwrap(),
            AudioFrame::quiet(0.0)
        );
        assert_eq!(
            AudioFrame::from_json(r#"{"isBeat": true, "rhythmIntensity": "inf"}"#).unwrap(),
            AudioFrame::beat(0.0)
        );
    }

    #[test]
    fn forwards_in_arrival_order_then_reports_end() {
        let (stream_tx, stream_rx) = unbounded();
        let (seen_tx, seen_rx) = unbounded();
        let subscription = FrameSubscription::attach(stream_rx, move |delivery| {
            seen_tx.send(delivery).map_err(|_| VisualiserError::EngineStopped)
        })
        .unwrap();

        for step in 0..20 {
            stream_tx
                .send(StreamEvent::Frame(AudioFrame::quiet(step as f32)))
                .unwrap();
        }
        drop(stream_tx);

        let received: Vec<Delivery> = seen_rx.iter().collect();
        assert_eq!(received.len(), 21);
        for (step, delivery) in received.iter().take(20).enumerate() {
            assert_eq!(*delivery, Delivery::Frame(AudioFrame::quiet(step as f32)));
        }
        assert_eq!(received[20], Delivery::Ended);

        subscription.detach().unwrap();
    }

    #[test]
    fn failure_stops_forwarding() {
        let (stream_tx, stream_rx) = unbounded();
        let (seen_tx, seen_rx) = unbounded();
        let subscription = FrameSubscription::attach(stream_rx, move |delivery| {
            seen_tx.send(delivery).map_err(|_| VisualiserError::EngineStopped)
        })
        .unwrap();

        stream_tx.send(StreamEvent::Frame(AudioFrame::beat(0.2))).unwrap();
        stream_tx.send(StreamEvent::Failed("device lost".into())).unwrap();
        // The forwarder may already be gone, so these sends can fail.
        let _ = stream_tx.send(StreamEvent::Frame(AudioFrame::beat(0.3)));
        let _ = stream_tx.send(StreamEvent::Frame(AudioFrame::beat(0.4)));

        // The consumer channel closes once the forwarder has exited.
        let received: Vec<Delivery> = seen_rx.iter().collect();
        assert_eq!(
            received,
            vec![
                Delivery::Frame(AudioFrame::beat(0.2)),
                Delivery::Failed("device lost".into()),
            ]
        );
        subscription.detach().unwrap();
    }

    #[test]
    fn detach_stops_forwarding_while_stream_is_open() {
        let (stream_tx, stream_rx) = unbounded();
        let (seen_tx, seen_rx) = unbounded();
        let subscription = FrameSubscription::attach(stream_rx, move |delivery| {
            seen_tx.send(delivery).map_err(|_| VisualiserError::EngineStopped)
        })
        .unwrap();
        assert!(subscription.is_attached());

        subscription.detach().unwrap();

        // The forwarder has exited, so its end of the consumer channel is gone.
        let _ = stream_tx.send(StreamEvent::Frame(AudioFrame::beat(1.0)));
        assert!(seen_rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn consumer_errors_end_the_subscription() {
        let (stream_tx, stream_rx) = unbounded();
        let subscription =
            FrameSubscription::attach(stream_rx, |_| Err(VisualiserError::EngineStopped)).unwrap();

        stream_tx.send(StreamEvent::Frame(AudioFrame::beat(0.0))).unwrap();
        subscription.detach().unwrap();
    }
}
