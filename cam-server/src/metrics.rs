//! Prometheus metrics exposed on `/metrics`.

use camera::CaptureLoop;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct ServerMetrics {
    registry: Registry,
    pub moves: IntCounterVec,
    pub move_failures: IntCounter,
    pub frames_encoded: IntCounter,
    pub stream_clients: IntGauge,
    frames_captured: IntGauge,
    capture_read_failures: IntGauge,
}

impl ServerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let moves = IntCounterVec::new(
            Opts::new("pantilt_moves_total", "Successful step commands"),
            &["direction"],
        )?;
        let move_failures =
            IntCounter::new("pantilt_move_failures_total", "Step commands that failed")?;
        let frames_encoded = IntCounter::new(
            "pantilt_frames_encoded_total",
            "JPEG parts sent to stream clients",
        )?;
        let stream_clients = IntGauge::new("pantilt_stream_clients", "Connected MJPEG clients")?;
        let frames_captured = IntGauge::new(
            "pantilt_frames_captured",
            "Frames published by the capture loop",
        )?;
        let capture_read_failures = IntGauge::new(
            "pantilt_capture_read_failures",
            "Failed frame reads in the capture loop",
        )?;

        registry.register(Box::new(moves.clone()))?;
        registry.register(Box::new(move_failures.clone()))?;
        registry.register(Box::new(frames_encoded.clone()))?;
        registry.register(Box::new(stream_clients.clone()))?;
        registry.register(Box::new(frames_captured.clone()))?;
        registry.register(Box::new(capture_read_failures.clone()))?;

        Ok(Self {
            registry,
            moves,
            move_failures,
            frames_encoded,
            stream_clients,
            frames_captured,
            capture_read_failures,
        })
    }

    /// Refresh the capture gauges and render everything in text format.
    pub fn render(&self, capture: &CaptureLoop) -> prometheus::Result<String> {
        self.frames_captured.set(capture.frames_captured() as i64);
        self.capture_read_failures.set(capture.read_failures() as i64);

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Keeps `stream_clients` in step with live streams; decrements on drop.
pub struct ClientGuard(IntGauge);

impl ClientGuard {
    pub fn new(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_guard_tracks_streams() {
        let metrics = ServerMetrics::new().unwrap();
        let first = ClientGuard::new(&metrics.stream_clients);
        let second = ClientGuard::new(&metrics.stream_clients);
        assert_eq!(metrics.stream_clients.get(), 2);
        drop(first);
        drop(second);
        assert_eq!(metrics.stream_clients.get(), 0);
    }

    #[test]
    fn test_move_counter_labels() {
        let metrics = ServerMetrics::new().unwrap();
        metrics.moves.with_label_values(&["up"]).inc();
        metrics.moves.with_label_values(&["up"]).inc();
        metrics.moves.with_label_values(&["left"]).inc();
        assert_eq!(metrics.moves.with_label_values(&["up"]).get(), 2);
        assert_eq!(metrics.moves.with_label_values(&["left"]).get(), 1);
    }
}
