use std::collections::HashMap;
use std::time::Instant;

/// Observer for detection session events.
///
/// Sessions report through this trait rather than straight to `log`, so a
/// caller can collect per-frame timings without parsing log output.
pub trait SessionLogger: Send {
    /// A frame finished scanning with `detections` accepted windows.
    fn frame_done(&mut self, frame_index: usize, detections: usize);

    /// How long a named session phase took for one frame.
    fn timing(&mut self, phase: &str, duration_ms: f64);

    /// A point-in-time metric (e.g. windows scanned, pyramid levels).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards every event.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn frame_done(&mut self, _frame_index: usize, _detections: usize) {}
    fn timing(&mut self, _phase: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Accumulates timings and metrics for a summary report at the end of a
/// CLI run.
pub struct StdoutSessionLogger {
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    frames: usize,
    detections: usize,
}

impl StdoutSessionLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
            detections: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames == 0 && self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Session summary ({} frames, {} detections, {:.1}s total):",
            self.frames,
            self.detections,
            elapsed_ms / 1000.0
        )];

        let mut phases: Vec<_> = self.timings.keys().collect();
        phases.sort();
        for phase in phases {
            let durations = &self.timings[phase];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            lines.push(format!(
                "  {phase:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, phase: &str) -> Option<&[f64]> {
        self.timings.get(phase).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for StdoutSessionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLogger for StdoutSessionLogger {
    fn frame_done(&mut self, frame_index: usize, detections: usize) {
        self.frames += 1;
        self.detections += detections;
        log::info!("Frame {frame_index}: {detections} detections");
    }

    fn timing(&mut self, phase: &str, duration_ms: f64) {
        self.timings
            .entry(phase.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
