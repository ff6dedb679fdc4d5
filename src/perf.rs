//! Coarse performance aggregation for the streaming and training paths.
//!
//! Spans record wall time per metric and counters accumulate step totals. The
//! collector is process-wide; the CLI prints the summary with `--verbose`.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Named metrics tracked by the perf collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Metric {
    CursorAdvance,
    AttentionForward,
    AttentionAppendKv,
    AttentionScores,
    ProjectedForward,
    CellForward,
    CellRecurrence,
    EncoderForward,
    ClassifierForward,
    TrainStep,
    TrainEvaluate,
    ReadySteps,
    SessionChunks,
    TrainExamples,
}

impl Metric {
    const COUNT: usize = 14;

    const ALL: [Metric; Metric::COUNT] = [
        Metric::CursorAdvance,
        Metric::AttentionForward,
        Metric::AttentionAppendKv,
        Metric::AttentionScores,
        Metric::ProjectedForward,
        Metric::CellForward,
        Metric::CellRecurrence,
        Metric::EncoderForward,
        Metric::ClassifierForward,
        Metric::TrainStep,
        Metric::TrainEvaluate,
        Metric::ReadySteps,
        Metric::SessionChunks,
        Metric::TrainExamples,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Dotted name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Metric::CursorAdvance => "cursor.advance",
            Metric::AttentionForward => "attention.forward",
            Metric::AttentionAppendKv => "attention.append_kv",
            Metric::AttentionScores => "attention.scores",
            Metric::ProjectedForward => "projected.forward",
            Metric::CellForward => "cell.forward",
            Metric::CellRecurrence => "cell.recurrence",
            Metric::EncoderForward => "encoder.forward",
            Metric::ClassifierForward => "classifier.forward",
            Metric::TrainStep => "train.step",
            Metric::TrainEvaluate => "train.evaluate",
            Metric::ReadySteps => "cursor.ready_steps",
            Metric::SessionChunks => "session.chunks",
            Metric::TrainExamples => "train.examples",
        }
    }

    fn is_counter(self) -> bool {
        matches!(
            self,
            Metric::ReadySteps | Metric::SessionChunks | Metric::TrainExamples
        )
    }
}

struct PerfCollector {
    start: Instant,
    totals_us: [AtomicU64; Metric::COUNT],
    counts: [AtomicU64; Metric::COUNT],
}

impl PerfCollector {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            totals_us: std::array::from_fn(|_| AtomicU64::new(0)),
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn add_duration(&self, metric: Metric, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let index = metric.index();
        self.totals_us[index].fetch_add(micros, Ordering::Relaxed);
        self.counts[index].fetch_add(1, Ordering::Relaxed);
    }

    fn add_count(&self, metric: Metric, delta: u64) {
        self.counts[metric.index()].fetch_add(delta, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PerfSnapshot {
        PerfSnapshot {
            uptime: self.start.elapsed(),
            totals_us: std::array::from_fn(|idx| self.totals_us[idx].load(Ordering::Relaxed)),
            counts: std::array::from_fn(|idx| self.counts[idx].load(Ordering::Relaxed)),
        }
    }
}

static COLLECTOR: OnceLock<PerfCollector> = OnceLock::new();

fn collector() -> &'static PerfCollector {
    COLLECTOR.get_or_init(PerfCollector::new)
}

/// RAII timer that records its duration when dropped.
pub struct PerfSpan {
    metric: Metric,
    start: Instant,
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        collector().add_duration(self.metric, self.start.elapsed());
    }
}

/// Begin a named timing span.
pub fn span(metric: Metric) -> PerfSpan {
    PerfSpan {
        metric,
        start: Instant::now(),
    }
}

/// Record a counter delta for a named metric.
pub fn add_count(metric: Metric, delta: u64) {
    collector().add_count(metric, delta);
}

/// Current value of a counter (or number of spans for a duration metric).
pub fn count(metric: Metric) -> u64 {
    collector().counts[metric.index()].load(Ordering::Relaxed)
}

/// Snapshot of collected performance data.
#[derive(Debug)]
pub struct PerfSnapshot {
    uptime: Duration,
    totals_us: [u64; Metric::COUNT],
    counts: [u64; Metric::COUNT],
}

impl PerfSnapshot {
    /// Format a human-readable report, largest totals first.
    pub fn format(&self) -> String {
        let mut durations: Vec<(Metric, u64, u64)> = Vec::new();
        let mut counters: Vec<(Metric, u64)> = Vec::new();
        for metric in Metric::ALL {
            let idx = metric.index();
            let (total_us, count) = (self.totals_us[idx], self.counts[idx]);
            if metric.is_counter() {
                if count > 0 {
                    counters.push((metric, count));
                }
            } else if count > 0 || total_us > 0 {
                durations.push((metric, total_us, count));
            }
        }
        durations.sort_by(|a, b| b.1.cmp(&a.1));
        counters.sort_by(|a, b| b.1.cmp(&a.1));

        let mut output = String::new();
        let _ = writeln!(
            output,
            "Performance summary (uptime: {:.3}s)",
            self.uptime.as_secs_f64()
        );
        if durations.is_empty() && counters.is_empty() {
            let _ = writeln!(output, "No performance data recorded.");
            return output;
        }

        if !durations.is_empty() {
            let _ = writeln!(output, "Durations:");
            let _ = writeln!(
                output,
                "  {:<24} {:>10} {:>8} {:>10}",
                "name", "total", "count", "avg"
            );
            for (metric, total_us, count) in durations {
                let avg_ms = if count == 0 {
                    0.0
                } else {
                    total_us as f64 / count as f64 / 1000.0
                };
                let _ = writeln!(
                    output,
                    "  {:<24} {:>10.3}s {:>8} {:>10.3}ms",
                    metric.name(),
                    total_us as f64 / 1_000_000.0,
                    count,
                    avg_ms
                );
            }
        }

        if !counters.is_empty() {
            let _ = writeln!(output, "Counters:");
            for (metric, value) in counters {
                let _ = writeln!(output, "  {:<24} {}", metric.name(), value);
            }
        }

        output
    }
}

/// Format a report of all collected metrics.
pub fn report() -> String {
    collector().snapshot().format()
}
