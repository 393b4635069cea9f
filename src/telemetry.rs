//! Logging setup and phase timing.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing_subscriber::{fmt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (tests) is harmless.
    let _ = fmt().with_env_filter(filter).try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    ModelCall,
    Validation,
    Stylesheet,
    GenerationTotal,
    Render,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::ModelCall => "model_call",
            MetricKind::Validation => "validation",
            MetricKind::Stylesheet => "stylesheet",
            MetricKind::GenerationTotal => "generation_total",
            MetricKind::Render => "render",
        }
    }

    /// Durations above this are logged as slow.
    pub fn threshold(self) -> Duration {
        Duration::from_millis(match self {
            MetricKind::ModelCall => 30_000,
            MetricKind::Validation => 1_000,
            MetricKind::Stylesheet => 1_000,
            MetricKind::GenerationTotal => 60_000,
            MetricKind::Render => 5_000,
        })
    }
}

pub fn record(kind: MetricKind, label: &str, elapsed: Duration) {
    let duration_ms = elapsed.as_millis() as u64;
    if elapsed > kind.threshold() {
        tracing::warn!(
            metric = kind.name(),
            duration_ms,
            threshold_ms = kind.threshold().as_millis() as u64,
            "⏱️ Slow metric: {} took {}",
            label,
            format_duration(elapsed)
        );
    } else {
        tracing::info!(metric = kind.name(), duration_ms, "✅ Metric completed: {} in {}", label, format_duration(elapsed));
    }
}

/// Awaits `future` and records how long it took.
pub async fn measure<F, T>(kind: MetricKind, label: &str, future: F) -> T
where
    F: Future<Output = T>,
{
    let timer = Timer::start();
    let output = future.await;
    record(kind, label, timer.elapsed());
    output
}

#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    pub fn human(&self) -> String {
        format_duration(self.elapsed())
    }
}

/// `"850ms"` below one second, `"1.25s"` above.
pub fn format_duration(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}
