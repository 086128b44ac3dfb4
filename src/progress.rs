// src/progress.rs

//! Weighted multi-step progress reporting
//!
//! Output is one line per percentage change, `<percentage>\t<status>`,
//! monotonically non-decreasing and ending at 100. Three weighted steps
//! cover a run: Initialization (10), Downloading snaps (80), Verifying
//! snaps (10). While the download step is active, the percentage is
//! derived from global downloaded bytes scaled into the 10-90 window.
//!
//! The [`Reporter`] sink is injected so tests can substitute a recording
//! collector for the tab-separated stdout writer.

use std::sync::{Arc, Mutex};

/// Sink for progress lines
pub trait Reporter: Send + Sync {
    fn report(&self, percentage: u32, status: &str);
}

/// Production reporter: `<percentage>\t<status>` on stdout
#[derive(Debug, Default)]
pub struct TabReporter;

impl Reporter for TabReporter {
    fn report(&self, percentage: u32, status: &str) {
        println!("{}\t{}", percentage, status);
    }
}

/// Recording reporter for tests
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<(u32, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(u32, String)> {
        self.events.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, percentage: u32, status: &str) {
        self.events
            .lock()
            .unwrap()
            .push((percentage, status.to_string()));
    }
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn report(&self, percentage: u32, status: &str) {
        (**self).report(percentage, status);
    }
}

struct WeightedStep {
    weight: u32,
    status: &'static str,
    done: bool,
}

struct Inner {
    steps: Vec<WeightedStep>,
    current: usize,
    completed_weight: u32,
    total_weight: u32,
    downloaded: f64,
    total_bytes: f64,
    last_reported: Option<u32>,
}

/// Tracks the three weighted steps and the global byte count
pub struct ProgressTracker {
    inner: Mutex<Inner>,
    reporter: Box<dyn Reporter>,
}

impl ProgressTracker {
    pub fn new(reporter: Box<dyn Reporter>) -> Self {
        let steps = vec![
            WeightedStep { weight: 10, status: "Initialization", done: false },
            WeightedStep { weight: 80, status: "Downloading snaps", done: false },
            WeightedStep { weight: 10, status: "Verifying snaps", done: false },
        ];
        let total_weight = steps.iter().map(|s| s.weight).sum();
        Self {
            inner: Mutex::new(Inner {
                steps,
                current: 0,
                completed_weight: 0,
                total_weight,
                downloaded: 0.0,
                total_bytes: 0.0,
                last_reported: None,
            }),
            reporter,
        }
    }

    /// Announce the first step at 0%
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        let status = inner.steps[0].status;
        inner.last_reported = Some(0);
        self.reporter.report(0, status);
    }

    /// Emit a fixed line, subject to the monotonicity guard
    pub fn report_line(&self, percentage: u32, status: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.last_reported.map_or(false, |last| percentage <= last) {
            return;
        }
        inner.last_reported = Some(percentage);
        self.reporter.report(percentage, status);
    }

    /// Total bytes expected across all downloads this run
    pub fn set_total_bytes(&self, total: f64) {
        self.inner.lock().unwrap().total_bytes = total;
    }

    /// Account freshly downloaded bytes and report the scaled percentage.
    ///
    /// Retried attempts re-count their bytes, so the window is clamped at
    /// 90 rather than trusting the estimate.
    pub fn add_bytes(&self, bytes: f64, status: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.downloaded += bytes;
        if inner.total_bytes <= 0.0 {
            return;
        }
        let percentage = ((inner.downloaded / inner.total_bytes) * 80.0) as u32 + 10;
        let percentage = percentage.min(90);
        if inner.last_reported.map_or(true, |last| percentage > last) {
            inner.last_reported = Some(percentage);
            self.reporter.report(percentage, status);
        }
    }

    /// Complete the current step, report its closing status, and move on.
    ///
    /// The closing line is always emitted, even when the percentage did not
    /// change; it carries status text the caller relies on.
    pub fn finish_step(&self, status: &str) {
        let mut inner = self.inner.lock().unwrap();
        let current = inner.current;
        if current >= inner.steps.len() {
            return;
        }
        if !inner.steps[current].done {
            inner.steps[current].done = true;
            inner.completed_weight += inner.steps[current].weight;
        }
        let percentage = (inner.completed_weight * 100 / inner.total_weight).min(100);
        inner.last_reported = Some(percentage);
        self.reporter.report(percentage, status);

        if current + 1 < inner.steps.len() {
            inner.current = current + 1;
        }
    }

    /// Skip ahead without a closing line (used when a step had no work)
    pub fn next_step(&self) {
        let mut inner = self.inner.lock().unwrap();
        let current = inner.current;
        if current >= inner.steps.len() {
            return;
        }
        if !inner.steps[current].done {
            inner.steps[current].done = true;
            inner.completed_weight += inner.steps[current].weight;
        }
        if current + 1 < inner.steps.len() {
            inner.current = current + 1;
        }
    }
}

/// Per-download byte meter feeding the global tracker
pub struct ByteMeter {
    tracker: Arc<ProgressTracker>,
    status: String,
    total: f64,
    current: f64,
}

impl ByteMeter {
    pub fn new(
        tracker: Arc<ProgressTracker>,
        snap_name: &str,
        snap_version: &str,
        is_delta: bool,
        total: f64,
    ) -> Self {
        let status = if is_delta {
            format!("Downloading delta for snap {} {}", snap_name, snap_version)
        } else {
            format!("Downloading snap {} {}", snap_name, snap_version)
        };
        Self {
            tracker,
            status,
            total,
            current: 0.0,
        }
    }

    pub fn add(&mut self, bytes: u64) {
        self.current += bytes as f64;
        self.tracker.add_bytes(bytes as f64, &self.status);
    }

    /// Snap the meter to its expected total so undercounted transfers do
    /// not stall the window.
    pub fn finish(&mut self) {
        let remaining = self.total - self.current;
        if remaining > 0.0 {
            self.tracker.add_bytes(remaining, &self.status);
        }
        self.current = self.total;
    }
}
