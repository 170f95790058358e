//! Progress and ETA tracking
//!
//! Two layers:
//!
//! - [`EtaTracker`] counts abstract units of work (chunks, blocks) and
//!   projects the remaining time linearly from the completion rate.
//! - [`ProgressTracker`] drives an [`EtaTracker`] with one unit per chunk and
//!   adds byte counters and a smoothed speed, producing one
//!   [`ProgressSnapshot`] per recorded chunk.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Callback receiving progress snapshots
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Progress of a transfer after one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Completion percentage (0-100)
    pub percentage: f64,
    /// Bytes transferred so far
    pub transferred: u64,
    /// Total bytes of the transfer
    pub length: u64,
    /// Bytes still to transfer
    pub remaining: u64,
    /// Estimated seconds remaining, once enough data has been seen
    pub eta: Option<u64>,
    /// Time since the transfer started
    pub runtime: Duration,
    /// Bytes moved by the chunk that produced this snapshot
    pub delta: u64,
    /// Current speed in bytes per second
    pub speed: u64,
}

impl ProgressSnapshot {
    /// Whether every byte has been transferred
    pub fn is_complete(&self) -> bool {
        self.transferred >= self.length
    }

    /// Format speed for display
    pub fn speed_display(&self) -> String {
        format_speed(self.speed)
    }

    /// Format ETA for display
    pub fn eta_display(&self) -> String {
        match self.eta {
            Some(secs) => format_duration(secs),
            None => "unknown".to_string(),
        }
    }
}

// ============================================================================
// ETA engine
// ============================================================================

/// One observation of the ETA engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaSample {
    /// Units completed so far
    pub completed: u64,
    /// Total units
    pub total: u64,
    /// Time since timing started
    pub elapsed: Duration,
    /// Projected time remaining
    pub eta: Option<Duration>,
    /// Units per second
    pub rate: f64,
}

/// Unit-based ETA engine with linear projection
#[derive(Debug, Clone)]
pub struct EtaTracker {
    total: u64,
    completed: u64,
    started: Option<Instant>,
}

impl EtaTracker {
    /// Create a tracker expecting `total` units of work
    pub fn new(total: u64) -> Self {
        Self {
            total,
            completed: 0,
            started: None,
        }
    }

    /// Start timing. Has no effect once timing has started.
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Record one completed unit
    pub fn tick(&mut self) -> EtaSample {
        self.tick_at(Instant::now())
    }

    /// Units completed so far
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub(crate) fn start_at(&mut self, now: Instant) {
        self.started.get_or_insert(now);
    }

    pub(crate) fn tick_at(&mut self, now: Instant) -> EtaSample {
        let started = *self.started.get_or_insert(now);
        self.completed += 1;

        let elapsed = now.saturating_duration_since(started);
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        };

        let eta = if rate > 0.0 {
            let remaining = self.total.saturating_sub(self.completed);
            Duration::try_from_secs_f64(remaining as f64 / rate).ok()
        } else {
            None
        };

        EtaSample {
            completed: self.completed,
            total: self.total,
            elapsed,
            eta,
            rate,
        }
    }
}

// ============================================================================
// Byte progress
// ============================================================================

/// Per-chunk progress tracker for a transfer of known length
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    length: u64,
    transferred: u64,
    eta: EtaTracker,
    speed: SpeedTracker,
}

impl ProgressTracker {
    /// Create a tracker for `length` bytes moved in chunks of `chunk_size`
    pub fn new(length: u64, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1) as u64;
        Self {
            length,
            transferred: 0,
            eta: EtaTracker::new(length.div_ceil(chunk_size)),
            speed: SpeedTracker::new(),
        }
    }

    /// Start timing the transfer
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Record a chunk of `delta` bytes and produce its snapshot
    pub fn record(&mut self, delta: u64) -> ProgressSnapshot {
        self.record_at(delta, Instant::now())
    }

    /// Bytes recorded so far
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub(crate) fn start_at(&mut self, now: Instant) {
        self.eta.start_at(now);
        self.speed.update_at(now, self.transferred);
    }

    pub(crate) fn record_at(&mut self, delta: u64, now: Instant) -> ProgressSnapshot {
        self.transferred = self.transferred.saturating_add(delta).min(self.length);

        let sample = self.eta.tick_at(now);
        self.speed.update_at(now, self.transferred);

        let mut speed = self.speed.current_speed();
        if speed == 0 && !sample.elapsed.is_zero() {
            speed = (self.transferred as f64 / sample.elapsed.as_secs_f64()) as u64;
        }

        let percentage = if self.length == 0 {
            100.0
        } else {
            self.transferred as f64 / self.length as f64 * 100.0
        };

        ProgressSnapshot {
            percentage,
            transferred: self.transferred,
            length: self.length,
            remaining: self.length - self.transferred,
            eta: sample.eta.map(|d| d.as_secs_f64().round() as u64),
            runtime: sample.elapsed,
            delta,
            speed,
        }
    }
}

/// Speed tracking with smoothing over the last few samples
#[derive(Debug, Clone)]
struct SpeedTracker {
    samples: VecDeque<(Instant, u64)>,
    max_samples: usize,
}

impl SpeedTracker {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(10),
            max_samples: 10,
        }
    }

    fn update_at(&mut self, now: Instant, bytes: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back((now, bytes));
    }

    fn current_speed(&self) -> u64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0;
        };

        let duration = last.0.saturating_duration_since(first.0);
        let bytes = last.1.saturating_sub(first.1);

        if duration.as_millis() > 0 {
            (bytes as f64 / duration.as_secs_f64()) as u64
        } else {
            0
        }
    }
}

/// Format speed for display
pub fn format_speed(bytes_per_second: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes_per_second >= GB {
        format!("{:.1} GB/s", bytes_per_second as f64 / GB as f64)
    } else if bytes_per_second >= MB {
        format!("{:.1} MB/s", bytes_per_second as f64 / MB as f64)
    } else if bytes_per_second >= KB {
        format!("{:.1} KB/s", bytes_per_second as f64 / KB as f64)
    } else {
        format!("{} B/s", bytes_per_second)
    }
}

/// Format duration for display
pub fn format_duration(seconds: u64) -> String {
    if seconds >= 3600 {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        format!("{}h {}m", hours, mins)
    } else if seconds >= 60 {
        let mins = seconds / 60;
        let secs = seconds % 60;
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", seconds)
    }
}
