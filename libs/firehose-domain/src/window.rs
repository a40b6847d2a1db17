//! Batch windows and the roll-over policy
//!
//! Two questions are answered on every chunk:
//!
//! - **flush due?** a delimiter is buffered and either the buffer grew past
//!   `max_buf_size` or a roll-over is due
//! - **roll due?** the window is older than `roll_duration` or the window volume
//!   (flushed bytes plus the current buffer) reached `max_roll_size`
//!
//! A roll-over always flushes; a flush only rolls the window when the second
//! predicate holds.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::stream::RecordReassembler;

/// Thresholds of the roll-over policy
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Length of a batch window (default: 1 hour)
    pub roll_duration: Duration,
    /// Buffered bytes above which a flush is forced (default: 4MiB)
    pub max_buf_size: usize,
    /// Window volume at which the window rolls regardless of age (default: 1GiB)
    pub max_roll_size: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            roll_duration: Duration::from_secs(3600),
            max_buf_size: 4 * 1024 * 1024,   // 4MiB
            max_roll_size: 1024 * 1024 * 1024, // 1GiB
        }
    }
}

/// Why a window rolled over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollTrigger {
    Duration,
    Size,
}

/// Why a flush happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    BufferSize,
    Roll(RollTrigger),
}

/// The current accumulation interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWindow {
    start: DateTime<Utc>,
    volume: u64,
}

impl BatchWindow {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { start, volume: 0 }
    }

    /// Timestamp the window started at
    pub fn start(&self) -> &DateTime<Utc> {
        &self.start
    }

    /// Bytes flushed since the window started
    pub fn volume(&self) -> u64 {
        self.volume
    }

    /// Time elapsed since the window started, zero if `now` is earlier
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.start).to_std().unwrap_or(Duration::ZERO)
    }

    fn reset(&mut self, at: DateTime<Utc>) {
        self.start = at;
        self.volume = 0;
    }

    fn reset_volume(&mut self) {
        self.volume = 0;
    }
}

/// Records extracted by a flush, with the window they belong to
#[derive(Debug, Clone)]
pub struct Flush {
    pub records: Bytes,
    pub window_start: DateTime<Utc>,
    pub window_duration: Duration,
    pub trigger: FlushTrigger,
    /// Whether this flush also started a new window
    pub rolled: bool,
}

/// Decides when to flush and when to start a new window
#[derive(Debug, Clone)]
pub struct RollOverPolicy {
    config: WindowConfig,
    window: BatchWindow,
}

impl RollOverPolicy {
    pub fn new(config: WindowConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            window: BatchWindow::new(now),
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn window(&self) -> &BatchWindow {
        &self.window
    }

    /// Forget the volume counted by the previous session
    ///
    /// The window start is wall-clock and survives reconnects, so a stream
    /// that reconnects more often than `roll_duration` still rolls on time.
    pub fn begin_session(&mut self) {
        self.window.reset_volume();
    }

    /// Roll-due predicate for a candidate window volume
    pub fn roll_due(&self, now: DateTime<Utc>, volume: u64) -> Option<RollTrigger> {
        if self.window.elapsed(now) >= self.config.roll_duration {
            return Some(RollTrigger::Duration);
        }
        if volume >= self.config.max_roll_size {
            return Some(RollTrigger::Size);
        }
        None
    }

    /// Flush-due predicate for the current reassembler state
    pub fn flush_due(
        &self,
        reassembler: &RecordReassembler,
        now: DateTime<Utc>,
    ) -> Option<FlushTrigger> {
        // Never cut a buffer that has no visible record boundary yet.
        if !reassembler.has_delimiter() {
            return None;
        }
        if reassembler.len() > self.config.max_buf_size {
            return Some(FlushTrigger::BufferSize);
        }
        self.roll_due(now, self.candidate_volume(reassembler))
            .map(FlushTrigger::Roll)
    }

    /// Flush the reassembler if due, rolling the window when that is due too
    pub fn poll(&mut self, reassembler: &mut RecordReassembler, now: DateTime<Utc>) -> Option<Flush> {
        let trigger = self.flush_due(reassembler, now)?;
        let volume = self.candidate_volume(reassembler);
        let records = reassembler.drain()?;

        let window_start = self.window.start;
        let window_duration = self.window.elapsed(now);
        let roll = self.roll_due(now, volume);

        debug!(
            trigger = ?trigger,
            records_bytes = records.len(),
            pending_bytes = reassembler.len(),
            window_volume = volume,
            "Flush"
        );

        match roll {
            Some(reason) => {
                debug!(
                    reason = ?reason,
                    elapsed_secs = window_duration.as_secs(),
                    volume,
                    "Roll over"
                );
                self.window.reset(now);
            }
            None => self.window.volume += records.len() as u64,
        }

        Some(Flush {
            records,
            window_start,
            window_duration,
            trigger,
            rolled: roll.is_some(),
        })
    }

    fn candidate_volume(&self, reassembler: &RecordReassembler) -> u64 {
        self.window.volume + reassembler.len() as u64
    }
}
