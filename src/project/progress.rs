use crate::error::Failure;
use std::time::{Duration, Instant};

/// Per-run counters handed to progress callbacks.
#[derive(Debug, Clone)]
pub struct WorkProgress {
    pub items_processed: usize,
    pub total_items: usize,
    pub bytes_processed: u64,
    pub current_item: Option<String>,
    pub start_time: Instant,
    pub failures: Vec<Failure>,
}

impl WorkProgress {
    pub fn new(total_items: usize) -> Self {
        Self {
            items_processed: 0,
            total_items,
            bytes_processed: 0,
            current_item: None,
            start_time: Instant::now(),
            failures: Vec::new(),
        }
    }

    pub fn begin_item<S: Into<String>>(&mut self, name: S) {
        self.current_item = Some(name.into());
    }

    pub fn complete_item(&mut self, bytes: u64) {
        self.items_processed += 1;
        self.bytes_processed += bytes;
    }

    pub fn fail_item(&mut self, failure: Failure) {
        self.items_processed += 1;
        self.failures.push(failure);
    }

    pub fn percentage(&self) -> f64 {
        if self.total_items == 0 {
            0.0
        } else {
            (self.items_processed as f64 / self.total_items as f64) * 100.0
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn estimated_remaining(&self) -> Duration {
        if self.items_processed == 0 {
            return Duration::from_secs(0);
        }

        let rate = self.items_processed as f64 / self.elapsed().as_secs_f64();
        let remaining = self.total_items.saturating_sub(self.items_processed);

        if rate > 0.0 && rate.is_finite() {
            Duration::from_secs_f64(remaining as f64 / rate)
        } else {
            Duration::from_secs(0)
        }
    }
}
