//! Minimum spacing between calls to the AI backend.
//!
//! One `Pacer` is shared process-wide by every AI call site (keyword
//! generation and the analyzer workers), so bounded concurrency in the
//! analyzer cannot exceed the backend's request budget.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct Pacer {
    spacing: Duration,
    next_slot: Mutex<Instant>,
}

impl Pacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Waits until a call slot is free. Slots are handed out one spacing
    /// interval apart, in arrival order; the lock is held only to claim a
    /// slot, never across the sleep.
    pub async fn pause(&self) {
        if self.spacing.is_zero() {
            return;
        }
        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            if *next <= now {
                *next = now + self.spacing;
                Duration::ZERO
            } else {
                let wait = *next - now;
                *next += self.spacing;
                wait
            }
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}
