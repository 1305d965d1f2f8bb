use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Wall clock with a monotonic offset on top; simulations advance the offset
/// instead of sleeping through real timeouts.
#[derive(Default)]
pub struct Clock {
    offset: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> i64 {
        Utc::now().timestamp() + self.offset.load(Ordering::Relaxed)
    }

    pub fn advance(&self, secs: i64) {
        self.offset.fetch_add(secs, Ordering::Relaxed);
    }
}
