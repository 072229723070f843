//! Window clocks.

use std::sync::atomic::{AtomicU64, Ordering};

use boxswap_domain::WindowId;
use chrono::Utc;

use crate::ports::WindowClock;

/// Clock driven by wall time: `window = unix_secs / window_secs`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    window_secs: u64,
}

impl SystemClock {
    /// Create a clock with the given window duration (at least one second)
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs: window_secs.max(1),
        }
    }

    /// Window duration in seconds
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }
}

impl WindowClock for SystemClock {
    fn current_window(&self) -> WindowId {
        let secs = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        WindowId::from_unix_secs(secs, self.window_secs)
    }
}

/// Clock advanced by hand. Used in tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    window: AtomicU64,
}

impl ManualClock {
    /// Start at the given window
    pub fn new(window: u64) -> Self {
        Self {
            window: AtomicU64::new(window),
        }
    }

    /// Move to the next window
    pub fn advance(&self) -> WindowId {
        WindowId::new(self.window.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Jump forward to a window. Earlier windows are ignored.
    pub fn set(&self, window: u64) {
        self.window.fetch_max(window, Ordering::SeqCst);
    }
}

impl WindowClock for ManualClock {
    fn current_window(&self) -> WindowId {
        WindowId::new(self.window.load(Ordering::SeqCst))
    }
}
