//! Latched one-time notices.
//!
//! Some conditions are worth reporting once and then never again, no
//! matter how many frames or windows hit them. Each latch is an
//! `AtomicBool` that is set the first time its notice fires.
//!
//! The process-wide instance returned by [`NoticeLatches::global`] is
//! what routers use unless another one is injected. The latches are
//! deliberately process-wide even where the triggering condition is per
//! window: a second window hitting the same condition stays quiet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

static GLOBAL: LazyLock<Arc<NoticeLatches>> = LazyLock::new(|| Arc::new(NoticeLatches::new()));

#[derive(Debug)]
pub struct NoticeLatches {
    quad_needs_network: AtomicBool,
    no_stereo_visual: AtomicBool,
    thin_off: AtomicBool,
    /// Starts raised so a healthy first frame does not announce a
    /// recovery.
    thin_on: AtomicBool,
}

impl NoticeLatches {
    pub fn new() -> Self {
        Self {
            quad_needs_network: AtomicBool::new(false),
            no_stereo_visual: AtomicBool::new(false),
            thin_off: AtomicBool::new(false),
            thin_on: AtomicBool::new(true),
        }
    }

    /// The process-wide latches.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Returns `true` exactly once: quad-buffered stereo requested on a
    /// transport that cannot carry it.
    pub fn quad_needs_network(&self) -> bool {
        !self.quad_needs_network.swap(true, Ordering::SeqCst)
    }

    /// Returns `true` exactly once: quad-buffered stereo requested on a
    /// destination without a stereo visual.
    pub fn no_stereo_visual(&self) -> bool {
        !self.no_stereo_visual.swap(true, Ordering::SeqCst)
    }

    /// Returns `true` on the first failure of the thin-client channel
    /// since it last worked.
    pub fn thin_client_lost(&self) -> bool {
        let first = !self.thin_off.swap(true, Ordering::SeqCst);
        if first {
            self.thin_on.store(false, Ordering::SeqCst);
        }
        first
    }

    /// Returns `true` on the first success of the thin-client channel
    /// after a failure.
    pub fn thin_client_restored(&self) -> bool {
        let first = !self.thin_on.swap(true, Ordering::SeqCst);
        if first {
            self.thin_off.store(false, Ordering::SeqCst);
        }
        first
    }
}

impl Default for NoticeLatches {
    fn default() -> Self {
        Self::new()
    }
}
