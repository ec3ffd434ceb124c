//! Process-visible autotest samples.
//!
//! When autotest is enabled the readback engine publishes, per window,
//! the solid color it last captured (or `-1` when the region was not
//! uniform) and a running frame counter. External verification
//! harnesses read them back by key.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use crate::lock_unpoisoned;
use crate::platform::WindowId;

static BOARD: LazyLock<Mutex<HashMap<String, i64>>> = LazyLock::new(Default::default);

/// Key of the left-eye (or mono) color sample.
pub fn color_key(window: WindowId) -> String {
    format!("autotest.color.{:x}", window.0)
}

/// Key of the right-eye color sample.
pub fn right_color_key(window: WindowId) -> String {
    format!("autotest.rcolor.{:x}", window.0)
}

/// Key of the frame counter.
pub fn frame_key(window: WindowId) -> String {
    format!("autotest.frame.{:x}", window.0)
}

pub fn publish(key: String, value: i64) {
    lock_unpoisoned(&BOARD).insert(key, value);
}

pub fn lookup(key: &str) -> Option<i64> {
    lock_unpoisoned(&BOARD).get(key).copied()
}

/// Every published pair, sorted by key.
pub fn dump() -> Vec<(String, i64)> {
    let mut pairs: Vec<_> = lock_unpoisoned(&BOARD)
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    pairs.sort();
    pairs
}
