//! Periodicity keys deciding on which key-cycles an overlay is active.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// When an overlay plays: starting at cycle `shift`, every `interval` cycles,
/// for `width` consecutive cycles, but never before `start_cycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlayKey {
    pub shift: u8,
    pub interval: u8,
    pub width: u8,
    pub start_cycle: u8,
}

/// Matches every cycle. Always the bottom layer of a stack.
pub const ROOT: OverlayKey = OverlayKey {
    shift: 1,
    interval: 1,
    width: 1,
    start_cycle: 0,
};

/// Upper bound of the scan in [`OverlayKey::minimum_key_cycle`].
const KEY_CYCLE_SCAN: i32 = 100;

impl OverlayKey {
    pub fn new(shift: u8, interval: u8, width: u8, start_cycle: u8) -> Self {
        Self {
            shift,
            interval,
            width,
            start_cycle,
        }
    }

    pub fn is_root(&self) -> bool {
        *self == ROOT
    }

    pub fn does_match(&self, cycle: i32) -> bool {
        if cycle < self.start_cycle as i32 {
            return false;
        }

        let mut shift = self.shift as i32;
        let mut interval = (self.interval as i32).max(1);
        if interval < shift {
            if shift % interval == 0 {
                interval = shift / interval;
                shift = 0;
            } else {
                interval *= shift / interval + 1;
            }
        }

        let level = interval * ((cycle - shift) / interval);
        let width = (self.width as i32).max(1);

        if shift == 0 && cycle < interval {
            false
        } else {
            cycle == shift
                || cycle == shift + interval
                || (shift + level <= cycle && cycle <= shift + level + (width - 1))
        }
    }

    /// First cycle in `1..100` this key matches, or 100 when none does.
    pub fn minimum_key_cycle(&self) -> i32 {
        (1..KEY_CYCLE_SCAN)
            .find(|&cycle| self.does_match(cycle))
            .unwrap_or(KEY_CYCLE_SCAN)
    }
}

impl Default for OverlayKey {
    fn default() -> Self {
        ROOT
    }
}

/// Specificity order: the most specific key sorts first, so a sorted stack
/// reads top (most specific) to bottom (ROOT).
impl Ord for OverlayKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .interval
            .cmp(&self.interval)
            .then(other.shift.cmp(&self.shift))
            .then(other.start_cycle.cmp(&self.start_cycle))
            .then(self.width.cmp(&other.width))
    }
}

impl PartialOrd for OverlayKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OverlayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shift, self.interval)?;
        if self.width > 1 {
            write!(f, ":{}", self.width)?;
        }
        if self.start_cycle > 0 {
            write!(f, "S{}", self.start_cycle)?;
        }
        Ok(())
    }
}
