//! Firing schedule of the VLP-16
//!
//! All 16 lasers are fired and recharged every 55.296 us, with 2.304 us
//! between consecutive firings and an idle period of 18.432 us at the end of
//! the cycle. Each data block holds two such cycles.
use std::sync::OnceLock;

use crate::packet::{BLOCKS, POINTS};

/// Duration of one firing sequence, us
pub const FIRING_CYCLE_US: f64 = 55.296;
/// Time between two consecutive laser firings, us
pub const FIRING_STEP_US: f64 = 2.304;
/// Duration of one data block (two firing sequences), us
pub const BLOCK_PERIOD_US: f64 = 2.*FIRING_CYCLE_US;

/// Microsecond offsets of every point relative to the packet timestamp
#[derive(Clone, Debug)]
pub struct TimeOffsetTable {
    offsets: [[f64; POINTS]; BLOCKS],
}

impl TimeOffsetTable {
    fn new() -> Self {
        let mut offsets = [[0f64; POINTS]; BLOCKS];
        for (block, row) in offsets.iter_mut().enumerate() {
            for (point, val) in row.iter_mut().enumerate() {
                *val = if point < 16 {
                    BLOCK_PERIOD_US*block as f64 + FIRING_STEP_US*point as f64
                } else {
                    FIRING_CYCLE_US*(2*block + 1) as f64
                        + FIRING_STEP_US*(point - 16) as f64
                };
            }
        }
        Self { offsets }
    }

    /// Shared table, computed on first use
    pub fn get() -> &'static Self {
        static TABLE: OnceLock<TimeOffsetTable> = OnceLock::new();
        TABLE.get_or_init(TimeOffsetTable::new)
    }

    /// Offset of point `point` in block `block`, us
    ///
    /// Panics if `block >= 12` or `point >= 32`.
    #[inline(always)]
    pub fn offset(&self, block: usize, point: usize) -> f64 {
        self.offsets[block][point]
    }

    /// Offset of point `point` from the start of its own block, us
    #[inline(always)]
    pub fn in_block(&self, point: usize) -> f64 {
        self.offsets[0][point]
    }
}
