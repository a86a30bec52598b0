use super::timing::{TimeOffsetTable, BLOCK_PERIOD_US};

/// Walks block azimuths, yielding `(azimuth, gap)` in degrees for each block
///
/// `gap` is the forward angular travel to the next block, corrected for a
/// rollover from 359.99 to 0. The last block has no successor and reuses the
/// gap of the previous block, a single block gets a gap of zero.
#[derive(Clone, Debug)]
pub struct Sweep<'a> {
    raw: &'a [u16],
    block: usize,
    cur: f64,
    gap: f64,
}

impl<'a> Sweep<'a> {
    /// Create sweep over raw block azimuths in `degrees*100`
    pub fn new(raw: &'a [u16]) -> Self {
        let cur = raw.first().map(|&a| to_degrees(a)).unwrap_or(0.);
        Self { raw, block: 0, cur, gap: 0. }
    }
}

impl<'a> Iterator for Sweep<'a> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.block >= self.raw.len() { return None; }
        let cur = self.cur;
        if let Some(&next) = self.raw.get(self.block + 1) {
            let mut next = to_degrees(next);
            if next < cur {
                next += 360.;
            }
            self.gap = next - cur;
            self.cur = next;
        }
        self.block += 1;
        Some((cur, self.gap))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.raw.len() - self.block;
        (n, Some(n))
    }
}

impl<'a> ExactSizeIterator for Sweep<'a> {}

#[inline(always)]
fn to_degrees(raw: u16) -> f64 {
    f64::from(raw)/100.
}

/// Azimuth of the point fired at position `point` of a block, interpolated
/// by firing time between the block azimuth and the next one.
///
/// Result is always in `[0, 360)`.
#[inline(always)]
pub fn point_azimuth(azimuth: f64, gap: f64, point: usize) -> f64 {
    let dt = TimeOffsetTable::get().in_block(point);
    (azimuth + gap*dt/BLOCK_PERIOD_US).rem_euclid(360.)
}
