//! Voltage sweep generation
//!
//! Screening ramps the bias up in fixed increments. The full test sweeps
//! the gate down to its minimum, across to its maximum and back to zero,
//! taking half as many points on the outer legs.

/// Source ranges offered by the source meter, largest first (volts)
pub const SOURCE_RANGES_V: [f64; 5] = [200.0, 20.0, 2.0, 0.2, 0.02];

/// Evenly spaced points from `start` to `end` inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linspace {
    start: f64,
    end: f64,
    num: usize,
    next: usize,
}

impl Linspace {
    /// `num` points from `start` to `end`; one point yields `start` only
    pub fn new(start: f64, end: f64, num: usize) -> Self {
        Self {
            start,
            end,
            num,
            next: 0,
        }
    }

    fn value(&self, i: usize) -> f64 {
        if self.num <= 1 {
            return self.start;
        }
        if i + 1 == self.num {
            return self.end;
        }
        self.start + (self.end - self.start) * i as f64 / (self.num - 1) as f64
    }
}

impl Iterator for Linspace {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.next >= self.num {
            return None;
        }
        let value = self.value(self.next);
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.num - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Linspace {}

/// Number of points for a leg of `span_v` volts at `step_mv` spacing
///
/// Truncates like an integer cast; negative spans give no points.
fn leg_points(span_v: f64, step_mv: f64) -> usize {
    if step_mv <= 0.0 {
        return 0;
    }
    let count = span_v / (step_mv * 1e-3) + 1.0;
    if count < 1.0 {
        0
    } else {
        count as usize
    }
}

/// Bias ramp for screening: 0, step, 2*step ... up to `max_mv` (volts out)
pub fn bias_points(max_mv: f64, step_mv: f64) -> Linspace {
    if step_mv <= 0.0 || max_mv < 0.0 {
        return Linspace::new(0.0, 0.0, 1);
    }
    let count = (max_mv / step_mv) as usize + 1;
    let last_v = (count - 1) as f64 * step_mv * 1e-3;
    Linspace::new(0.0, last_v, count)
}

/// Gate sweep for the full test
pub type GateSweep = core::iter::Chain<core::iter::Chain<Linspace, Linspace>, Linspace>;

/// Gate points: 0 to `min_v` at double step, `min_v` to `max_v` at step,
/// `max_v` back to 0 at double step
pub fn gate_points(min_v: f64, max_v: f64, step_mv: f64) -> GateSweep {
    let down = Linspace::new(0.0, min_v, leg_points(-min_v, step_mv * 2.0));
    let full = Linspace::new(min_v, max_v, leg_points(max_v - min_v, step_mv));
    let back = Linspace::new(max_v, 0.0, leg_points(max_v, step_mv * 2.0));
    down.chain(full).chain(back)
}

/// Smallest source range that still exceeds `bias_v`
pub fn source_range_for(bias_v: f64) -> f64 {
    let mut range = SOURCE_RANGES_V[0];
    for limit in SOURCE_RANGES_V {
        if limit > bias_v {
            range = limit;
        } else {
            break;
        }
    }
    range
}
