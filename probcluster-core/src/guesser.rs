//! Threshold guessers: state machines that sequence the probability
//! threshold `p_curr` probed by the shared clustering loop (§4.5).
//!
//! `above` means the previous guess was unattainable (the cover at that
//! threshold failed); `below` means the previous guess succeeded. Every
//! guesser searches for the *largest* attainable threshold, since a larger
//! `p_curr` is a stronger guarantee on the returned clustering.

fn midpoint(lower: f64, upper: f64) -> f64 {
    lower + (upper - lower) / 2.0
}

/// A sequence of threshold guesses driven by above/below feedback from a
/// cover attempt.
pub trait Guesser {
    /// The current threshold to probe.
    fn current(&self) -> f64;
    /// Reports that the previous guess was unattainable.
    fn above(&mut self);
    /// Reports that the previous guess succeeded.
    fn below(&mut self);
    /// Whether the search has concluded.
    fn stopped(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ExpBisectState {
    Exp,
    Bin { lower: f64, upper: f64 },
}

/// Exponential-then-bisect guesser (G1): starts at `p_curr = 1 - gamma`,
/// halves the remaining gap to 1 on each failure until either a success is
/// found (switching to bisection between the last failure and this
/// success) or the exponential candidate would fall at or below `p_low`
/// (clamping there and bisecting against the last exponential failure).
///
/// # Examples
/// ```
/// use probcluster_core::guesser::{ExponentialBisectGuesser, Guesser};
///
/// let mut guesser = ExponentialBisectGuesser::new(0.1, 0.01);
/// assert!((guesser.current() - 0.9).abs() < 1e-9);
/// guesser.above();
/// assert!(guesser.current() < 0.9);
/// ```
#[derive(Clone, Debug)]
pub struct ExponentialBisectGuesser {
    gamma: f64,
    p_low: f64,
    p_curr: f64,
    previous_p_curr: f64,
    exp_index: i32,
    state: ExpBisectState,
}

impl ExponentialBisectGuesser {
    /// Creates a new guesser with bisection tolerance `gamma` and floor
    /// `p_low`.
    #[must_use]
    pub fn new(gamma: f64, p_low: f64) -> Self {
        let p_curr = (1.0 - gamma).max(p_low);
        Self {
            gamma,
            p_low,
            p_curr,
            previous_p_curr: 1.0,
            exp_index: 0,
            state: ExpBisectState::Exp,
        }
    }
}

impl Guesser for ExponentialBisectGuesser {
    fn current(&self) -> f64 {
        self.p_curr
    }

    fn above(&mut self) {
        match self.state {
            ExpBisectState::Exp => {
                self.previous_p_curr = self.p_curr;
                self.exp_index += 1;
                let candidate = 1.0 - self.gamma * 2f64.powi(self.exp_index);
                if candidate <= self.p_low {
                    self.state = ExpBisectState::Bin {
                        lower: self.p_low,
                        upper: self.p_curr,
                    };
                    self.p_curr = self.p_low;
                } else {
                    self.p_curr = candidate;
                }
            }
            ExpBisectState::Bin { lower, .. } => {
                let upper = self.p_curr;
                self.state = ExpBisectState::Bin { lower, upper };
                self.p_curr = midpoint(lower, upper);
            }
        }
    }

    fn below(&mut self) {
        match self.state {
            ExpBisectState::Exp => {
                let lower = self.p_curr;
                let upper = self.previous_p_curr;
                self.state = ExpBisectState::Bin { lower, upper };
                self.p_curr = midpoint(lower, upper);
            }
            ExpBisectState::Bin { upper, .. } => {
                let lower = self.p_curr;
                self.state = ExpBisectState::Bin { lower, upper };
                self.p_curr = midpoint(lower, upper);
            }
        }
    }

    fn stopped(&self) -> bool {
        match self.state {
            ExpBisectState::Exp => false,
            ExpBisectState::Bin { lower, upper } => (1.0 - lower / upper) <= self.gamma,
        }
    }
}

/// Geometric guesser (G2): `p_curr` starts at 1 and is multiplied by
/// `gamma` on every failure; a success sets a terminal flag.
///
/// # Examples
/// ```
/// use probcluster_core::guesser::{Guesser, GeometricGuesser};
///
/// let mut guesser = GeometricGuesser::new(0.5, 0.01);
/// guesser.above();
/// assert!((guesser.current() - 0.5).abs() < 1e-9);
/// ```
#[derive(Clone, Debug)]
pub struct GeometricGuesser {
    gamma: f64,
    p_low: f64,
    p_curr: f64,
    terminal: bool,
}

impl GeometricGuesser {
    /// Creates a new guesser with shrink rate `gamma` and floor `p_low`.
    #[must_use]
    pub fn new(gamma: f64, p_low: f64) -> Self {
        Self {
            gamma,
            p_low,
            p_curr: 1.0,
            terminal: false,
        }
    }
}

impl Guesser for GeometricGuesser {
    fn current(&self) -> f64 {
        self.p_curr
    }

    fn above(&mut self) {
        self.p_curr *= self.gamma;
    }

    fn below(&mut self) {
        self.terminal = true;
    }

    fn stopped(&self) -> bool {
        self.terminal || self.p_curr < self.p_low
    }
}

/// Uniform guesser (G3): `p_curr` decreases by `gamma` on every failure; a
/// success sets a terminal flag.
///
/// # Examples
/// ```
/// use probcluster_core::guesser::{Guesser, UniformGuesser};
///
/// let mut guesser = UniformGuesser::new(0.1, 0.01);
/// guesser.above();
/// assert!((guesser.current() - 0.9).abs() < 1e-9);
/// ```
#[derive(Clone, Debug)]
pub struct UniformGuesser {
    gamma: f64,
    p_low: f64,
    p_curr: f64,
    terminal: bool,
}

impl UniformGuesser {
    /// Creates a new guesser with step size `gamma` and floor `p_low`.
    #[must_use]
    pub fn new(gamma: f64, p_low: f64) -> Self {
        Self {
            gamma,
            p_low,
            p_curr: 1.0,
            terminal: false,
        }
    }
}

impl Guesser for UniformGuesser {
    fn current(&self) -> f64 {
        self.p_curr
    }

    fn above(&mut self) {
        self.p_curr -= self.gamma;
    }

    fn below(&mut self) {
        self.terminal = true;
    }

    fn stopped(&self) -> bool {
        self.terminal || self.p_curr <= self.p_low
    }
}

/// Score-monotone guesser for the average-probability engine (G1-APC):
/// wraps [`ExponentialBisectGuesser`]'s exponential-then-bisect search over
/// `p_curr`, but advances it by comparing an achieved score (sum of covered
/// probabilities) against the score a fully-covering clustering would need
/// at the current threshold, rather than a plain above/below signal.
///
/// This is the documented resolution of the spec's open question about
/// which of several divergent avg-prob guesser shapes to port: rather than
/// introduce a second, differently-shaped "directional" state machine, the
/// same exponential-then-bisect search is reused with a score-derived
/// above/below translation.
///
/// # Examples
/// ```
/// use probcluster_core::guesser::{Guesser, ScoreMonotoneGuesser};
///
/// let mut guesser = ScoreMonotoneGuesser::new(0.1, 0.01, 10);
/// let threshold = guesser.current();
/// guesser.update(10.0 * threshold);
/// assert!(guesser.current() >= threshold);
/// ```
#[derive(Clone, Debug)]
pub struct ScoreMonotoneGuesser {
    inner: ExponentialBisectGuesser,
    vertex_count_f64: f64,
}

impl ScoreMonotoneGuesser {
    /// Creates a new guesser over a graph of `vertex_count` vertices.
    #[must_use]
    pub fn new(gamma: f64, p_low: f64, vertex_count: usize) -> Self {
        #[expect(
            clippy::cast_precision_loss,
            reason = "vertex counts are far below f64's exact-integer range"
        )]
        let vertex_count_f64 = vertex_count as f64;
        Self {
            inner: ExponentialBisectGuesser::new(gamma, p_low),
            vertex_count_f64,
        }
    }

    /// The current threshold being probed.
    #[must_use]
    pub fn current(&self) -> f64 {
        self.inner.current()
    }

    /// Feeds the achieved score (sum of covered probabilities over all
    /// vertices) for this iteration, advancing the search.
    pub fn update(&mut self, achieved_score: f64) {
        let required = self.inner.current() * self.vertex_count_f64;
        if achieved_score >= required {
            self.inner.below();
        } else {
            self.inner.above();
        }
    }

    /// Whether the search has concluded.
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.inner.stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_bisect_starts_at_one_minus_gamma() {
        let guesser = ExponentialBisectGuesser::new(0.1, 0.01);
        assert!((guesser.current() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn exponential_bisect_moves_to_bin_on_success() {
        let mut guesser = ExponentialBisectGuesser::new(0.1, 0.01);
        guesser.below();
        // Bisecting between the initial success and the 1.0 ceiling should
        // raise the next guess above the initial success value.
        assert!(guesser.current() > 0.9);
    }

    #[test]
    fn exponential_bisect_eventually_stops() {
        let mut guesser = ExponentialBisectGuesser::new(0.2, 0.01);
        let mut iterations = 0;
        while !guesser.stopped() && iterations < 10_000 {
            if iterations % 3 == 0 {
                guesser.below();
            } else {
                guesser.above();
            }
            iterations += 1;
        }
        assert!(guesser.stopped());
    }

    #[test]
    fn exponential_bisect_clamps_to_p_low_eventually() {
        let mut guesser = ExponentialBisectGuesser::new(0.3, 0.05);
        for _ in 0..20 {
            if guesser.stopped() {
                break;
            }
            guesser.above();
        }
        assert!(guesser.current() >= 0.05 - 1e-9);
    }

    #[test]
    fn geometric_guesser_shrinks_on_failure() {
        let mut guesser = GeometricGuesser::new(0.5, 0.01);
        guesser.above();
        assert!((guesser.current() - 0.5).abs() < 1e-9);
        guesser.above();
        assert!((guesser.current() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn geometric_guesser_stops_on_success() {
        let mut guesser = GeometricGuesser::new(0.5, 0.01);
        assert!(!guesser.stopped());
        guesser.below();
        assert!(guesser.stopped());
    }

    #[test]
    fn uniform_guesser_decrements_by_gamma() {
        let mut guesser = UniformGuesser::new(0.1, 0.01);
        guesser.above();
        assert!((guesser.current() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn uniform_guesser_stops_below_floor() {
        let mut guesser = UniformGuesser::new(0.5, 0.4);
        guesser.above();
        assert!(guesser.stopped());
    }

    #[test]
    fn score_monotone_guesser_treats_full_score_as_success() {
        let mut guesser = ScoreMonotoneGuesser::new(0.1, 0.01, 4);
        let threshold = guesser.current();
        guesser.update(4.0);
        assert!(guesser.current() >= threshold);
    }

    #[test]
    fn score_monotone_guesser_treats_low_score_as_failure() {
        let mut guesser = ScoreMonotoneGuesser::new(0.1, 0.01, 4);
        let threshold = guesser.current();
        guesser.update(0.0);
        assert!(guesser.current() < threshold);
    }
}
