//! State of one integration run.

use crate::coefficients::Coefficients;
use crate::compensated::CompensatedSum;
use crate::difference_table::DifferenceTable;
use crate::ode_shared::{FloatNumber, Stats};

use nalgebra::{allocator::Allocator, storage::Storage, DefaultAllocator, Dim, OVector};

/// Everything the step engine remembers between steps.
///
/// A state is owned by exactly one run and is advanced in place by
/// [`step`](IntegratorState::step). Two concurrent integrations need two states.
#[derive(Debug, Clone)]
pub struct IntegratorState<T, V> {
    /// Current value of the independent variable.
    pub(crate) x: T,
    /// Solution at `x`.
    pub(crate) y: V,
    /// Derivative at `(x, y)`. While an attempt is in progress, derivative at the predicted point.
    pub(crate) dy: V,
    /// Predicted solution of the step in progress.
    pub(crate) p: V,
    /// Error weights, refreshed by the caller before each step.
    pub(crate) wt: V,
    /// Signed step size to attempt next.
    pub(crate) h: T,
    /// Size of the last accepted step, zero before the first one.
    pub(crate) hold: T,
    /// Start of the last accepted step.
    pub(crate) x_prev: T,
    /// Order of the formulas, `1 <= k <= 12`.
    pub(crate) k: usize,
    /// Order used on the last accepted step, zero before the first one.
    pub(crate) kold: usize,
    /// Steps taken at the present step size.
    pub(crate) ns: usize,
    /// Consecutive rejected attempts of the step in progress.
    pub(crate) ifail: usize,
    /// True until the first step of a (re)started problem.
    pub(crate) start: bool,
    /// True while the order is being raised at start up.
    pub(crate) phase1: bool,
    /// True when round-off compensation is unnecessary.
    pub(crate) nornd: bool,
    pub(crate) phi: DifferenceTable<V>,
    pub(crate) coefficients: Coefficients<T>,
    pub(crate) residual: CompensatedSum<V>,
    pub(crate) stats: Stats,
}

impl<T, D: Dim> IntegratorState<T, OVector<T, D>>
where
    T: FloatNumber,
    DefaultAllocator: Allocator<T, D>,
{
    /// Creates the state of a new problem starting at `(x, y)`.
    ///
    /// The first step attempts `h` unless the start up heuristic finds it too large;
    /// its sign sets the direction of integration.
    pub fn new(x: T, y: OVector<T, D>, h: T) -> Self {
        let (rows, cols) = y.data.shape();
        Self {
            x,
            dy: OVector::zeros_generic(rows, cols),
            p: OVector::zeros_generic(rows, cols),
            wt: OVector::from_element_generic(rows, cols, T::one()),
            h,
            hold: T::zero(),
            x_prev: x,
            k: 1,
            kold: 0,
            ns: 0,
            ifail: 0,
            start: true,
            phase1: true,
            nornd: true,
            phi: DifferenceTable::new(&y),
            coefficients: Coefficients::new(),
            residual: CompensatedSum::new(&y),
            stats: Stats::new(),
            y,
        }
    }

    /// Restarts the problem at `(x, y)` with a trial step `h`. The difference
    /// table and the coefficients are rebuilt on the next step.
    pub fn restart(&mut self, x: T, y: &OVector<T, D>, h: T) {
        self.x = x;
        self.x_prev = x;
        self.y.copy_from(y);
        self.h = h;
        self.kold = 0;
        self.start = true;
    }

    /// Sets the error weights to `rel * |y| + abs`.
    pub fn refresh_weights(&mut self, rel: T, abs: T) {
        for (w, y) in self.wt.iter_mut().zip(self.y.iter()) {
            *w = rel * y.abs() + abs;
        }
    }

    /// Error weights, for callers that scale the error themselves.
    pub fn weights_mut(&mut self) -> &mut OVector<T, D> {
        &mut self.wt
    }

    /// `sqrt(sum (v / wt)^2)`.
    pub(crate) fn weighted_norm(&self, v: &OVector<T, D>) -> T {
        v.iter()
            .zip(self.wt.iter())
            .fold(T::zero(), |sum, (v, w)| {
                let scaled = *v / *w;
                sum + scaled * scaled
            })
            .sqrt()
    }

    pub fn x(&self) -> T {
        self.x
    }

    pub fn y(&self) -> &OVector<T, D> {
        &self.y
    }

    pub fn dy(&self) -> &OVector<T, D> {
        &self.dy
    }

    /// Step size the next step will attempt.
    pub fn h(&self) -> T {
        self.h
    }

    /// Sets the step size the next step will attempt.
    pub fn set_h(&mut self, h: T) {
        self.h = h;
    }

    /// Order the next step will use.
    pub fn order(&self) -> usize {
        self.k
    }

    /// Order used on the last accepted step, zero if none was taken yet.
    pub fn last_order(&self) -> usize {
        self.kold
    }

    /// Bounds of the last accepted step, in the direction of integration.
    pub fn span(&self) -> (T, T) {
        (self.x_prev, self.x)
    }

    /// Whether the next step starts a new problem.
    pub fn is_starting(&self) -> bool {
        self.start
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub(crate) fn dimension(&self) -> usize {
        self.y.len()
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> bool {
        use crate::constants::MAX_ORDER;
        (1..=MAX_ORDER).contains(&self.k) && self.kold <= MAX_ORDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DVector, Vector2};

    #[test]
    fn new_state_is_starting_at_order_one() {
        let state = IntegratorState::new(0.5, Vector2::new(1.0, 2.0), 0.1);
        assert!(state.is_starting());
        assert_eq!(state.order(), 1);
        assert_eq!(state.last_order(), 0);
        assert_eq!(state.span(), (0.5, 0.5));
        assert!(state.check_invariants());
    }

    #[test]
    fn weights_mix_relative_and_absolute_parts() {
        let mut state = IntegratorState::new(0.0, DVector::from_vec(vec![-2.0, 0.0, 4.0]), 0.1);
        state.refresh_weights(0.5, 1.0);
        assert_eq!(*state.weights_mut(), DVector::from_vec(vec![2.0, 1.0, 3.0]));
        let norm = state.weighted_norm(&DVector::from_vec(vec![2.0, 0.0, 3.0]));
        assert!((norm - 2.0f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn restart_resets_start_flag() {
        let mut state = IntegratorState::new(0.0, Vector2::new(1.0, 2.0), 0.1);
        state.start = false;
        state.kold = 4;
        state.restart(1.0, &Vector2::new(3.0, 4.0), -0.2);
        assert!(state.is_starting());
        assert_eq!(state.x(), 1.0);
        assert_eq!(*state.y(), Vector2::new(3.0, 4.0));
        assert_eq!(state.h(), -0.2);
        assert_eq!(state.last_order(), 0);
    }
}
