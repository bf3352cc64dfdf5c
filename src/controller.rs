//! Order and step size control.

use crate::constants::{cast, machine, two, MAX_ORDER};
use crate::ode_shared::{sign, FloatNumber};

/// Weighted local error estimates of one attempt.
///
/// `erk`, `erkm1` and `erkm2` estimate the error a constant step size
/// formula of order k, k-1 and k-2 would have made; they are zero when the
/// order is too low for them to exist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorEstimates<T> {
    /// Error of the step actually taken. The step is accepted when `err <= eps`.
    pub err: T,
    pub erk: T,
    pub erkm1: T,
    pub erkm2: T,
}

impl<T: FloatNumber> ErrorEstimates<T> {
    /// Order suggested by the attempt: one lower when the lower order
    /// estimates are not worse than the order k one. With only one lower
    /// order available the comparison is stricter.
    pub fn suggested_order(&self, k: usize) -> usize {
        if k >= 3 {
            if self.erkm1.max(self.erkm2) <= self.erk {
                return k - 1;
            }
        } else if k == 2 && self.erkm1 <= cast::<T, _>(0.5) * self.erk {
            return 1;
        }
        k
    }
}

/// Outcome of a rejected attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rejection<T> {
    /// Factor applied to the step size.
    pub factor: T,
    /// Whether the next attempt is forced to order one.
    pub order_one: bool,
}

/// Reaction to the `ifail`-th consecutive rejection.
///
/// The step size is halved; from the fourth failure on the factor predicted
/// from the order k error is used instead when it shrinks more. From the
/// third failure on the order drops to one.
pub fn rejection<T: FloatNumber>(ifail: usize, p5eps: T, erk: T) -> Rejection<T> {
    let mut factor = cast(0.5);
    if ifail > 3 && p5eps < cast::<T, _>(0.25) * erk {
        factor = (p5eps / erk).sqrt();
    }
    Rejection {
        factor,
        order_one: ifail >= 3,
    }
}

/// Chooses the order of the next step after an accepted one at order `k`.
///
/// `knew` is the order suggested while estimating errors and `ns` the number
/// of steps taken at the current step size. The order k+1 estimate is only
/// computed, through `erkp1`, when it is meaningful. Returns the new order
/// together with the error estimate at that order.
pub fn next_order<T, F>(
    k: usize,
    knew: usize,
    ns: usize,
    phase1: bool,
    estimates: &ErrorEstimates<T>,
    erkp1: F,
) -> (usize, T)
where
    T: FloatNumber,
    F: FnOnce() -> T,
{
    let raise = |erkp1: T| (k + 1, erkp1);
    let lower = (k - 1, estimates.erkm1);
    let hold = (k, estimates.erk);

    if phase1 {
        return raise(T::zero());
    }
    if knew + 1 == k {
        return lower;
    }
    if k + 1 > ns {
        return hold;
    }

    let erkp1 = erkp1();
    if k > 1 {
        if estimates.erkm1 <= estimates.erk.min(erkp1) {
            lower
        } else if erkp1 >= estimates.erk || k == MAX_ORDER {
            hold
        } else {
            // erkp1 < erk < max(erkm1, erkm2), else the order would have been lowered
            raise(erkp1)
        }
    } else if erkp1 >= cast::<T, _>(0.5) * estimates.erk {
        hold
    } else {
        raise(erkp1)
    }
}

/// Step size for the next step, given the order `k` chosen for it and its
/// error estimate `erk`.
///
/// While raising the order at start up, or when the error is far below the
/// tolerance, the step is doubled. Otherwise it is kept unless the error
/// exceeds half the tolerance, in which case it shrinks by a factor within
/// [0.5, 0.9].
pub fn next_step_size<T: FloatNumber>(
    h: T,
    x: T,
    k: usize,
    phase1: bool,
    p5eps: T,
    erk: T,
) -> T {
    if phase1 || p5eps >= erk * two::<T>(k) {
        return h + h;
    }
    if p5eps >= erk {
        return h;
    }
    let r = (p5eps / erk).powf(T::one() / cast::<T, _>(k + 1));
    let hnew = h.abs() * cast::<T, _>(0.5).max(cast::<T, _>(0.9).min(r));
    sign(hnew.max(machine::step_floor(x)), h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimates(erk: f64, erkm1: f64, erkm2: f64) -> ErrorEstimates<f64> {
        ErrorEstimates {
            err: 0.0,
            erk,
            erkm1,
            erkm2,
        }
    }

    #[test]
    fn lowers_order_when_lower_estimates_are_not_worse() {
        assert_eq!(estimates(1.0, 1.0, 0.5).suggested_order(5), 4);
        assert_eq!(estimates(1.0, 1.1, 0.5).suggested_order(5), 5);
        assert_eq!(estimates(1.0, 0.5, 1.1).suggested_order(3), 3);
    }

    #[test]
    fn order_two_uses_stricter_test() {
        assert_eq!(estimates(1.0, 0.5, 0.0).suggested_order(2), 1);
        assert_eq!(estimates(1.0, 0.6, 0.0).suggested_order(2), 2);
        assert_eq!(estimates(1.0, 0.0, 0.0).suggested_order(1), 1);
    }

    #[test]
    fn rejection_policy() {
        let first = rejection::<f64>(1, 1e-9, 1.0);
        assert_eq!(first.factor, 0.5);
        assert!(!first.order_one);

        let third = rejection::<f64>(3, 1e-9, 1.0);
        assert_eq!(third.factor, 0.5);
        assert!(third.order_one);

        let fourth = rejection::<f64>(4, 1e-8, 1.0);
        assert!((fourth.factor - 1e-4).abs() < 1e-18);
        assert!(fourth.order_one);

        // predicted factor above one half: keep halving
        let mild = rejection::<f64>(5, 0.3, 1.0);
        assert_eq!(mild.factor, 0.5);
    }

    #[test]
    fn phase1_always_raises() {
        let e = estimates(1.0, 0.1, 0.1);
        let (k, erk) = next_order(3, 3, 1, true, &e, || panic!("not needed"));
        assert_eq!((k, erk), (4, 0.0));
    }

    #[test]
    fn suggested_lower_order_wins_after_phase1() {
        let e = estimates(1.0, 0.25, 0.1);
        let (k, erk) = next_order(4, 3, 6, false, &e, || panic!("not needed"));
        assert_eq!((k, erk), (3, 0.25));
    }

    #[test]
    fn changing_step_size_holds_order() {
        let e = estimates(1.0, 2.0, 2.0);
        let (k, erk) = next_order(4, 4, 4, false, &e, || panic!("not needed"));
        assert_eq!((k, erk), (4, 1.0));
    }

    #[test]
    fn order_from_k_plus_one_estimate() {
        let e = estimates(1.0, 2.0, 3.0);
        assert_eq!(next_order(4, 4, 5, false, &e, || 0.5), (5, 0.5));
        assert_eq!(next_order(4, 4, 5, false, &e, || 1.0), (4, 1.0));
        assert_eq!(
            next_order(MAX_ORDER, MAX_ORDER, 13, false, &e, || 0.5),
            (MAX_ORDER, 1.0)
        );
        let e = estimates(1.0, 0.4, 3.0);
        assert_eq!(next_order(4, 4, 5, false, &e, || 0.5), (3, 0.4));
    }

    #[test]
    fn order_one_raise_threshold_is_pinned_at_one_half() {
        // Empirical threshold: raise from order one only if erkp1 < erk / 2.
        let e = estimates(1.0, 0.0, 0.0);
        assert_eq!(next_order(1, 1, 2, false, &e, || 0.5), (1, 1.0));
        assert_eq!(next_order(1, 1, 2, false, &e, || 0.499_999), (2, 0.499_999));
    }

    #[test]
    fn step_doubles_while_raising_order_or_far_below_tolerance() {
        assert_eq!(next_step_size(0.1, 0.0, 3, true, 1e-8, 1.0), 0.2);
        // two[3] = 16
        assert_eq!(next_step_size(-0.1, 0.0, 3, false, 2e-7, 1e-8), -0.2);
    }

    #[test]
    fn step_is_kept_below_half_tolerance() {
        assert_eq!(next_step_size(0.1, 0.0, 3, false, 1e-8, 1e-8), 0.1);
        assert_eq!(next_step_size(0.1, 0.0, 3, false, 1e-8, 1e-9), 0.1);
    }

    #[test]
    fn step_shrink_is_clamped() {
        // r = (1/2)^(1/4) ~ 0.84
        let h = next_step_size(0.1, 0.0, 3, false, 1e-8, 2e-8);
        assert!((h - 0.1 * 0.5f64.powf(0.25)).abs() < 1e-15);
        // r tiny: at most halved
        assert_eq!(next_step_size(-0.1, 0.0, 3, false, 1e-8, 1.0), -0.05);
        // r close to one: at least 10 % smaller
        let h = next_step_size(0.1, 0.0, 3, false, 1e-8, 1.000_001e-8);
        assert_eq!(h, 0.1 * 0.9);
    }

    #[test]
    fn step_never_below_floor() {
        let tiny = 1e-20;
        let h = next_step_size(tiny, 1.0e4, 2, false, 1e-8, 1.0);
        assert_eq!(h, machine::step_floor(1.0e4));
    }
}
