//! Coefficients of the variable step Adams formulas.
//!
//! All arrays are indexed by order - 1. `psi[i]` is the distance from the point
//! being stepped to the one `i + 1` steps back, `g` holds the predictor weights
//! and `sig`, `alpha`, `beta` the scalings between the modified divided
//! differences of consecutive steps. `v` and `w` are work arrays from which `g`
//! is built; `v` carries over between steps.

use crate::constants::{cast, MAX_ORDER};
use crate::ode_shared::FloatNumber;

#[derive(Debug, Clone)]
pub struct Coefficients<T> {
    pub(crate) alpha: [T; MAX_ORDER],
    pub(crate) beta: [T; MAX_ORDER],
    pub(crate) psi: [T; MAX_ORDER],
    pub(crate) sig: [T; MAX_ORDER + 1],
    pub(crate) g: [T; MAX_ORDER + 1],
    v: [T; MAX_ORDER],
    w: [T; MAX_ORDER],
}

impl<T: FloatNumber> Coefficients<T> {
    pub fn new() -> Self {
        let zero = T::zero();
        let mut coefficients = Self {
            alpha: [zero; MAX_ORDER],
            beta: [zero; MAX_ORDER],
            psi: [zero; MAX_ORDER],
            sig: [zero; MAX_ORDER + 1],
            g: [zero; MAX_ORDER + 1],
            v: [zero; MAX_ORDER],
            w: [zero; MAX_ORDER],
        };
        coefficients.reset_leading();
        coefficients
    }

    /// Sets the entries that never change: `g[0] = 1`, `g[1] = 1/2`, `sig[0] = 1`.
    pub(crate) fn reset_leading(&mut self) {
        self.g[0] = T::one();
        self.g[1] = cast(0.5);
        self.sig[0] = T::one();
    }

    /// Brings the coefficients up to date for a step of size `h` at order `k`.
    ///
    /// `ns` counts the steps taken with the current step size, the one about to
    /// be taken included. It restarts when `h` differs from `hold`, the size of
    /// the last accepted step, and saturates one past `kold`. Once `k < ns` the
    /// formulas are those of a constant step size and nothing is recomputed.
    pub(crate) fn refresh(&mut self, h: T, hold: T, k: usize, kold: usize, ns: &mut usize) {
        if h != hold {
            *ns = 0;
        }
        if *ns <= kold {
            *ns += 1;
        }
        let ns = *ns;
        if k < ns {
            return;
        }
        let nsp1 = ns + 1;

        // alpha, beta, psi and sig beyond the constant step part
        self.beta[ns - 1] = T::one();
        let realns: T = cast(ns);
        self.alpha[ns - 1] = T::one() / realns;
        let mut temp1 = h * realns;
        self.sig[ns] = T::one();
        for i in nsp1..=k {
            let temp2 = self.psi[i - 2];
            self.psi[i - 2] = temp1;
            self.beta[i - 1] = self.beta[i - 2] * self.psi[i - 2] / temp2;
            temp1 = temp2 + h;
            self.alpha[i - 1] = h / temp1;
            self.sig[i] = cast::<T, _>(i) * self.alpha[i - 1] * self.sig[i - 1];
        }
        self.psi[k - 1] = temp1;

        if ns <= 1 {
            for iq in 1..=k {
                self.v[iq - 1] = T::one() / cast::<T, _>(iq * (iq + 1));
                self.w[iq - 1] = self.v[iq - 1];
            }
        } else {
            if k > kold {
                // order was raised: new diagonal entry of v
                self.v[k - 1] = T::one() / cast::<T, _>(k * (k + 1));
                for j in 1..=ns - 2 {
                    let i = k - j;
                    self.v[i - 1] = self.v[i - 1] - self.alpha[j] * self.v[i];
                }
            }
            let limit1 = k + 1 - ns;
            let temp5 = self.alpha[ns - 1];
            for iq in 1..=limit1 {
                self.v[iq - 1] = self.v[iq - 1] - temp5 * self.v[iq];
                self.w[iq - 1] = self.v[iq - 1];
            }
            self.g[ns] = self.w[0];
        }

        for i in ns + 2..=k + 1 {
            let limit2 = k + 2 - i;
            let temp6 = self.alpha[i - 2];
            for iq in 1..=limit2 {
                self.w[iq - 1] = self.w[iq - 1] - temp6 * self.w[iq];
            }
            self.g[i - 1] = self.w[0];
        }
    }

    /// Undoes the `psi` update of a rejected step of size `h` at order `k`.
    pub(crate) fn restore_psi(&mut self, h: T, k: usize) {
        for i in 2..=k {
            self.psi[i - 2] = self.psi[i - 1] - h;
        }
    }

    /// Distances back from the current point, for orders up to `k`.
    pub fn psi(&self, k: usize) -> &[T] {
        &self.psi[..k]
    }
}

impl<T: FloatNumber> Default for Coefficients<T> {
    fn default() -> Self {
        Self::new()
    }
}
