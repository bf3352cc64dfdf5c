//! One step of the variable order, variable step Adams PECE method.
//!
//! A step predicts with the order `k` Adams-Bashforth formula, evaluates the
//! derivative at the predicted point, estimates the local error at orders k-2
//! to k and either corrects with the Adams-Moulton formula and evaluates again,
//! or halves the step and tries again. After an accepted step the order and
//! step size of the next step are chosen.

use crate::constants::{cast, gstr, machine, MAX_ORDER};
use crate::controller::{self, ErrorEstimates};
use crate::ode_shared::{sign, FloatNumber, StepStatus, System};
use crate::state::IntegratorState;

use log::{debug, trace};
use nalgebra::{allocator::Allocator, DefaultAllocator, Dim, OVector};

impl<T, D: Dim> IntegratorState<T, OVector<T, D>>
where
    T: FloatNumber,
    DefaultAllocator: Allocator<T, D>,
{
    /// Advances the solution by one step.
    ///
    /// `eps` is the local error tolerance, measured against the weights set
    /// with [`refresh_weights`](Self::refresh_weights). On
    /// [`StepStatus::ToleranceRaised`] the state is untouched and `eps` holds
    /// an acceptable tolerance. On [`StepStatus::Crashed`] the step size has
    /// collapsed to the floor allowed at `x`; `x`, `y` and `dy` still describe
    /// the last accepted point and `eps` may have been doubled.
    pub fn step<F>(&mut self, f: &F, eps: &mut T) -> StepStatus
    where
        F: System<T, OVector<T, D>>,
    {
        if machine::below_floor(self.h, self.x) {
            self.h = sign(machine::step_floor(self.x), self.h);
            return StepStatus::Crashed;
        }
        let p5eps = cast::<T, _>(0.5) * *eps;

        // a tolerance below round-off cannot be met
        let round = machine::twou::<T>() * self.weighted_norm(&self.y);
        if p5eps < round {
            *eps = cast::<T, _>(2.0) * round * (T::one() + machine::fouru::<T>());
            return StepStatus::ToleranceRaised;
        }

        self.coefficients.reset_leading();
        if self.start {
            self.initialize(f, *eps, p5eps, round);
        }
        self.ifail = 0;

        loop {
            self.coefficients
                .refresh(self.h, self.hold, self.k, self.kold, &mut self.ns);
            self.predict();

            let xold = self.x;
            self.x = self.x + self.h;
            f.system(self.x, &self.p, &mut self.dy);
            self.stats.num_eval += 1;

            let estimates = self.estimate_errors();
            let knew = estimates.suggested_order(self.k);
            if estimates.err <= *eps {
                self.accept(f, &estimates, knew, xold, p5eps);
                return StepStatus::Accepted;
            }

            self.x = xold;
            if !self.reject(&estimates, knew, p5eps) {
                *eps = *eps + *eps;
                // dy still belongs to the rejected predicted point
                f.system(self.x, &self.y, &mut self.dy);
                self.stats.num_eval += 1;
                return StepStatus::Crashed;
            }
        }
    }

    /// First step of a problem: seeds the history and picks a safe step size.
    fn initialize<F>(&mut self, f: &F, eps: T, p5eps: T, round: T)
    where
        F: System<T, OVector<T, D>>,
    {
        f.system(self.x, &self.y, &mut self.dy);
        self.stats.num_eval += 1;
        self.phi.seed(&self.dy);
        let sum = self.weighted_norm(&self.dy);

        let mut absh = self.h.abs();
        if eps < cast::<T, _>(16.0) * sum * self.h * self.h {
            absh = cast::<T, _>(0.25) * (eps / sum).sqrt();
        }
        self.h = sign(absh.max(machine::step_floor(self.x)), self.h);

        self.hold = T::zero();
        self.k = 1;
        self.kold = 0;
        self.ns = 0;
        self.x_prev = self.x;
        self.start = false;
        self.phase1 = true;
        self.nornd = true;
        if p5eps <= cast::<T, _>(100.0) * round {
            self.nornd = false;
            self.residual.reset();
        }
        debug!(
            "Adams start at x = {} with h = {}, round-off compensation {}",
            self.x,
            self.h,
            if self.nornd { "off" } else { "on" }
        );
    }

    /// Forms the predicted solution `p` and the predicted differences.
    fn predict(&mut self) {
        let k = self.k;
        self.phi.to_phi_star(&self.coefficients.beta, self.ns, k);
        self.phi.predict(&self.coefficients.g, k, &mut self.p);

        let h = self.h;
        if self.nornd {
            for (p, y) in self.p.iter_mut().zip(self.y.iter()) {
                *p = *y + h * *p;
            }
        } else {
            let mut increment = self.p.clone();
            for value in increment.iter_mut() {
                *value = h * *value;
            }
            self.residual.provisional(&self.y, &increment, &mut self.p);
        }
    }

    /// Local error estimates at orders k, k-1 and k-2, from the derivative at
    /// the predicted point.
    fn estimate_errors(&self) -> ErrorEstimates<T> {
        let k = self.k;
        let absh = self.h.abs();
        let phi0 = self.phi.column(0);
        let mut erkm2 = T::zero();
        let mut erkm1 = T::zero();
        let mut erk = T::zero();
        for l in 0..self.dimension() {
            let temp3 = T::one() / self.wt[l];
            let temp4 = self.dy[l] - phi0[l];
            if k >= 3 {
                let e = (self.phi.column(k - 2)[l] + temp4) * temp3;
                erkm2 = erkm2 + e * e;
            }
            if k >= 2 {
                let e = (self.phi.column(k - 1)[l] + temp4) * temp3;
                erkm1 = erkm1 + e * e;
            }
            let e = temp4 * temp3;
            erk = erk + e * e;
        }

        let c = &self.coefficients;
        if k >= 3 {
            erkm2 = absh * c.sig[k - 2] * gstr::<T>(k - 3) * erkm2.sqrt();
        }
        if k >= 2 {
            erkm1 = absh * c.sig[k - 1] * gstr::<T>(k - 2) * erkm1.sqrt();
        }
        let temp5 = absh * erk.sqrt();
        ErrorEstimates {
            err: temp5 * (c.g[k - 1] - c.g[k]),
            erk: temp5 * c.sig[k] * gstr::<T>(k - 1),
            erkm1,
            erkm2,
        }
    }

    /// Undoes a failed attempt and shrinks the step. Returns `false` when the
    /// step size collapsed below the floor allowed at `x`.
    fn reject(&mut self, estimates: &ErrorEstimates<T>, knew: usize, p5eps: T) -> bool {
        let k = self.k;
        self.phase1 = false;
        self.phi.restore(&self.coefficients.beta, k);
        self.coefficients.restore_psi(self.h, k);
        self.ifail += 1;
        self.stats.rejected_steps += 1;

        let rejection = controller::rejection(self.ifail, p5eps, estimates.erk);
        trace!(
            "Adams step rejected at x = {}: h = {}, k = {}, err = {}, failure {}",
            self.x,
            self.h,
            k,
            estimates.err,
            self.ifail
        );
        self.h = rejection.factor * self.h;
        self.k = if rejection.order_one { 1 } else { knew };

        if machine::below_floor(self.h, self.x) {
            self.h = sign(machine::step_floor(self.x), self.h);
            return false;
        }
        true
    }

    /// Corrects, evaluates and updates the history after a successful attempt,
    /// then chooses the order and step size of the next step.
    fn accept<F>(
        &mut self,
        f: &F,
        estimates: &ErrorEstimates<T>,
        knew: usize,
        xold: T,
        p5eps: T,
    ) where
        F: System<T, OVector<T, D>>,
    {
        let k = self.k;
        self.kold = k;
        self.hold = self.h;
        self.x_prev = xold;

        let temp1 = self.h * self.coefficients.g[k];
        let phi0 = self.phi.column(0);
        if self.nornd {
            for l in 0..self.dimension() {
                self.y[l] = self.p[l] + temp1 * (self.dy[l] - phi0[l]);
            }
        } else {
            let mut increment = self.dy.clone();
            for (value, phi) in increment.iter_mut().zip(phi0.iter()) {
                *value = temp1 * (*value - *phi);
            }
            self.residual.commit(&self.p, &increment, &mut self.y);
        }
        f.system(self.x, &self.y, &mut self.dy);
        self.stats.num_eval += 1;
        self.phi.update(&self.dy, k);

        if knew + 1 == k || k == MAX_ORDER {
            if self.phase1 {
                debug!("Adams order ramp ends at x = {} with k = {}", self.x, k);
            }
            self.phase1 = false;
        }

        let absh = self.h.abs();
        let (k_next, erk) = {
            let phi = &self.phi;
            let wt = &self.wt;
            controller::next_order(k, knew, self.ns, self.phase1, estimates, || {
                absh * gstr::<T>(k) * phi.weighted_norm(k + 1, wt)
            })
        };
        self.k = k_next;
        self.h = controller::next_step_size(self.h, self.x, k_next, self.phase1, p5eps, erk);
        self.ifail = 0;
        self.stats.accepted_steps += 1;
    }
}
