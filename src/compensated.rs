//! Round-off compensated accumulation of the solution.
//!
//! Each step adds two increments to the solution: the predictor's and the
//! corrector's. When the tolerance is close to round-off the low order bits of
//! those increments are lost in the addition, so the lost part is carried over
//! to the next addition, Kahan style. A rejected step discards the residual of
//! its prediction and keeps the one of the last correction.

use crate::ode_shared::FloatNumber;

use nalgebra::{allocator::Allocator, storage::Storage, DefaultAllocator, Dim, OVector};

/// Paired Kahan accumulator for the predict/correct additions of a step.
#[derive(Debug, Clone)]
pub struct CompensatedSum<V> {
    /// Residual left by the last accepted correction.
    committed: V,
    /// Residual left by the prediction of the step in progress.
    pending: V,
}

impl<T, D: Dim> CompensatedSum<OVector<T, D>>
where
    T: FloatNumber,
    DefaultAllocator: Allocator<T, D>,
{
    /// Creates an accumulator with zero residuals, shaped like `template`.
    pub fn new(template: &OVector<T, D>) -> Self {
        let (rows, cols) = template.data.shape();
        Self {
            committed: OVector::zeros_generic(rows, cols),
            pending: OVector::zeros_generic(rows, cols),
        }
    }

    /// Forgets every residual.
    pub fn reset(&mut self) {
        self.committed.fill(T::zero());
        self.pending.fill(T::zero());
    }

    /// Computes `base + increment`, compensated by the committed residual.
    ///
    /// The residual of this addition is kept aside until [`commit`](Self::commit)
    /// consumes it; calling `provisional` again simply replaces it.
    pub fn provisional(
        &mut self,
        base: &OVector<T, D>,
        increment: &OVector<T, D>,
        sum: &mut OVector<T, D>,
    ) {
        for l in 0..base.len() {
            let tau = increment[l] - self.committed[l];
            sum[l] = base[l] + tau;
            self.pending[l] = (sum[l] - base[l]) - tau;
        }
    }

    /// Computes `base + increment`, compensated by the residual of the last
    /// provisional addition, and commits the new residual.
    pub fn commit(
        &mut self,
        base: &OVector<T, D>,
        increment: &OVector<T, D>,
        sum: &mut OVector<T, D>,
    ) {
        for l in 0..base.len() {
            let rho = increment[l] - self.pending[l];
            sum[l] = base[l] + rho;
            self.committed[l] = (sum[l] - base[l]) - rho;
        }
    }

    /// Residual carried into the next step.
    pub fn residual(&self) -> &OVector<T, D> {
        &self.committed
    }
}
