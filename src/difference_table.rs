//! Modified divided differences of the derivative history.
//!
//! Column `i` (0-based) holds the `i`-th modified divided difference. Between
//! steps the table describes the polynomial interpolating the derivative at the
//! last `k + 1` accepted points. During a step the first `k` columns are turned
//! into "phi star" form and then into the predicted differences; a rejected step
//! undoes both transformations.

use crate::constants::PHI_COLUMNS;
use crate::ode_shared::FloatNumber;

use nalgebra::{allocator::Allocator, storage::Storage, DefaultAllocator, Dim, OVector};

#[derive(Debug, Clone)]
pub struct DifferenceTable<V> {
    columns: Vec<V>,
}

impl<T, D: Dim> DifferenceTable<OVector<T, D>>
where
    T: FloatNumber,
    DefaultAllocator: Allocator<T, D>,
{
    /// Creates a zero table shaped like `template`.
    pub fn new(template: &OVector<T, D>) -> Self {
        let (rows, cols) = template.data.shape();
        Self {
            columns: vec![OVector::zeros_generic(rows, cols); PHI_COLUMNS],
        }
    }

    /// Starts a new history from the derivative at the initial point.
    pub fn seed(&mut self, dy: &OVector<T, D>) {
        self.columns[0].copy_from(dy);
        for column in self.columns.iter_mut().skip(1) {
            column.fill(T::zero());
        }
    }

    pub fn column(&self, i: usize) -> &OVector<T, D> {
        &self.columns[i]
    }

    /// First `n` columns.
    pub fn columns(&self, n: usize) -> &[OVector<T, D>] {
        &self.columns[..n]
    }

    /// Scales columns `ns..k` by `beta`, turning them into phi star.
    pub fn to_phi_star(&mut self, beta: &[T], ns: usize, k: usize) {
        for i in ns..k {
            let b = beta[i];
            for value in self.columns[i].iter_mut() {
                *value = b * *value;
            }
        }
    }

    /// Forms the predictor sum `p = sum g[i] * phi*[i]` over the first `k`
    /// columns and turns the table into the predicted differences.
    pub fn predict(&mut self, g: &[T], k: usize, p: &mut OVector<T, D>) {
        let (lower, upper) = self.columns.split_at_mut(k + 1);
        upper[0].copy_from(&lower[k]);
        lower[k].fill(T::zero());
        p.fill(T::zero());
        for i in (0..k).rev() {
            let gi = g[i];
            let (head, tail) = lower.split_at_mut(i + 1);
            let entries = p.iter_mut().zip(head[i].iter_mut()).zip(tail[0].iter());
            for ((pl, phi), next) in entries {
                *pl = *pl + gi * *phi;
                *phi = *phi + *next;
            }
        }
    }

    /// Undoes [`predict`](Self::predict) and [`to_phi_star`](Self::to_phi_star)
    /// for a rejected step.
    pub fn restore(&mut self, beta: &[T], k: usize) {
        for i in 0..k {
            let temp1 = T::one() / beta[i];
            let (head, tail) = self.columns.split_at_mut(i + 1);
            for (phi, next) in head[i].iter_mut().zip(tail[0].iter()) {
                *phi = temp1 * (*phi - *next);
            }
        }
    }

    /// Folds the derivative `dy` at the accepted point into the table.
    pub fn update(&mut self, dy: &OVector<T, D>, k: usize) {
        let (lower, upper) = self.columns.split_at_mut(k);
        let (current, beyond) = upper.split_at_mut(1);
        for l in 0..dy.len() {
            current[0][l] = dy[l] - lower[0][l];
            beyond[0][l] = current[0][l] - beyond[0][l];
        }
        for column in lower.iter_mut() {
            for (phi, correction) in column.iter_mut().zip(current[0].iter()) {
                *phi = *phi + *correction;
            }
        }
    }

    /// `sqrt(sum (phi[i] / wt)^2)`.
    pub fn weighted_norm(&self, i: usize, wt: &OVector<T, D>) -> T {
        self.columns[i]
            .iter()
            .zip(wt.iter())
            .fold(T::zero(), |sum, (phi, w)| sum + (*phi / *w).powi(2))
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    fn table() -> DifferenceTable<Vector2<f64>> {
        let mut table = DifferenceTable::new(&Vector2::zeros());
        for i in 0..4 {
            table.columns[i] = Vector2::new(1.0 + i as f64, -0.5 * i as f64);
        }
        table
    }

    #[test]
    fn seed_clears_history() {
        let mut table = table();
        table.seed(&Vector2::new(3.0, 4.0));
        assert_eq!(*table.column(0), Vector2::new(3.0, 4.0));
        for i in 1..PHI_COLUMNS {
            assert_eq!(*table.column(i), Vector2::zeros());
        }
    }

    #[test]
    fn predict_then_restore_round_trips() {
        let mut table = table();
        let original = table.clone();
        let beta = [1.0, 2.0, 0.5, 4.0];
        let g = [1.0, 0.5, 5.0 / 12.0];
        let k = 3;
        let mut p = Vector2::zeros();
        table.to_phi_star(&beta, 1, k);
        table.predict(&g, k, &mut p);
        table.restore(&beta, k);
        for i in 0..k {
            assert!((table.column(i) - original.column(i)).norm() < 1e-14);
        }
        // the highest difference is parked one column up
        assert_eq!(table.column(k + 1), original.column(k));
    }

    #[test]
    fn predict_weights_columns_with_g() {
        let mut table = table();
        let g = [1.0, 0.5];
        let mut p = Vector2::zeros();
        table.predict(&g, 2, &mut p);
        // p = g0 * phi0 + g1 * phi1
        assert_eq!(p, Vector2::new(1.0 + 0.5 * 2.0, 0.5 * -0.5));
        assert_eq!(*table.column(2), Vector2::zeros());
        assert_eq!(*table.column(1), Vector2::new(2.0, -0.5));
        assert_eq!(*table.column(0), Vector2::new(3.0, -0.5));
    }

    #[test]
    fn update_adds_correction_to_active_columns() {
        let mut table = table();
        let dy = Vector2::new(2.0, 1.0);
        table.update(&dy, 2);
        // correction e = dy - phi0
        let e = Vector2::new(1.0, 1.0);
        assert_eq!(*table.column(2), e);
        assert_eq!(*table.column(3), e - Vector2::new(4.0, -1.5));
        assert_eq!(*table.column(0), Vector2::new(1.0, 0.0) + e);
        assert_eq!(*table.column(1), Vector2::new(2.0, -0.5) + e);
    }

    #[test]
    fn weighted_norm_scales_by_weights() {
        let table = table();
        let norm = table.weighted_norm(3, &Vector2::new(2.0, 0.5));
        assert!((norm - 13.0f64.sqrt()).abs() < 1e-14);
    }
}
