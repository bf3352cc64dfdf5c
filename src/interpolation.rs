//! Dense output from the Adams history.
//!
//! After a step from `x_prev` to `x` the difference table defines a polynomial
//! of degree `kold` whose derivative interpolates the last `kold + 1` accepted
//! derivatives. Evaluating it needs only the table, `psi` and the solution at
//! `x`, so it costs no derivative evaluations.

use crate::constants::{cast, MAX_ORDER};
use crate::ode_shared::{to_f64, FloatNumber, IntegrationError};
use crate::state::IntegratorState;

use nalgebra::{allocator::Allocator, DefaultAllocator, Dim, OVector};
use serde::{Deserialize, Serialize};

/// Evaluates the interpolating polynomial and its derivative at `x_out`.
///
/// `phi` must hold at least `kold + 1` columns and `psi` at least `kold` entries.
fn evaluate<T, D: Dim>(
    x: T,
    y: &OVector<T, D>,
    x_out: T,
    kold: usize,
    phi: &[OVector<T, D>],
    psi: &[T],
    y_out: &mut OVector<T, D>,
    dy_out: &mut OVector<T, D>,
) where
    T: FloatNumber,
    DefaultAllocator: Allocator<T, D>,
{
    let hi = x_out - x;
    let ki = kold + 1;

    let mut g = [T::zero(); MAX_ORDER + 1];
    let mut rho = [T::zero(); MAX_ORDER + 1];
    let mut w = [T::zero(); MAX_ORDER + 1];
    g[0] = T::one();
    rho[0] = T::one();
    for i in 1..=ki {
        w[i - 1] = T::one() / cast::<T, _>(i);
    }

    let mut term = T::zero();
    for j in 2..=ki {
        let psijm1 = psi[j - 2];
        let gamma = (hi + term) / psijm1;
        let eta = hi / psijm1;
        for i in 1..=ki + 1 - j {
            w[i - 1] = gamma * w[i - 1] - eta * w[i];
        }
        g[j - 1] = w[0];
        rho[j - 1] = gamma * rho[j - 2];
        term = psijm1;
    }

    y_out.fill(T::zero());
    dy_out.fill(T::zero());
    for i in (0..ki).rev() {
        for l in 0..y.len() {
            y_out[l] = y_out[l] + g[i] * phi[i][l];
            dy_out[l] = dy_out[l] + rho[i] * phi[i][l];
        }
    }
    for (out, y) in y_out.iter_mut().zip(y.iter()) {
        *out = *y + hi * *out;
    }
}

/// Everything needed to evaluate the interpolant of one step after the
/// integrator has moved on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseSegment<T, V> {
    x_prev: T,
    x: T,
    y: V,
    kold: usize,
    psi: Vec<T>,
    phi: Vec<V>,
}

impl<T, D: Dim> DenseSegment<T, OVector<T, D>>
where
    T: FloatNumber,
    DefaultAllocator: Allocator<T, D>,
{
    /// Start and end of the step.
    pub fn span(&self) -> (T, T) {
        (self.x_prev, self.x)
    }

    /// Solution and derivative at `x_out`.
    pub fn evaluate(&self, x_out: T) -> (OVector<T, D>, OVector<T, D>) {
        let mut y_out = self.y.clone();
        let mut dy_out = self.y.clone();
        evaluate(
            self.x,
            &self.y,
            x_out,
            self.kold,
            &self.phi,
            &self.psi,
            &mut y_out,
            &mut dy_out,
        );
        (y_out, dy_out)
    }
}

impl<T, D: Dim> IntegratorState<T, OVector<T, D>>
where
    T: FloatNumber,
    DefaultAllocator: Allocator<T, D>,
{
    /// Solution and derivative at `x_out`, which must lie within the last
    /// accepted step.
    pub fn interpolate(
        &self,
        x_out: T,
    ) -> Result<(OVector<T, D>, OVector<T, D>), IntegrationError> {
        let (a, b) = self.span();
        let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
        if !(x_out >= lower && x_out <= upper) {
            return Err(IntegrationError::OutOfSpan {
                x: to_f64(x_out),
                lower: to_f64(lower),
                upper: to_f64(upper),
            });
        }
        Ok(self.extrapolate(x_out))
    }

    /// Solution and derivative at any `x_out`, evaluating the polynomial of
    /// the last step outside of it if needed. Accuracy degrades quickly away
    /// from the step.
    pub fn extrapolate(&self, x_out: T) -> (OVector<T, D>, OVector<T, D>) {
        let mut y_out = self.y.clone();
        let mut dy_out = self.y.clone();
        self.extrapolate_into(x_out, &mut y_out, &mut dy_out);
        (y_out, dy_out)
    }

    pub(crate) fn extrapolate_into(
        &self,
        x_out: T,
        y_out: &mut OVector<T, D>,
        dy_out: &mut OVector<T, D>,
    ) {
        evaluate(
            self.x,
            &self.y,
            x_out,
            self.kold,
            self.phi.columns(self.kold + 1),
            self.coefficients.psi(self.kold),
            y_out,
            dy_out,
        );
    }

    /// Snapshot of the interpolant of the last accepted step.
    pub fn segment(&self) -> DenseSegment<T, OVector<T, D>> {
        DenseSegment {
            x_prev: self.x_prev,
            x: self.x,
            y: self.y.clone(),
            kold: self.kold,
            psi: self.coefficients.psi(self.kold).to_vec(),
            phi: self.phi.columns(self.kold + 1).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ode_shared::{StepStatus, System};
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    struct Oscillator;

    impl System<f64, Vector2<f64>> for Oscillator {
        fn system(&self, _x: f64, y: &Vector2<f64>, dy: &mut Vector2<f64>) {
            dy[0] = y[1];
            dy[1] = -y[0];
        }
    }

    fn advanced(steps: usize) -> IntegratorState<f64, Vector2<f64>> {
        let mut state = IntegratorState::new(0.0, Vector2::new(0.0, 1.0), 0.1);
        let mut eps = 1e-10;
        for _ in 0..steps {
            state.refresh_weights(0.0, 1.0);
            assert_eq!(state.step(&Oscillator, &mut eps), StepStatus::Accepted);
        }
        state
    }

    #[test]
    fn right_end_reproduces_solution() {
        let state = advanced(20);
        let (y, dy) = state.interpolate(state.x()).unwrap();
        assert_eq!(y, *state.y());
        assert_relative_eq!(dy, *state.dy(), epsilon = 1e-9);
    }

    #[test]
    fn left_end_matches_previous_point() {
        let mut state = advanced(20);
        let (x_before, previous) = (state.x(), state.y().clone());
        state.refresh_weights(0.0, 1.0);
        let mut eps = 1e-10;
        assert_eq!(state.step(&Oscillator, &mut eps), StepStatus::Accepted);
        assert_eq!(state.span().0, x_before);
        let (y, _) = state.interpolate(x_before).unwrap();
        assert_relative_eq!(y, previous, epsilon = 1e-8);
    }

    #[test]
    fn interior_points_follow_exact_solution() {
        let state = advanced(25);
        let (a, b) = state.span();
        for i in 0..4 {
            let x = a + (b - a) * i as f64 / 4.0;
            let (y, dy) = state.interpolate(x).unwrap();
            assert_relative_eq!(y[0], x.sin(), epsilon = 1e-8);
            assert_relative_eq!(y[1], x.cos(), epsilon = 1e-8);
            assert_relative_eq!(dy[0], x.cos(), epsilon = 1e-6);
        }
    }

    #[test]
    fn outside_the_last_step_needs_extrapolation() {
        let state = advanced(10);
        let (_, b) = state.span();
        let beyond = b + 1e-3;
        match state.interpolate(beyond) {
            Err(IntegrationError::OutOfSpan { x, upper, .. }) => {
                assert_eq!(x, beyond);
                assert_eq!(upper, b);
            }
            other => panic!("unexpected {:?}", other),
        }
        let (y, _) = state.extrapolate(beyond);
        assert_relative_eq!(y[0], beyond.sin(), epsilon = 1e-7);
    }

    #[test]
    fn segment_survives_further_steps() {
        let mut state = advanced(15);
        let segment = state.segment();
        let (a, b) = segment.span();
        let mid = 0.5 * (a + b);
        let expected = state.interpolate(mid).unwrap();
        let mut eps = 1e-10;
        for _ in 0..5 {
            state.refresh_weights(0.0, 1.0);
            state.step(&Oscillator, &mut eps);
        }
        assert_eq!(segment.evaluate(mid), expected);
    }
}
