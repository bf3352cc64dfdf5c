//! Variable order, variable step Adams predictor-corrector method with dense output.

use crate::constants::{cast, driver, machine};
use crate::continuous_output_model::ContinuousOutputModel;
use crate::ode_shared::*;
use crate::state::IntegratorState;

use log::{debug, warn};
use nalgebra::{allocator::Allocator, storage::Storage, DefaultAllocator, Dim, OVector};

/// Structure containing the parameters for the numerical integration.
pub struct Adams<T, V, F>
where
    F: System<T, V>,
{
    f: F,
    /// Output point reached by the last call.
    x: T,
    x_end: T,
    dx: T,
    /// Solution and derivative at `x`.
    y: V,
    dy: V,
    rtol: T,
    atol: T,
    h: T,
    n_max: u32,
    out_type: OutputType,
    overshoot: bool,
    state: IntegratorState<T, V>,
    /// Direction of integration of the problem in progress.
    direction: T,
    /// Whether a problem was started.
    started: bool,
    /// Whether the last successful call was not allowed to overshoot.
    last_without_overshoot: bool,
    x_out: Vec<T>,
    y_out: Vec<V>,
}

impl<T, D: Dim, F> Adams<T, OVector<T, D>, F>
where
    T: FloatNumber,
    F: System<T, OVector<T, D>>,
    DefaultAllocator: Allocator<T, D>,
{
    /// Default initializer for the structure
    ///
    /// # Arguments
    ///
    /// * `f`       - Structure implementing the System trait
    /// * `x`       - Initial value of the independent variable (usually time)
    /// * `x_end`   - Final value of the independent variable
    /// * `dx`      - Increment in the dense output. This argument has no effect if the output type is Sparse
    /// * `y`       - Initial value of the dependent variable(s)
    /// * `rtol`    - Relative tolerance of the local error
    /// * `atol`    - Absolute tolerance of the local error
    ///
    pub fn new(f: F, x: T, x_end: T, dx: T, y: OVector<T, D>, rtol: T, atol: T) -> Self {
        Self::from_param(
            f,
            x,
            x_end,
            dx,
            y,
            rtol,
            atol,
            T::zero(),
            driver::MAX_NUM_STEPS,
            OutputType::Dense,
            true,
        )
    }

    /// Advanced initializer for the structure.
    ///
    /// # Arguments
    ///
    /// * `f`, `x`, `x_end`, `dx`, `y`, `rtol`, `atol` - See [`new`](Self::new)
    /// * `h`           - Initial step size. If h = 0.0, the distance to the first target is tried and reduced as needed
    /// * `n_max`       - Maximum number of steps in one call. Default is 500
    /// * `out_type`    - Type of the output. Must be a variant of the OutputType enum. Default is Dense
    /// * `overshoot`   - Whether steps may go past the target, which is then reached by interpolation. Default is true
    ///
    #[allow(clippy::too_many_arguments)]
    pub fn from_param(
        f: F,
        x: T,
        x_end: T,
        dx: T,
        y: OVector<T, D>,
        rtol: T,
        atol: T,
        h: T,
        n_max: u32,
        out_type: OutputType,
        overshoot: bool,
    ) -> Self {
        let (rows, cols) = y.data.shape();
        Self {
            f,
            x,
            x_end,
            dx,
            dy: OVector::zeros_generic(rows, cols),
            rtol,
            atol,
            h,
            n_max,
            out_type,
            overshoot,
            state: IntegratorState::new(x, y.clone(), h),
            direction: sign(T::one(), x_end - x),
            started: false,
            last_without_overshoot: false,
            x_out: Vec::new(),
            y_out: Vec::new(),
            y,
        }
    }

    /// Integrates from `x` to `x_end`, recording the solution as requested by
    /// the output type.
    pub fn integrate(&mut self) -> Result<Stats, IntegrationError> {
        self.x_out.push(self.x);
        self.y_out.push(self.y.clone());

        match self.out_type {
            OutputType::Dense => self.integrate_dense(),
            OutputType::Sparse => {
                let mut x_out = Vec::new();
                let mut y_out = Vec::new();
                let x_end = self.x_end;
                let direction = self.direction;
                let result = self.advance(x_end, RunMode::Start, &mut |state| {
                    if (state.x() - x_end) * direction < T::zero() {
                        x_out.push(state.x());
                        y_out.push(state.y().clone());
                    }
                });
                self.x_out.extend(x_out);
                self.y_out.extend(y_out);
                if self.x_out.last() != Some(&self.x) {
                    self.x_out.push(self.x);
                    self.y_out.push(self.y.clone());
                }
                result
            }
        }
    }

    /// Integrates from `x` to `x_end` and stores the interpolant of every accepted step in
    /// `continuous_output_model`.
    pub fn integrate_with_continuous_output_model(
        &mut self,
        continuous_output_model: &mut ContinuousOutputModel<T, OVector<T, D>>,
    ) -> Result<Stats, IntegrationError> {
        continuous_output_model.set_lower_bound(self.x);
        let x_end = self.x_end;
        self.advance(x_end, RunMode::Start, &mut |state| {
            continuous_output_model.add_segment(state.segment())
        })
    }

    /// Integrates up to `tout`.
    ///
    /// With [`RunMode::Start`] a new problem is started from the current point.
    /// [`RunMode::Continue`] resumes the problem in progress, for instance after an error
    /// or with a new target. [`RunMode::Interpolate`] only interpolates within the span
    /// already integrated.
    pub fn integrate_to(&mut self, tout: T, mode: RunMode) -> Result<Stats, IntegrationError> {
        self.advance(tout, mode, &mut |_| {})
    }

    fn integrate_dense(&mut self) -> Result<Stats, IntegrationError> {
        let x0 = self.x;
        let step = self.dx.abs() * self.direction;
        if !(step.abs() > T::zero()) {
            return Err(IntegrationError::ImproperInput(
                "the dense output increment must be nonzero".to_string(),
            ));
        }

        let mut mode = RunMode::Start;
        let mut i: u32 = 1;
        loop {
            let mut target = x0 + cast::<T, _>(i) * step;
            let last = (self.x_end - target) * self.direction <= machine::step_floor(self.x_end);
            if last {
                target = self.x_end;
            }
            let stats = self.advance(target, mode, &mut |_| {})?;
            self.x_out.push(self.x);
            self.y_out.push(self.y.clone());
            // stopped early by solout
            if last || self.x != target {
                return Ok(stats);
            }
            mode = RunMode::Continue;
            i += 1;
        }
    }

    /// Drives the step engine towards `tout`, calling `on_step` after every accepted step.
    fn advance<S>(
        &mut self,
        tout: T,
        mode: RunMode,
        on_step: &mut S,
    ) -> Result<Stats, IntegrationError>
    where
        S: FnMut(&IntegratorState<T, OVector<T, D>>),
    {
        let t = self.x;
        self.check_input(t, tout, mode)?;
        if mode == RunMode::Interpolate {
            return self.interpolate_to(tout);
        }

        let mut eps = self.rtol.max(self.atol);
        let releps = self.rtol / eps;
        let abseps = self.atol / eps;
        let del = tout - t;
        let absdel = del.abs();
        let tend = if self.overshoot {
            t + cast::<T, _>(driver::OVERSHOOT_FACTOR) * del
        } else {
            tout
        };

        if mode == RunMode::Start
            || !self.started
            || self.last_without_overshoot
            || self.direction * del <= T::zero()
        {
            let h = if self.h != T::zero() && !self.started {
                sign(self.h.abs(), del)
            } else {
                sign(absdel.max(machine::step_floor(t)), del)
            };
            self.state.restart(t, &self.y, h);
            self.direction = sign(T::one(), del);
            self.started = true;
            debug!("Adams (re)start at x = {} towards {}", t, tout);
        }

        let mut n_step = 0;
        let mut low_order_steps = 0;
        let mut stiff = false;
        loop {
            let x = self.state.x();
            if (x - t).abs() >= absdel {
                self.state.extrapolate_into(tout, &mut self.y, &mut self.dy);
                return Ok(self.reached(tout));
            }

            // too close to the target for a step of admissible size
            if (tout - x).abs() < machine::step_floor(x) {
                let h = tout - x;
                self.f.system(x, self.state.y(), &mut self.dy);
                self.state.stats.num_eval += 1;
                for (y, (yy, yp)) in self
                    .y
                    .iter_mut()
                    .zip(self.state.y().iter().zip(self.dy.iter()))
                {
                    *y = *yy + h * *yp;
                }
                return Ok(self.reached(tout));
            }

            if n_step >= self.n_max {
                self.stopped_at_internal_point();
                return Err(if stiff {
                    IntegrationError::StiffnessDetected { x: to_f64(x) }
                } else {
                    IntegrationError::MaxNumStepReached {
                        x: to_f64(x),
                        n_step,
                    }
                });
            }

            let h = self.state.h();
            self.state.set_h(sign(h.abs().min((tend - x).abs()), h));
            self.state.refresh_weights(releps, abseps);
            if let Some(i) = self.state.wt.iter().position(|w| !(*w > T::zero())) {
                self.stopped_at_internal_point();
                return Err(IntegrationError::ImproperInput(format!(
                    "error weight of component {} is zero at x = {}, atol must be positive",
                    i, x
                )));
            }
            match self.state.step(&self.f, &mut eps) {
                StepStatus::Accepted => {}
                status => {
                    self.rtol = eps * releps;
                    self.atol = eps * abseps;
                    self.stopped_at_internal_point();
                    return Err(if status == StepStatus::ToleranceRaised {
                        warn!(
                            "Tolerances too small at x = {}, relaxed to rtol = {}, atol = {}",
                            x, self.rtol, self.atol
                        );
                        IntegrationError::ToleranceTooSmall {
                            x: to_f64(x),
                            rtol: to_f64(self.rtol),
                            atol: to_f64(self.atol),
                        }
                    } else {
                        warn!("Step size underflow at x = {}", x);
                        IntegrationError::StepSizeUnderflow { x: to_f64(x) }
                    });
                }
            }

            on_step(&self.state);
            n_step += 1;
            low_order_steps += 1;
            if self.state.last_order() > driver::LOW_ORDER {
                low_order_steps = 0;
            }
            if low_order_steps >= driver::STIFF_STEP_COUNT {
                stiff = true;
            }

            if self
                .f
                .solout(self.state.x(), self.state.y(), self.state.dy())
            {
                self.stopped_at_internal_point();
                return Ok(self.state.stats());
            }
        }
    }

    fn check_input(&self, t: T, tout: T, mode: RunMode) -> Result<(), IntegrationError> {
        let improper = |reason: &str| Err(IntegrationError::ImproperInput(reason.to_string()));
        if self.y.is_empty() {
            return improper("the system has no equations");
        }
        if mode != RunMode::Start && !self.started {
            return improper("no problem in progress, start one first");
        }
        if mode == RunMode::Interpolate {
            return Ok(());
        }
        if tout == t {
            return improper("the target equals the current point");
        }
        if self.rtol < T::zero() || self.atol < T::zero() {
            return improper("tolerances must be non-negative");
        }
        if !(self.rtol.max(self.atol) > T::zero()) {
            return improper("at least one tolerance must be positive");
        }
        Ok(())
    }

    /// Answers a target already integrated past, without stepping.
    fn interpolate_to(&mut self, tout: T) -> Result<Stats, IntegrationError> {
        let (a, b) = self.state.span();
        let lower = a.min(b).min(self.x);
        let upper = a.max(b).max(self.x);
        if !(tout >= lower && tout <= upper) {
            return Err(IntegrationError::ImproperInput(format!(
                "cannot interpolate at {} outside of [{}, {}]",
                tout, lower, upper
            )));
        }
        self.state.extrapolate_into(tout, &mut self.y, &mut self.dy);
        Ok(self.reached(tout))
    }

    /// Records a successful call that reached `tout`.
    fn reached(&mut self, tout: T) -> Stats {
        self.x = tout;
        self.last_without_overshoot = !self.overshoot;
        self.state.stats()
    }

    /// Reports the internal point as the output of an interrupted call.
    fn stopped_at_internal_point(&mut self) {
        self.x = self.state.x();
        self.y.copy_from(self.state.y());
        self.dy.copy_from(self.state.dy());
        self.last_without_overshoot = false;
    }

    /// Getter for the independent variable's output.
    pub fn x_out(&self) -> &Vec<T> {
        &self.x_out
    }

    /// Getter for the dependent variables' output.
    pub fn y_out(&self) -> &Vec<OVector<T, D>> {
        &self.y_out
    }

    /// Output point reached by the last call.
    pub fn x(&self) -> T {
        self.x
    }

    /// Solution at the output point.
    pub fn y(&self) -> &OVector<T, D> {
        &self.y
    }

    /// Derivative at the output point, as given by the interpolant. After a target
    /// closer than the step size floor, derivative at the internal point.
    pub fn dy(&self) -> &OVector<T, D> {
        &self.dy
    }

    /// Relative tolerance, enlarged if it was found too small.
    pub fn rtol(&self) -> T {
        self.rtol
    }

    /// Absolute tolerance, enlarged if it was found too small.
    pub fn atol(&self) -> T {
        self.atol
    }

    /// State of the step engine, positioned at the internal integration point.
    pub fn state(&self) -> &IntegratorState<T, OVector<T, D>> {
        &self.state
    }

    pub fn stats(&self) -> Stats {
        self.state.stats()
    }
}
