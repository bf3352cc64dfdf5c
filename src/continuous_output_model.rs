use crate::interpolation::DenseSegment;
use crate::ode_shared::FloatNumber;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, Dim, OVector};
use serde::{Deserialize, Serialize};

/// Stores the interpolants of every accepted step of an integration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinuousOutputModel<T, V> {
    lower_bound: T,
    breakpoints: Vec<T>,
    segments: Vec<DenseSegment<T, V>>,
}

impl<T, D: Dim> ContinuousOutputModel<T, OVector<T, D>>
where
    T: FloatNumber,
    DefaultAllocator: Allocator<T, D>,
{
    /// Creates a new empty [`ContinuousOutputModel`].
    pub fn new() -> Self {
        Self {
            lower_bound: T::zero(),
            breakpoints: Vec::new(),
            segments: Vec::new(),
        }
    }

    /// Evaluates the continuous output at the given value.
    pub fn evaluate(&self, x: T) -> Option<OVector<T, D>> {
        self.evaluate_with_derivative(x).map(|(y, _)| y)
    }

    /// Evaluates the continuous output and its derivative at the given value.
    pub fn evaluate_with_derivative(&self, x: T) -> Option<(OVector<T, D>, OVector<T, D>)> {
        self.get_segment_index(x)
            .map(|index| self.segments[index].evaluate(x))
    }

    /// Returns the lower and upper bounds of the continuous output model validity range,
    /// in the direction of integration. `None` if no step was stored.
    pub fn bounds(&self) -> Option<(T, T)> {
        self.breakpoints
            .last()
            .map(|upper| (self.lower_bound, *upper))
    }

    /// Number of stored steps.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sets the lower bound of the continuous output.
    pub(crate) fn set_lower_bound(&mut self, lower_bound: T) {
        self.lower_bound = lower_bound;
    }

    /// Adds the interpolant of the step ending at the segment's upper bound.
    pub(crate) fn add_segment(&mut self, segment: DenseSegment<T, OVector<T, D>>) {
        let (_, breakpoint) = segment.span();
        self.breakpoints.push(breakpoint);
        self.segments.push(segment);
    }

    /// Returns the index of the segment containing x. Breakpoints decrease
    /// when integrating backwards.
    fn get_segment_index(&self, x: T) -> Option<usize> {
        let (lower, upper) = self.bounds()?;
        let forward = upper >= lower;
        let inside = if forward {
            x >= lower && x <= upper
        } else {
            x <= lower && x >= upper
        };
        if !inside {
            return None;
        }
        let index = self
            .breakpoints
            .partition_point(|probe| if forward { *probe < x } else { *probe > x });
        if index < self.segments.len() {
            Some(index)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::continuous_output_model::ContinuousOutputModel;
    use crate::ode_shared::{StepStatus, System};
    use crate::state::IntegratorState;
    use approx::assert_relative_eq;
    use nalgebra::Vector1;

    type State = Vector1<f64>;

    struct Growth;

    impl System<f64, State> for Growth {
        fn system(&self, _x: f64, y: &State, dy: &mut State) {
            dy[0] = y[0];
        }
    }

    fn model(h: f64, steps: usize) -> ContinuousOutputModel<f64, State> {
        let mut state = IntegratorState::new(0.0, State::new(1.0), h);
        let mut model = ContinuousOutputModel::default();
        model.set_lower_bound(0.0);
        let mut eps = 1e-10;
        for _ in 0..steps {
            state.refresh_weights(0.0, 1.0);
            assert_eq!(state.step(&Growth, &mut eps), StepStatus::Accepted);
            model.add_segment(state.segment());
        }
        model
    }

    #[test]
    fn test_evaluate_follows_solution() {
        let model = model(0.1, 30);
        let (_, upper) = model.bounds().unwrap();
        for i in 0..=10 {
            let x = upper * (i as f64 / 10.0);
            let (y, dy) = model.evaluate_with_derivative(x).unwrap();
            assert_relative_eq!(y, State::new(x.exp()), max_relative = 1e-8);
            assert_relative_eq!(dy, State::new(x.exp()), max_relative = 1e-6);
        }
    }

    #[test]
    fn test_evaluate_backward() {
        let model = model(-0.1, 30);
        let (lower, upper) = model.bounds().unwrap();
        assert_eq!(lower, 0.0);
        assert!(upper < 0.0);
        assert_eq!(model.evaluate(0.1), None);
        assert_eq!(model.evaluate(upper - 1e-3), None);
        let x = 0.5 * upper;
        assert_relative_eq!(model.evaluate(x).unwrap(), State::new(x.exp()), max_relative = 1e-8);
    }

    #[test]
    fn test_evaluate_with_no_segments() {
        let continuous_output_model: ContinuousOutputModel<f64, State> =
            ContinuousOutputModel::default();
        assert!(continuous_output_model.is_empty());
        assert_eq!(continuous_output_model.bounds(), None);
        assert_eq!(continuous_output_model.evaluate(0.0), None);
        assert_eq!(continuous_output_model.evaluate(3.0), None);
    }

    #[test]
    fn test_get_segment_index() {
        let model = model(0.1, 5);
        let spans: Vec<(f64, f64)> = model.segments.iter().map(|s| s.span()).collect();
        let (_, upper) = model.bounds().unwrap();

        assert_eq!(model.len(), 5);
        assert_eq!(model.get_segment_index(-0.001), None);
        assert_eq!(model.get_segment_index(0.0), Some(0));
        for (i, (a, b)) in spans.iter().enumerate() {
            assert_eq!(model.get_segment_index(*b), Some(i));
            assert_eq!(model.get_segment_index(0.5 * (a + b)), Some(i));
        }
        assert_eq!(model.get_segment_index(upper * 1.0001), None);
    }
}
