use crate::ode_shared::FloatNumber;
use num_traits::ToPrimitive;

/// Highest formula order.
pub const MAX_ORDER: usize = 12;

/// Number of columns of the difference table. Order k reads and writes columns up to k+2.
pub const PHI_COLUMNS: usize = MAX_ORDER + 2;

/// Powers of two, `two[i] = 2^(i+1)`, used when deciding whether to double the step.
const TWO: [f64; 13] = [
    2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0, 2048.0, 4096.0, 8192.0,
];

/// Error constants of the Adams formulas, indexed by order - 1.
const GSTR: [f64; 13] = [
    0.500, 0.0833, 0.0417, 0.0264, 0.0188, 0.0143, 0.0114, 0.00936, 0.00789, 0.00679, 0.00592,
    0.00524, 0.00468,
];

/// Converts a primitive number into the working type.
pub(crate) fn cast<T: FloatNumber, N: ToPrimitive>(n: N) -> T {
    // Casts between primitive numbers and f32/f64 always succeed.
    T::from(n).unwrap()
}

pub fn two<T: FloatNumber>(i: usize) -> T {
    cast(TWO[i])
}

pub fn gstr<T: FloatNumber>(i: usize) -> T {
    cast(GSTR[i])
}

/// Machine precision constants
pub mod machine {
    use super::{cast, FloatNumber};

    /// Unit round-off.
    pub fn umach<T: FloatNumber>() -> T {
        T::epsilon()
    }

    pub fn twou<T: FloatNumber>() -> T {
        cast::<T, _>(2.0) * umach::<T>()
    }

    pub fn fouru<T: FloatNumber>() -> T {
        cast::<T, _>(4.0) * umach::<T>()
    }

    /// Smallest admissible step size magnitude at `x`.
    pub fn step_floor<T: FloatNumber>(x: T) -> T {
        fouru::<T>() * x.abs().max(T::one())
    }

    /// True when `h` has collapsed below the floor at `x`. A NaN step counts as collapsed.
    pub fn below_floor<T: FloatNumber>(h: T, x: T) -> bool {
        !(h.abs() >= step_floor(x))
    }
}

/// Driver constants
pub mod driver {
    /// Default maximum number of steps in one call to the driver.
    pub const MAX_NUM_STEPS: u32 = 500;

    /// Consecutive low order steps after which a problem is suspected to be stiff.
    pub const STIFF_STEP_COUNT: u32 = 50;

    /// Orders up to this one count towards the stiffness heuristic.
    pub const LOW_ORDER: usize = 4;

    /// Factor of the requested interval bounding a single step when overshooting is allowed.
    pub const OVERSHOOT_FACTOR: f64 = 10.0;
}

#[cfg(test)]
mod tests {
    use super::machine::*;
    use super::*;

    #[test]
    fn tables_are_indexed_by_order() {
        assert_eq!(two::<f64>(0), 2.0);
        assert_eq!(two::<f64>(12), 8192.0);
        assert_eq!(gstr::<f64>(0), 0.5);
        assert_eq!(gstr::<f64>(MAX_ORDER), 0.00468);
    }

    #[test]
    fn step_floor_is_relative_above_one() {
        assert_eq!(step_floor(0.0), 4.0 * f64::EPSILON);
        assert_eq!(step_floor(-0.5), 4.0 * f64::EPSILON);
        assert_eq!(step_floor(1.0e3), 4.0e3 * f64::EPSILON);
    }

    #[test]
    fn below_floor_is_strict() {
        let floor = step_floor(2.0);
        assert!(!below_floor(floor, 2.0));
        assert!(!below_floor(-floor, 2.0));
        assert!(below_floor(0.5 * floor, 2.0));
        assert!(below_floor(f64::NAN, 2.0));
    }
}
