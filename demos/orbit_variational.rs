use adams_ode::*;
use nalgebra::{Matrix3, Matrix6, SVector, Vector3};

// Position, velocity, then the state transition matrix in column major order
type State = SVector<f64, 42>;
type Time = f64;

use std::f64::consts::PI;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

const MU: f64 = 398600.435436;

fn main() {
    let a: f64 = 20000.0;
    let period = 2.0 * PI * (a.powi(3) / MU).sqrt();

    // Orbit with: a = 20000km, e = 0.7, i = 35 deg, raan = 100 deg, arg_per = 65 deg, true_an = 30 deg
    let mut y0 = State::zeros();
    let rv = [
        -5007.248417988539,
        -1444.918140151374,
        3628.534606178356,
        0.717716656891,
        -10.224093784269,
        0.748229399696,
    ];
    y0.fixed_rows_mut::<6>(0).copy_from_slice(&rv);
    for i in 0..6 {
        y0[6 + 7 * i] = 1.0;
    }

    let mut stepper = Adams::from_param(
        KeplerOrbit,
        0.0,
        period,
        60.0,
        y0,
        1.0e-11,
        1.0e-11,
        0.0,
        10_000,
        OutputType::Dense,
        true,
    );
    let res = stepper.integrate();

    // Handle result
    match res {
        Ok(stats) => {
            println!("{}", stats);
            let stm = Matrix6::from_iterator(stepper.y().iter().skip(6).cloned());
            println!("State transition matrix after one period: {}", stm);
            println!("Determinant: {}", stm.determinant());

            let path = Path::new("./outputs/orbit_variational.dat");
            save(stepper.x_out(), stepper.y_out(), path);
            println!("Results saved in: {:?}", path);
        }
        Err(e) => println!("An error occured: {}", e),
    }
}

struct KeplerOrbit;

impl System<Time, State> for KeplerOrbit {
    /// Equations of motion of the system and their variational equations
    fn system(&self, _t: Time, y: &State, dy: &mut State) {
        let r2 = y[0] * y[0] + y[1] * y[1] + y[2] * y[2];
        let r = r2.sqrt();
        for i in 0..3 {
            dy[i] = y[i + 3];
            dy[i + 3] = -MU * y[i] / r.powi(3);
        }

        let pos = Vector3::new(y[0], y[1], y[2]);
        let gravity_gradient =
            (3.0 * pos * pos.transpose() - Matrix3::identity() * r2) * (MU / r.powi(5));
        let mut jacobian = Matrix6::zeros();
        jacobian
            .fixed_slice_mut::<3, 3>(0, 3)
            .copy_from(&Matrix3::identity());
        jacobian
            .fixed_slice_mut::<3, 3>(3, 0)
            .copy_from(&gravity_gradient);

        let stm = Matrix6::from_iterator(y.iter().skip(6).cloned());
        for (i, value) in (jacobian * stm).iter().enumerate() {
            dy[6 + i] = *value;
        }
    }
}

pub fn save(times: &[Time], states: &[State], filename: &Path) {
    if let Some(dir) = filename.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            println!("Could not create directory. Error: {:?}", e);
            return;
        }
    }

    // Create or open file
    let mut buf = match File::create(filename) {
        Err(e) => {
            println!("Could not open file. Error: {:?}", e);
            return;
        }
        Ok(buf) => buf,
    };

    // Write time and position/velocity in a csv format
    for (i, state) in states.iter().enumerate() {
        buf.write_fmt(format_args!("{}", times[i])).unwrap();
        for val in state.iter().take(6) {
            buf.write_fmt(format_args!(", {}", val)).unwrap();
        }
        buf.write_fmt(format_args!("\n")).unwrap();
    }
}
