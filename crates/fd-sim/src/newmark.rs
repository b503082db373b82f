//! Implicit Newmark time step.

use nalgebra::{DVector, Dyn, linalg::LU};

use crate::error::{SimError, SimResult};
use crate::system::StructuralSystem;

/// Kinematic state of all dofs.
#[derive(Clone, Debug, PartialEq)]
pub struct Kinematics {
    pub displacement: DVector<f64>,
    pub velocity: DVector<f64>,
    pub acceleration: DVector<f64>,
}

impl Kinematics {
    pub fn at_rest(n: usize) -> Self {
        Self {
            displacement: DVector::zeros(n),
            velocity: DVector::zeros(n),
            acceleration: DVector::zeros(n),
        }
    }
}

/// Newmark-beta integrator for a fixed step size.
///
/// The effective stiffness `K + M/(beta dt^2) + gamma C/(beta dt)` is
/// factorized once; every step is a back substitution followed by a residual
/// check of the solved system.
pub struct Newmark {
    beta: f64,
    gamma: f64,
    dt: f64,
    residual_tolerance: f64,
    divergence_limit: f64,
    factorization: Option<LU<f64, Dyn, Dyn>>,
    effective: nalgebra::DMatrix<f64>,
}

impl Newmark {
    pub fn new(
        system: &StructuralSystem,
        beta: f64,
        gamma: f64,
        dt: f64,
        residual_tolerance: f64,
        divergence_limit: f64,
    ) -> Self {
        let a0 = 1.0 / (beta * dt * dt);
        let a1 = gamma / (beta * dt);
        let effective = &system.stiffness + &system.mass * a0 + &system.damping * a1;
        let lu = effective.clone().lu();
        // A singular effective stiffness is reported by the first step, not here.
        let factorization = lu.is_invertible().then_some(lu);
        Self {
            beta,
            gamma,
            dt,
            residual_tolerance,
            divergence_limit,
            factorization,
            effective,
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Advance `current` to the time where the load vector is `load`.
    pub fn step(
        &self,
        system: &StructuralSystem,
        current: &Kinematics,
        load: &DVector<f64>,
        time: f64,
    ) -> SimResult<Kinematics> {
        let lu = self
            .factorization
            .as_ref()
            .ok_or_else(|| SimError::NumericalDivergence {
                time,
                what: "effective stiffness matrix is singular".to_string(),
            })?;

        let (beta, gamma, dt) = (self.beta, self.gamma, self.dt);
        let a0 = 1.0 / (beta * dt * dt);
        let a1 = gamma / (beta * dt);
        let a2 = 1.0 / (beta * dt);
        let a3 = 1.0 / (2.0 * beta) - 1.0;
        let a4 = gamma / beta - 1.0;
        let a5 = 0.5 * dt * (gamma / beta - 2.0);

        let Kinematics {
            displacement: u,
            velocity: v,
            acceleration: a,
        } = current;

        let rhs = load
            + &system.mass * (u * a0 + v * a2 + a * a3)
            + &system.damping * (u * a1 + v * a4 + a * a5);

        let u_next = lu
            .solve(&rhs)
            .ok_or_else(|| SimError::NumericalDivergence {
                time,
                what: "linear solve failed".to_string(),
            })?;

        let residual = (&self.effective * &u_next - &rhs).norm();
        if !(residual <= self.residual_tolerance * rhs.norm().max(1.0)) {
            return Err(SimError::NumericalDivergence {
                time,
                what: format!("residual {residual:e} above tolerance"),
            });
        }

        let a_next = (&u_next - u) * a0 - v * a2 - a * a3;
        let v_next = v + (a * (1.0 - gamma) + &a_next * gamma) * dt;

        let next = Kinematics {
            displacement: u_next,
            velocity: v_next,
            acceleration: a_next,
        };
        self.check_bounded(&next, time)?;
        Ok(next)
    }

    fn check_bounded(&self, state: &Kinematics, time: f64) -> SimResult<()> {
        let finite = state
            .displacement
            .iter()
            .chain(state.velocity.iter())
            .chain(state.acceleration.iter())
            .all(|x| x.is_finite());
        if !finite {
            return Err(SimError::NumericalDivergence {
                time,
                what: "non-finite state".to_string(),
            });
        }
        let peak = state.displacement.amax();
        if peak > self.divergence_limit {
            return Err(SimError::NumericalDivergence {
                time,
                what: format!("displacement {peak:e} exceeds divergence limit"),
            });
        }
        Ok(())
    }
}

/// Accelerations in equilibrium with `load` for the given displacement and
/// velocity. Lumped masses keep `M` diagonal; massless dofs get zero
/// acceleration.
pub fn equilibrium_acceleration(
    system: &StructuralSystem,
    displacement: &DVector<f64>,
    velocity: &DVector<f64>,
    load: &DVector<f64>,
    time: f64,
) -> SimResult<DVector<f64>> {
    let residual = load - &system.damping * velocity - &system.stiffness * displacement;
    let acceleration = DVector::from_iterator(
        residual.len(),
        residual.iter().enumerate().map(|(i, r)| {
            let m = system.mass[(i, i)];
            if m > 0.0 { r / m } else { 0.0 }
        }),
    );
    if acceleration.iter().all(|x| x.is_finite()) {
        Ok(acceleration)
    } else {
        Err(SimError::NumericalDivergence {
            time,
            what: "non-finite initial acceleration".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fd_model::{DofDef, ModelDef, SolverSettings};

    fn oscillator(mass: f64, stiffness: f64) -> StructuralSystem {
        let model = ModelDef {
            version: 1,
            name: "sdof".to_string(),
            settings: SolverSettings::default(),
            dofs: vec![DofDef {
                id: "x".to_string(),
                mass,
                stiffness,
                damping: 0.0,
                initial_displacement: 0.0,
                initial_velocity: 0.0,
            }],
            rayleigh: None,
            functions: vec![],
            loads: vec![],
            sensors: vec![],
            results: None,
        };
        StructuralSystem::assemble(&model).unwrap()
    }

    #[test]
    fn free_vibration_tracks_cosine() {
        // m = 1, k = 4 pi^2: period of one second.
        let k = 4.0 * std::f64::consts::PI.powi(2);
        let system = oscillator(1.0, k);
        let dt = 1e-3;
        let newmark = Newmark::new(&system, 0.25, 0.5, dt, 1e-10, 1e6);

        let mut state = Kinematics::at_rest(1);
        state.displacement[0] = 1.0;
        state.acceleration[0] = -k;

        let zero = DVector::zeros(1);
        let steps = 250;
        for i in 1..=steps {
            state = newmark.step(&system, &state, &zero, i as f64 * dt).unwrap();
        }
        // Quarter period: displacement crosses zero.
        assert!(state.displacement[0].abs() < 1e-2);
        assert!(state.velocity[0] < 0.0);
    }

    #[test]
    fn average_acceleration_conserves_energy() {
        let system = oscillator(2.0, 50.0);
        let newmark = Newmark::new(&system, 0.25, 0.5, 0.01, 1e-10, 1e6);
        let mut state = Kinematics::at_rest(1);
        state.velocity[0] = 1.0;

        let energy = |s: &Kinematics| 0.5 * 2.0 * s.velocity[0].powi(2) + 0.5 * 50.0 * s.displacement[0].powi(2);
        let e0 = energy(&state);
        let zero = DVector::zeros(1);
        for i in 1..=500 {
            state = newmark.step(&system, &state, &zero, i as f64 * 0.01).unwrap();
        }
        assert!((energy(&state) - e0).abs() < 1e-9 * e0.max(1.0));
    }

    #[test]
    fn singular_system_diverges() {
        let system = oscillator(0.0, 0.0);
        let newmark = Newmark::new(&system, 0.25, 0.5, 0.01, 1e-10, 1e6);
        let err = newmark
            .step(&system, &Kinematics::at_rest(1), &DVector::zeros(1), 0.01)
            .unwrap_err();
        assert!(matches!(err, SimError::NumericalDivergence { .. }));
    }

    #[test]
    fn non_finite_load_diverges() {
        let system = oscillator(1.0, 10.0);
        let newmark = Newmark::new(&system, 0.25, 0.5, 0.01, 1e-10, 1e6);
        let load = DVector::from_element(1, f64::NAN);
        assert!(newmark
            .step(&system, &Kinematics::at_rest(1), &load, 0.01)
            .is_err());
    }

    #[test]
    fn equilibrium_acceleration_divides_by_mass() {
        let system = oscillator(2.0, 10.0);
        let u = DVector::from_element(1, 0.1);
        let v = DVector::zeros(1);
        let f = DVector::from_element(1, 3.0);
        let a = equilibrium_acceleration(&system, &u, &v, &f, 0.0).unwrap();
        assert!((a[0] - 1.0).abs() < 1e-12);
    }
}
