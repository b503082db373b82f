//! Step-wise time integrator.
//!
//! `TimeIntegrator` owns the simulation state of one model and moves through
//!
//! ```text
//! Uninitialized -> Initialized -> Stepping -> Completed
//!                                         \-> Failed
//! ```
//!
//! `initialize` is accepted in any phase, `finalize` returns to
//! `Uninitialized`. Once a step fails the error code sticks until the next
//! `initialize`, and every query other than `last_error` is refused.

use std::collections::BTreeMap;

use fd_core::{FunctionId, step_count, step_time};
use fd_model::{FunctionDef, FunctionKind, ModelDef, SensorQuantity};
use nalgebra::DVector;
use tracing::{debug, info, warn};

use crate::error::{SimError, SimResult, codes};
use crate::forcing::{ExternalFunctionProvider, NoExternalFunctions, evaluate_builtin};
use crate::newmark::{Kinematics, Newmark, equilibrium_acceleration};
use crate::system::StructuralSystem;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegratorPhase {
    Uninitialized,
    Initialized,
    Stepping,
    Completed,
    Failed,
}

/// Displacement and velocity overriding the model's initial conditions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InitialConditions {
    pub displacement: Vec<f64>,
    pub velocity: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct SimulationState {
    pub time: f64,
    /// Number of completed steps.
    pub step: usize,
    pub kinematics: Kinematics,
    /// Last computed value of every registered function.
    pub values: BTreeMap<FunctionId, f64>,
    pub error_code: i32,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            time: 0.0,
            step: 0,
            kinematics: Kinematics::at_rest(0),
            values: BTreeMap::new(),
            error_code: codes::OK,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Probe {
    Position(usize),
    Velocity(usize),
    Acceleration(usize),
    SpringForce(usize),
}

struct Setup {
    system: StructuralSystem,
    newmark: Newmark,
    functions: Vec<FunctionDef>,
    sensors: Vec<(FunctionId, Probe)>,
    start_time: f64,
    total_steps: usize,
    /// First step solves the initial accelerations at the start time.
    equilibrium_step: bool,
    /// Accelerations are consistent with the current load.
    acceleration_ready: bool,
    /// Highest external channel referenced by the model.
    max_channel: u32,
}

impl Setup {
    /// Time reached by the `k`-th step (1-based).
    fn time_of(&self, k: usize) -> f64 {
        let intervals = if self.equilibrium_step { k - 1 } else { k };
        step_time(self.start_time, self.newmark.dt(), intervals)
    }
}

pub struct TimeIntegrator {
    provider: Box<dyn ExternalFunctionProvider>,
    phase: IntegratorPhase,
    setup: Option<Setup>,
    state: SimulationState,
    finalize_code: Option<i32>,
}

impl Default for TimeIntegrator {
    fn default() -> Self {
        Self::new(Box::new(NoExternalFunctions))
    }
}

impl TimeIntegrator {
    pub fn new(provider: Box<dyn ExternalFunctionProvider>) -> Self {
        Self {
            provider,
            phase: IntegratorPhase::Uninitialized,
            setup: None,
            state: SimulationState::default(),
            finalize_code: None,
        }
    }

    /// Replace the external function provider; takes effect on the next step.
    pub fn set_provider(&mut self, provider: Box<dyn ExternalFunctionProvider>) {
        self.provider = provider;
    }

    pub fn phase(&self) -> IntegratorPhase {
        self.phase
    }

    /// 0 while healthy, otherwise the code of the failure that stopped the run.
    pub fn last_error(&self) -> i32 {
        self.state.error_code
    }

    pub fn current_time(&self) -> f64 {
        self.state.time
    }

    pub fn step_index(&self) -> usize {
        self.state.step
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Ids answerable by `get_function`, ascending.
    pub fn output_ids(&self) -> Vec<FunctionId> {
        self.state.values.keys().copied().collect()
    }

    pub fn initialize(&mut self, model: &ModelDef) -> SimResult<()> {
        self.initialize_with(model, None)
    }

    /// Initialize, optionally starting from given displacement and velocity
    /// instead of the model's initial conditions.
    pub fn initialize_with(
        &mut self,
        model: &ModelDef,
        initial: Option<&InitialConditions>,
    ) -> SimResult<()> {
        let system = StructuralSystem::assemble(model)?;
        let n = system.dofs();
        let settings = &model.settings;

        let (displacement, velocity) = match initial {
            Some(ic) => {
                if ic.displacement.len() != n || ic.velocity.len() != n {
                    return Err(SimError::InvalidArg {
                        what: "initial conditions do not match the number of dofs",
                    });
                }
                (
                    DVector::from_column_slice(&ic.displacement),
                    DVector::from_column_slice(&ic.velocity),
                )
            }
            None => (
                DVector::from_iterator(n, model.dofs.iter().map(|d| d.initial_displacement)),
                DVector::from_iterator(n, model.dofs.iter().map(|d| d.initial_velocity)),
            ),
        };

        let sensors = model
            .sensors
            .iter()
            .map(|sensor| {
                let dof = model.dof_index(sensor.quantity.dof()).ok_or_else(|| {
                    SimError::InvalidModel {
                        what: format!("sensor {} references unknown dof", sensor.id),
                    }
                })?;
                let probe = match sensor.quantity {
                    SensorQuantity::Position { .. } => Probe::Position(dof),
                    SensorQuantity::Velocity { .. } => Probe::Velocity(dof),
                    SensorQuantity::Acceleration { .. } => Probe::Acceleration(dof),
                    SensorQuantity::SpringForce { .. } => Probe::SpringForce(dof),
                };
                Ok((sensor.id, probe))
            })
            .collect::<SimResult<Vec<_>>>()?;

        let intervals = step_count(settings.start_time, settings.stop_time, settings.time_step);
        let equilibrium_step = settings.initial_equilibrium;

        let newmark = Newmark::new(
            &system,
            settings.newmark_beta,
            settings.newmark_gamma,
            settings.time_step,
            settings.residual_tolerance,
            settings.divergence_limit,
        );

        let max_channel = model
            .functions
            .iter()
            .filter_map(|f| match f.kind {
                FunctionKind::External { channel } => Some(channel),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let setup = Setup {
            system,
            newmark,
            functions: model.functions.clone(),
            sensors,
            start_time: settings.start_time,
            total_steps: intervals + usize::from(equilibrium_step),
            equilibrium_step,
            acceleration_ready: false,
            max_channel,
        };

        let mut state = SimulationState {
            time: settings.start_time,
            step: 0,
            kinematics: Kinematics {
                displacement,
                velocity,
                acceleration: DVector::zeros(n),
            },
            values: BTreeMap::new(),
            error_code: codes::OK,
        };
        for function in &setup.functions {
            let value = evaluate_builtin(&function.kind, setup.start_time).unwrap_or(0.0);
            state.values.insert(function.id, value);
        }
        record_sensors(&setup, &mut state);

        info!(
            model = %model.name,
            dofs = n,
            steps = setup.total_steps,
            dt = settings.time_step,
            "integrator initialized"
        );

        self.setup = Some(setup);
        self.state = state;
        self.phase = IntegratorPhase::Initialized;
        self.finalize_code = None;
        Ok(())
    }

    /// Time the next `solve_next` advances to. After the last step this is
    /// the final time itself.
    pub fn get_next_time(&self) -> SimResult<f64> {
        let setup = self.active_setup()?;
        if self.phase == IntegratorPhase::Completed || self.state.step >= setup.total_steps {
            return Ok(self.state.time);
        }
        Ok(setup.time_of(self.state.step + 1))
    }

    /// Take one step. `Ok(true)` means more steps remain, `Ok(false)` that the
    /// final time has been reached. A failure is also recorded in
    /// `last_error` and stops the integrator.
    pub fn solve_next(&mut self) -> SimResult<bool> {
        self.solve_next_inner(None)
    }

    /// Take one step with external function values assigned by the caller:
    /// channel `k` takes `inputs[k - 1]`.
    pub fn solve_next_with_inputs(&mut self, inputs: &[f64]) -> SimResult<bool> {
        let setup = self.active_setup()?;
        if (inputs.len() as u64) < u64::from(setup.max_channel) {
            return Err(SimError::InvalidArg {
                what: "fewer inputs than external function channels",
            });
        }
        self.solve_next_inner(Some(inputs))
    }

    /// Last computed value of function `id`.
    pub fn get_function(&self, id: u32) -> SimResult<f64> {
        let value = FunctionId::new(id)
            .and_then(|fid| self.state.values.get(&fid).copied())
            .ok_or(SimError::UnknownFunctionId { id })?;
        if self.phase == IntegratorPhase::Failed {
            return Err(SimError::Terminated {
                code: self.state.error_code,
            });
        }
        Ok(value)
    }

    /// Release the model and return the run's error code. Calling it again
    /// without an `initialize` in between returns the same code.
    pub fn finalize(&mut self) -> i32 {
        if self.phase == IntegratorPhase::Uninitialized {
            return self.finalize_code.unwrap_or(codes::OK);
        }

        let code = self.state.error_code;
        self.setup = None;
        self.state.values.clear();
        self.phase = IntegratorPhase::Uninitialized;
        self.finalize_code = Some(code);
        debug!(code, "integrator finalized");
        code
    }

    fn active_setup(&self) -> SimResult<&Setup> {
        match (&self.phase, &self.setup) {
            (IntegratorPhase::Failed, _) => Err(SimError::Terminated {
                code: self.state.error_code,
            }),
            (IntegratorPhase::Uninitialized, _) | (_, None) => Err(SimError::NotInitialized),
            (_, Some(setup)) => Ok(setup),
        }
    }

    fn solve_next_inner(&mut self, inputs: Option<&[f64]>) -> SimResult<bool> {
        let total_steps = self.active_setup()?.total_steps;
        if self.phase == IntegratorPhase::Completed {
            return Ok(false);
        }
        if self.state.step >= total_steps {
            self.phase = IntegratorPhase::Completed;
            return Ok(false);
        }

        if let Err(e) = self.advance(inputs) {
            self.state.error_code = e.code();
            self.phase = IntegratorPhase::Failed;
            warn!(time = self.state.time, code = e.code(), error = %e, "time step failed");
            return Err(e);
        }

        self.state.step += 1;
        if self.state.step >= total_steps {
            self.phase = IntegratorPhase::Completed;
            info!(
                time = self.state.time,
                steps = self.state.step,
                "integration completed"
            );
            Ok(false)
        } else {
            self.phase = IntegratorPhase::Stepping;
            Ok(true)
        }
    }

    fn advance(&mut self, inputs: Option<&[f64]>) -> SimResult<()> {
        let Some(setup) = self.setup.as_mut() else {
            return Err(SimError::NotInitialized);
        };
        let provider = &*self.provider;
        let state = &mut self.state;

        let k = state.step + 1;
        let time = setup.time_of(k);

        if !setup.acceleration_ready {
            let start_values = function_values(&setup.functions, provider, state.time, inputs)?;
            let load = setup.system.load_vector(|id| lookup(&start_values, id));
            state.kinematics.acceleration = equilibrium_acceleration(
                &setup.system,
                &state.kinematics.displacement,
                &state.kinematics.velocity,
                &load,
                state.time,
            )?;
            setup.acceleration_ready = true;

            if setup.equilibrium_step && k == 1 {
                state.values.extend(start_values);
                record_sensors(setup, state);
                debug!(time, "initial equilibrium solved");
                return Ok(());
            }
        }

        let values = function_values(&setup.functions, provider, time, inputs)?;
        let load = setup.system.load_vector(|id| lookup(&values, id));
        let next = setup
            .newmark
            .step(&setup.system, &state.kinematics, &load, time)?;

        state.time = time;
        state.kinematics = next;
        state.values.extend(values);
        record_sensors(setup, state);
        debug!(time, step = k, "time step solved");
        Ok(())
    }
}

fn lookup(values: &[(FunctionId, f64)], id: FunctionId) -> f64 {
    values
        .iter()
        .find(|(fid, _)| *fid == id)
        .map_or(0.0, |(_, v)| *v)
}

fn function_values(
    functions: &[FunctionDef],
    provider: &dyn ExternalFunctionProvider,
    time: f64,
    inputs: Option<&[f64]>,
) -> SimResult<Vec<(FunctionId, f64)>> {
    functions
        .iter()
        .map(|function| {
            let value = match (&function.kind, inputs) {
                (FunctionKind::External { channel }, Some(inputs)) => (*channel as usize)
                    .checked_sub(1)
                    .and_then(|index| inputs.get(index))
                    .copied()
                    .ok_or(SimError::InvalidArg {
                        what: "missing input for external function channel",
                    })?,
                (FunctionKind::External { channel }, None) => provider
                    .evaluate(*channel, time)
                    .map_err(|source| SimError::Forcing { time, source })?,
                (kind, _) => evaluate_builtin(kind, time).unwrap_or(0.0),
            };
            Ok((function.id, value))
        })
        .collect()
}

fn record_sensors(setup: &Setup, state: &mut SimulationState) {
    let kin = &state.kinematics;
    for &(id, probe) in &setup.sensors {
        let value = match probe {
            Probe::Position(dof) => kin.displacement[dof],
            Probe::Velocity(dof) => kin.velocity[dof],
            Probe::Acceleration(dof) => kin.acceleration[dof],
            Probe::SpringForce(dof) => setup.system.spring_force(dof, &kin.displacement),
        };
        state.values.insert(id, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forcing::FnProvider;
    use fd_model::{DofDef, FunctionDef, LoadDef, SensorDef, SolverSettings};

    fn fid(raw: u32) -> FunctionId {
        FunctionId::new(raw).unwrap()
    }

    fn cantilever(stop_time: f64) -> ModelDef {
        ModelDef {
            version: 1,
            name: "cantilever".to_string(),
            settings: SolverSettings {
                stop_time,
                time_step: 0.01,
                ..SolverSettings::default()
            },
            dofs: vec![DofDef {
                id: "tip".to_string(),
                mass: 1.0,
                stiffness: 400.0,
                damping: 0.5,
                initial_displacement: 0.0,
                initial_velocity: 0.0,
            }],
            rayleigh: None,
            functions: vec![FunctionDef {
                id: fid(1),
                name: "load".to_string(),
                kind: FunctionKind::External { channel: 1 },
            }],
            loads: vec![LoadDef {
                dof: "tip".to_string(),
                scale: 1.0,
                function: fid(1),
            }],
            sensors: vec![SensorDef {
                id: fid(3),
                name: "tip".to_string(),
                quantity: SensorQuantity::Position {
                    dof: "tip".to_string(),
                },
            }],
            results: None,
        }
    }

    fn unit_step() -> Box<dyn ExternalFunctionProvider> {
        Box::new(FnProvider(|id: u32, _t: f64| (id == 1).then_some(1.0)))
    }

    #[test]
    fn uninitialized_integrator_refuses_to_step() {
        let mut integrator = TimeIntegrator::default();
        assert!(matches!(
            integrator.get_next_time(),
            Err(SimError::NotInitialized)
        ));
        assert!(matches!(
            integrator.solve_next(),
            Err(SimError::NotInitialized)
        ));
        assert!(matches!(
            integrator.get_function(3),
            Err(SimError::UnknownFunctionId { id: 3 })
        ));
    }

    #[test]
    fn first_step_lands_one_dt_after_start() {
        let mut integrator = TimeIntegrator::new(unit_step());
        integrator.initialize(&cantilever(0.03)).unwrap();
        assert_eq!(integrator.phase(), IntegratorPhase::Initialized);
        assert_eq!(integrator.get_next_time().unwrap(), 0.01);
        assert_eq!(integrator.get_next_time().unwrap(), 0.01);
        assert_eq!(integrator.last_error(), 0);
    }

    #[test]
    fn equilibrium_step_starts_at_start_time() {
        let mut model = cantilever(0.02);
        model.settings.initial_equilibrium = true;
        let mut integrator = TimeIntegrator::new(unit_step());
        integrator.initialize(&model).unwrap();

        assert_eq!(integrator.get_next_time().unwrap(), 0.0);
        assert!(integrator.solve_next().unwrap());
        assert_eq!(integrator.current_time(), 0.0);
        // a = f / m with the structure at rest
        assert!((integrator.state().kinematics.acceleration[0] - 1.0).abs() < 1e-12);
        assert_eq!(integrator.get_next_time().unwrap(), 0.01);
    }

    #[test]
    fn three_step_run_completes_on_last_step() {
        let mut integrator = TimeIntegrator::new(unit_step());
        integrator.initialize(&cantilever(0.03)).unwrap();

        assert!(integrator.solve_next().unwrap());
        assert_eq!(integrator.phase(), IntegratorPhase::Stepping);
        assert!(integrator.solve_next().unwrap());
        assert!(!integrator.solve_next().unwrap());
        assert_eq!(integrator.phase(), IntegratorPhase::Completed);
        assert_eq!(integrator.last_error(), 0);
        assert_eq!(integrator.step_index(), 3);

        // Sentinel: the final time repeats and no further step is taken.
        let final_time = integrator.current_time();
        assert!((final_time - 0.03).abs() < 1e-12);
        assert_eq!(integrator.get_next_time().unwrap(), final_time);
        assert!(!integrator.solve_next().unwrap());
        assert!(integrator.get_function(3).unwrap() > 0.0);
    }

    #[test]
    fn outputs_follow_the_latest_step() {
        let mut integrator = TimeIntegrator::new(unit_step());
        integrator.initialize(&cantilever(0.05)).unwrap();
        assert_eq!(integrator.get_function(3).unwrap(), 0.0);

        integrator.solve_next().unwrap();
        let first = integrator.get_function(3).unwrap();
        assert_eq!(first, integrator.state().kinematics.displacement[0]);
        integrator.solve_next().unwrap();
        let second = integrator.get_function(3).unwrap();
        assert_ne!(first, second);
        assert_eq!(integrator.get_function(1).unwrap(), 1.0);
    }

    #[test]
    fn unknown_function_id_in_every_phase() {
        let mut integrator = TimeIntegrator::new(unit_step());
        assert!(matches!(
            integrator.get_function(42),
            Err(SimError::UnknownFunctionId { id: 42 })
        ));
        integrator.initialize(&cantilever(0.02)).unwrap();
        assert!(matches!(
            integrator.get_function(42),
            Err(SimError::UnknownFunctionId { .. })
        ));
        assert!(matches!(
            integrator.get_function(0),
            Err(SimError::UnknownFunctionId { id: 0 })
        ));
        integrator.solve_next().unwrap();
        assert!(integrator.get_function(42).is_err());
        integrator.solve_next().unwrap();
        assert_eq!(integrator.phase(), IntegratorPhase::Completed);
        assert!(matches!(
            integrator.get_function(42),
            Err(SimError::UnknownFunctionId { .. })
        ));
    }

    #[test]
    fn divergence_fails_the_run_and_sticks() {
        let provider = FnProvider(|_id: u32, t: f64| Some(if t > 0.015 { f64::NAN } else { 1.0 }));
        let mut integrator = TimeIntegrator::new(Box::new(provider));
        integrator.initialize(&cantilever(0.05)).unwrap();

        assert!(integrator.solve_next().unwrap());
        let err = integrator.solve_next().unwrap_err();
        assert!(matches!(err, SimError::NumericalDivergence { .. }));
        assert_eq!(integrator.phase(), IntegratorPhase::Failed);
        assert_eq!(integrator.last_error(), codes::NUMERICAL_DIVERGENCE);

        assert!(matches!(
            integrator.solve_next(),
            Err(SimError::Terminated { code: codes::NUMERICAL_DIVERGENCE })
        ));
        assert!(integrator.get_next_time().is_err());
        assert!(matches!(
            integrator.get_function(3),
            Err(SimError::Terminated { .. })
        ));
        assert!(matches!(
            integrator.get_function(42),
            Err(SimError::UnknownFunctionId { .. })
        ));
    }

    #[test]
    fn missing_external_function_is_a_forcing_failure() {
        let mut integrator = TimeIntegrator::default();
        integrator.initialize(&cantilever(0.02)).unwrap();
        let err = integrator.solve_next().unwrap_err();
        assert!(matches!(err, SimError::Forcing { .. }));
        assert_eq!(integrator.last_error(), codes::FORCING);
    }

    #[test]
    fn injected_inputs_match_provider_values() {
        let mut from_provider = TimeIntegrator::new(unit_step());
        from_provider.initialize(&cantilever(0.04)).unwrap();
        let mut injected = TimeIntegrator::default();
        injected.initialize(&cantilever(0.04)).unwrap();

        loop {
            let more_a = from_provider.solve_next().unwrap();
            let more_b = injected.solve_next_with_inputs(&[1.0]).unwrap();
            assert_eq!(more_a, more_b);
            assert_eq!(
                from_provider.get_function(3).unwrap(),
                injected.get_function(3).unwrap()
            );
            if !more_a {
                break;
            }
        }
    }

    #[test]
    fn too_few_inputs_rejected_without_failing() {
        let mut integrator = TimeIntegrator::default();
        integrator.initialize(&cantilever(0.02)).unwrap();
        assert!(matches!(
            integrator.solve_next_with_inputs(&[]),
            Err(SimError::InvalidArg { .. })
        ));
        assert_eq!(integrator.phase(), IntegratorPhase::Initialized);
        assert_eq!(integrator.last_error(), 0);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut integrator = TimeIntegrator::new(unit_step());
        assert_eq!(integrator.finalize(), 0);

        integrator.initialize(&cantilever(0.02)).unwrap();
        integrator.solve_next().unwrap();
        assert_eq!(integrator.finalize(), 0);
        assert_eq!(integrator.finalize(), 0);
        assert_eq!(integrator.phase(), IntegratorPhase::Uninitialized);
    }

    #[test]
    fn finalize_after_failure_reports_code_twice() {
        let mut integrator = TimeIntegrator::default();
        integrator.initialize(&cantilever(0.02)).unwrap();
        let _ = integrator.solve_next();
        let first = integrator.finalize();
        assert_eq!(first, codes::FORCING);
        assert_eq!(integrator.finalize(), first);
        assert_eq!(integrator.last_error(), first);
    }

    #[test]
    fn reinitialize_clears_failure() {
        let mut integrator = TimeIntegrator::default();
        integrator.initialize(&cantilever(0.02)).unwrap();
        let _ = integrator.solve_next();
        assert_eq!(integrator.phase(), IntegratorPhase::Failed);

        integrator.set_provider(unit_step());
        integrator.initialize(&cantilever(0.02)).unwrap();
        assert_eq!(integrator.last_error(), 0);
        assert!(integrator.solve_next().unwrap());
    }

    #[test]
    fn initial_conditions_override_model() {
        let mut integrator = TimeIntegrator::new(unit_step());
        let ic = InitialConditions {
            displacement: vec![0.25],
            velocity: vec![0.0],
        };
        integrator
            .initialize_with(&cantilever(0.02), Some(&ic))
            .unwrap();
        assert_eq!(integrator.get_function(3).unwrap(), 0.25);

        let wrong = InitialConditions {
            displacement: vec![0.0, 0.0],
            velocity: vec![0.0],
        };
        assert!(integrator
            .initialize_with(&cantilever(0.02), Some(&wrong))
            .is_err());
    }

    #[test]
    fn zero_length_run_completes_without_stepping() {
        let mut integrator = TimeIntegrator::new(unit_step());
        integrator.initialize(&cantilever(0.0)).unwrap();
        assert_eq!(integrator.get_next_time().unwrap(), 0.0);
        assert!(!integrator.solve_next().unwrap());
        assert_eq!(integrator.step_index(), 0);
        assert_eq!(integrator.phase(), IntegratorPhase::Completed);
    }
}
