//! Solver sessions: one model file driven through the time integrator.

use std::path::{Path, PathBuf};
use std::time::Instant;

use fd_model::{Model, ResultsDef, load_model, reset_for_rerun, save_model};
use fd_results::{ResponseHistory, ResultsDatabase, RunManifest, compute_run_id};
use fd_sim::{
    ExternalFunctionProvider, InitialConditions, IntegratorPhase, NoExternalFunctions, SimError,
    TimeIntegrator, codes,
};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::progress::{RunProgressEvent, SessionStage, StepProgress};

/// Initial conditions used when a model is solved again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Start from the initial conditions in the model file.
    #[default]
    FromInitial,
    /// Start from the displacement and velocity of the latest results. The
    /// clock still restarts at the start time.
    FromLastState,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub restart_policy: RestartPolicy,
    /// Whether `run_all` writes results back into the model file.
    pub write_back: bool,
    /// Function ids recorded into the response history per step; all model
    /// outputs when `None`.
    pub record_functions: Option<Vec<u32>>,
    /// Store each closed run in the results database next to the model.
    pub results_database: bool,
    pub solver_version: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            restart_policy: RestartPolicy::FromInitial,
            write_back: true,
            record_functions: None,
            results_database: true,
            solver_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A model file opened for solving.
///
/// ```text
/// open -> (run_step | solve_window)* -> close
/// ```
///
/// `run_all` does the same in one call. The response history of the last
/// run stays readable after `close` and after a failed step.
pub struct SolverSession {
    options: SessionOptions,
    integrator: TimeIntegrator,
    model: Option<Model>,
    history: ResponseHistory,
    progress: Option<Box<dyn FnMut(RunProgressEvent)>>,
    started: Instant,
}

impl Default for SolverSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl SolverSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            integrator: TimeIntegrator::new(Box::new(NoExternalFunctions)),
            model: None,
            history: ResponseHistory::new(Vec::new()),
            progress: None,
            started: Instant::now(),
        }
    }

    /// Use `provider` for the model's external functions.
    pub fn with_provider(mut self, provider: Box<dyn ExternalFunctionProvider>) -> Self {
        self.integrator.set_provider(provider);
        self
    }

    pub fn set_progress_callback(&mut self, callback: impl FnMut(RunProgressEvent) + 'static) {
        self.progress = Some(Box::new(callback));
    }

    /// Load `path` and initialize a new session for it.
    pub fn open(path: &Path, options: SessionOptions) -> AppResult<Self> {
        let mut session = Self::new(options);
        session.start(path)?;
        Ok(session)
    }

    /// Load `path` into this session, discarding any model that is open.
    pub fn start(&mut self, path: &Path) -> AppResult<()> {
        if self.model.is_some() {
            debug!("discarding open model");
            self.integrator.finalize();
            self.model = None;
        }

        self.started = Instant::now();
        self.emit(SessionStage::LoadingModel, Some(path.display().to_string()));
        let model = load_model(path)?;
        self.initialize(model)
    }

    /// Solve the open model again from its start time without reloading it.
    /// Unsaved results are dropped. With `RestartPolicy::FromLastState` the
    /// last computed state seeds the initial conditions.
    pub fn rerun(&mut self) -> AppResult<()> {
        let mut model = self.model.take().ok_or(AppError::NoModel)?;
        let state = self.integrator.state();
        let initial = if self.options.restart_policy == RestartPolicy::FromLastState && state.step > 0
        {
            Some(InitialConditions {
                displacement: state.kinematics.displacement.iter().copied().collect(),
                velocity: state.kinematics.velocity.iter().copied().collect(),
            })
        } else {
            self.initial_conditions(&model)
        };
        reset_for_rerun(&mut model);
        self.started = Instant::now();
        self.initialize_from(model, initial)
    }

    fn initialize(&mut self, model: Model) -> AppResult<()> {
        let initial = self.initial_conditions(&model);
        self.initialize_from(model, initial)
    }

    fn initialize_from(&mut self, model: Model, initial: Option<InitialConditions>) -> AppResult<()> {
        self.emit(SessionStage::Initializing, None);
        self.integrator.initialize_with(model.def(), initial.as_ref())?;

        let ids = match &self.options.record_functions {
            Some(ids) => {
                let known = self.integrator.output_ids();
                if let Some(&unknown) = ids
                    .iter()
                    .find(|&&id| !known.iter().any(|k| k.get() == id))
                {
                    self.integrator.finalize();
                    return Err(AppError::InvalidInput(format!(
                        "function {unknown} is not defined by model '{}'",
                        model.def().name
                    )));
                }
                ids.clone()
            }
            None => model.def().output_ids().into_iter().map(u32::from).collect(),
        };
        self.history = ResponseHistory::new(ids);

        info!(
            model = %model.def().name,
            path = %model.path().display(),
            restart = ?self.options.restart_policy,
            "session started"
        );
        self.model = Some(model);
        Ok(())
    }

    fn initial_conditions(&self, model: &Model) -> Option<InitialConditions> {
        if self.options.restart_policy != RestartPolicy::FromLastState {
            return None;
        }
        let results = model.latest_results()?;
        let dofs = model.def().dofs.len();
        if results.displacement.len() != dofs || results.velocity.len() != dofs {
            warn!(
                model = %model.def().name,
                "stored results do not match the model, restarting from initial conditions"
            );
            return None;
        }
        Some(InitialConditions {
            displacement: results.displacement.clone(),
            velocity: results.velocity.clone(),
        })
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn history(&self) -> &ResponseHistory {
        &self.history
    }

    pub fn phase(&self) -> IntegratorPhase {
        self.integrator.phase()
    }

    pub fn last_error(&self) -> i32 {
        self.integrator.last_error()
    }

    pub fn get_next_time(&self) -> AppResult<f64> {
        Ok(self.integrator.get_next_time()?)
    }

    pub fn get_current_time(&self) -> f64 {
        self.integrator.current_time()
    }

    pub fn get_function(&self, id: u32) -> AppResult<f64> {
        Ok(self.integrator.get_function(id)?)
    }

    /// Advance one step. `Ok(false)` once the final time is reached.
    pub fn run_step(&mut self) -> AppResult<bool> {
        self.step(None)
    }

    /// Advance one step with the external function values given in `inputs`.
    pub fn run_step_with_inputs(&mut self, inputs: &[f64]) -> AppResult<bool> {
        self.step(Some(inputs))
    }

    fn step(&mut self, inputs: Option<&[f64]>) -> AppResult<bool> {
        let next_time = self.integrator.get_next_time()?;
        let before = self.integrator.step_index();

        let outcome = match inputs {
            Some(inputs) => self.integrator.solve_next_with_inputs(inputs),
            None => self.integrator.solve_next(),
        };
        let more = match outcome {
            Ok(more) => more,
            Err(e) => {
                if self.integrator.phase() == IntegratorPhase::Failed {
                    self.emit(SessionStage::Failed, Some(e.to_string()));
                }
                return Err(e.into());
            }
        };

        if self.integrator.step_index() > before {
            let values = self
                .history
                .function_ids()
                .iter()
                .map(|&id| self.integrator.get_function(id))
                .collect::<Result<Vec<_>, SimError>>()?;
            self.history.push(self.integrator.current_time(), values);
            debug!(time = next_time, step = self.integrator.step_index(), "step recorded");
            self.emit_step();
        }
        if !more {
            self.emit(SessionStage::Completed, None);
        }
        Ok(more)
    }

    /// Step until the final time or a failure; returns the error code
    /// (0 for a clean run).
    pub fn run_to_completion(&mut self) -> i32 {
        loop {
            match self.run_step() {
                Ok(true) => continue,
                Ok(false) => return self.integrator.last_error(),
                Err(e) => {
                    let code = self.integrator.last_error();
                    return if code != codes::OK { code } else { e.code() };
                }
            }
        }
    }

    /// Take up to `n_steps` steps, collecting `function_ids` after each one.
    ///
    /// Outputs are row-major, one row per completed step; id 0 fills its
    /// slot with 0.0. The flag is `false` once the final time is reached.
    /// With `inputs`, every step uses the same external function values.
    pub fn solve_window(
        &mut self,
        n_steps: usize,
        inputs: Option<&[f64]>,
        function_ids: &[u32],
    ) -> AppResult<(Vec<f64>, bool)> {
        let mut outputs = Vec::with_capacity(n_steps * function_ids.len());
        let mut more = self.integrator.phase() != IntegratorPhase::Completed;

        for _ in 0..n_steps {
            if !more {
                break;
            }
            let before = self.integrator.step_index();
            more = self.step(inputs)?;
            if self.integrator.step_index() == before {
                break;
            }
            for &id in function_ids {
                let value = if id == 0 {
                    0.0
                } else {
                    self.integrator.get_function(id)?
                };
                outputs.push(value);
            }
        }
        Ok((outputs, more))
    }

    /// Write the response history as an ASCII table.
    pub fn export_history(&self, path: &Path) -> AppResult<()> {
        std::fs::write(path, self.history.to_table().to_ascii()).map_err(|e| {
            AppError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            }
        })
    }

    /// Save the model, writing the results back into the file when
    /// `write_results` is set, then finalize the integrator. Returns the
    /// run's error code. If saving fails the model and the integrator state
    /// stay as they were, so `close` can be retried.
    pub fn close(&mut self, write_results: bool) -> AppResult<i32> {
        if self.model.is_none() {
            return Ok(self.integrator.finalize());
        }
        self.emit(SessionStage::SavingResults, None);
        let Some(model) = self.model.as_mut() else {
            return Err(AppError::NoModel);
        };

        let run_id = compute_run_id(model.def(), &self.options.solver_version, &self.history);
        let timestamp = chrono::Utc::now().to_rfc3339();
        let state = self.integrator.state();
        if state.step > 0 && self.integrator.phase() != IntegratorPhase::Uninitialized {
            model.record_results(ResultsDef {
                run_id: run_id.clone(),
                solved_at: timestamp.clone(),
                steps: state.step,
                final_time: state.time,
                error_code: state.error_code,
                function_values: state
                    .values
                    .iter()
                    .map(|(id, value)| (u32::from(*id), *value))
                    .collect(),
                displacement: state.kinematics.displacement.iter().copied().collect(),
                velocity: state.kinematics.velocity.iter().copied().collect(),
            });
        }
        let steps = state.step;
        let final_time = state.time;
        let code = state.error_code;

        let path: PathBuf = model.path().to_path_buf();
        save_model(model, &path, write_results)?;

        if self.options.results_database && !self.history.is_empty() {
            let database = ResultsDatabase::for_model(&path)?;
            let manifest = RunManifest {
                run_id,
                model_name: model.def().name.clone(),
                timestamp,
                solver_version: self.options.solver_version.clone(),
                function_ids: self.history.function_ids().to_vec(),
                steps,
                final_time,
                error_code: code,
            };
            database.save_run(&manifest, &self.history)?;
            debug!(run_id = %manifest.run_id, "run stored");
        }

        let code = self.integrator.finalize();
        info!(path = %path.display(), code, write_results, "session closed");
        self.model = None;
        Ok(code)
    }

    /// Open `path`, run it to the end and close with the session's write-back
    /// option. Returns the run's error code.
    pub fn run_all(&mut self, path: &Path) -> AppResult<i32> {
        self.start(path)?;
        let code = self.run_to_completion();
        let closed = self.close(self.options.write_back)?;
        Ok(if code != codes::OK { code } else { closed })
    }

    fn emit(&mut self, stage: SessionStage, message: Option<String>) {
        let elapsed = self.started.elapsed().as_secs_f64();
        if let Some(cb) = self.progress.as_deref_mut() {
            cb(RunProgressEvent::stage(stage, elapsed, message));
        }
    }

    fn emit_step(&mut self) {
        let Some(cb) = self.progress.as_deref_mut() else {
            return;
        };
        let Some(model) = self.model.as_ref() else {
            return;
        };
        let settings = &model.def().settings;
        let sim_time = self.integrator.current_time();
        let span = settings.stop_time - settings.start_time;
        let fraction_complete = if span > 0.0 {
            ((sim_time - settings.start_time) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        cb(RunProgressEvent {
            stage: SessionStage::Stepping,
            elapsed_wall_s: self.started.elapsed().as_secs_f64(),
            message: None,
            step: Some(StepProgress {
                sim_time,
                final_time: settings.stop_time,
                fraction_complete,
                step: self.integrator.step_index(),
            }),
        });
    }
}
