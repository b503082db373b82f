//! Model file schema.
//!
//! A model is a lumped chain of degrees of freedom: dof `i` is tied to dof
//! `i - 1` by its spring and damper, dof 0 is tied to ground. This is the
//! classical reduction of a cantilever to its transverse tip dynamics.
//!
//! ```yaml
//! version: 1
//! name: Cantilever
//! settings:
//!   stop_time: 0.03
//!   time_step: 0.01
//! dofs:
//!   - { id: root, mass: 2.0, stiffness: 4000.0 }
//!   - { id: tip, mass: 1.0, stiffness: 2000.0 }
//! functions:
//!   - { id: 1, name: Tip load, kind: { type: Sine, amplitude: 10.0, frequency_hz: 2.0 } }
//! loads:
//!   - { dof: tip, function: 1 }
//! sensors:
//!   - { id: 3, name: Tip position, quantity: { type: Position, dof: tip } }
//! ```

use std::collections::BTreeMap;

use fd_core::FunctionId;
use serde::{Deserialize, Serialize};

/// Newest model file version understood by this crate.
pub const LATEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDef {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub settings: SolverSettings,
    #[serde(default)]
    pub dofs: Vec<DofDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rayleigh: Option<RayleighDef>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
    #[serde(default)]
    pub loads: Vec<LoadDef>,
    #[serde(default)]
    pub sensors: Vec<SensorDef>,
    /// Written by write-back; absent on a model that was never solved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsDef>,
}

impl ModelDef {
    /// Position of a dof in the chain, by id.
    pub fn dof_index(&self, dof_id: &str) -> Option<usize> {
        self.dofs.iter().position(|d| d.id == dof_id)
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn sensor(&self, id: FunctionId) -> Option<&SensorDef> {
        self.sensors.iter().find(|s| s.id == id)
    }

    /// All ids that can be queried as outputs: sensors and forcing functions.
    pub fn output_ids(&self) -> Vec<FunctionId> {
        let mut ids: Vec<FunctionId> = self
            .sensors
            .iter()
            .map(|s| s.id)
            .chain(self.functions.iter().map(|f| f.id))
            .collect();
        ids.sort();
        ids
    }
}

/// Time range and integration parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverSettings {
    #[serde(default)]
    pub start_time: f64,
    #[serde(default = "default_stop_time")]
    pub stop_time: f64,
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    #[serde(default = "default_newmark_beta")]
    pub newmark_beta: f64,
    #[serde(default = "default_newmark_gamma")]
    pub newmark_gamma: f64,
    /// Relative residual accepted after the linear solve of a step.
    #[serde(default = "default_residual_tolerance")]
    pub residual_tolerance: f64,
    /// Displacement magnitude treated as divergence.
    #[serde(default = "default_divergence_limit")]
    pub divergence_limit: f64,
    /// Solve for the initial accelerations at `start_time` as the first step.
    #[serde(default)]
    pub initial_equilibrium: bool,
}

fn default_stop_time() -> f64 {
    1.0
}

fn default_time_step() -> f64 {
    0.01
}

fn default_newmark_beta() -> f64 {
    0.25
}

fn default_newmark_gamma() -> f64 {
    0.5
}

fn default_residual_tolerance() -> f64 {
    1e-8
}

fn default_divergence_limit() -> f64 {
    1e6
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            stop_time: default_stop_time(),
            time_step: default_time_step(),
            newmark_beta: default_newmark_beta(),
            newmark_gamma: default_newmark_gamma(),
            residual_tolerance: default_residual_tolerance(),
            divergence_limit: default_divergence_limit(),
            initial_equilibrium: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DofDef {
    pub id: String,
    pub mass: f64,
    /// Spring to the previous dof (ground for the first one).
    pub stiffness: f64,
    #[serde(default)]
    pub damping: f64,
    #[serde(default)]
    pub initial_displacement: f64,
    #[serde(default)]
    pub initial_velocity: f64,
}

/// Mass and stiffness proportional damping, `C += alpha*M + beta*K`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RayleighDef {
    pub alpha: f64,
    pub beta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDef {
    pub id: FunctionId,
    pub name: String,
    pub kind: FunctionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum FunctionKind {
    Constant {
        value: f64,
    },
    Sine {
        amplitude: f64,
        frequency_hz: f64,
        #[serde(default)]
        phase_rad: f64,
        #[serde(default)]
        offset: f64,
    },
    Ramp {
        slope: f64,
        #[serde(default)]
        start_time: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_value: Option<f64>,
    },
    /// Piecewise linear through `(time, value)` points, constant outside.
    Polyline {
        points: Vec<(f64, f64)>,
    },
    /// Value supplied by the caller, either through an external function
    /// provider or assigned per step.
    External {
        channel: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadDef {
    pub dof: String,
    #[serde(default = "default_load_scale")]
    pub scale: f64,
    pub function: FunctionId,
}

fn default_load_scale() -> f64 {
    1.0
}

/// Output function measuring a response quantity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorDef {
    pub id: FunctionId,
    pub name: String,
    pub quantity: SensorQuantity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SensorQuantity {
    Position { dof: String },
    Velocity { dof: String },
    Acceleration { dof: String },
    /// Force in the spring connecting `dof` to its predecessor.
    SpringForce { dof: String },
}

impl SensorQuantity {
    pub fn dof(&self) -> &str {
        match self {
            SensorQuantity::Position { dof }
            | SensorQuantity::Velocity { dof }
            | SensorQuantity::Acceleration { dof }
            | SensorQuantity::SpringForce { dof } => dof,
        }
    }
}

/// Results section persisted by write-back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsDef {
    pub run_id: String,
    pub solved_at: String,
    pub steps: usize,
    pub final_time: f64,
    #[serde(default)]
    pub error_code: i32,
    /// Last computed value per function id.
    #[serde(default)]
    pub function_values: BTreeMap<u32, f64>,
    #[serde(default)]
    pub displacement: Vec<f64>,
    #[serde(default)]
    pub velocity: Vec<f64>,
}
