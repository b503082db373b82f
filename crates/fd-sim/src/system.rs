//! Lumped chain assembly.

use fd_core::{FunctionId, ensure_finite};
use fd_model::ModelDef;
use nalgebra::{DMatrix, DVector};

use crate::error::{SimError, SimResult};

/// A load applied to one dof: `scale * f(t)`.
#[derive(Clone, Debug)]
pub struct AppliedLoad {
    pub dof: usize,
    pub scale: f64,
    pub function: FunctionId,
}

/// Assembled mass, damping and stiffness of a model.
#[derive(Clone, Debug)]
pub struct StructuralSystem {
    pub mass: DMatrix<f64>,
    pub damping: DMatrix<f64>,
    pub stiffness: DMatrix<f64>,
    /// Spring constant between dof `i` and its predecessor (ground for 0).
    pub springs: Vec<f64>,
    pub loads: Vec<AppliedLoad>,
}

impl StructuralSystem {
    pub fn assemble(model: &ModelDef) -> SimResult<Self> {
        let n = model.dofs.len();
        if n == 0 {
            return Err(SimError::InvalidModel {
                what: "model has no degrees of freedom".to_string(),
            });
        }

        let mut mass = DMatrix::zeros(n, n);
        let mut damping = DMatrix::zeros(n, n);
        let mut stiffness = DMatrix::zeros(n, n);

        for (i, dof) in model.dofs.iter().enumerate() {
            mass[(i, i)] = ensure_finite(dof.mass, "dof mass")?;
            add_link(&mut stiffness, i, ensure_finite(dof.stiffness, "dof stiffness")?);
            add_link(&mut damping, i, ensure_finite(dof.damping, "dof damping")?);
        }

        if let Some(rayleigh) = model.rayleigh {
            damping += &mass * rayleigh.alpha + &stiffness * rayleigh.beta;
        }

        let loads = model
            .loads
            .iter()
            .map(|load| {
                let dof = model
                    .dof_index(&load.dof)
                    .ok_or_else(|| SimError::InvalidModel {
                        what: format!("load references unknown dof '{}'", load.dof),
                    })?;
                Ok(AppliedLoad {
                    dof,
                    scale: load.scale,
                    function: load.function,
                })
            })
            .collect::<SimResult<Vec<_>>>()?;

        Ok(Self {
            mass,
            damping,
            stiffness,
            springs: model.dofs.iter().map(|d| d.stiffness).collect(),
            loads,
        })
    }

    pub fn dofs(&self) -> usize {
        self.springs.len()
    }

    /// Force in the spring between `dof` and its predecessor.
    pub fn spring_force(&self, dof: usize, displacement: &DVector<f64>) -> f64 {
        let below = if dof == 0 { 0.0 } else { displacement[dof - 1] };
        self.springs[dof] * (displacement[dof] - below)
    }

    /// Load vector for the given function values, looked up per load.
    pub fn load_vector(&self, mut value_of: impl FnMut(FunctionId) -> f64) -> DVector<f64> {
        let mut f = DVector::zeros(self.dofs());
        for load in &self.loads {
            f[load.dof] += load.scale * value_of(load.function);
        }
        f
    }
}

/// Add a two-node link between `i` and `i - 1`; the first dof links to
/// ground.
fn add_link(matrix: &mut DMatrix<f64>, i: usize, k: f64) {
    matrix[(i, i)] += k;
    if i > 0 {
        matrix[(i - 1, i - 1)] += k;
        matrix[(i, i - 1)] -= k;
        matrix[(i - 1, i)] -= k;
    }
}
