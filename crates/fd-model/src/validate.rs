//! Model validation logic.

use crate::schema::{FunctionKind, ModelDef, SolverSettings};
use std::collections::HashSet;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_model(model: &ModelDef) -> Result<(), ValidationError> {
    if model.version == 0 || model.version > crate::schema::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: model.version,
        });
    }

    validate_settings(&model.settings)?;

    if model.dofs.is_empty() {
        return Err(invalid("dofs", "[]", "model needs at least one dof"));
    }

    let mut dof_ids = HashSet::new();
    for dof in &model.dofs {
        if !dof_ids.insert(dof.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: dof.id.clone(),
                context: "dofs".to_string(),
            });
        }
        if !dof.mass.is_finite() || dof.mass < 0.0 {
            return Err(invalid("dof.mass", dof.mass, "must be finite and >= 0"));
        }
        if !dof.stiffness.is_finite() || dof.stiffness < 0.0 {
            return Err(invalid(
                "dof.stiffness",
                dof.stiffness,
                "must be finite and >= 0",
            ));
        }
        if !dof.damping.is_finite() || dof.damping < 0.0 {
            return Err(invalid("dof.damping", dof.damping, "must be finite and >= 0"));
        }
        if !dof.initial_displacement.is_finite() || !dof.initial_velocity.is_finite() {
            return Err(invalid("dof.initial", &dof.id, "initial conditions must be finite"));
        }
    }

    if let Some(rayleigh) = &model.rayleigh
        && (!rayleigh.alpha.is_finite() || !rayleigh.beta.is_finite())
    {
        return Err(invalid("rayleigh", rayleigh.alpha, "coefficients must be finite"));
    }

    // Forcing functions and sensors share one id space.
    let mut function_ids = HashSet::new();
    for function in &model.functions {
        if !function_ids.insert(function.id) {
            return Err(ValidationError::DuplicateId {
                id: function.id.to_string(),
                context: "functions".to_string(),
            });
        }
        match &function.kind {
            FunctionKind::Polyline { points } => {
                if points.is_empty() {
                    return Err(invalid("Polyline.points", "[]", "needs at least one point"));
                }
                if points.windows(2).any(|w| w[1].0 <= w[0].0) {
                    return Err(invalid(
                        "Polyline.points",
                        &function.name,
                        "times must be strictly increasing",
                    ));
                }
            }
            FunctionKind::External { channel } if *channel == 0 => {
                return Err(invalid("External.channel", channel, "channels start at 1"));
            }
            _ => {}
        }
    }
    for sensor in &model.sensors {
        if !function_ids.insert(sensor.id) {
            return Err(ValidationError::DuplicateId {
                id: sensor.id.to_string(),
                context: "sensors".to_string(),
            });
        }
        if !dof_ids.contains(sensor.quantity.dof()) {
            return Err(ValidationError::MissingReference {
                id: sensor.quantity.dof().to_string(),
                context: format!("sensor {}", sensor.id),
            });
        }
    }

    for load in &model.loads {
        if !dof_ids.contains(load.dof.as_str()) {
            return Err(ValidationError::MissingReference {
                id: load.dof.clone(),
                context: "load dof".to_string(),
            });
        }
        if model.function(load.function).is_none() {
            return Err(ValidationError::MissingReference {
                id: load.function.to_string(),
                context: "load function".to_string(),
            });
        }
        if !load.scale.is_finite() {
            return Err(invalid("load.scale", load.scale, "must be finite"));
        }
    }

    if let Some(results) = &model.results {
        let n = model.dofs.len();
        if !results.displacement.is_empty() && results.displacement.len() != n {
            return Err(invalid(
                "results.displacement",
                results.displacement.len(),
                "length must match the number of dofs",
            ));
        }
        if !results.velocity.is_empty() && results.velocity.len() != n {
            return Err(invalid(
                "results.velocity",
                results.velocity.len(),
                "length must match the number of dofs",
            ));
        }
    }

    Ok(())
}

fn validate_settings(settings: &SolverSettings) -> Result<(), ValidationError> {
    if !settings.time_step.is_finite() || settings.time_step <= 0.0 {
        return Err(invalid(
            "settings.time_step",
            settings.time_step,
            "must be positive",
        ));
    }
    if !settings.start_time.is_finite() || !settings.stop_time.is_finite() {
        return Err(invalid(
            "settings.stop_time",
            settings.stop_time,
            "time range must be finite",
        ));
    }
    if settings.stop_time < settings.start_time {
        return Err(invalid(
            "settings.stop_time",
            settings.stop_time,
            "must not precede start_time",
        ));
    }
    if !(settings.newmark_beta > 0.0 && settings.newmark_beta <= 0.5) {
        return Err(invalid(
            "settings.newmark_beta",
            settings.newmark_beta,
            "must be in (0, 0.5]",
        ));
    }
    if !(settings.newmark_gamma >= 0.5 && settings.newmark_gamma <= 1.0) {
        return Err(invalid(
            "settings.newmark_gamma",
            settings.newmark_gamma,
            "must be in [0.5, 1]",
        ));
    }
    if !(settings.residual_tolerance > 0.0) {
        return Err(invalid(
            "settings.residual_tolerance",
            settings.residual_tolerance,
            "must be positive",
        ));
    }
    if !(settings.divergence_limit > 0.0) {
        return Err(invalid(
            "settings.divergence_limit",
            settings.divergence_limit,
            "must be positive",
        ));
    }
    Ok(())
}
