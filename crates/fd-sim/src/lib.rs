//! Transient structural dynamics for fedyn models.
//!
//! Provides:
//! - External forcing function providers (trait + tabulated/closure sources)
//! - Lumped chain assembly of mass, damping and stiffness
//! - Implicit Newmark time step
//! - `TimeIntegrator`, the step-wise state machine driven by solver sessions

pub mod error;
pub mod forcing;
pub mod integrator;
pub mod newmark;
pub mod system;

// Re-exports for public API
pub use error::{SimError, SimResult, codes};
pub use forcing::{
    ExternalFunctionProvider, FnProvider, ForcingError, NoExternalFunctions, TabulatedFunctions,
};
pub use integrator::{InitialConditions, IntegratorPhase, SimulationState, TimeIntegrator};
pub use newmark::{Kinematics, Newmark};
pub use system::StructuralSystem;
