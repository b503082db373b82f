#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    LoadingModel,
    Initializing,
    Stepping,
    SavingResults,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct StepProgress {
    pub sim_time: f64,
    pub final_time: f64,
    pub fraction_complete: f64,
    pub step: usize,
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    pub stage: SessionStage,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
    pub step: Option<StepProgress>,
}

impl RunProgressEvent {
    pub fn stage(stage: SessionStage, elapsed_wall_s: f64, message: Option<String>) -> Self {
        Self {
            stage,
            elapsed_wall_s,
            message,
            step: None,
        }
    }
}
