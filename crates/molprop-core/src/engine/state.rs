use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Trainer life-cycle: `Initialized` until `fit` begins, `Training` while
/// epochs run, then exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerPhase {
    Initialized,
    Training,
    /// The convergence policy reported a plateau.
    Converged,
    /// Cancellation, wall-clock budget, or epoch budget ended the run
    /// before convergence.
    Stopped,
    /// The run aborted with an error; parameters are from the last
    /// completed step.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub mean_nll: f64,
}

/// Summary of a completed (or terminated) training run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub phase: TrainerPhase,
    pub epochs_completed: usize,
    pub history: Vec<EpochRecord>,
    /// Learning rate at the end of the run; differs from the configured one
    /// when instability backoff fired.
    pub final_learning_rate: f64,
}

impl FitReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.history.last().map(|r| r.mean_nll)
    }
}

/// Cooperative cancellation flag shared between a training loop and its
/// controller. Checked at step boundaries only; an in-flight
/// forward/backward pass is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
