//! Learning Rate Scheduler Module
//!
//! Epoch-level learning rate schedules. The run loop advances the schedule
//! once after every training epoch, so epoch `e` trains with `get_lr(e)`.

use serde::{Deserialize, Serialize};

/// Learning rate schedule as a function of the epoch index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LRScheduler {
    /// Constant learning rate (no scheduling)
    Constant { lr: f64 },

    /// Multiply the rate by `gamma` every `step_size` epochs
    StepLR {
        initial_lr: f64,
        gamma: f64,
        step_size: usize,
    },
}

impl LRScheduler {
    /// Create a constant learning rate scheduler
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    /// Create a step decay scheduler
    pub fn step_lr(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self::StepLR {
            initial_lr,
            gamma,
            step_size,
        }
    }

    /// Get the learning rate for a given epoch
    pub fn get_lr(&self, epoch: usize) -> f64 {
        match self {
            Self::Constant { lr } => *lr,
            Self::StepLR {
                initial_lr,
                gamma,
                step_size,
            } => {
                // step_size 0 would decay on every call; treat it as "never"
                if *step_size == 0 {
                    return *initial_lr;
                }
                initial_lr * gamma.powi((epoch / step_size) as i32)
            }
        }
    }

    /// Human-readable description for the run banner
    pub fn description(&self) -> String {
        match self {
            Self::Constant { lr } => format!("Constant (lr={})", lr),
            Self::StepLR {
                initial_lr,
                gamma,
                step_size,
            } => format!(
                "StepLR (lr={}, gamma={}, every {} epochs)",
                initial_lr, gamma, step_size
            ),
        }
    }
}

/// A schedule plus the number of completed epochs
#[derive(Debug, Clone)]
pub struct SchedulerState {
    schedule: LRScheduler,
    completed_epochs: usize,
}

impl SchedulerState {
    pub fn new(schedule: LRScheduler) -> Self {
        Self {
            schedule,
            completed_epochs: 0,
        }
    }

    /// Rate for the epoch about to be trained
    pub fn current_lr(&self) -> f64 {
        self.schedule.get_lr(self.completed_epochs)
    }

    /// Advance one epoch, returning the new rate
    pub fn step(&mut self) -> f64 {
        self.completed_epochs += 1;
        self.current_lr()
    }

    pub fn schedule(&self) -> &LRScheduler {
        &self.schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_scheduler() {
        let scheduler = LRScheduler::constant(0.001);
        assert_eq!(scheduler.get_lr(0), 0.001);
        assert_eq!(scheduler.get_lr(100), 0.001);
    }

    #[test]
    fn test_step_lr_halves_every_step_size() {
        let scheduler = LRScheduler::step_lr(1e-3, 20, 0.5);
        assert_eq!(scheduler.get_lr(0), 1e-3);
        assert_eq!(scheduler.get_lr(19), 1e-3);
        assert!((scheduler.get_lr(20) - 5e-4).abs() < 1e-12);
        assert!((scheduler.get_lr(45) - 2.5e-4).abs() < 1e-12);
    }

    #[test]
    fn test_step_lr_zero_step_size_is_constant() {
        let scheduler = LRScheduler::step_lr(0.1, 0, 0.5);
        assert_eq!(scheduler.get_lr(7), 0.1);
    }

    #[test]
    fn test_state_steps_after_each_epoch() {
        let mut state = SchedulerState::new(LRScheduler::step_lr(1.0, 2, 0.5));
        assert_eq!(state.current_lr(), 1.0);
        assert_eq!(state.step(), 1.0);
        assert_eq!(state.step(), 0.5);
        state.step();
        assert_eq!(state.step(), 0.25);
    }
}
