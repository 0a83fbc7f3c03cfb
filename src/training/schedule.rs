use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    #[default]
    Constant,
    Linear,
}

/// A hyperparameter as a function of `progress_remaining`, which goes from 1
/// at the start of training to 0 at the end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schedule {
    Constant(f64),
    Linear { start: f64, end: f64 },
}

impl Schedule {
    pub fn new(kind: ScheduleKind, start: f64, end: f64) -> Self {
        match kind {
            ScheduleKind::Constant => Schedule::Constant(start),
            ScheduleKind::Linear => Schedule::Linear { start, end },
        }
    }

    pub fn value(&self, progress_remaining: f64) -> f64 {
        match *self {
            Schedule::Constant(v) => v,
            Schedule::Linear { start, end } => {
                let p = progress_remaining.clamp(0.0, 1.0);
                end + (start - end) * p
            }
        }
    }
}

/// `1 - num_timesteps / total_timesteps`, clamped to [0, 1].
pub fn progress_remaining(num_timesteps: u64, total_timesteps: u64) -> f64 {
    if total_timesteps == 0 {
        return 0.0;
    }
    (1.0 - num_timesteps as f64 / total_timesteps as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_schedule() {
        let s = Schedule::new(ScheduleKind::Constant, 3e-4, 0.0);
        assert_eq!(s.value(1.0), 3e-4);
        assert_eq!(s.value(0.0), 3e-4);
    }

    #[test]
    fn test_linear_schedule_interpolates() {
        let s = Schedule::new(ScheduleKind::Linear, 1.0, 0.0);
        assert!((s.value(1.0) - 1.0).abs() < 1e-12);
        assert!((s.value(0.25) - 0.25).abs() < 1e-12);
        assert!((s.value(0.0)).abs() < 1e-12);
        // clamped outside [0, 1]
        assert!((s.value(-1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_progress_remaining() {
        assert_eq!(progress_remaining(0, 100), 1.0);
        assert!((progress_remaining(25, 100) - 0.75).abs() < 1e-12);
        assert_eq!(progress_remaining(150, 100), 0.0);
        assert_eq!(progress_remaining(0, 0), 0.0);
    }
}
