//! argmin observer that reports optimization progress through `log`

use argmin::core::observers::Observe;
use argmin::core::{State, KV};
use log::{debug, log_enabled, Level};

/// Writes one table row per iteration at debug level, repeating the header every
/// `header_interval` iterations
pub struct LogObserver {
    header_interval: u64,
    last_header_iter: u64,
}

impl LogObserver {
    pub fn new() -> Self {
        Self::with_header_interval(100)
    }

    pub fn with_header_interval(header_interval: u64) -> Self {
        Self {
            header_interval,
            last_header_iter: 0,
        }
    }

    fn print_header(&self) {
        let separator = "=".repeat(92);
        debug!("{}", separator);
        debug!(
            "{:>12} | {:>14} | {:>16} | {:>16} | {:>16}",
            "Iteration", "Time (s)", "Objective", "Best Objective", "Obj. Evaluations"
        );
        debug!("{}", separator);
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Observe<I> for LogObserver
where
    I: State,
    <I as State>::Float: std::fmt::LowerExp,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), argmin::core::Error> {
        if !log_enabled!(Level::Debug) {
            return Ok(());
        }

        let iter = state.get_iter();
        if iter == 0 || iter - self.last_header_iter >= self.header_interval {
            self.print_header();
            self.last_header_iter = iter;
        }

        let time = state.get_time().map(|d| d.as_secs_f64()).unwrap_or(0.0);
        let evaluations = state
            .get_func_counts()
            .get("cost_count")
            .copied()
            .unwrap_or(0);

        debug!(
            "{:>12} | {:>14.6} | {:>16} | {:>16} | {:>16}",
            iter,
            time,
            format!("{:.6e}", state.get_cost()),
            format!("{:.6e}", state.get_best_cost()),
            evaluations,
        );
        Ok(())
    }
}
