//! Early stopping for training and cross-validation.
//!
//! [`EarlyStopping`] tracks one metric series. [`EarlyStopMonitor`] keeps one
//! [`EarlyStopping`] per (dataset, metric) key and stops the loop as soon as
//! any key has gone `patience` rounds without a strict improvement.

use super::eval::EvaluationRecord;
use super::metrics::Direction;

// =============================================================================
// EarlyStopping
// =============================================================================

/// What the loop should do after an early-stopping update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyStopAction {
    /// The value strictly improved on the best so far.
    Improved,
    /// No improvement, patience not exhausted.
    Continue,
    /// No improvement for `patience` rounds.
    Stop,
}

/// Early stopping state for one metric series.
///
/// Rounds are the 1-based iteration numbers passed to [`update`](Self::update).
/// The best round only moves on a strict improvement under the metric
/// direction; the series stops once `round - best_round >= patience`.
///
/// # Example
///
/// ```
/// use lgbm::training::{Direction, EarlyStopAction, EarlyStopping};
///
/// let mut early_stop = EarlyStopping::new(2, Direction::LowerIsBetter);
/// assert_eq!(early_stop.update(1, 0.5), EarlyStopAction::Improved);
/// assert_eq!(early_stop.update(2, 0.6), EarlyStopAction::Continue);
/// assert_eq!(early_stop.update(3, 0.7), EarlyStopAction::Stop);
/// assert_eq!(early_stop.best_round(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    /// Rounds without improvement before stopping. Zero disables stopping.
    patience: usize,
    direction: Direction,
    best_value: Option<f64>,
    best_round: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, direction: Direction) -> Self {
        Self {
            patience,
            direction,
            best_value: None,
            best_round: 0,
        }
    }

    /// Whether stopping can trigger at all.
    pub fn is_enabled(&self) -> bool {
        self.patience > 0
    }

    /// Record the value observed at `round`.
    pub fn update(&mut self, round: usize, value: f64) -> EarlyStopAction {
        let improved = match self.best_value {
            None => !value.is_nan(),
            Some(best) => self.direction.improves(value, best),
        };
        if improved {
            self.best_value = Some(value);
            self.best_round = round;
            return EarlyStopAction::Improved;
        }
        if self.is_enabled() && round.saturating_sub(self.best_round) >= self.patience {
            EarlyStopAction::Stop
        } else {
            EarlyStopAction::Continue
        }
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    /// Round of the best value, 0 before any value was recorded.
    pub fn best_round(&self) -> usize {
        self.best_round
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

// =============================================================================
// EarlyStopMonitor
// =============================================================================

/// The outcome of a stopping decision.
#[derive(Debug, Clone, PartialEq)]
pub struct BestIteration {
    /// 1-based iteration of the best score.
    pub iteration: usize,
    /// The console line logged at that iteration.
    pub line: String,
}

#[derive(Debug, Clone)]
struct KeyState {
    dataset: String,
    metric: String,
    stopping: EarlyStopping,
    best_line: String,
}

/// Early stopping over every monitored (dataset, metric) key.
///
/// Keys are discovered from the first batch of records passed to
/// [`update`](Self::update) and kept in that order.
#[derive(Debug, Clone)]
pub struct EarlyStopMonitor {
    patience: usize,
    first_metric_only: bool,
    keys: Vec<KeyState>,
}

impl EarlyStopMonitor {
    pub fn new(patience: usize, first_metric_only: bool) -> Self {
        Self {
            patience,
            first_metric_only,
            keys: Vec::new(),
        }
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    fn init_keys(&mut self, records: &[EvaluationRecord]) {
        let first_metric = records.first().map(|r| r.metric.clone());
        self.keys = records
            .iter()
            .filter(|r| !self.first_metric_only || Some(&r.metric) == first_metric.as_ref())
            .map(|r| KeyState {
                dataset: r.dataset.clone(),
                metric: r.metric.clone(),
                stopping: EarlyStopping::new(self.patience, r.direction),
                best_line: String::new(),
            })
            .collect();
    }

    /// Feed one iteration's monitored records and the line logged for it.
    ///
    /// Returns the best iteration of the first key that ran out of patience.
    pub fn update(
        &mut self,
        iteration: usize,
        records: &[EvaluationRecord],
        line: &str,
    ) -> Option<BestIteration> {
        if self.keys.is_empty() {
            self.init_keys(records);
        }
        for key in &mut self.keys {
            let Some(record) = records
                .iter()
                .find(|r| r.dataset == key.dataset && r.metric == key.metric)
            else {
                continue;
            };
            match key.stopping.update(iteration, record.value) {
                EarlyStopAction::Improved => key.best_line = line.to_string(),
                EarlyStopAction::Stop => {
                    tracing::debug!(
                        dataset = %key.dataset,
                        metric = %key.metric,
                        best = key.stopping.best_round(),
                        "early stopping triggered"
                    );
                    return Some(BestIteration {
                        iteration: key.stopping.best_round(),
                        line: key.best_line.clone(),
                    });
                }
                EarlyStopAction::Continue => {}
            }
        }
        None
    }

    /// Best iteration of the first monitored key, used when rounds run out.
    pub fn first_best(&self) -> Option<BestIteration> {
        self.keys.first().map(|key| BestIteration {
            iteration: key.stopping.best_round(),
            line: key.best_line.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::metrics::direction_of;

    fn record(dataset: &str, metric: &str, value: f64) -> EvaluationRecord {
        EvaluationRecord {
            iteration: 0,
            dataset: dataset.into(),
            metric: metric.into(),
            value,
            direction: direction_of(metric),
        }
    }

    #[test]
    fn no_stop_while_improving() {
        let mut early_stop = EarlyStopping::new(3, Direction::LowerIsBetter);
        for (round, value) in [1.0, 0.9, 0.8, 0.7, 0.6].into_iter().enumerate() {
            assert_eq!(early_stop.update(round + 1, value), EarlyStopAction::Improved);
        }
        assert_eq!(early_stop.best_round(), 5);
        assert!((early_stop.best_value().unwrap() - 0.6).abs() < 1e-10);
    }

    #[test]
    fn stops_after_patience() {
        let mut early_stop = EarlyStopping::new(3, Direction::LowerIsBetter);
        assert_eq!(early_stop.update(1, 0.5), EarlyStopAction::Improved);
        assert_eq!(early_stop.update(2, 0.6), EarlyStopAction::Continue);
        assert_eq!(early_stop.update(3, 0.7), EarlyStopAction::Continue);
        assert_eq!(early_stop.update(4, 0.8), EarlyStopAction::Stop);
        assert_eq!(early_stop.best_round(), 1);
    }

    #[test]
    fn ties_do_not_improve() {
        let mut early_stop = EarlyStopping::new(2, Direction::LowerIsBetter);
        early_stop.update(1, 0.5);
        assert_eq!(early_stop.update(2, 0.5), EarlyStopAction::Continue);
        assert_eq!(early_stop.update(3, 0.5), EarlyStopAction::Stop);
        assert_eq!(early_stop.best_round(), 1);
    }

    #[test]
    fn improvement_resets_counter() {
        let mut early_stop = EarlyStopping::new(3, Direction::LowerIsBetter);
        early_stop.update(1, 1.0);
        early_stop.update(2, 1.1);
        early_stop.update(3, 1.2);
        assert_eq!(early_stop.update(4, 0.9), EarlyStopAction::Improved);
        assert_eq!(early_stop.update(5, 1.0), EarlyStopAction::Continue);
        assert_eq!(early_stop.update(6, 1.1), EarlyStopAction::Continue);
        assert_eq!(early_stop.update(7, 1.2), EarlyStopAction::Stop);
        assert_eq!(early_stop.best_round(), 4);
    }

    #[test]
    fn higher_is_better() {
        let mut early_stop = EarlyStopping::new(2, Direction::HigherIsBetter);
        early_stop.update(1, 0.8);
        assert_eq!(early_stop.update(2, 0.9), EarlyStopAction::Improved);
        assert_eq!(early_stop.update(3, 0.85), EarlyStopAction::Continue);
        assert_eq!(early_stop.update(4, 0.85), EarlyStopAction::Stop);
        assert_eq!(early_stop.best_round(), 2);
    }

    #[test]
    fn zero_patience_never_stops() {
        let mut early_stop = EarlyStopping::new(0, Direction::LowerIsBetter);
        assert!(!early_stop.is_enabled());
        early_stop.update(1, 0.1);
        for round in 2..50 {
            assert_eq!(early_stop.update(round, 1.0), EarlyStopAction::Continue);
        }
    }

    #[test]
    fn monitor_stops_on_first_exhausted_key() {
        let mut monitor = EarlyStopMonitor::new(2, false);
        // valid_0 l2 keeps improving; valid_0 auc peaks at iteration 1.
        let rounds = [(0.5, 0.70), (0.4, 0.69), (0.3, 0.68)];
        let mut stopped = None;
        for (i, (l2, auc)) in rounds.into_iter().enumerate() {
            let records = [record("valid_0", "l2", l2), record("valid_0", "auc", auc)];
            stopped = monitor.update(i + 1, &records, &format!("line {}", i + 1));
            if stopped.is_some() {
                break;
            }
        }
        assert_eq!(
            stopped,
            Some(BestIteration {
                iteration: 1,
                line: "line 1".into()
            })
        );
    }

    #[test]
    fn first_metric_only_ignores_later_metrics() {
        let mut monitor = EarlyStopMonitor::new(2, true);
        let rounds = [(0.5, 0.70), (0.4, 0.69), (0.3, 0.68)];
        for (i, (l2, auc)) in rounds.into_iter().enumerate() {
            let records = [record("valid_0", "l2", l2), record("valid_0", "auc", auc)];
            assert!(monitor.update(i + 1, &records, "").is_none());
        }
        assert_eq!(monitor.first_best().map(|b| b.iteration), Some(3));
    }
}
