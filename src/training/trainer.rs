//! Boosting loop with evaluation and early stopping.
//!
//! Use [`Trainer::train`] (or the [`train`] shorthand) to run up to
//! `num_boost_round` rounds over a training [`Dataset`], evaluating every
//! listed [`EvalSet`] after each round.

use bon::Builder;

use crate::booster::Booster;
use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::params::Params;

use super::callback::{BestIteration, EarlyStopMonitor};
use super::eval::{EvalHistory, EvalSet};
use super::logger::{LogSink, TrainingLogger, VerboseEval, format_line, record_clause};

// =============================================================================
// TrainConfig
// =============================================================================

/// Loop settings for [`Trainer`].
///
/// # Example
///
/// ```
/// use lgbm::training::TrainConfig;
///
/// let config = TrainConfig::builder()
///     .num_boost_round(200)
///     .early_stopping_rounds(10)
///     .verbose_eval(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.num_boost_round, 200);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct TrainConfig {
    /// Maximum boosting rounds. Default: 100.
    #[builder(default = 100)]
    pub num_boost_round: usize,

    /// Stop when a validation metric has not improved for this many rounds.
    /// `None` disables early stopping.
    pub early_stopping_rounds: Option<usize>,

    /// Metric line period. Default: every round.
    #[builder(default, into)]
    pub verbose_eval: VerboseEval,

    /// Only the first metric of each validation set can trigger a stop.
    #[builder(default)]
    pub first_metric_only: bool,

    #[builder(default)]
    pub sink: LogSink,
}

impl<S: train_config_builder::IsComplete> TrainConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] when `num_boost_round == 0` or
    /// `early_stopping_rounds == Some(0)`.
    pub fn build(self) -> Result<TrainConfig> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl TrainConfig {
    fn validate(&self) -> Result<()> {
        if self.num_boost_round == 0 {
            return Err(Error::config("num_boost_round must be at least 1"));
        }
        if self.early_stopping_rounds == Some(0) {
            return Err(Error::config("early_stopping_rounds must be at least 1"));
        }
        Ok(())
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Trainer
// =============================================================================

/// A trained booster and the metrics recorded while training it.
#[derive(Debug)]
pub struct TrainOutput {
    /// The model; its best iteration is set when early stopping was on.
    pub booster: Booster,
    pub history: EvalHistory,
}

/// Drives the boosting loop.
///
/// Every round:
/// 1. advance the booster one round; stop if the engine reports it finished
/// 2. evaluate the training data (when listed) and each validation set
/// 3. print the metric line on the verbose period
/// 4. update early stopping over the validation records only
#[derive(Debug, Clone)]
pub struct Trainer {
    params: Params,
    config: TrainConfig,
}

impl Trainer {
    pub fn new(params: Params, config: TrainConfig) -> Self {
        Self { params, config }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train on `train`, evaluating `eval_sets` every round.
    ///
    /// An entry of `eval_sets` that is `train` itself reports training
    /// metrics; every other entry becomes validation data named
    /// `valid_<position>` unless it carries a name.
    pub fn train(&self, train: &Dataset, eval_sets: &[EvalSet<'_>]) -> Result<TrainOutput> {
        let n_valid = eval_sets.iter().filter(|set| !set.is(train)).count();
        if self.config.early_stopping_rounds.is_some() && n_valid == 0 {
            return Err(Error::config(
                "early stopping requires at least one validation set",
            ));
        }

        let mut booster = Booster::from_dataset(train, &self.params)?;
        let mut train_label = None;
        for (position, set) in eval_sets.iter().enumerate() {
            if set.is(train) {
                train_label = Some(set.label(position, true));
            } else {
                booster.add_valid(set.dataset, set.label(position, false))?;
            }
        }

        let logger = TrainingLogger::new(self.config.verbose_eval, self.config.sink.clone());
        let mut monitor = self
            .config
            .early_stopping_rounds
            .map(|rounds| EarlyStopMonitor::new(rounds, self.config.first_metric_only));
        let mut history = EvalHistory::new();
        let mut stopped: Option<BestIteration> = None;
        let mut rounds_run = 0;

        logger.start_training(self.config.early_stopping_rounds);

        for iteration in 1..=self.config.num_boost_round {
            if booster.update()? {
                tracing::debug!(iteration, "engine reported training finished");
                break;
            }
            rounds_run = iteration;

            let mut records = match &train_label {
                Some(label) => booster.eval_slot(0, label)?,
                None => Vec::new(),
            };
            let valid_records = booster.eval_valid()?;
            records.extend(valid_records.iter().cloned());
            history.extend(&records);

            let clauses: Vec<String> = records.iter().map(record_clause).collect();
            let line = format_line(iteration, &clauses);
            logger.log_metrics(iteration, &line);

            if let Some(monitor) = monitor.as_mut() {
                if let Some(best) = monitor.update(iteration, &valid_records, &line) {
                    logger.log_early_stopping(&best.line);
                    stopped = Some(best);
                    break;
                }
            }
        }

        let best = match (stopped, &monitor) {
            (Some(best), _) => Some(best),
            (None, Some(monitor)) => {
                let best = monitor.first_best();
                if rounds_run == self.config.num_boost_round {
                    if let Some(best) = &best {
                        logger.finish_training(&best.line);
                    }
                }
                best
            }
            (None, None) => None,
        };
        let best_iteration = best.map(|b| b.iteration).filter(|&i| i > 0);
        booster.set_best_iteration(best_iteration);

        tracing::debug!(rounds_run, ?best_iteration, "training finished");
        Ok(TrainOutput { booster, history })
    }
}

/// Train a booster with `config`; see [`Trainer::train`].
pub fn train(
    params: &Params,
    train: &Dataset,
    eval_sets: &[EvalSet<'_>],
    config: TrainConfig,
) -> Result<Booster> {
    Trainer::new(params.clone(), config)
        .train(train, eval_sets)
        .map(|output| output.booster)
}
