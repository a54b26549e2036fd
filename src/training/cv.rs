//! K-fold cross-validation.
//!
//! [`CrossValidator`] splits a labeled [`Dataset`] into `n_folds` groups,
//! trains one [`Booster`] per fold in lockstep, and aggregates each metric
//! across folds every round into `<metric>-mean` / `<metric>-stdv` series.
//!
//! Folds are not stratified by label.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lgbm::data::Dataset;
//! use lgbm::params::Params;
//! use lgbm::testing::ScriptedEngine;
//! use lgbm::training::{cv, CvConfig};
//! use lgbm::EngineRef;
//!
//! let engine: EngineRef = Arc::new(ScriptedEngine::new());
//! let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
//! let label: Vec<f64> = (0..20).map(|i| (i % 4) as f64).collect();
//! let data = Dataset::from_rows(&engine, &rows, &label).unwrap();
//!
//! let config = CvConfig::builder().num_boost_round(10).n_folds(4).build().unwrap();
//! let result = cv(&Params::new().with("metric", "l2"), &data, config).unwrap();
//! assert_eq!(result.mean("l2").map(<[f64]>::len), Some(10));
//! ```

use std::collections::BTreeMap;

use bon::Builder;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::booster::Booster;
use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::params::Params;
use crate::utils::Parallelism;

use super::callback::{BestIteration, EarlyStopMonitor};
use super::eval::EvaluationRecord;
use super::logger::{LogSink, TrainingLogger, VerboseEval, cv_clause, format_line};
use super::metrics::direction_of;

/// Dataset label of the aggregated metrics.
pub const CV_AGG_NAME: &str = "cv_agg";

/// Name each fold gives its validation set.
const FOLD_VALID_NAME: &str = "valid";

// =============================================================================
// CvConfig
// =============================================================================

/// Settings for [`CrossValidator`].
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct CvConfig {
    /// Maximum boosting rounds. Default: 100.
    #[builder(default = 100)]
    pub num_boost_round: usize,

    /// Number of folds. Default: 5.
    #[builder(default = 5)]
    pub n_folds: usize,

    /// Shuffle rows before splitting. Default: true.
    #[builder(default = true)]
    pub shuffle: bool,

    /// Seed for the shuffle. Default: 0.
    #[builder(default)]
    pub seed: u64,

    /// Stop when the mean of a metric has not improved for this many rounds.
    pub early_stopping_rounds: Option<usize>,

    /// Metric line period. Default: silent.
    #[builder(default = VerboseEval::Silent, into)]
    pub verbose_eval: VerboseEval,

    /// Print `+ <stdv>` after each mean. Default: true.
    #[builder(default = true)]
    pub show_stdv: bool,

    /// Only the first metric can trigger a stop.
    #[builder(default)]
    pub first_metric_only: bool,

    /// Run the folds of one round on rayon. Default: sequential.
    #[builder(default)]
    pub parallelism: Parallelism,

    #[builder(default)]
    pub sink: LogSink,
}

impl<S: cv_config_builder::IsComplete> CvConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<CvConfig> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl CvConfig {
    fn validate(&self) -> Result<()> {
        if self.n_folds < 2 {
            return Err(Error::config(format!(
                "n_folds must be at least 2, got {}",
                self.n_folds
            )));
        }
        if self.num_boost_round == 0 {
            return Err(Error::config("num_boost_round must be at least 1"));
        }
        if self.early_stopping_rounds == Some(0) {
            return Err(Error::config("early_stopping_rounds must be at least 1"));
        }
        Ok(())
    }
}

impl Default for CvConfig {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

// =============================================================================
// Fold partition
// =============================================================================

/// Split `0..n_rows` into `n_folds` validation groups.
///
/// Groups are contiguous runs of the (optionally shuffled) index order, with
/// sizes differing by at most one; the larger groups come first. Together
/// they cover every row exactly once.
pub fn fold_groups(n_rows: usize, n_folds: usize, shuffle: bool, seed: u64) -> Result<Vec<Vec<usize>>> {
    if n_folds < 2 {
        return Err(Error::config(format!("n_folds must be at least 2, got {n_folds}")));
    }
    if n_rows < n_folds {
        return Err(Error::validation(format!(
            "cannot split {n_rows} rows into {n_folds} folds"
        )));
    }

    let mut order: Vec<usize> = (0..n_rows).collect();
    if shuffle {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        order.shuffle(&mut rng);
    }

    let base = n_rows / n_folds;
    let extra = n_rows % n_folds;
    let mut groups = Vec::with_capacity(n_folds);
    let mut start = 0;
    for k in 0..n_folds {
        let size = base + usize::from(k < extra);
        groups.push(order[start..start + size].to_vec());
        start += size;
    }
    Ok(groups)
}

// =============================================================================
// CvResult
// =============================================================================

/// Aggregated cross-validation metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    /// `<metric>-mean` and `<metric>-stdv`, one point per kept iteration.
    series: BTreeMap<String, Vec<f64>>,
    best_iteration: Option<usize>,
}

impl CvResult {
    /// Series by full key, e.g. `"l2-mean"`.
    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.series.get(key).map(Vec::as_slice)
    }

    pub fn mean(&self, metric: &str) -> Option<&[f64]> {
        self.get(&format!("{metric}-mean"))
    }

    pub fn stdv(&self, metric: &str) -> Option<&[f64]> {
        self.get(&format!("{metric}-stdv"))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.series
    }

    /// Number of iterations kept.
    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iteration chosen by early stopping, if it was configured.
    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    fn push(&mut self, metric: &str, mean: f64, stdv: f64) {
        self.series
            .entry(format!("{metric}-mean"))
            .or_default()
            .push(mean);
        self.series
            .entry(format!("{metric}-stdv"))
            .or_default()
            .push(stdv);
    }

    fn truncate(&mut self, len: usize) {
        for values in self.series.values_mut() {
            values.truncate(len);
        }
    }
}

/// Arithmetic mean and population standard deviation.
pub fn mean_stdv(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

// =============================================================================
// CrossValidator
// =============================================================================

/// One fold's model and data. The booster is declared first so it is
/// dropped before the datasets it was built from.
struct Fold {
    booster: Booster,
    valid: Dataset,
    train: Dataset,
}

struct FoldStep {
    finished: bool,
    records: Vec<EvaluationRecord>,
}

impl Fold {
    fn step(&mut self) -> Result<FoldStep> {
        let finished = self.booster.update()?;
        let records = self.booster.eval_valid()?;
        Ok(FoldStep { finished, records })
    }

    fn release(mut self) -> Result<()> {
        self.booster.release()?;
        self.valid.release()?;
        self.train.release()
    }
}

/// Runs k-fold cross-validation.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    params: Params,
    config: CvConfig,
}

impl CrossValidator {
    pub fn new(params: Params, config: CvConfig) -> Self {
        Self { params, config }
    }

    pub fn config(&self) -> &CvConfig {
        &self.config
    }

    fn build_folds(&self, data: &Dataset) -> Result<Vec<Fold>> {
        let groups = fold_groups(
            data.n_rows(),
            self.config.n_folds,
            self.config.shuffle,
            self.config.seed,
        )?;

        let mut folds = Vec::with_capacity(groups.len());
        for (k, valid_rows) in groups.iter().enumerate() {
            let train_rows: Vec<usize> = groups
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != k)
                .flat_map(|(_, rows)| rows.iter().copied())
                .collect();
            let train = data.subset(&train_rows)?;
            let valid = data.subset(valid_rows)?;
            let mut booster = Booster::from_dataset(&train, &self.params)?;
            booster.add_valid(&valid, FOLD_VALID_NAME)?;
            tracing::debug!(
                fold = k,
                train_rows = train_rows.len(),
                valid_rows = valid_rows.len(),
                "built cross-validation fold"
            );
            folds.push(Fold {
                booster,
                valid,
                train,
            });
        }
        Ok(folds)
    }

    /// Cross-validate on `data`, which must carry labels.
    pub fn run(&self, data: &Dataset) -> Result<CvResult> {
        if data.label().is_none() {
            return Err(Error::validation("cross-validation requires a labeled dataset"));
        }
        // Reject bad parameters before any fold is built.
        self.params.to_param_string()?;

        let mut folds = self.build_folds(data)?;
        let logger = TrainingLogger::new(self.config.verbose_eval, self.config.sink.clone());
        let mut monitor = self
            .config
            .early_stopping_rounds
            .map(|rounds| EarlyStopMonitor::new(rounds, self.config.first_metric_only));
        let mut result = CvResult::default();
        let mut stopped: Option<BestIteration> = None;
        let mut rounds_run = 0;

        logger.start_training(self.config.early_stopping_rounds);

        for iteration in 1..=self.config.num_boost_round {
            let steps = self
                .config
                .parallelism
                .maybe_par_map(&mut folds, Fold::step)
                .into_iter()
                .collect::<Result<Vec<FoldStep>>>()?;
            if steps.iter().all(|step| step.finished) {
                tracing::debug!(iteration, "every fold reported training finished");
                break;
            }
            rounds_run = iteration;

            let aggregated = aggregate(&steps)?;
            let mut clauses = Vec::with_capacity(aggregated.len());
            let mut records = Vec::with_capacity(aggregated.len());
            for (metric, mean, stdv) in &aggregated {
                result.push(metric, *mean, *stdv);
                clauses.push(cv_clause(metric, *mean, self.config.show_stdv.then_some(*stdv)));
                records.push(EvaluationRecord {
                    iteration,
                    dataset: CV_AGG_NAME.to_string(),
                    metric: metric.clone(),
                    value: *mean,
                    direction: direction_of(metric),
                });
            }
            let line = format_line(iteration, &clauses);
            logger.log_metrics(iteration, &line);

            if let Some(monitor) = monitor.as_mut() {
                if let Some(best) = monitor.update(iteration, &records, &line) {
                    logger.log_early_stopping(&best.line);
                    stopped = Some(best);
                    break;
                }
            }
        }

        let best = match (stopped, &monitor) {
            (Some(best), _) => {
                result.truncate(best.iteration);
                Some(best)
            }
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
        result.best_iteration = best.map(|b| b.iteration).filter(|&i| i > 0);

        for fold in folds {
            fold.release()?;
        }
        tracing::debug!(rounds_run, best_iteration = ?result.best_iteration, "cross-validation finished");
        Ok(result)
    }
}

/// Per metric, in the order the first fold reports them: (name, mean, stdv).
fn aggregate(steps: &[FoldStep]) -> Result<Vec<(String, f64, f64)>> {
    let Some(first) = steps.first() else {
        return Ok(Vec::new());
    };
    first
        .records
        .iter()
        .map(|reference| {
            let values = steps
                .iter()
                .map(|step| {
                    step.records
                        .iter()
                        .find(|r| r.metric == reference.metric)
                        .map(|r| r.value)
                        .ok_or_else(|| Error::Engine {
                            message: format!("fold is missing metric {}", reference.metric),
                        })
                })
                .collect::<Result<Vec<f64>>>()?;
            let (mean, stdv) = mean_stdv(&values);
            Ok((reference.metric.clone(), mean, stdv))
        })
        .collect()
}

/// Cross-validate `data` with `config`; see [`CrossValidator::run`].
pub fn cv(params: &Params, data: &Dataset, config: CvConfig) -> Result<CvResult> {
    CrossValidator::new(params.clone(), config).run(data)
}
