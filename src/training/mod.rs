//! Training loop, cross-validation and their supporting types.
//!
//! - [`Trainer`] / [`train`]: boost a model with per-round evaluation
//! - [`CrossValidator`] / [`cv`]: k-fold cross-validation in lockstep
//! - [`EarlyStopping`], [`EarlyStopMonitor`]: no-improvement stopping
//! - [`TrainingLogger`]: the console lines both loops print
//! - [`Metric`], [`Direction`]: metric names and which way is better

mod callback;
mod cv;
mod eval;
mod logger;
pub(crate) mod metrics;
mod trainer;

pub use callback::{BestIteration, EarlyStopAction, EarlyStopMonitor, EarlyStopping};
pub use cv::{CV_AGG_NAME, CrossValidator, CvConfig, CvResult, cv, fold_groups, mean_stdv};
pub use eval::{EvalHistory, EvalSet, EvaluationRecord, TRAINING_NAME};
pub use logger::{
    LogSink, TrainingLogger, VerboseEval, cv_clause, format_g, format_line, record_clause,
};
pub use metrics::{Direction, Metric, direction_of};
pub use trainer::{TrainConfig, TrainOutput, Trainer, train};
