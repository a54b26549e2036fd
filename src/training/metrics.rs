//! Metric names and their comparison direction.
//!
//! The engine reports evaluation results by metric name only. Early
//! stopping needs to know whether a larger value is an improvement, so
//! every name is resolved through the fixed table in [`Metric::from_name`].
//! Both the trainer and the cross-validator consult this table.
//!
//! Unknown names resolve to [`Metric::Other`], which is treated as
//! lower-is-better unless the name starts with a ranking prefix.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Whether a larger metric value is an improvement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

impl Direction {
    /// Strict improvement of `value` over `best`.
    #[inline]
    pub fn improves(self, value: f64, best: f64) -> bool {
        match self {
            Direction::LowerIsBetter => value < best,
            Direction::HigherIsBetter => value > best,
        }
    }

    pub fn higher_is_better(self) -> bool {
        matches!(self, Direction::HigherIsBetter)
    }
}

/// An evaluation metric, keyed by the engine's canonical name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Mean absolute error (`l1`).
    L1,
    /// Mean squared error (`l2`).
    L2,
    Rmse,
    Quantile,
    Mape,
    Huber,
    Fair,
    Poisson,
    Gamma,
    GammaDeviance,
    Tweedie,
    BinaryLogloss,
    BinaryError,
    Auc,
    AveragePrecision,
    MultiLogloss,
    MultiError,
    AucMu,
    CrossEntropy,
    CrossEntropyLambda,
    KullbackLeibler,
    /// `ndcg@k`; `None` evaluates at every position the engine chooses.
    Ndcg(Option<u32>),
    /// `map@k`.
    Map(Option<u32>),
    /// Any name outside the table, kept verbatim.
    Other(String),
}

impl Metric {
    /// Resolve a metric name or alias.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if let Some(k) = lower.strip_prefix("ndcg@") {
            return Metric::Ndcg(k.parse().ok());
        }
        if let Some(k) = lower.strip_prefix("map@") {
            return Metric::Map(k.parse().ok());
        }
        match lower.as_str() {
            "l1" | "mae" | "mean_absolute_error" | "regression_l1" => Metric::L1,
            "l2" | "mse" | "mean_squared_error" | "regression" | "regression_l2" => Metric::L2,
            "rmse" | "root_mean_squared_error" | "l2_root" => Metric::Rmse,
            "quantile" => Metric::Quantile,
            "mape" | "mean_absolute_percentage_error" => Metric::Mape,
            "huber" => Metric::Huber,
            "fair" => Metric::Fair,
            "poisson" => Metric::Poisson,
            "gamma" => Metric::Gamma,
            "gamma_deviance" => Metric::GammaDeviance,
            "tweedie" => Metric::Tweedie,
            "binary_logloss" | "binary" => Metric::BinaryLogloss,
            "binary_error" => Metric::BinaryError,
            "auc" => Metric::Auc,
            "average_precision" => Metric::AveragePrecision,
            "multi_logloss" | "multiclass" | "softmax" | "multiclassova" | "multiclass_ova"
            | "ova" | "ovr" => Metric::MultiLogloss,
            "multi_error" => Metric::MultiError,
            "auc_mu" => Metric::AucMu,
            "cross_entropy" | "xentropy" => Metric::CrossEntropy,
            "cross_entropy_lambda" | "xentlambda" => Metric::CrossEntropyLambda,
            "kullback_leibler" | "kldiv" => Metric::KullbackLeibler,
            "ndcg" | "lambdarank" | "rank_xendcg" | "xendcg" | "xe_ndcg" | "xe_ndcg_mart"
            | "xendcg_mart" => Metric::Ndcg(None),
            "map" | "mean_average_precision" => Metric::Map(None),
            _ => Metric::Other(name.to_string()),
        }
    }

    /// Canonical name as the engine reports it.
    pub fn name(&self) -> String {
        match self {
            Metric::L1 => "l1".into(),
            Metric::L2 => "l2".into(),
            Metric::Rmse => "rmse".into(),
            Metric::Quantile => "quantile".into(),
            Metric::Mape => "mape".into(),
            Metric::Huber => "huber".into(),
            Metric::Fair => "fair".into(),
            Metric::Poisson => "poisson".into(),
            Metric::Gamma => "gamma".into(),
            Metric::GammaDeviance => "gamma_deviance".into(),
            Metric::Tweedie => "tweedie".into(),
            Metric::BinaryLogloss => "binary_logloss".into(),
            Metric::BinaryError => "binary_error".into(),
            Metric::Auc => "auc".into(),
            Metric::AveragePrecision => "average_precision".into(),
            Metric::MultiLogloss => "multi_logloss".into(),
            Metric::MultiError => "multi_error".into(),
            Metric::AucMu => "auc_mu".into(),
            Metric::CrossEntropy => "cross_entropy".into(),
            Metric::CrossEntropyLambda => "cross_entropy_lambda".into(),
            Metric::KullbackLeibler => "kullback_leibler".into(),
            Metric::Ndcg(None) => "ndcg".into(),
            Metric::Ndcg(Some(k)) => format!("ndcg@{k}"),
            Metric::Map(None) => "map".into(),
            Metric::Map(Some(k)) => format!("map@{k}"),
            Metric::Other(name) => name.clone(),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Metric::Auc
            | Metric::AveragePrecision
            | Metric::AucMu
            | Metric::Ndcg(_)
            | Metric::Map(_) => Direction::HigherIsBetter,
            Metric::Other(name) => direction_for_unknown(name),
            _ => Direction::LowerIsBetter,
        }
    }

    pub fn higher_is_better(&self) -> bool {
        self.direction().higher_is_better()
    }
}

fn direction_for_unknown(name: &str) -> Direction {
    const HIGHER: [&str; 4] = ["auc", "ndcg@", "map@", "average_precision"];
    if HIGHER.iter().any(|prefix| name.starts_with(prefix)) {
        Direction::HigherIsBetter
    } else {
        Direction::LowerIsBetter
    }
}

/// Direction for a metric name reported by the engine.
pub fn direction_of(name: &str) -> Direction {
    Metric::from_name(name).direction()
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Metric {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Metric::from_name(s))
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Metric::from_name(&name))
    }
}
