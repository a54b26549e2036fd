//! Engine parameters and their string encoding.
//!
//! The engine takes its configuration as one `key=value key=value ...`
//! string. [`Params`] covers the commonly used keys with typed fields and
//! keeps everything else in an ordered free-form map. [`Params::to_param_string`]
//! rejects any key or value containing whitespace, since whitespace is the
//! pair delimiter and would let a value smuggle in extra keys.
//!
//! # Example
//!
//! ```
//! use lgbm::params::{Objective, Params};
//! use lgbm::training::Metric;
//!
//! let params = Params::builder()
//!     .objective(Objective::Regression)
//!     .metric(vec![Metric::L2])
//!     .learning_rate(0.05)
//!     .build()
//!     .with("min_data_in_bin", 3);
//!
//! assert_eq!(
//!     params.to_param_string().unwrap(),
//!     "objective=regression metric=l2 learning_rate=0.05 verbosity=-1 min_data_in_bin=3"
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::training::Metric;

// =============================================================================
// Objective
// =============================================================================

/// Training objective, keyed by the engine's canonical name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Objective {
    Regression,
    RegressionL1,
    Huber,
    Fair,
    Poisson,
    Quantile,
    Mape,
    Gamma,
    Tweedie,
    Binary,
    Multiclass,
    MulticlassOva,
    CrossEntropy,
    CrossEntropyLambda,
    LambdaRank,
    RankXendcg,
    /// Any name outside the table, passed through verbatim.
    Other(String),
}

impl Objective {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "regression" | "regression_l2" | "l2" | "mean_squared_error" | "mse" | "l2_root"
            | "root_mean_squared_error" | "rmse" => Objective::Regression,
            "regression_l1" | "l1" | "mean_absolute_error" | "mae" => Objective::RegressionL1,
            "huber" => Objective::Huber,
            "fair" => Objective::Fair,
            "poisson" => Objective::Poisson,
            "quantile" => Objective::Quantile,
            "mape" | "mean_absolute_percentage_error" => Objective::Mape,
            "gamma" => Objective::Gamma,
            "tweedie" => Objective::Tweedie,
            "binary" => Objective::Binary,
            "multiclass" | "softmax" => Objective::Multiclass,
            "multiclassova" | "multiclass_ova" | "ova" | "ovr" => Objective::MulticlassOva,
            "cross_entropy" | "xentropy" => Objective::CrossEntropy,
            "cross_entropy_lambda" | "xentlambda" => Objective::CrossEntropyLambda,
            "lambdarank" => Objective::LambdaRank,
            "rank_xendcg" | "xendcg" | "xe_ndcg" | "xe_ndcg_mart" | "xendcg_mart" => {
                Objective::RankXendcg
            }
            _ => Objective::Other(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Objective::Regression => "regression",
            Objective::RegressionL1 => "regression_l1",
            Objective::Huber => "huber",
            Objective::Fair => "fair",
            Objective::Poisson => "poisson",
            Objective::Quantile => "quantile",
            Objective::Mape => "mape",
            Objective::Gamma => "gamma",
            Objective::Tweedie => "tweedie",
            Objective::Binary => "binary",
            Objective::Multiclass => "multiclass",
            Objective::MulticlassOva => "multiclassova",
            Objective::CrossEntropy => "cross_entropy",
            Objective::CrossEntropyLambda => "cross_entropy_lambda",
            Objective::LambdaRank => "lambdarank",
            Objective::RankXendcg => "rank_xendcg",
            Objective::Other(name) => name,
        }
    }

    /// Whether the objective produces one output per class.
    pub fn is_multiclass(&self) -> bool {
        matches!(self, Objective::Multiclass | Objective::MulticlassOva)
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Objective {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Objective::from_name(s))
    }
}

impl Serialize for Objective {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Objective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Objective::from_name(&name))
    }
}

// =============================================================================
// Params
// =============================================================================

/// Engine parameters.
///
/// Typed fields cover the recognized keys; [`Params::with`] adds any other
/// key. `verbosity` defaults to `-1` so the engine stays quiet unless asked.
#[derive(Clone, Debug, Default, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub objective: Option<Objective>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub metric: Vec<Metric>,
    pub num_class: Option<u32>,
    pub learning_rate: Option<f64>,
    pub num_leaves: Option<u32>,
    pub max_depth: Option<i32>,
    pub min_data_in_leaf: Option<u32>,
    pub feature_fraction: Option<f64>,
    pub bagging_fraction: Option<f64>,
    pub bagging_freq: Option<u32>,
    pub lambda_l1: Option<f64>,
    pub lambda_l2: Option<f64>,
    pub seed: Option<u64>,
    pub num_threads: Option<u32>,
    pub verbosity: Option<i32>,
    /// Free-form keys, emitted after the typed ones in key order.
    #[serde(flatten)]
    #[builder(default)]
    pub extra: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an arbitrary key/value mapping.
    ///
    /// Recognized keys land in their typed field when the value parses;
    /// everything else is kept verbatim in `extra`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        pairs
            .into_iter()
            .fold(Params::default(), |params, (k, v)| params.with(k, v))
    }

    /// Set one parameter by name.
    pub fn with(mut self, key: impl ToString, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Set one parameter by name in place.
    ///
    /// A key or value containing whitespace is kept verbatim in `extra`
    /// so that [`Params::to_param_string`] rejects it.
    pub fn set(&mut self, key: impl ToString, value: impl ToString) {
        let key = key.to_string();
        let value = value.to_string();
        if check_param(&key, &value).is_err() || !self.set_known(&key, &value) {
            self.extra.insert(key, value);
        }
    }

    fn set_known(&mut self, key: &str, value: &str) -> bool {
        fn parsed<T: FromStr>(slot: &mut Option<T>, value: &str) -> bool {
            match value.parse() {
                Ok(v) => {
                    *slot = Some(v);
                    true
                }
                Err(_) => false,
            }
        }

        match key {
            "objective" => {
                self.objective = Some(Objective::from_name(value));
                true
            }
            "metric" => {
                self.metric = value
                    .split(',')
                    .filter(|m| !m.is_empty())
                    .map(Metric::from_name)
                    .collect();
                true
            }
            "num_class" => parsed(&mut self.num_class, value),
            "learning_rate" => parsed(&mut self.learning_rate, value),
            "num_leaves" => parsed(&mut self.num_leaves, value),
            "max_depth" => parsed(&mut self.max_depth, value),
            "min_data_in_leaf" => parsed(&mut self.min_data_in_leaf, value),
            "feature_fraction" => parsed(&mut self.feature_fraction, value),
            "bagging_fraction" => parsed(&mut self.bagging_fraction, value),
            "bagging_freq" => parsed(&mut self.bagging_freq, value),
            "lambda_l1" => parsed(&mut self.lambda_l1, value),
            "lambda_l2" => parsed(&mut self.lambda_l2, value),
            "seed" => parsed(&mut self.seed, value),
            "num_threads" => parsed(&mut self.num_threads, value),
            "verbosity" => parsed(&mut self.verbosity, value),
            _ => false,
        }
    }

    /// Number of outputs per row the configured objective produces.
    pub fn n_outputs(&self) -> usize {
        match (&self.objective, self.num_class) {
            (Some(obj), Some(k)) if obj.is_multiclass() => k.max(1) as usize,
            _ => 1,
        }
    }

    /// Whether the caller set the engine verbosity explicitly.
    pub fn has_verbosity(&self) -> bool {
        self.verbosity.is_some() || self.extra.contains_key("verbose")
    }

    /// Ordered `(key, value)` pairs as they will be sent to the engine.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut push = |k: &str, v: String| pairs.push((k.to_string(), v));

        if let Some(objective) = &self.objective {
            push("objective", objective.name().to_string());
        }
        if !self.metric.is_empty() {
            let names: Vec<String> = self.metric.iter().map(Metric::name).collect();
            push("metric", names.join(","));
        }
        if let Some(v) = self.num_class {
            push("num_class", v.to_string());
        }
        if let Some(v) = self.learning_rate {
            push("learning_rate", v.to_string());
        }
        if let Some(v) = self.num_leaves {
            push("num_leaves", v.to_string());
        }
        if let Some(v) = self.max_depth {
            push("max_depth", v.to_string());
        }
        if let Some(v) = self.min_data_in_leaf {
            push("min_data_in_leaf", v.to_string());
        }
        if let Some(v) = self.feature_fraction {
            push("feature_fraction", v.to_string());
        }
        if let Some(v) = self.bagging_fraction {
            push("bagging_fraction", v.to_string());
        }
        if let Some(v) = self.bagging_freq {
            push("bagging_freq", v.to_string());
        }
        if let Some(v) = self.lambda_l1 {
            push("lambda_l1", v.to_string());
        }
        if let Some(v) = self.lambda_l2 {
            push("lambda_l2", v.to_string());
        }
        if let Some(v) = self.seed {
            push("seed", v.to_string());
        }
        if let Some(v) = self.num_threads {
            push("num_threads", v.to_string());
        }
        if !self.has_verbosity() {
            push("verbosity", "-1".to_string());
        } else if let Some(v) = self.verbosity {
            push("verbosity", v.to_string());
        }
        for (k, v) in &self.extra {
            push(k, v.clone());
        }
        pairs
    }

    /// Encode as the engine's parameter string.
    ///
    /// Fails with [`Error::Argument`] if any key or value contains whitespace.
    pub fn to_param_string(&self) -> Result<String> {
        encode_pairs(self.pairs())
    }
}

/// Join `key=value` pairs with single spaces, rejecting embedded whitespace.
pub(crate) fn encode_pairs<I>(pairs: I) -> Result<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut encoded = Vec::new();
    for (key, value) in pairs {
        check_param(&key, &value)?;
        encoded.push(format!("{key}={value}"));
    }
    Ok(encoded.join(" "))
}

fn check_param(key: &str, value: &str) -> Result<()> {
    let rejected = |s: &str| s.chars().any(|c| c.is_whitespace() || c == '\0');
    if key.is_empty() || rejected(key) || rejected(value) {
        return Err(Error::argument(
            key,
            value,
            "keys and values must be non-empty and free of whitespace",
        ));
    }
    Ok(())
}
