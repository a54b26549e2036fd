//! Console output of the training and cross-validation loops.
//!
//! The line formats written here are part of the public contract:
//!
//! ```text
//! [10]	training's l2: 2.18872	valid_1's l2: 35.6151
//! [10]	cv_agg's l2: 21.6348 + 12.0872
//! ```
//!
//! Values are rendered with [`format_g`], which matches C's `%g`. Lines go
//! to a [`LogSink`]: stdout by default, or an in-memory buffer.
//! Diagnostics that are not part of the console contract use `tracing`.

use std::fmt;
use std::io::Write;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use super::eval::EvaluationRecord;

// =============================================================================
// VerboseEval
// =============================================================================

/// How often metric lines are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerboseEval {
    /// Print nothing, including early-stopping messages.
    Silent,
    /// Print the metric line every `n` iterations.
    Every(NonZeroUsize),
}

impl VerboseEval {
    /// Whether anything is printed at all.
    pub fn is_verbose(self) -> bool {
        matches!(self, VerboseEval::Every(_))
    }

    /// Whether the metric line for `iteration` is printed.
    pub fn logs(self, iteration: usize) -> bool {
        match self {
            VerboseEval::Silent => false,
            VerboseEval::Every(n) => iteration % n.get() == 0,
        }
    }
}

impl Default for VerboseEval {
    fn default() -> Self {
        VerboseEval::Every(NonZeroUsize::MIN)
    }
}

impl From<bool> for VerboseEval {
    fn from(verbose: bool) -> Self {
        if verbose {
            VerboseEval::Every(NonZeroUsize::MIN)
        } else {
            VerboseEval::Silent
        }
    }
}

impl From<usize> for VerboseEval {
    fn from(period: usize) -> Self {
        NonZeroUsize::new(period).map_or(VerboseEval::Silent, VerboseEval::Every)
    }
}

// =============================================================================
// LogSink
// =============================================================================

/// Destination of console lines.
#[derive(Clone, Default)]
pub enum LogSink {
    #[default]
    Stdout,
    /// Shared in-memory buffer.
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl LogSink {
    /// A fresh in-memory sink.
    pub fn buffer() -> Self {
        LogSink::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    /// Everything written to a buffer sink so far; empty for stdout.
    pub fn contents(&self) -> String {
        match self {
            LogSink::Stdout => String::new(),
            LogSink::Buffer(buffer) => {
                let bytes = buffer.lock().unwrap_or_else(|e| e.into_inner());
                String::from_utf8_lossy(&bytes).into_owned()
            }
        }
    }

    pub fn write_line(&self, line: &str) {
        let result = match self {
            LogSink::Stdout => writeln!(std::io::stdout().lock(), "{line}"),
            LogSink::Buffer(buffer) => {
                let mut bytes = buffer.lock().unwrap_or_else(|e| e.into_inner());
                writeln!(bytes, "{line}")
            }
        };
        if let Err(error) = result {
            tracing::warn!(%error, "failed to write training log line");
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::Stdout => f.write_str("Stdout"),
            LogSink::Buffer(_) => f.write_str("Buffer"),
        }
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Render `value` like C's `%g`: six significant digits, trailing zeros
/// trimmed, exponent form when the exponent is below -4 or at least 6.
pub fn format_g(value: f64) -> String {
    const PRECISION: i32 = 6;

    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0".into() } else { "0".into() };
    }

    // Round to the target precision first; rounding can bump the exponent.
    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_zeros(mantissa), exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent) as usize;
        trim_zeros(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// `<set>'s <metric>: <value>`
pub fn record_clause(record: &EvaluationRecord) -> String {
    format!(
        "{}'s {}: {}",
        record.dataset,
        record.metric,
        format_g(record.value)
    )
}

/// `cv_agg's <metric>: <mean>` with an optional ` + <stdv>`.
pub fn cv_clause(metric: &str, mean: f64, stdv: Option<f64>) -> String {
    match stdv {
        Some(stdv) => format!("cv_agg's {metric}: {} + {}", format_g(mean), format_g(stdv)),
        None => format!("cv_agg's {metric}: {}", format_g(mean)),
    }
}

/// `[<iteration>]` followed by tab-separated clauses.
pub fn format_line<S: AsRef<str>>(iteration: usize, clauses: &[S]) -> String {
    let mut line = format!("[{iteration}]");
    for clause in clauses {
        line.push('\t');
        line.push_str(clause.as_ref());
    }
    line
}

// =============================================================================
// TrainingLogger
// =============================================================================

/// Writes the console lines of one training or cross-validation run.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    verbose: VerboseEval,
    sink: LogSink,
}

impl TrainingLogger {
    pub fn new(verbose: VerboseEval, sink: LogSink) -> Self {
        Self { verbose, sink }
    }

    pub fn verbose(&self) -> VerboseEval {
        self.verbose
    }

    /// Header printed before the first round when early stopping is on.
    pub fn start_training(&self, early_stopping_rounds: Option<usize>) {
        if let Some(rounds) = early_stopping_rounds {
            if self.verbose.is_verbose() {
                self.sink.write_line(&format!(
                    "Training until validation scores don't improve for {rounds} rounds."
                ));
            }
        }
    }

    /// Print the metric line if `iteration` falls on the verbose period.
    pub fn log_metrics(&self, iteration: usize, line: &str) {
        if self.verbose.logs(iteration) {
            self.sink.write_line(line);
        }
    }

    pub fn log_early_stopping(&self, best_line: &str) {
        if self.verbose.is_verbose() {
            self.sink
                .write_line(&format!("Early stopping, best iteration is:\n{best_line}"));
        }
    }

    /// Summary printed when all rounds ran with early stopping configured.
    pub fn finish_training(&self, best_line: &str) {
        if self.verbose.is_verbose() {
            self.sink
                .write_line(&format!("Best iteration is: {best_line}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(2.18872, "2.18872")]
    #[case(35.6151, "35.6151")]
    #[case(21.634812, "21.6348")]
    #[case(12.08716, "12.0872")]
    #[case(100.0, "100")]
    #[case(0.5, "0.5")]
    #[case(0.0001, "0.0001")]
    #[case(0.00001234, "1.234e-05")]
    #[case(123456.0, "123456")]
    #[case(1234567.0, "1.23457e+06")]
    #[case(999999.5, "1e+06")]
    #[case(-3.5, "-3.5")]
    #[case(0.0, "0")]
    #[case(1e100, "1e+100")]
    #[case(f64::NAN, "nan")]
    #[case(f64::INFINITY, "inf")]
    fn formats_like_printf_g(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(format_g(value), expected);
    }

    #[test]
    fn formats_lines() {
        let clauses = ["training's l2: 2.18872", "valid_1's l2: 35.6151"];
        assert_eq!(
            format_line(55, &clauses),
            "[55]\ttraining's l2: 2.18872\tvalid_1's l2: 35.6151"
        );
        assert_eq!(
            format_line(49, &[cv_clause("l2", 21.6348, Some(12.0872))]),
            "[49]\tcv_agg's l2: 21.6348 + 12.0872"
        );
        assert_eq!(
            cv_clause("auc", 0.75, None),
            "cv_agg's auc: 0.75"
        );
    }

    #[rstest]
    #[case(VerboseEval::from(true), 7, true)]
    #[case(VerboseEval::from(false), 7, false)]
    #[case(VerboseEval::from(5usize), 5, true)]
    #[case(VerboseEval::from(5usize), 7, false)]
    #[case(VerboseEval::from(0usize), 5, false)]
    fn verbose_period(#[case] verbose: VerboseEval, #[case] iteration: usize, #[case] logs: bool) {
        assert_eq!(verbose.logs(iteration), logs);
    }

    #[test]
    fn silent_logger_writes_nothing() {
        let sink = LogSink::buffer();
        let logger = TrainingLogger::new(VerboseEval::Silent, sink.clone());
        logger.start_training(Some(5));
        logger.log_metrics(1, "[1]\tvalid_0's l2: 1");
        logger.log_early_stopping("[1]\tvalid_0's l2: 1");
        logger.finish_training("[1]\tvalid_0's l2: 1");
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn exhausted_rounds_print_bare_best_line() {
        let sink = LogSink::buffer();
        let logger = TrainingLogger::new(VerboseEval::default(), sink.clone());
        logger.finish_training("[71]\ttraining's l2: 1.69138\tvalid_1's l2: 35.2563");
        assert_eq!(
            sink.contents(),
            "Best iteration is: [71]\ttraining's l2: 1.69138\tvalid_1's l2: 35.2563\n"
        );
    }

    #[test]
    fn verbose_logger_writes_contract_lines() {
        let sink = LogSink::buffer();
        let logger = TrainingLogger::new(VerboseEval::default(), sink.clone());
        logger.start_training(Some(5));
        logger.log_early_stopping("[3]\tvalid_0's l2: 0.5");
        assert_eq!(
            sink.contents(),
            "Training until validation scores don't improve for 5 rounds.\n\
             Early stopping, best iteration is:\n[3]\tvalid_0's l2: 0.5\n"
        );
    }

    proptest! {
        #[test]
        fn format_g_round_trips_to_six_digits(value in -1e12f64..1e12f64) {
            let text = format_g(value);
            let parsed: f64 = text.parse().unwrap();
            let tolerance = value.abs() * 5.0001e-6 + 1e-300;
            prop_assert!((parsed - value).abs() <= tolerance, "{value} -> {text}");
        }

        #[test]
        fn format_g_has_no_trailing_zeros(value in 1e-3f64..1e5f64) {
            let text = format_g(value);
            if text.contains('.') {
                prop_assert!(!text.ends_with('0') && !text.ends_with('.'), "{text}");
            }
        }
    }
}
