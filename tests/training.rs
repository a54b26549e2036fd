//! Training loop integration tests against the scripted engine.

mod common;

use lgbm::testing::ScriptedEngine;
use lgbm::training::{LogSink, VerboseEval};
use lgbm::{Booster, Error, EvalSet, Params, PredictOptions, TrainConfig, Trainer, train};
use rstest::rstest;

fn l2_params() -> Params {
    Params::new().with("objective", "regression").with("metric", "l2")
}

fn config(rounds: usize, early_stopping: Option<usize>, sink: &LogSink) -> TrainConfig {
    TrainConfig::builder()
        .num_boost_round(rounds)
        .maybe_early_stopping_rounds(early_stopping)
        .sink(sink.clone())
        .build()
        .unwrap()
}

// =============================================================================
// Early stopping
// =============================================================================

#[test]
fn stops_exactly_patience_rounds_after_best() {
    let curve = [5.0, 4.0, 3.0, 2.0, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5];
    let (scripted, engine) = common::engine(ScriptedEngine::new().with_curve(1, "l2", curve));
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let sink = LogSink::buffer();

    let output = Trainer::new(l2_params(), config(100, Some(3), &sink))
        .train(&train_set, &[EvalSet::new(&train_set), EvalSet::new(&test_set)])
        .unwrap();

    assert_eq!(output.booster.best_iteration(), Some(5));
    assert_eq!(output.booster.current_iteration().unwrap(), 8);
    assert_eq!(scripted.counters().updates, 8);
    assert_eq!(
        output.history.get("valid_1", "l2"),
        Some(&[5.0, 4.0, 3.0, 2.0, 1.0, 1.5, 2.0, 2.5][..])
    );
    assert_eq!(output.history.get("training", "l2").map(<[f64]>::len), Some(8));

    let contents = sink.contents();
    let lines = common::lines(&contents);
    assert_eq!(lines.len(), 11, "{contents}");
    assert_eq!(
        lines[0],
        "Training until validation scores don't improve for 3 rounds."
    );
    assert!(lines[1].starts_with("[1]\ttraining's l2: "));
    assert!(lines[1].ends_with("\tvalid_1's l2: 5"));
    assert!(lines[8].starts_with("[8]\t"));
    assert_eq!(lines[9], "Early stopping, best iteration is:");
    assert!(lines[10].starts_with("[5]\ttraining's l2: "));
    assert!(lines[10].ends_with("\tvalid_1's l2: 1"));
    assert!(!contents.contains("[9]"));
}

#[test]
fn higher_is_better_metrics_stop_after_their_peak() {
    let curve = [0.6, 0.7, 0.8, 0.75, 0.7, 0.65, 0.6];
    let (_, engine) = common::engine(ScriptedEngine::new().with_curve(1, "auc", curve));
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let params = Params::new().with("metric", "auc");

    let output = Trainer::new(params, config(50, Some(2), &LogSink::buffer()))
        .train(&train_set, &[EvalSet::new(&test_set)])
        .unwrap();

    assert_eq!(output.booster.best_iteration(), Some(3));
    assert_eq!(output.booster.current_iteration().unwrap(), 5);
}

#[test]
fn exhausted_rounds_report_best_iteration() {
    let curve: Vec<f64> = (1..=10).rev().map(f64::from).collect();
    let (_, engine) = common::engine(ScriptedEngine::new().with_curve(1, "l2", curve));
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let sink = LogSink::buffer();

    let booster = train(
        &l2_params(),
        &train_set,
        &[EvalSet::new(&train_set), EvalSet::new(&test_set)],
        config(10, Some(5), &sink),
    )
    .unwrap();

    assert_eq!(booster.best_iteration(), Some(10));
    let contents = sink.contents();
    let last = common::lines(&contents).last().copied().unwrap();
    assert!(
        last.starts_with("Best iteration is: [10]\ttraining's l2: "),
        "{last}"
    );
    assert!(last.ends_with("\tvalid_1's l2: 1"));
}

#[test]
fn first_metric_only_ignores_later_metrics() {
    let l2: Vec<f64> = (1..=10).rev().map(f64::from).collect();
    let l1: Vec<f64> = (1..=10).map(f64::from).collect();
    let scripted = || {
        ScriptedEngine::new()
            .with_curve(1, "l2", l2.clone())
            .with_curve(1, "l1", l1.clone())
    };
    let params = Params::new().with("metric", "l2,l1");

    let (_, engine) = common::engine(scripted());
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let all_metrics = Trainer::new(params.clone(), config(10, Some(2), &LogSink::buffer()))
        .train(&train_set, &[EvalSet::new(&test_set)])
        .unwrap();
    assert_eq!(all_metrics.booster.best_iteration(), Some(1));
    assert_eq!(all_metrics.booster.current_iteration().unwrap(), 3);

    let (_, engine) = common::engine(scripted());
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let first_only = TrainConfig::builder()
        .num_boost_round(10)
        .early_stopping_rounds(2)
        .first_metric_only(true)
        .sink(LogSink::buffer())
        .build()
        .unwrap();
    let first_metric = Trainer::new(params, first_only)
        .train(&train_set, &[EvalSet::new(&test_set)])
        .unwrap();
    assert_eq!(first_metric.booster.best_iteration(), Some(10));
    assert_eq!(first_metric.booster.current_iteration().unwrap(), 10);
}

#[test]
fn engine_finished_flag_ends_loop_quietly() {
    let curve: Vec<f64> = (1..=10).rev().map(f64::from).collect();
    let (_, engine) = common::engine(
        ScriptedEngine::new()
            .with_curve(1, "l2", curve)
            .finish_after(4),
    );
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let sink = LogSink::buffer();

    let output = Trainer::new(l2_params(), config(10, Some(2), &sink))
        .train(&train_set, &[EvalSet::new(&test_set)])
        .unwrap();

    assert_eq!(output.booster.current_iteration().unwrap(), 4);
    assert_eq!(output.booster.best_iteration(), Some(4));
    assert_eq!(output.history.len(), 4);
    let contents = sink.contents();
    assert!(!contents.contains("Best iteration is:"));
    assert!(!contents.contains("Early stopping, best iteration is"));
}

#[test]
fn early_stopped_booster_predicts_with_best_iteration() {
    let curve = [3.0, 2.0, 1.0, 2.0, 3.0, 4.0];
    let (_, engine) = common::engine(ScriptedEngine::new().with_curve(1, "l2", curve));
    let (train_set, test_set) = common::train_test(&engine, 40, 10);

    let output = Trainer::new(l2_params(), config(20, Some(2), &LogSink::buffer()))
        .train(&train_set, &[EvalSet::new(&test_set)])
        .unwrap();
    let booster = output.booster;
    assert_eq!(booster.best_iteration(), Some(3));

    let row = [1.0, 2.0];
    let default = booster.predict(&row).unwrap();
    let at_best = booster
        .predict_with(&row, &PredictOptions::builder().num_iteration(3).build())
        .unwrap();
    let at_last = booster
        .predict_with(&row, &PredictOptions::builder().num_iteration(5).build())
        .unwrap();
    assert_eq!(default, at_best);
    assert_ne!(default, at_last);
}

// =============================================================================
// Console output
// =============================================================================

#[test]
fn silent_training_prints_nothing() {
    let curve = [3.0, 2.0, 1.0, 2.0, 3.0];
    let (_, engine) = common::engine(ScriptedEngine::new().with_curve(1, "l2", curve));
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let sink = LogSink::buffer();
    let config = TrainConfig::builder()
        .num_boost_round(10)
        .early_stopping_rounds(2)
        .verbose_eval(false)
        .sink(sink.clone())
        .build()
        .unwrap();

    let booster = train(&l2_params(), &train_set, &[EvalSet::new(&test_set)], config).unwrap();
    assert_eq!(booster.best_iteration(), Some(3));
    assert_eq!(sink.contents(), "");
}

#[test]
fn verbose_period_prints_every_nth_round() {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let sink = LogSink::buffer();
    let config = TrainConfig::builder()
        .num_boost_round(12)
        .verbose_eval(VerboseEval::from(5usize))
        .sink(sink.clone())
        .build()
        .unwrap();

    train(&l2_params(), &train_set, &[EvalSet::new(&test_set)], config).unwrap();
    let contents = sink.contents();
    let lines = common::lines(&contents);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("[5]\tvalid_0's l2: "));
    assert!(lines[1].starts_with("[10]\tvalid_0's l2: "));
}

#[test]
fn named_sets_label_their_clauses() {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let sink = LogSink::buffer();

    train(
        &l2_params(),
        &train_set,
        &[
            EvalSet::named("train", &train_set),
            EvalSet::named("holdout", &test_set),
        ],
        config(1, None, &sink),
    )
    .unwrap();

    let contents = sink.contents();
    assert!(contents.starts_with("[1]\ttrain's l2: "), "{contents}");
    assert!(contents.contains("\tholdout's l2: "));
}

// =============================================================================
// Errors and resources
// =============================================================================

#[test]
fn early_stopping_requires_validation_data() {
    let (scripted, engine) = common::engine(ScriptedEngine::new());
    let (train_set, _) = common::train_test(&engine, 40, 10);

    let err = train(
        &l2_params(),
        &train_set,
        &[EvalSet::new(&train_set)],
        config(10, Some(3), &LogSink::buffer()),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)), "got {err:?}");
    assert_eq!(scripted.counters().boosters_created, 0);
}

#[test]
fn whitespace_parameter_never_reaches_engine() {
    let (scripted, engine) = common::engine(ScriptedEngine::new());
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let params = l2_params().with("min_data_in_bin", "3 num_leaves=2");

    let err = train(
        &params,
        &train_set,
        &[EvalSet::new(&test_set)],
        config(10, None, &LogSink::buffer()),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Argument { .. }), "got {err:?}");
    assert_eq!(scripted.counters().boosters_created, 0);
    assert_eq!(scripted.counters().updates, 0);
}

#[rstest]
#[case::leading_space("objective", " regression")]
#[case::trailing_newline("objective", "regression\n")]
#[case::tab("objective", "\tbinary")]
#[case::metric_list("metric", "l2, l1")]
fn whitespace_in_typed_value_never_reaches_engine(#[case] key: &str, #[case] value: &str) {
    let (scripted, engine) = common::engine(ScriptedEngine::new());
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let params = Params::new().with(key, value);

    let err = Booster::from_dataset(&train_set, &params).unwrap_err();
    assert!(matches!(err, Error::Argument { .. }), "got {err:?}");

    let err = train(
        &params,
        &train_set,
        &[EvalSet::new(&test_set)],
        config(10, None, &LogSink::buffer()),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Argument { .. }), "got {err:?}");
    assert_eq!(scripted.counters().boosters_created, 0);
}

#[test]
fn engine_errors_abort_and_free_the_booster() {
    let (scripted, engine) =
        common::engine(ScriptedEngine::new().fail_on("booster_eval", "eval broke"));
    let (train_set, test_set) = common::train_test(&engine, 40, 10);

    let err = train(
        &l2_params(),
        &train_set,
        &[EvalSet::new(&test_set)],
        config(10, None, &LogSink::buffer()),
    )
    .unwrap_err();
    match err {
        Error::Engine { message } => assert_eq!(message, "eval broke"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(scripted.counters().updates, 1);
    assert_eq!(scripted.counters().boosters_freed, 1);

    drop(train_set);
    drop(test_set);
    assert_eq!(scripted.live_handles(), 0);
}

#[test]
fn explicit_release_frees_every_handle() {
    let (scripted, engine) = common::engine(ScriptedEngine::new());
    let (mut train_set, mut test_set) = common::train_test(&engine, 40, 10);

    let mut booster = train(
        &l2_params(),
        &train_set,
        &[EvalSet::new(&test_set)],
        config(3, None, &LogSink::buffer()),
    )
    .unwrap();
    booster.release().unwrap();
    test_set.release().unwrap();
    train_set.release().unwrap();

    assert_eq!(scripted.live_handles(), 0);
    let counters = scripted.counters();
    assert_eq!(counters.boosters_freed, 1);
    assert_eq!(counters.datasets_freed, 2);
}
