//! Booster prediction and persistence against the scripted engine.

mod common;

use approx::assert_abs_diff_eq;
use lgbm::testing::ScriptedEngine;
use lgbm::training::LogSink;
use lgbm::{
    Booster, Dataset, Error, EvalSet, ImportanceType, Params, PredictOptions, PredictType,
    Trainer, TrainConfig, train,
};
use ndarray::Array2;
use rstest::rstest;

fn quiet(rounds: usize) -> TrainConfig {
    TrainConfig::builder()
        .num_boost_round(rounds)
        .sink(LogSink::buffer())
        .build()
        .unwrap()
}

fn trained(engine: &lgbm::EngineRef, params: &Params, label: &[f64], rounds: usize) -> (Dataset, Booster) {
    let (rows, _) = common::regression_rows(label.len());
    let train_set = Dataset::from_rows(engine, &rows, label).unwrap();
    let booster = train(params, &train_set, &[EvalSet::new(&train_set)], quiet(rounds)).unwrap();
    (train_set, booster)
}

// =============================================================================
// Prediction shapes
// =============================================================================

#[test]
fn regression_batch_has_one_value_per_row() {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (_, label) = common::regression_rows(30);
    let (_train, booster) = trained(&engine, &Params::new(), &label, 5);

    let rows = vec![vec![0.5, 1.0]; 7];
    let batch = booster.predict(&rows).unwrap();
    assert_eq!(batch.as_scalars().map(<[f64]>::len), Some(7));

    let single = booster.predict(&rows[0]).unwrap();
    assert!(single.as_scalar().is_some());
}

#[test]
fn binary_probabilities_lie_in_unit_interval() {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (_, label) = common::class_rows(40, 2);
    let params = Params::new().with("objective", "binary");
    let (_train, booster) = trained(&engine, &params, &label, 10);

    let p = booster.predict(&[1.0, 2.0]).unwrap().as_scalar().unwrap();
    assert!(p > 0.0 && p < 1.0, "{p}");

    let raw = booster
        .predict_with(
            &[1.0, 2.0],
            &PredictOptions::builder().predict_type(PredictType::RawScore).build(),
        )
        .unwrap()
        .as_scalar()
        .unwrap();
    assert_abs_diff_eq!(p, 1.0 / (1.0 + (-raw).exp()), epsilon = 1e-12);
}

#[test]
fn multiclass_predictions_are_class_vectors() {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (_, label) = common::class_rows(30, 3);
    let params = Params::new()
        .with("objective", "multiclass")
        .with("num_class", 3);
    let (_train, booster) = trained(&engine, &params, &label, 10);
    assert_eq!(booster.num_classes().unwrap(), 3);

    let single = booster.predict(&[1.0, 2.0]).unwrap();
    let probs = single.as_vector().unwrap();
    assert_eq!(probs.len(), 3);
    assert_abs_diff_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-9);

    let batch = Array2::from_shape_fn((4, 2), |(i, j)| (i + j) as f64);
    let out = booster.predict(batch.view()).unwrap();
    let matrix = out.as_vectors().unwrap();
    assert_eq!(matrix.dim(), (4, 3));
    for row in matrix.rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn empty_batch_predicts_zero_rows() {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (_, label) = common::class_rows(30, 3);
    let (_train, regression) = trained(&engine, &Params::new(), &label, 4);
    let multiclass_params = Params::new()
        .with("objective", "multiclass")
        .with("num_class", 3);
    let (_train, multiclass) = trained(&engine, &multiclass_params, &label, 4);

    let rows: Vec<Vec<f64>> = Vec::new();
    let out = regression.predict(&rows).unwrap();
    assert_eq!(out.as_scalars(), Some(&[][..]));

    let out = multiclass.predict(Array2::<f64>::zeros((0, 2)).view()).unwrap();
    assert_eq!(out.as_vectors().map(|m| m.dim()), Some((0, 3)));
    assert!(out.is_empty());
}

#[rstest]
#[case::leaf_index(PredictType::LeafIndex, 6)]
#[case::contrib(PredictType::Contrib, 3)]
fn auxiliary_outputs_have_documented_width(#[case] predict_type: PredictType, #[case] width: usize) {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (_, label) = common::regression_rows(20);
    let (_train, booster) = trained(&engine, &Params::new(), &label, 6);

    let rows = vec![vec![0.0, 1.0]; 2];
    let options = PredictOptions::builder().predict_type(predict_type).build();
    let out = booster.predict_with(&rows, &options).unwrap();
    assert_eq!(out.n_outputs(), width);
    assert_eq!(out.len(), 2);
}

#[test]
fn feature_importance_covers_every_column() {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (_, label) = common::regression_rows(20);
    let (_train, booster) = trained(&engine, &Params::new(), &label, 5);

    let split = booster.feature_importance(ImportanceType::Split).unwrap();
    assert_eq!(split.len(), booster.num_features());
    assert_abs_diff_eq!(split.iter().sum::<f64>(), 5.0);
}

// =============================================================================
// Persistence
// =============================================================================

#[rstest]
#[case::regression(Params::new(), 1)]
#[case::multiclass(Params::new().with("objective", "multiclass").with("num_class", 3), 3)]
fn save_then_load_predicts_identically(#[case] params: Params, #[case] n_classes: usize) {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (_, label) = common::class_rows(30, 3);
    let (_train, booster) = trained(&engine, &params, &label, 8);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.txt");
    booster.save(&path).unwrap();
    let loaded = Booster::from_file(&engine, &path).unwrap();

    assert_eq!(loaded.num_features(), booster.num_features());
    assert_eq!(loaded.current_iteration().unwrap(), 8);
    assert_eq!(loaded.num_classes().unwrap(), n_classes);

    let rows: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64, 1.0]).collect();
    let before = booster.predict(&rows).unwrap().to_flat();
    let after = loaded.predict(&rows).unwrap().to_flat();
    lgbm::testing::assert_series_approx_eq(&after, &before, 1e-12, "reloaded predictions");
}

#[test]
fn model_string_matches_saved_file() {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let (_, label) = common::regression_rows(20);
    let (_train, booster) = trained(&engine, &Params::new(), &label, 3);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.txt");
    booster.save(&path).unwrap();
    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(booster.to_model_string().unwrap(), on_disk);
}

#[test]
fn early_stopped_model_is_saved_up_to_best_iteration() {
    let curve = [3.0, 2.0, 1.0, 2.0, 3.0, 4.0];
    let (_, engine) = common::engine(ScriptedEngine::new().with_curve(1, "l2", curve));
    let (train_set, test_set) = common::train_test(&engine, 40, 10);
    let config = TrainConfig::builder()
        .num_boost_round(20)
        .early_stopping_rounds(2)
        .sink(LogSink::buffer())
        .build()
        .unwrap();
    let booster = Trainer::new(Params::new().with("metric", "l2"), config)
        .train(&train_set, &[EvalSet::new(&test_set)])
        .unwrap()
        .booster;
    assert_eq!(booster.best_iteration(), Some(3));
    assert_eq!(booster.current_iteration().unwrap(), 5);

    let dumped = booster.to_model_string().unwrap();
    assert!(dumped.lines().any(|line| line == "iterations=3"), "{dumped}");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.txt");
    booster.save(&path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), dumped);

    let loaded = Booster::from_file(&engine, &path).unwrap();
    assert_eq!(loaded.current_iteration().unwrap(), 3);
    let row = [1.0, 2.0];
    assert_eq!(loaded.predict(&row).unwrap(), booster.predict(&row).unwrap());
}

#[test]
fn corrupt_model_file_is_engine_error() {
    let (_, engine) = common::engine(ScriptedEngine::new());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.txt");
    std::fs::write(&path, "not a model").unwrap();

    let err = Booster::from_file(&engine, &path).unwrap_err();
    assert!(matches!(err, Error::Engine { .. }), "got {err:?}");
}
