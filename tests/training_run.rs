mod common;

use std::fs;

use mask_classifier::backend::{default_device, TrainingBackend};
use mask_classifier::dataset::DatasetKind;
use mask_classifier::training::{train_with_backend, OptimizerKind, TrainConfig};
use mask_classifier::utils::events::{read_events, Event, EVENTS_FILE};
use mask_classifier::MaskClassifierError;

#[test]
fn run_writes_all_artifacts() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = common::synthetic_dataset(temp.path()).unwrap();
    let config = TrainConfig {
        epochs: 2,
        ..common::tiny_config(data_dir, temp.path().join("runs"))
    };

    let summary = train_with_backend::<TrainingBackend>(&config, &default_device()).unwrap();
    let run = &summary.run_dir;
    assert_eq!(run, &temp.path().join("runs").join("exp"));

    for file in ["config.json", "log.log", "last.mpk", EVENTS_FILE, "training_curves.svg"] {
        assert!(run.join(file).exists(), "{} missing", file);
    }
    for epoch in 0..2 {
        assert!(run.join(format!("figures/results_epoch_{}.png", epoch)).exists());
    }
    if summary.best.best_f1 > 0.0 {
        assert!(run.join("best.mpk").exists());
        assert!(run.join("confusion_matrix.svg").exists());
        assert!(run.join("classification_report.txt").exists());
    }

    let log = fs::read_to_string(run.join("log.log")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Epoch 0, F1_Score: "));
    assert!(lines[1].contains("Val Acc: "));

    let events = read_events(&run.join(EVENTS_FILE)).unwrap();
    let scalars = events
        .iter()
        .filter(|e| matches!(e, Event::Scalar { .. }))
        .count();
    let figures = events
        .iter()
        .filter(|e| matches!(e, Event::Figure { .. }))
        .count();
    assert_eq!((scalars, figures), (8, 2));
    assert!(events.iter().any(|e| e.tag() == "Val/f1_score"));

    let saved = TrainConfig::load(&run.join("config.json")).unwrap();
    assert_eq!(saved, config);
}

#[test]
fn sam_with_cutmix_trains_and_resumes() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = common::synthetic_dataset(temp.path()).unwrap();
    let config = TrainConfig {
        name: "sam".to_string(),
        dataset: DatasetKind::MaskBaseDataset,
        optimizer: OptimizerKind::Sam,
        base_optimizer: Some(OptimizerKind::Sgd),
        beta: 1.0,
        cutmix_prob: 1.0,
        ..common::tiny_config(data_dir, temp.path().join("runs"))
    };

    let summary = train_with_backend::<TrainingBackend>(&config, &default_device()).unwrap();
    assert!(summary.history[0].train_loss.is_finite());

    let resumed = TrainConfig {
        resume: Some(summary.run_dir.join("last")),
        optimizer: OptimizerKind::AdamW,
        base_optimizer: None,
        ..config
    };
    let again = train_with_backend::<TrainingBackend>(&resumed, &default_device()).unwrap();
    assert_eq!(again.run_dir, temp.path().join("runs").join("sam2"));
}

#[test]
fn invalid_config_fails_before_touching_disk() {
    let temp = tempfile::tempdir().unwrap();
    let config = TrainConfig {
        optimizer: OptimizerKind::Sam,
        base_optimizer: None,
        ..common::tiny_config(temp.path().join("missing"), temp.path().join("runs"))
    };

    let err = train_with_backend::<TrainingBackend>(&config, &default_device()).unwrap_err();
    assert!(matches!(err, MaskClassifierError::Config(_)));
    assert!(!temp.path().join("runs").exists());
}

#[test]
fn missing_data_dir_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let config = common::tiny_config(temp.path().join("missing"), temp.path().join("runs"));
    let err = train_with_backend::<TrainingBackend>(&config, &default_device()).unwrap_err();
    assert!(matches!(err, MaskClassifierError::PathNotFound(_)));
}
