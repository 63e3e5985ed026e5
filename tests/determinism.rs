//! Two identical runs must agree exactly. Kept as the only test in this
//! binary because the backend seed is process-global.

mod common;

use mask_classifier::backend::{default_device, TrainingBackend};
use mask_classifier::training::train_with_backend;

#[test]
fn repeated_runs_are_identical() {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = common::synthetic_dataset(temp.path()).unwrap();
    let config = common::tiny_config(data_dir, temp.path().join("runs"));
    assert_eq!(config.beta, 0.0);

    let device = default_device();
    let first = train_with_backend::<TrainingBackend>(&config, &device).unwrap();
    let second = train_with_backend::<TrainingBackend>(&config, &device).unwrap();

    assert_ne!(first.run_dir, second.run_dir);
    assert_eq!(first.history.len(), 1);

    let a = first.history[0];
    let b = second.history[0];
    assert_eq!(a.train_loss, b.train_loss);
    assert_eq!(a.val_loss, b.val_loss);
    assert_eq!(a.val_accuracy, b.val_accuracy);
    assert_eq!(a.val_f1, b.val_f1);
    assert!(a.train_loss.is_finite());
}
