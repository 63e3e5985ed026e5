//! Train/validation split strategies
//!
//! Two strategies, picked by [`DatasetKind`]:
//! 1. **MaskBaseDataset** - images are shuffled and split individually, so the
//!    same person can appear on both sides.
//! 2. **MaskSplitByProfileDataset** - people are shuffled and split, and every
//!    photo follows its owner. Validation then measures generalisation to
//!    unseen faces.
//!
//! Both are deterministic for a fixed seed.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::loader::{MaskDataset, MaskSample};
use super::DatasetKind;
use crate::utils::error::{MaskClassifierError, Result};

/// Train and validation samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train: Vec<MaskSample>,
    pub val: Vec<MaskSample>,
}

/// Split `dataset` with `val_ratio` of the images (or people) going to validation
pub fn split_dataset(
    dataset: &MaskDataset,
    kind: DatasetKind,
    val_ratio: f64,
    seed: u64,
) -> Result<DatasetSplits> {
    if !(val_ratio > 0.0 && val_ratio < 1.0) {
        return Err(MaskClassifierError::Config(format!(
            "val_ratio must be in (0, 1), got {}",
            val_ratio
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let splits = match kind {
        DatasetKind::MaskBaseDataset => {
            let n_val = (dataset.len() as f64 * val_ratio) as usize;
            let mut indices: Vec<usize> = (0..dataset.len()).collect();
            indices.shuffle(&mut rng);

            let val_idx: HashSet<usize> = indices.into_iter().take(n_val).collect();
            partition(dataset, |i, _| val_idx.contains(&i))
        }
        DatasetKind::MaskSplitByProfileDataset => {
            let mut profiles = dataset.profiles();
            let n_val = (profiles.len() as f64 * val_ratio) as usize;
            profiles.shuffle(&mut rng);

            let val_profiles: HashSet<String> = profiles.into_iter().take(n_val).collect();
            partition(dataset, |_, s| val_profiles.contains(&s.profile))
        }
    };

    if splits.val.is_empty() || splits.train.is_empty() {
        return Err(MaskClassifierError::Config(format!(
            "val_ratio {} leaves an empty split ({} train / {} val) for {}",
            val_ratio,
            splits.train.len(),
            splits.val.len(),
            kind
        )));
    }

    info!(
        "{} split: {} train / {} val images",
        kind,
        splits.train.len(),
        splits.val.len()
    );

    Ok(splits)
}

fn partition<F>(dataset: &MaskDataset, is_val: F) -> DatasetSplits
where
    F: Fn(usize, &MaskSample) -> bool,
{
    let mut train = Vec::new();
    let mut val = Vec::new();
    for (i, sample) in dataset.samples.iter().enumerate() {
        if is_val(i, sample) {
            val.push(sample.clone());
        } else {
            train.push(sample.clone());
        }
    }
    DatasetSplits { train, val }
}
