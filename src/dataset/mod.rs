//! Dataset module for masked-face data handling
//!
//! This module provides functionality for:
//! - Discovering the per-person image folders on disk
//! - Encoding (mask, gender, age) into one of 18 classes
//! - Splitting into train/validation sets, either per image or per person
//! - Image transforms and Burn `Dataset`/`Batcher` integration
//!
//! ## Label encoding
//!
//! Every person folder is named `{id}_{gender}_{race}_{age}` and holds seven
//! photos: `mask1`..`mask5` (mask worn), `incorrect_mask` and `normal`
//! (no mask). The class index is `mask * 6 + gender * 3 + age`.

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod split;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::MaskClassifierError;

pub use augmentation::{AugmentationKind, Transform};
pub use burn_dataset::{BatchLoader, MaskBatch, MaskBatcher, MaskBurnDataset, MaskItem};
pub use loader::{DatasetStats, MaskDataset, MaskSample};
pub use split::{split_dataset, DatasetSplits};

/// 3 mask states x 2 genders x 3 age bands
pub const NUM_CLASSES: usize = 18;

/// Per-channel mean of the training photos (RGB, [0, 1] scale)
pub const DEFAULT_MEAN: [f32; 3] = [0.548, 0.504, 0.479];

/// Per-channel standard deviation of the training photos
pub const DEFAULT_STD: [f32; 3] = [0.237, 0.247, 0.246];

/// Whether and how the mask is worn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskLabel {
    Mask = 0,
    Incorrect = 1,
    NotWear = 2,
}

impl MaskLabel {
    /// Map an image file stem (`mask3`, `incorrect_mask`, `normal`) to a label
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        match stem {
            "mask1" | "mask2" | "mask3" | "mask4" | "mask5" => Some(Self::Mask),
            "incorrect_mask" => Some(Self::Incorrect),
            "normal" => Some(Self::NotWear),
            _ => None,
        }
    }

    fn from_index(i: usize) -> Self {
        match i {
            0 => Self::Mask,
            1 => Self::Incorrect,
            _ => Self::NotWear,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mask => "Wear",
            Self::Incorrect => "Incorrect",
            Self::NotWear => "Not Wear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenderLabel {
    Male = 0,
    Female = 1,
}

impl GenderLabel {
    pub fn parse(value: &str) -> Result<Self, MaskClassifierError> {
        match value.to_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            other => Err(MaskClassifierError::Dataset(format!(
                "gender should be 'male' or 'female', got '{}'",
                other
            ))),
        }
    }

    fn from_index(i: usize) -> Self {
        if i == 0 {
            Self::Male
        } else {
            Self::Female
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeLabel {
    Young = 0,
    Middle = 1,
    Old = 2,
}

impl AgeLabel {
    /// Under 30, 30 to 59, 60 and over
    pub fn from_age(age: u32) -> Self {
        if age < 30 {
            Self::Young
        } else if age < 60 {
            Self::Middle
        } else {
            Self::Old
        }
    }

    pub fn parse(value: &str) -> Result<Self, MaskClassifierError> {
        value
            .trim()
            .parse::<u32>()
            .map(Self::from_age)
            .map_err(|_| {
                MaskClassifierError::Dataset(format!("age value should be numeric, got '{}'", value))
            })
    }

    fn from_index(i: usize) -> Self {
        match i {
            0 => Self::Young,
            1 => Self::Middle,
            _ => Self::Old,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Young => "<30",
            Self::Middle => "30-60",
            Self::Old => ">=60",
        }
    }
}

/// Combine the three sub-labels into a class index in `0..18`
pub fn encode_multi_class(mask: MaskLabel, gender: GenderLabel, age: AgeLabel) -> usize {
    mask as usize * 6 + gender as usize * 3 + age as usize
}

/// Split a class index back into its sub-labels
pub fn decode_multi_class(label: usize) -> (MaskLabel, GenderLabel, AgeLabel) {
    let mask = MaskLabel::from_index((label / 6) % 3);
    let gender = GenderLabel::from_index((label / 3) % 2);
    let age = AgeLabel::from_index(label % 3);
    (mask, gender, age)
}

/// Display name for a class, e.g. `Wear/Female/30-60`
pub fn class_name(label: usize) -> String {
    let (mask, gender, age) = decode_multi_class(label);
    format!("{}/{}/{}", mask.name(), gender.name(), age.name())
}

/// Display names for all 18 classes
pub fn class_names() -> Vec<String> {
    (0..NUM_CLASSES).map(class_name).collect()
}

/// Undo mean/std normalisation of one CHW image and scale to `0..=255`
pub fn denormalize_image(chw: &[f32], mean: [f32; 3], std: [f32; 3]) -> Vec<u8> {
    let plane = chw.len() / 3;
    chw.iter()
        .enumerate()
        .map(|(i, &v)| {
            let c = (i / plane.max(1)).min(2);
            ((v * std[c] + mean[c]) * 255.0).clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// How the train/validation split is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    /// Random split over individual images
    MaskBaseDataset,
    /// Random split over people, so one person's photos never straddle both sets
    MaskSplitByProfileDataset,
}

impl DatasetKind {
    /// Validation figures use a random sample of the first batch unless the
    /// split is per person
    pub fn shuffle_figure_samples(&self) -> bool {
        !matches!(self, Self::MaskSplitByProfileDataset)
    }
}

impl FromStr for DatasetKind {
    type Err = MaskClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MaskBaseDataset" => Ok(Self::MaskBaseDataset),
            "MaskSplitByProfileDataset" => Ok(Self::MaskSplitByProfileDataset),
            other => Err(MaskClassifierError::Config(format!(
                "unknown dataset '{}' (expected MaskBaseDataset or MaskSplitByProfileDataset)",
                other
            ))),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MaskBaseDataset => "MaskBaseDataset",
            Self::MaskSplitByProfileDataset => "MaskSplitByProfileDataset",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_every_class() {
        for label in 0..NUM_CLASSES {
            let (mask, gender, age) = decode_multi_class(label);
            assert_eq!(encode_multi_class(mask, gender, age), label);
        }
    }

    #[test]
    fn test_encode_examples() {
        assert_eq!(
            encode_multi_class(MaskLabel::Mask, GenderLabel::Male, AgeLabel::Young),
            0
        );
        assert_eq!(
            encode_multi_class(MaskLabel::Incorrect, GenderLabel::Female, AgeLabel::Middle),
            10
        );
        assert_eq!(
            encode_multi_class(MaskLabel::NotWear, GenderLabel::Female, AgeLabel::Old),
            17
        );
    }

    #[test]
    fn test_denormalize_inverts_normalisation() {
        let mean = [0.5, 0.25, 0.0];
        let std = [0.5, 0.25, 1.0];
        // one pixel per channel, normalised value 1.0
        let out = denormalize_image(&[1.0, 1.0, 1.0], mean, std);
        assert_eq!(out, vec![255, 127, 255]);
        assert_eq!(denormalize_image(&[-5.0, 0.0, 0.0], mean, std)[0], 0);
    }

    #[test]
    fn test_age_bands() {
        assert_eq!(AgeLabel::from_age(29), AgeLabel::Young);
        assert_eq!(AgeLabel::from_age(30), AgeLabel::Middle);
        assert_eq!(AgeLabel::from_age(59), AgeLabel::Middle);
        assert_eq!(AgeLabel::from_age(60), AgeLabel::Old);
        assert!(AgeLabel::parse("abc").is_err());
    }

    #[test]
    fn test_file_stems() {
        assert_eq!(MaskLabel::from_file_stem("mask4"), Some(MaskLabel::Mask));
        assert_eq!(
            MaskLabel::from_file_stem("incorrect_mask"),
            Some(MaskLabel::Incorrect)
        );
        assert_eq!(MaskLabel::from_file_stem("normal"), Some(MaskLabel::NotWear));
        assert_eq!(MaskLabel::from_file_stem("mask6"), None);
    }

    #[test]
    fn test_dataset_kind_parse() {
        assert_eq!(
            "MaskBaseDataset".parse::<DatasetKind>().unwrap(),
            DatasetKind::MaskBaseDataset
        );
        let err = "CocoDataset".parse::<DatasetKind>().unwrap_err();
        assert!(matches!(err, MaskClassifierError::Config(_)));
        assert!(!DatasetKind::MaskSplitByProfileDataset.shuffle_figure_samples());
    }

    #[test]
    fn test_class_name() {
        assert_eq!(class_name(0), "Wear/Male/<30");
        assert_eq!(class_names().len(), NUM_CLASSES);
    }
}
