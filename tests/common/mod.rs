use std::fs;
use std::path::{Path, PathBuf};

use mask_classifier::dataset::AugmentationKind;
use mask_classifier::model::ModelKind;
use mask_classifier::training::TrainConfig;

const PHOTOS: [&str; 7] = [
    "mask1",
    "mask2",
    "mask3",
    "mask4",
    "mask5",
    "incorrect_mask",
    "normal",
];

/// Person folders covering both genders and all age bands
pub const PROFILES: [&str; 6] = [
    "000001_male_Asian_20",
    "000002_female_Asian_25",
    "000003_male_Asian_45",
    "000004_female_Asian_50",
    "000005_male_Asian_61",
    "000006_female_Asian_70",
];

/// Seven small photos per person, each with its own colour pattern
pub fn synthetic_dataset(root: &Path) -> anyhow::Result<PathBuf> {
    let images = root.join("images");
    for (p, profile) in PROFILES.iter().enumerate() {
        let dir = images.join(profile);
        fs::create_dir_all(&dir)?;
        for (s, stem) in PHOTOS.iter().enumerate() {
            let shade = ((p * 41 + s * 23) % 256) as u8;
            let img = image::RgbImage::from_fn(16, 16, |x, y| {
                image::Rgb([shade, (x * 16) as u8, (y * 16) as u8])
            });
            img.save(dir.join(format!("{}.png", stem)))?;
        }
    }
    Ok(images)
}

/// A run small enough for the CPU backend
pub fn tiny_config(data_dir: PathBuf, model_dir: PathBuf) -> TrainConfig {
    TrainConfig {
        seed: 3,
        epochs: 1,
        augmentation: AugmentationKind::BaseAugmentation,
        // height != width, like the default 128x96
        resize: [16, 12],
        batch_size: 8,
        valid_batch_size: 8,
        model: ModelKind::LiteModel,
        val_ratio: 0.34,
        log_interval: 2,
        data_dir,
        model_dir,
        ..TrainConfig::default()
    }
}
