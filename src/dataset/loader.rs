//! Masked-face Dataset Loader
//!
//! Walks the per-person folders and turns every recognised photo into a
//! labelled sample. Images are not decoded here; that happens lazily in
//! [`super::burn_dataset::MaskBurnDataset`].

use std::path::{Path, PathBuf};

use image::ImageReader;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{
    class_name, encode_multi_class, AgeLabel, GenderLabel, MaskLabel, DEFAULT_MEAN, DEFAULT_STD,
    NUM_CLASSES,
};
use crate::utils::error::{MaskClassifierError, Result};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// A single photo with its decoded labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskSample {
    pub path: PathBuf,
    /// Folder name of the person the photo belongs to
    pub profile: String,
    pub mask: MaskLabel,
    pub gender: GenderLabel,
    pub age: AgeLabel,
    /// Combined class index in `0..18`
    pub label: usize,
}

/// All samples found under a data directory
#[derive(Debug, Clone)]
pub struct MaskDataset {
    pub root_dir: PathBuf,
    pub samples: Vec<MaskSample>,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl MaskDataset {
    /// Discover every person folder under `root_dir`
    ///
    /// ```text
    /// root_dir/
    /// ├── 000001_female_Asian_45/
    /// │   ├── mask1.jpg ... mask5.jpg
    /// │   ├── incorrect_mask.jpg
    /// │   └── normal.jpg
    /// └── ...
    /// ```
    ///
    /// Hidden entries and files whose stem is not a known photo name are skipped.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading mask dataset from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(MaskClassifierError::PathNotFound(root_dir));
        }

        let mut profiles: Vec<String> = std::fs::read_dir(&root_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect();
        profiles.sort();

        let mut samples = Vec::new();
        for profile in &profiles {
            let (gender, age) = match parse_profile(profile) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Skipping folder '{}': {}", profile, e);
                    continue;
                }
            };

            let mut files: Vec<PathBuf> = WalkDir::new(root_dir.join(profile))
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .collect();
            files.sort();

            for path in files {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if stem.starts_with('.') || !has_image_extension(&path) {
                    continue;
                }
                let Some(mask) = MaskLabel::from_file_stem(stem) else {
                    continue;
                };

                samples.push(MaskSample {
                    label: encode_multi_class(mask, gender, age),
                    path,
                    profile: profile.clone(),
                    mask,
                    gender,
                    age,
                });
            }
            debug!("Profile '{}' parsed", profile);
        }

        info!(
            "Loaded {} images from {} profiles",
            samples.len(),
            profiles.len()
        );

        if samples.is_empty() {
            return Err(MaskClassifierError::Dataset(format!(
                "no labelled images found under {:?}",
                root_dir
            )));
        }

        Ok(Self {
            root_dir,
            samples,
            mean: DEFAULT_MEAN,
            std: DEFAULT_STD,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    /// Distinct person folders in discovery order
    pub fn profiles(&self) -> Vec<String> {
        let mut profiles: Vec<String> = Vec::new();
        for sample in &self.samples {
            if profiles.last() != Some(&sample.profile) {
                profiles.push(sample.profile.clone());
            }
        }
        profiles
    }

    /// Estimate per-channel mean/std from the first `max_images` photos and
    /// use them for normalisation instead of the defaults.
    pub fn estimate_statistics(&mut self, max_images: usize) -> Result<()> {
        let mut sum = [0f64; 3];
        let mut sum_sq = [0f64; 3];
        let mut pixels = 0f64;

        for sample in self.samples.iter().take(max_images) {
            let img = ImageReader::open(&sample.path)
                .map_err(|e| MaskClassifierError::ImageLoadError(sample.path.clone(), e.to_string()))?
                .decode()
                .map_err(|e| MaskClassifierError::ImageLoadError(sample.path.clone(), e.to_string()))?
                .to_rgb8();

            for p in img.pixels() {
                for c in 0..3 {
                    let v = p[c] as f64 / 255.0;
                    sum[c] += v;
                    sum_sq[c] += v * v;
                }
            }
            pixels += (img.width() * img.height()) as f64;
        }

        if pixels == 0.0 {
            return Err(MaskClassifierError::Dataset(
                "cannot estimate statistics from zero pixels".to_string(),
            ));
        }

        for c in 0..3 {
            let mean = sum[c] / pixels;
            let var = (sum_sq[c] / pixels - mean * mean).max(0.0);
            self.mean[c] = mean as f32;
            self.std[c] = var.sqrt().max(1e-6) as f32;
        }
        info!("Estimated mean {:?}, std {:?}", self.mean, self.std);
        Ok(())
    }

    /// Class distribution of the discovered samples
    pub fn get_stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; NUM_CLASSES];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            num_profiles: self.profiles().len(),
            class_counts,
        }
    }
}

/// `{id}_{gender}_{race}_{age}` → (gender, age band)
pub fn parse_profile(name: &str) -> Result<(GenderLabel, AgeLabel)> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 4 {
        return Err(MaskClassifierError::Dataset(format!(
            "expected '{{id}}_{{gender}}_{{race}}_{{age}}', got '{}'",
            name
        )));
    }
    let gender = GenderLabel::parse(parts[1])?;
    let age = AgeLabel::parse(parts[parts.len() - 1])?;
    Ok((gender, age))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_profiles: usize,
    pub class_counts: Vec<usize>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\nDataset Statistics:");
        println!(
            "  Total samples: {}",
            crate::utils::format_number(self.total_samples)
        );
        println!("  People: {}", self.num_profiles);
        println!("\n  Samples per class:");

        for (idx, &count) in self.class_counts.iter().enumerate() {
            let share = if self.total_samples > 0 {
                count as f64 / self.total_samples as f64
            } else {
                0.0
            };
            println!(
                "    {:2}. {:24} {:6} {}",
                idx,
                class_name(idx),
                count,
                crate::utils::format_progress_bar(share, 30)
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Write a fake dataset: each profile gets all seven photos
    pub(crate) fn write_fake_dataset(root: &Path, profiles: &[&str], size: u32) {
        let stems = [
            "mask1",
            "mask2",
            "mask3",
            "mask4",
            "mask5",
            "incorrect_mask",
            "normal",
        ];
        for (p, profile) in profiles.iter().enumerate() {
            let dir = root.join(profile);
            std::fs::create_dir_all(&dir).unwrap();
            for (s, stem) in stems.iter().enumerate() {
                let shade = ((p * 37 + s * 19) % 255) as u8;
                let img = RgbImage::from_fn(size, size, |x, y| {
                    Rgb([shade, (x * 8) as u8, (y * 8) as u8])
                });
                img.save(dir.join(format!("{}.png", stem))).unwrap();
            }
        }
    }

    #[test]
    fn test_parse_profile() {
        let (gender, age) = parse_profile("000123_female_Asian_45").unwrap();
        assert_eq!(gender, GenderLabel::Female);
        assert_eq!(age, AgeLabel::Middle);
        assert!(parse_profile("broken").is_err());
        assert!(parse_profile("1_unknown_Asian_20").is_err());
    }

    #[test]
    fn test_discovers_profiles_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), &["000001_male_Asian_20", "000002_female_Asian_65"], 4);
        // ignored entries
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join("000001_male_Asian_20").join("notes.txt"), "x").unwrap();

        let dataset = MaskDataset::new(dir.path()).unwrap();
        assert_eq!(dataset.len(), 14);
        assert_eq!(dataset.profiles().len(), 2);

        let stats = dataset.get_stats();
        // male <30 wearing: class 0, five photos
        assert_eq!(stats.class_counts[0], 5);
        // female >=60 not wearing: class 17
        assert_eq!(stats.class_counts[17], 1);
        // female >=60 incorrect: class 11
        assert_eq!(stats.class_counts[11], 1);
    }

    #[test]
    fn test_missing_dir() {
        let err = MaskDataset::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, MaskClassifierError::PathNotFound(_)));
    }

    #[test]
    fn test_estimate_statistics() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), &["000001_male_Asian_20"], 4);
        let mut dataset = MaskDataset::new(dir.path()).unwrap();
        dataset.estimate_statistics(3).unwrap();
        for c in 0..3 {
            assert!(dataset.mean[c] >= 0.0 && dataset.mean[c] <= 1.0);
            assert!(dataset.std[c] > 0.0);
        }
    }
}
