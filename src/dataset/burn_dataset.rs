//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` trait and `Batcher` for the mask photos, plus
//! a small seeded batch loader that assembles batches lazily, one epoch at a
//! time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::ImageReader;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::augmentation::Transform;
use super::loader::MaskSample;
use crate::utils::error::{MaskClassifierError, Result};

/// A single photo ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaskItem {
    /// Image data as flattened CHW float array in `[0, 1]`
    pub image: Vec<f32>,
    /// Class label in `0..18`
    pub label: usize,
    /// Image path (for logging)
    pub path: String,
}

/// Lazily decoded photos implementing Burn's Dataset trait
#[derive(Debug)]
pub struct MaskBurnDataset {
    samples: Vec<(PathBuf, usize)>,
    transform: Transform,
    seed: u64,
    /// Number of random transforms drawn so far; each draw gets its own stream
    draws: AtomicU64,
}

impl MaskBurnDataset {
    pub fn new(samples: &[MaskSample], transform: Transform, seed: u64) -> Self {
        Self {
            samples: samples.iter().map(|s| (s.path.clone(), s.label)).collect(),
            transform,
            seed,
            draws: AtomicU64::new(0),
        }
    }

    /// Load and transform one photo, reporting decode failures
    pub fn load(&self, index: usize) -> Result<MaskItem> {
        let (path, label) = self.samples.get(index).ok_or_else(|| {
            MaskClassifierError::Dataset(format!(
                "index {} out of range ({} samples)",
                index,
                self.samples.len()
            ))
        })?;

        let img = ImageReader::open(path)
            .map_err(|e| MaskClassifierError::ImageLoadError(path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| MaskClassifierError::ImageLoadError(path.clone(), e.to_string()))?;

        let stream = if self.transform.is_random() {
            self.draws.fetch_add(1, Ordering::Relaxed)
        } else {
            0
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ stream.rotate_left(17));

        Ok(MaskItem {
            image: self.transform.apply(img, &mut rng),
            label: *label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

impl Dataset<MaskItem> for MaskBurnDataset {
    fn get(&self, index: usize) -> Option<MaskItem> {
        match self.load(index) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images and their class indices
#[derive(Clone, Debug)]
pub struct MaskBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> MaskBatch<B> {
    /// Check that images and labels agree on the batch dimension, returning it
    pub fn validate(&self) -> Result<usize> {
        let [n, _, _, _] = self.images.dims();
        let [m] = self.targets.dims();
        if n != m {
            return Err(MaskClassifierError::ShapeMismatch(format!(
                "batch has {} images but {} labels",
                n, m
            )));
        }
        if n == 0 {
            return Err(MaskClassifierError::ShapeMismatch(
                "empty batch".to_string(),
            ));
        }
        Ok(n)
    }
}

/// Stacks items into tensors and applies mean/std normalisation
#[derive(Clone, Debug)]
pub struct MaskBatcher<B: Backend> {
    device: B::Device,
    height: usize,
    width: usize,
    mean: [f32; 3],
    std: [f32; 3],
}

impl<B: Backend> MaskBatcher<B> {
    pub fn new(device: B::Device, (height, width): (u32, u32), mean: [f32; 3], std: [f32; 3]) -> Self {
        Self {
            device,
            height: height as usize,
            width: width as usize,
            mean,
            std,
        }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: Backend> Batcher<MaskItem, MaskBatch<B>> for MaskBatcher<B> {
    fn batch(&self, items: Vec<MaskItem>) -> MaskBatch<B> {
        let batch_size = items.len();

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, self.height, self.width]),
            &self.device,
        );

        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(self.mean.to_vec(), [1, 3, 1, 1]),
            &self.device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(self.std.to_vec(), [1, 3, 1, 1]),
            &self.device,
        );
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        MaskBatch { images, targets }
    }
}

/// Seeded, lazily assembled batches over a dataset
pub struct BatchLoader<D> {
    dataset: D,
    batch_size: usize,
    shuffle: Option<u64>,
    drop_last: bool,
}

impl<D: Dataset<MaskItem>> BatchLoader<D> {
    pub fn new(dataset: D, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle: None,
            drop_last: false,
        }
    }

    /// Reshuffle every epoch with a stream derived from `seed` and the epoch index
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = Some(seed);
        self
    }

    /// Skip the trailing partial batch
    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    /// Number of samples in the underlying dataset
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Sample order for `epoch`
    pub fn epoch_indices(&self, epoch: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
        }
        indices
    }

    /// Iterate the batches of one epoch. Images are read only when a batch is pulled.
    pub fn epoch_batches<'a, B: Backend>(
        &'a self,
        batcher: &'a MaskBatcher<B>,
        epoch: usize,
    ) -> impl ExactSizeIterator<Item = Result<MaskBatch<B>>> + 'a {
        let indices = self.epoch_indices(epoch);
        let mut chunks: Vec<Vec<usize>> = indices
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect();
        if self.drop_last {
            chunks.retain(|c| c.len() == self.batch_size);
        }

        chunks.into_iter().map(move |chunk| {
            let items = chunk
                .iter()
                .map(|&i| {
                    self.dataset.get(i).ok_or_else(|| {
                        MaskClassifierError::Dataset(format!("failed to load sample {}", i))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(batcher.batch(items))
        })
    }
}
