//! CNN Model Architectures for masked-face classification
//!
//! Two Burn CNNs: `MaskClassifier` (registered as `BaseModel`) and the
//! smaller `MaskClassifierLite` (`LiteModel`).

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::ImageClassifier;

/// Configuration for the MaskClassifier CNN model
#[derive(Config, Debug)]
pub struct MaskClassifierConfig {
    /// Number of output classes
    #[config(default = "18")]
    pub num_classes: usize,

    /// Dropout rate before the final layer
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Base number of convolutional filters
    #[config(default = "32")]
    pub base_filters: usize,
}

/// Conv2d, BatchNorm and ReLU; a downsampling block uses stride 2.
///
/// Downsampling stays in the convolution so the block works for any
/// `H x W`, including non-square inputs like the default 128x96.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        downsample: bool,
        device: &B::Device,
    ) -> Self {
        let stride = if downsample { 2 } else { 1 };
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

/// Mean over the spatial axes: `[batch, C, H, W]` → `[batch, C]`
fn global_average<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch_size, channels, _, _] = x.dims();
    x.mean_dim(3).mean_dim(2).reshape([batch_size, channels])
}

/// Default classifier
///
/// Architecture:
/// - 4 convolutional blocks (32 → 64 → 128 → 256 filters), each a stride-2
///   convolution that halves the spatial size
/// - Global average pooling, so any input resolution works
/// - Two fully connected layers with dropout in between
#[derive(Module, Debug)]
pub struct MaskClassifier<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    conv3: ConvBlock<B>,
    conv4: ConvBlock<B>,
    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> MaskClassifier<B> {
    pub fn new(config: &MaskClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        Self {
            conv1: ConvBlock::new(config.in_channels, base, true, device),
            conv2: ConvBlock::new(base, base * 2, true, device),
            conv3: ConvBlock::new(base * 2, base * 4, true, device),
            conv4: ConvBlock::new(base * 4, base * 8, true, device),
            fc1: LinearConfig::new(base * 8, 256).init(device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            fc2: LinearConfig::new(256, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// `[batch, 3, H, W]` → logits `[batch, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        let x = global_average(x);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }
}

impl<B: Backend> ImageClassifier<B> for MaskClassifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        MaskClassifier::forward(self, images)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Three conv blocks and a small head; fast enough for CPU runs
#[derive(Module, Debug)]
pub struct MaskClassifierLite<B: Backend> {
    block1: ConvBlock<B>,
    block2: ConvBlock<B>,
    block3: ConvBlock<B>,
    fc: Linear<B>,
    dropout: Dropout,
    classifier: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> MaskClassifierLite<B> {
    pub fn new(num_classes: usize, dropout_rate: f64, device: &B::Device) -> Self {
        Self {
            block1: ConvBlock::new(3, 16, true, device),
            block2: ConvBlock::new(16, 32, true, device),
            block3: ConvBlock::new(32, 64, false, device),
            fc: LinearConfig::new(64, 128).init(device),
            dropout: DropoutConfig::new(dropout_rate).init(),
            classifier: LinearConfig::new(128, num_classes).init(device),
            num_classes,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(x);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);

        let x = global_average(x);

        let x = self.fc.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.classifier.forward(x)
    }
}

impl<B: Backend> ImageClassifier<B> for MaskClassifierLite<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        MaskClassifierLite::forward(self, images)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_mask_classifier_output_shape() {
        let device = Default::default();
        let config = MaskClassifierConfig::new().with_base_filters(4);
        let model = MaskClassifier::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 16], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 18]);
        assert_eq!(ImageClassifier::num_classes(&model), 18);
    }

    #[test]
    fn test_downsampling_halves_each_side() {
        let device = Default::default();
        let block = ConvBlock::<TestBackend>::new(3, 4, true, &device);
        let output = block.forward(Tensor::zeros([1, 3, 16, 12], &device));
        assert_eq!(output.dims(), [1, 4, 8, 6]);

        let odd = block.forward(Tensor::zeros([1, 3, 7, 5], &device));
        assert_eq!(odd.dims(), [1, 4, 4, 3]);
    }

    #[test]
    fn test_backward_on_non_square_input() {
        use burn::backend::Autodiff;
        use burn::tensor::{Int, TensorData};

        type Train = Autodiff<TestBackend>;
        let device = Default::default();
        let images = Tensor::<Train, 4>::ones([2, 3, 16, 12], &device);
        let targets = Tensor::<Train, 1, Int>::from_data(TensorData::new(vec![0i64, 5], [2]), &device);

        let lite = MaskClassifierLite::<Train>::new(18, 0.3, &device);
        let loss = burn::nn::loss::CrossEntropyLossConfig::new()
            .init(&device)
            .forward(lite.forward(images.clone()), targets.clone());
        let grads = loss.backward();
        assert!(lite.classifier.weight.val().grad(&grads).is_some());

        let config = MaskClassifierConfig::new().with_base_filters(4);
        let base = MaskClassifier::<Train>::new(&config, &device);
        let loss = burn::nn::loss::CrossEntropyLossConfig::new()
            .init(&device)
            .forward(base.forward(Tensor::ones([2, 3, 32, 24], &device)), targets);
        let grads = loss.backward();
        assert!(base.fc2.weight.val().grad(&grads).is_some());
    }

    #[test]
    fn test_lite_output_shape() {
        let device = Default::default();
        let model = MaskClassifierLite::<TestBackend>::new(18, 0.5, &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 12], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [1, 18]);
    }
}
