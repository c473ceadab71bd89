use ndarray::{Array4, ArrayView4};

use super::attention::SEBlock;
use super::layers::{relu4, BatchNorm2d, ConvLayer};

/// Bloc convolutif: conv (sans biais) -> batchnorm -> ReLU -> squeeze-excitation
pub struct ConvBlock {
    pub conv: ConvLayer,
    pub bn: BatchNorm2d,
    pub se: SEBlock,
}

impl ConvBlock {
    pub fn forward(&self, input: &ArrayView4<f32>) -> Array4<f32> {
        let features = self.conv.forward(input);
        let normalized = self.bn.forward(&features.view());
        let activated = relu4(&normalized);
        self.se.forward(&activated.view())
    }
}

/// Extracteur de features: trois blocs convolutifs, 1 -> 16 -> 32 -> 64 canaux,
/// résolution 128 -> 128 -> 64 -> 32
pub struct FeatureExtractor {
    pub blocks: Vec<ConvBlock>,
}

impl FeatureExtractor {
    pub fn new(blocks: Vec<ConvBlock>) -> Self {
        Self { blocks }
    }

    pub fn forward(&self, input: &ArrayView4<f32>) -> Array4<f32> {
        let mut output = input.to_owned();

        for block in &self.blocks {
            output = block.forward(&output.view());
        }

        output
    }

    pub fn out_channels(&self) -> usize {
        self.blocks
            .last()
            .map(|block| block.conv.out_channels())
            .unwrap_or(0)
    }
}
