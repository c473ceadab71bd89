use ndarray::{Array1, Array2, Array3, Array4, ArrayView4};
use rand::Rng;

use crate::config::NetworkConfig;
use crate::error::{ModelError, Result};

use super::attention::SEBlock;
use super::capsule::{ClassCapsLayer, PrimaryCapsLayer};
use super::features::{ConvBlock, FeatureExtractor};
use super::layers::{BatchNorm2d, ConvLayer, Linear};

/// Prédiction pour une image
#[derive(Debug, Clone)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    /// Normes des capsules de classe, dans l'ordre de `class_names`
    pub scores: Vec<f32>,
}

/// Réseau complet: extracteur de features -> capsules primaires -> capsules
/// de classe -> normes par classe
///
/// Tous les poids sont immuables après construction; `forward` est pur et
/// peut être appelé depuis plusieurs threads sur la même instance.
pub struct CapsNet {
    pub config: NetworkConfig,
    pub features: FeatureExtractor,
    pub primary: PrimaryCapsLayer,
    pub class_caps: ClassCapsLayer,
}

impl CapsNet {
    /// Assemble le réseau et vérifie la cohérence entre la configuration et
    /// les formes effectives des poids. Toute incohérence est fatale ici,
    /// jamais différée à l'inférence.
    pub fn from_parts(
        config: NetworkConfig,
        features: FeatureExtractor,
        primary: PrimaryCapsLayer,
        class_caps: ClassCapsLayer,
    ) -> Result<Self> {
        config.validate()?;

        let feature_channels = *config.feature_channels.last().unwrap_or(&0);
        if features.out_channels() != feature_channels {
            return Err(ModelError::Config(format!(
                "l'extracteur produit {} canaux, {} attendus",
                features.out_channels(),
                feature_channels
            )));
        }

        let expected_primary_out = config.primary.num_capsules * config.primary.capsule_dim;
        let primary_conv_shape = primary.conv.weights.dim();
        if primary_conv_shape.0 != expected_primary_out || primary_conv_shape.1 != feature_channels
        {
            return Err(ModelError::ShapeMismatch {
                name: "primary.conv.weight".into(),
                expected: vec![
                    expected_primary_out,
                    feature_channels,
                    config.primary.kernel_size,
                    config.primary.kernel_size,
                ],
                actual: vec![
                    primary_conv_shape.0,
                    primary_conv_shape.1,
                    primary_conv_shape.2,
                    primary_conv_shape.3,
                ],
            });
        }

        let weights_shape = class_caps.weights.dim();
        let expected = (
            config.num_primary_capsules(),
            config.num_classes(),
            config.class_capsules.capsule_dim,
            config.primary.capsule_dim,
        );
        if weights_shape != expected {
            return Err(ModelError::ShapeMismatch {
                name: "class_caps.weight".into(),
                expected: vec![expected.0, expected.1, expected.2, expected.3],
                actual: vec![
                    weights_shape.0,
                    weights_shape.1,
                    weights_shape.2,
                    weights_shape.3,
                ],
            });
        }

        Ok(Self {
            config,
            features,
            primary,
            class_caps,
        })
    }

    /// Réseau à poids aléatoires (échelle 0.01), pour les tests et les démos
    pub fn random(config: NetworkConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = rand::rng();
        let mut small = move || (rng.random::<f32>() - 0.5) * 0.01;

        let (in_channels, _, _) = config.input_shape;
        let mut blocks = Vec::new();
        let mut previous = in_channels;

        for (i, &channels) in config.feature_channels.iter().enumerate() {
            let conv_weights =
                Array4::from_shape_simple_fn((channels, previous, 3, 3), &mut small);
            let hidden = channels / config.se_reduction;

            blocks.push(ConvBlock {
                conv: ConvLayer::new(conv_weights, None, config.feature_strides[i], 1),
                bn: BatchNorm2d::new(
                    Array1::ones(channels),
                    Array1::zeros(channels),
                    Array1::zeros(channels),
                    Array1::ones(channels),
                ),
                se: SEBlock::new(
                    Linear::new(
                        Array2::from_shape_simple_fn((hidden, channels), &mut small),
                        Array1::zeros(hidden),
                    ),
                    Linear::new(
                        Array2::from_shape_simple_fn((channels, hidden), &mut small),
                        Array1::zeros(channels),
                    ),
                ),
            });
            previous = channels;
        }

        let primary_out = config.primary.num_capsules * config.primary.capsule_dim;
        let primary = PrimaryCapsLayer::new(
            ConvLayer::new(
                Array4::from_shape_simple_fn(
                    (
                        primary_out,
                        previous,
                        config.primary.kernel_size,
                        config.primary.kernel_size,
                    ),
                    &mut small,
                ),
                Some(Array1::zeros(primary_out)),
                config.primary.stride,
                config.primary.padding,
            ),
            config.primary.num_capsules,
            config.primary.capsule_dim,
        );

        let class_caps = ClassCapsLayer::random(
            config.num_primary_capsules(),
            config.primary.capsule_dim,
            config.num_classes(),
            config.class_capsules.capsule_dim,
            config.routing_iterations,
        );

        Self::from_parts(config, FeatureExtractor::new(blocks), primary, class_caps)
    }

    fn check_input(&self, input: &ArrayView4<f32>) -> Result<()> {
        let (_, channels, height, width) = input.dim();
        let (expected_c, expected_h, expected_w) = self.config.input_shape;
        if channels != expected_c || height != expected_h || width != expected_w {
            return Err(ModelError::Config(format!(
                "entrée {channels}x{height}x{width}, attendue {expected_c}x{expected_h}x{expected_w}"
            )));
        }
        Ok(())
    }

    /// Poses des capsules de classe, [batch, classes, dim]
    pub fn class_poses(&self, input: &ArrayView4<f32>) -> Result<Array3<f32>> {
        self.check_input(input)?;

        let features = self.features.forward(input);
        let primary = self.primary.forward(&features.view());
        Ok(self.class_caps.forward(&primary.view()))
    }

    /// Scores par classe (normes des capsules), [batch, classes]
    pub fn forward(&self, input: &ArrayView4<f32>) -> Result<Array2<f32>> {
        let poses = self.class_poses(input)?;
        let (batch_size, num_classes, dim) = poses.dim();

        let mut scores = Array2::zeros((batch_size, num_classes));
        for b in 0..batch_size {
            for class in 0..num_classes {
                let mut norm_sq = 0.0;
                for d in 0..dim {
                    let val = poses[[b, class, d]];
                    norm_sq += val * val;
                }
                scores[[b, class]] = norm_sq.sqrt();
            }
        }

        Ok(scores)
    }

    /// Classe prédite par image, avec les scores bruts
    pub fn predict(&self, input: &ArrayView4<f32>) -> Result<Vec<Prediction>> {
        let scores = self.forward(input)?;
        let (batch_size, num_classes) = scores.dim();

        let mut predictions = Vec::with_capacity(batch_size);
        for b in 0..batch_size {
            let row: Vec<f32> = (0..num_classes).map(|class| scores[[b, class]]).collect();
            let class_index = argmax(&row);

            predictions.push(Prediction {
                class_index,
                label: self.config.class_names[class_index].clone(),
                scores: row,
            });
        }

        Ok(predictions)
    }
}

/// Argmax stable: en cas d'égalité, l'indice le plus bas gagne
fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = scores[0];

    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > best_score {
            best = i;
            best_score = score;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapsuleConfig, ClassCapsuleConfig};
    use ndarray::Array4;

    /// Géométrie réduite pour des tests rapides (entrée 32x32)
    fn tiny_config() -> NetworkConfig {
        NetworkConfig {
            input_shape: (1, 32, 32),
            feature_channels: [4, 4, 8],
            feature_strides: [1, 2, 2],
            se_reduction: 4,
            primary: CapsuleConfig {
                num_capsules: 2,
                capsule_dim: 4,
                kernel_size: 3,
                stride: 2,
                padding: 1,
            },
            class_capsules: ClassCapsuleConfig { capsule_dim: 8 },
            routing_iterations: 3,
            class_names: vec!["benign".into(), "malignant".into(), "normal".into()],
        }
    }

    #[test]
    fn test_argmax_tie_breaks_to_lowest_index() {
        assert_eq!(argmax(&[0.5, 0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1, 0.7, 0.7]), 1);
        assert_eq!(argmax(&[0.1, 0.2, 0.9]), 2);
    }

    #[test]
    fn test_forward_scores_shape() {
        let model = CapsNet::random(tiny_config()).unwrap();
        let input = Array4::zeros((2, 1, 32, 32));

        let scores = model.forward(&input.view()).unwrap();

        assert_eq!(scores.dim(), (2, 3));
        for v in scores.iter() {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn test_predict_maps_labels() {
        let model = CapsNet::random(tiny_config()).unwrap();
        let input = Array4::from_elem((1, 1, 32, 32), 0.3_f32);

        let predictions = model.predict(&input.view()).unwrap();

        assert_eq!(predictions.len(), 1);
        let prediction = &predictions[0];
        assert_eq!(
            prediction.label,
            model.config.class_names[prediction.class_index]
        );
        assert_eq!(prediction.scores.len(), 3);
    }

    #[test]
    fn test_rejects_wrong_input_size() {
        let model = CapsNet::random(tiny_config()).unwrap();
        let input = Array4::zeros((1, 1, 64, 64));

        assert!(model.forward(&input.view()).is_err());
    }

    #[test]
    fn test_rejects_mismatched_class_weights() {
        let config = tiny_config();
        let reference = CapsNet::random(config.clone()).unwrap();

        // Poids de transformation avec un mauvais nombre de capsules primaires
        let bad_caps = ClassCapsLayer::random(
            config.num_primary_capsules() / 2,
            config.primary.capsule_dim,
            config.num_classes(),
            config.class_capsules.capsule_dim,
            config.routing_iterations,
        );

        let result = CapsNet::from_parts(
            config,
            reference.features,
            reference.primary,
            bad_caps,
        );
        assert!(matches!(
            result,
            Err(ModelError::ShapeMismatch { .. })
        ));
    }
}
