use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Axis};
use rand::Rng;
use rayon::prelude::*;

use super::layers::{squash, ConvLayer};
use super::routing::DynamicRouting;

/// Couche de capsules primaires
///
/// Une convolution produit num_capsules × capsule_dim canaux; la sortie est
/// aplatie en une séquence de vecteurs capsules puis passée au squash.
pub struct PrimaryCapsLayer {
    pub conv: ConvLayer,
    pub num_capsules: usize,
    pub capsule_dim: usize,
}

impl PrimaryCapsLayer {
    pub fn new(conv: ConvLayer, num_capsules: usize, capsule_dim: usize) -> Self {
        Self {
            conv,
            num_capsules,
            capsule_dim,
        }
    }

    /// [batch, canaux, h, w] -> [batch, num_capsules × h' × w', capsule_dim]
    ///
    /// Ordre d'aplatissement: type de capsule majeur, position spatiale
    /// (h·largeur + w) mineur. Le même ordre indexe le premier axe des poids
    /// de transformation de la couche suivante.
    pub fn forward(&self, input: &ArrayView4<f32>) -> Array3<f32> {
        let conv_output = self.conv.forward(input);
        let (batch_size, _, out_height, out_width) = conv_output.dim();
        let spatial = out_height * out_width;

        let mut capsules = Array3::zeros((
            batch_size,
            self.num_capsules * spatial,
            self.capsule_dim,
        ));

        for b in 0..batch_size {
            for cap in 0..self.num_capsules {
                for d in 0..self.capsule_dim {
                    let channel = cap * self.capsule_dim + d;
                    for h in 0..out_height {
                        for w in 0..out_width {
                            let spatial_idx = h * out_width + w;
                            capsules[[b, cap * spatial + spatial_idx, d]] =
                                conv_output[[b, channel, h, w]];
                        }
                    }
                }
            }
        }

        squash(&capsules.view())
    }
}

/// Couche de capsules de classe: votes û_j|i = W_ij · u_i puis routage dynamique
pub struct ClassCapsLayer {
    pub routing: DynamicRouting,
    pub num_classes: usize,
    pub capsule_dim: usize,
    /// Poids de transformation [capsules primaires, classes, dim sortie, dim entrée]
    pub weights: Array4<f32>,
}

impl ClassCapsLayer {
    pub fn new(weights: Array4<f32>, routing_iterations: usize) -> Self {
        let (_, num_classes, capsule_dim, _) = weights.dim();
        Self {
            routing: DynamicRouting::new(routing_iterations),
            num_classes,
            capsule_dim,
            weights,
        }
    }

    /// Initialisation aléatoire à petite échelle, pour les tests et les démos
    pub fn random(
        input_capsules: usize,
        input_dim: usize,
        num_classes: usize,
        capsule_dim: usize,
        routing_iterations: usize,
    ) -> Self {
        let mut weights = Array4::zeros((input_capsules, num_classes, capsule_dim, input_dim));

        let mut rng = rand::rng();
        for i in 0..input_capsules {
            for j in 0..num_classes {
                for k in 0..capsule_dim {
                    for l in 0..input_dim {
                        weights[[i, j, k, l]] = (rng.random::<f32>() - 0.5) * 0.01;
                    }
                }
            }
        }

        Self::new(weights, routing_iterations)
    }

    /// [batch, capsules primaires, dim entrée] -> [batch, classes, dim sortie]
    pub fn forward(&self, primary_capsules: &ArrayView3<f32>) -> Array3<f32> {
        let votes = self.votes(primary_capsules);
        self.routing.route(&votes.view())
    }

    /// Votes û_j|i, calculés une fois par appel et réutilisés par toutes les
    /// itérations de routage
    pub fn votes(&self, primary_capsules: &ArrayView3<f32>) -> Array4<f32> {
        let (batch_size, input_caps, input_dim) = primary_capsules.dim();

        let mut votes = Array4::zeros((batch_size, input_caps, self.num_classes, self.capsule_dim));

        votes
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut votes_batch)| {
                for ic in 0..input_caps {
                    for class in 0..self.num_classes {
                        for k in 0..self.capsule_dim {
                            let mut sum = 0.0;
                            for l in 0..input_dim {
                                sum += self.weights[[ic, class, k, l]]
                                    * primary_capsules[[b, ic, l]];
                            }
                            votes_batch[[ic, class, k]] = sum;
                        }
                    }
                }
            });

        votes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn primary_layer() -> PrimaryCapsLayer {
        // 2 capsules de dim 4 sur une carte 2 canaux 8x8, stride 2
        let conv = ConvLayer::new(Array4::from_elem((8, 2, 3, 3), 0.05), None, 2, 1);
        PrimaryCapsLayer::new(conv, 2, 4)
    }

    #[test]
    fn test_primary_capsules_shape() {
        let layer = primary_layer();
        let input = Array4::ones((2, 2, 8, 8));

        let capsules = layer.forward(&input.view());

        // grille 4x4 -> 2 * 16 capsules
        assert_eq!(capsules.dim(), (2, 32, 4));
    }

    #[test]
    fn test_primary_capsules_are_squashed() {
        let layer = primary_layer();
        let input = Array4::from_elem((1, 2, 8, 8), 50.0_f32);

        let capsules = layer.forward(&input.view());

        for cap in 0..32 {
            let norm: f32 = (0..4)
                .map(|d| capsules[[0, cap, d]].powi(2))
                .sum::<f32>()
                .sqrt();
            assert!(norm < 1.0);
        }
    }

    #[test]
    fn test_class_capsules_shape() {
        let layer = ClassCapsLayer::random(32, 4, 3, 16, 3);
        let primary = Array3::from_elem((2, 32, 4), 0.1_f32);

        let output = layer.forward(&primary.view());

        assert_eq!(output.dim(), (2, 3, 16));
    }

    #[test]
    fn test_votes_linear_in_input() {
        // û = W·u: doubler u double les votes
        let layer = ClassCapsLayer::random(8, 4, 2, 6, 1);
        let primary = Array3::from_elem((1, 8, 4), 0.2_f32);
        let doubled = Array3::from_elem((1, 8, 4), 0.4_f32);

        let votes = layer.votes(&primary.view());
        let votes_doubled = layer.votes(&doubled.view());

        for (v, v2) in votes.iter().zip(votes_doubled.iter()) {
            assert!((v2 - 2.0 * v).abs() < 1e-6);
        }
    }

    #[test]
    fn test_geometry_from_weights() {
        let layer = ClassCapsLayer::new(Array4::zeros((128, 3, 16, 8)), 3);
        assert_eq!(layer.num_classes, 3);
        assert_eq!(layer.capsule_dim, 16);
    }
}
