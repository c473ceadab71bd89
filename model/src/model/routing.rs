use ndarray::{Array3, ArrayView3, ArrayView4, Axis};
use rayon::prelude::*;

use super::layers::squash;

/// Routage dynamique par agreement entre capsules primaires et capsules de classe
pub struct DynamicRouting {
    pub num_iterations: usize,
}

impl DynamicRouting {
    pub fn new(num_iterations: usize) -> Self {
        Self { num_iterations }
    }

    /// Routage avec retour des coefficients de couplage.
    ///
    /// `votes`: prédictions û_j|i de forme [batch, capsules primaires, classes, dim].
    /// Retourne les poses de classe [batch, classes, dim] et les coefficients
    /// de couplage [batch, capsules primaires, classes].
    ///
    /// Les logits b_ij sont remis à zéro à chaque appel: aucun état ne
    /// survit d'une image à l'autre.
    pub fn route_with_coeffs(&self, votes: &ArrayView4<f32>) -> (Array3<f32>, Array3<f32>) {
        let (batch_size, input_caps, num_classes, _dim) = votes.dim();

        let mut logits = Array3::zeros((batch_size, input_caps, num_classes));
        // softmax(0) = couplage uniforme 1/num_classes
        let mut coupling = self.softmax_classes(&logits.view());

        // Raffinement itératif: la dernière itération n'a pas besoin de
        // mettre à jour les logits, son couplage est déjà fixé.
        for _ in 1..self.num_iterations {
            let outputs = self.weighted_sum(votes, &coupling.view());
            let squashed = squash(&outputs.view());
            self.update_logits(votes, &squashed.view(), &mut logits);
            coupling = self.softmax_classes(&logits.view());
        }

        let outputs = self.weighted_sum(votes, &coupling.view());
        let final_squashed = squash(&outputs.view());

        (final_squashed, coupling)
    }

    /// Version simple sans coefficients
    pub fn route(&self, votes: &ArrayView4<f32>) -> Array3<f32> {
        let (outputs, _) = self.route_with_coeffs(votes);
        outputs
    }

    /// Softmax sur l'axe des classes: pour chaque capsule primaire,
    /// les coefficients sur les classes somment à 1.
    fn softmax_classes(&self, logits: &ArrayView3<f32>) -> Array3<f32> {
        let (_batch_size, input_caps, num_classes) = logits.dim();
        let mut result = Array3::zeros(logits.dim());

        result
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut result_batch)| {
                for ic in 0..input_caps {
                    // Soustraction du max pour la stabilité numérique
                    let mut max_val = f32::NEG_INFINITY;
                    for class in 0..num_classes {
                        max_val = max_val.max(logits[[b, ic, class]]);
                    }

                    let mut exp_sum = 0.0;
                    let mut exp_vals = vec![0.0; num_classes];

                    for class in 0..num_classes {
                        let exp_val = (logits[[b, ic, class]] - max_val).exp();
                        exp_vals[class] = exp_val;
                        exp_sum += exp_val;
                    }

                    for class in 0..num_classes {
                        result_batch[[ic, class]] = exp_vals[class] / (exp_sum + 1e-8);
                    }
                }
            });

        result
    }

    /// Somme des votes pondérée par le couplage: s_j = Σ_i c_ij · û_j|i
    fn weighted_sum(&self, votes: &ArrayView4<f32>, coupling: &ArrayView3<f32>) -> Array3<f32> {
        let (batch_size, input_caps, num_classes, dim) = votes.dim();
        let mut outputs = Array3::zeros((batch_size, num_classes, dim));

        outputs
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut output_batch)| {
                for class in 0..num_classes {
                    for d in 0..dim {
                        let mut sum = 0.0;

                        for ic in 0..input_caps {
                            sum += coupling[[b, ic, class]] * votes[[b, ic, class, d]];
                        }

                        output_batch[[class, d]] = sum;
                    }
                }
            });

        outputs
    }

    /// Mise à jour des logits par agreement: b_ij += û_j|i · v_j
    fn update_logits(
        &self,
        votes: &ArrayView4<f32>,
        outputs: &ArrayView3<f32>,
        logits: &mut Array3<f32>,
    ) {
        let (_batch_size, input_caps, num_classes, dim) = votes.dim();

        logits
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut logits_batch)| {
                for ic in 0..input_caps {
                    for class in 0..num_classes {
                        let mut agreement = 0.0;

                        for d in 0..dim {
                            agreement += votes[[b, ic, class, d]] * outputs[[b, class, d]];
                        }

                        logits_batch[[ic, class]] += agreement;
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    /// Votes pseudo-aléatoires déterministes, non dégénérés
    fn synthetic_votes(batch: usize, input_caps: usize, classes: usize, dim: usize) -> Array4<f32> {
        let mut votes = Array4::zeros((batch, input_caps, classes, dim));
        for b in 0..batch {
            for ic in 0..input_caps {
                for class in 0..classes {
                    for d in 0..dim {
                        let k = (b * 7919 + ic * 31 + class * 17 + d * 7) % 23;
                        votes[[b, ic, class, d]] = k as f32 / 23.0 - 0.5;
                    }
                }
            }
        }
        votes
    }

    #[test]
    fn test_routing_dimensions() {
        let routing = DynamicRouting::new(3);
        let votes = Array4::ones((2, 128, 3, 16));

        let output = routing.route(&votes.view());

        assert_eq!(output.dim(), (2, 3, 16));
    }

    #[test]
    fn test_coupling_sums_to_one() {
        let routing = DynamicRouting::new(4);
        let votes = synthetic_votes(2, 32, 3, 8);

        let (_, coupling) = routing.route_with_coeffs(&votes.view());

        for b in 0..2 {
            for ic in 0..32 {
                let sum: f32 = (0..3).map(|class| coupling[[b, ic, class]]).sum();
                assert!((sum - 1.0).abs() < 1e-5, "somme {sum}");
            }
        }
    }

    #[test]
    fn test_routing_deterministic() {
        let routing = DynamicRouting::new(3);
        let votes = synthetic_votes(1, 64, 3, 16);

        let first = routing.route(&votes.view());
        let second = routing.route(&votes.view());

        // Aucun état entre deux appels: sorties identiques bit à bit
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_iterations_uniform_coupling() {
        // T=0: une seule passe avec couplage uniforme 1/num_classes
        let routing = DynamicRouting::new(0);
        let votes = synthetic_votes(1, 16, 3, 8);

        let (output, coupling) = routing.route_with_coeffs(&votes.view());

        for ic in 0..16 {
            for class in 0..3 {
                assert!((coupling[[0, ic, class]] - 1.0 / 3.0).abs() < 1e-5);
            }
        }

        // Équivalent au squash de la moyenne uniforme des votes
        let mut expected = Array3::zeros((1, 3, 8));
        for class in 0..3 {
            for d in 0..8 {
                let mut sum = 0.0;
                for ic in 0..16 {
                    sum += votes[[0, ic, class, d]] / 3.0;
                }
                expected[[0, class, d]] = sum;
            }
        }
        let expected = squash(&expected.view());

        for class in 0..3 {
            for d in 0..8 {
                assert!((output[[0, class, d]] - expected[[0, class, d]]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_single_iteration_matches_zero() {
        // T=1 ne raffine pas les logits: même sortie que T=0
        let votes = synthetic_votes(1, 16, 3, 8);

        let zero = DynamicRouting::new(0).route(&votes.view());
        let one = DynamicRouting::new(1).route(&votes.view());

        assert_eq!(zero, one);
    }

    #[test]
    fn test_more_iterations_sharpen_coupling() {
        let votes = synthetic_votes(1, 48, 3, 8);

        let mean_max = |iterations: usize| -> f32 {
            let routing = DynamicRouting::new(iterations);
            let (_, coupling) = routing.route_with_coeffs(&votes.view());
            let mut total = 0.0;
            for ic in 0..48 {
                let mut max_c = 0.0_f32;
                for class in 0..3 {
                    max_c = max_c.max(coupling[[0, ic, class]]);
                }
                total += max_c;
            }
            total / 48.0
        };

        // Le raffinement concentre le couplage sur les classes en accord
        let sharp_1 = mean_max(1);
        let sharp_5 = mean_max(5);
        assert!((sharp_1 - 1.0 / 3.0).abs() < 1e-5);
        assert!(sharp_5 > sharp_1, "T=5 ({sharp_5}) <= T=1 ({sharp_1})");
    }

    #[test]
    fn test_output_shape_independent_of_input_caps() {
        let routing = DynamicRouting::new(3);

        for input_caps in [8, 64, 2048] {
            let votes = Array4::ones((1, input_caps, 3, 16));
            let output = routing.route(&votes.view());
            assert_eq!(output.dim(), (1, 3, 16));
        }
    }
}
