use ndarray::{s, Array1, Array2, Array3, Array4, ArrayView3, ArrayView4, Axis};
use rayon::prelude::*;

/// Epsilon de stabilité numérique du squash
pub const SQUASH_EPS: f32 = 1e-8;

/// Couche de convolution (inférence seule)
pub struct ConvLayer {
    /// Poids [out_channels, in_channels, k, k]
    pub weights: Array4<f32>,
    pub bias: Option<Array1<f32>>,
    pub stride: usize,
    pub padding: usize,
}

impl ConvLayer {
    pub fn new(weights: Array4<f32>, bias: Option<Array1<f32>>, stride: usize, padding: usize) -> Self {
        Self {
            weights,
            bias,
            stride,
            padding,
        }
    }

    pub fn out_channels(&self) -> usize {
        self.weights.dim().0
    }

    pub fn forward(&self, input: &ArrayView4<f32>) -> Array4<f32> {
        let (batch_size, in_channels, in_height, in_width) = input.dim();
        let (out_channels, _, kernel_size, _) = self.weights.dim();

        let out_height = (in_height + 2 * self.padding - kernel_size) / self.stride + 1;
        let out_width = (in_width + 2 * self.padding - kernel_size) / self.stride + 1;

        let mut output = Array4::zeros((batch_size, out_channels, out_height, out_width));

        let padded = if self.padding > 0 {
            self.pad_input(input)
        } else {
            input.to_owned()
        };

        // Convolution parallélisée par batch
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(b, mut out_batch)| {
                let input_batch = padded.index_axis(Axis(0), b);

                for oc in 0..out_channels {
                    let bias = self.bias.as_ref().map_or(0.0, |bias| bias[oc]);

                    for oh in 0..out_height {
                        for ow in 0..out_width {
                            let mut sum = 0.0;

                            let ih_start = oh * self.stride;
                            let iw_start = ow * self.stride;

                            for ic in 0..in_channels {
                                for kh in 0..kernel_size {
                                    for kw in 0..kernel_size {
                                        sum += input_batch[[ic, ih_start + kh, iw_start + kw]]
                                            * self.weights[[oc, ic, kh, kw]];
                                    }
                                }
                            }

                            out_batch[[oc, oh, ow]] = sum + bias;
                        }
                    }
                }
            });

        output
    }

    fn pad_input(&self, input: &ArrayView4<f32>) -> Array4<f32> {
        let (batch_size, channels, height, width) = input.dim();
        let p = self.padding;

        let mut padded = Array4::zeros((batch_size, channels, height + 2 * p, width + 2 * p));

        for b in 0..batch_size {
            for c in 0..channels {
                padded
                    .slice_mut(s![b, c, p..height + p, p..width + p])
                    .assign(&input.slice(s![b, c, .., ..]));
            }
        }

        padded
    }
}

/// Normalisation par batch en mode inférence (statistiques figées)
pub struct BatchNorm2d {
    pub gamma: Array1<f32>,
    pub beta: Array1<f32>,
    pub running_mean: Array1<f32>,
    pub running_var: Array1<f32>,
    pub eps: f32,
}

impl BatchNorm2d {
    pub fn new(
        gamma: Array1<f32>,
        beta: Array1<f32>,
        running_mean: Array1<f32>,
        running_var: Array1<f32>,
    ) -> Self {
        Self {
            gamma,
            beta,
            running_mean,
            running_var,
            eps: 1e-5,
        }
    }

    pub fn forward(&self, input: &ArrayView4<f32>) -> Array4<f32> {
        let (batch_size, channels, height, width) = input.dim();
        let mut output = Array4::zeros(input.dim());

        // Échelle et décalage par canal, précalculés
        let mut scale = Array1::zeros(channels);
        let mut shift = Array1::zeros(channels);
        for c in 0..channels {
            let inv_std = 1.0 / (self.running_var[c] + self.eps).sqrt();
            scale[c] = self.gamma[c] * inv_std;
            shift[c] = self.beta[c] - self.running_mean[c] * scale[c];
        }

        for b in 0..batch_size {
            for c in 0..channels {
                for h in 0..height {
                    for w in 0..width {
                        output[[b, c, h, w]] = input[[b, c, h, w]] * scale[c] + shift[c];
                    }
                }
            }
        }

        output
    }
}

/// Couche dense
pub struct Linear {
    /// Poids [out_features, in_features]
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Linear {
    pub fn new(weights: Array2<f32>, bias: Array1<f32>) -> Self {
        Self { weights, bias }
    }

    pub fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        let (out_features, in_features) = self.weights.dim();
        let mut output = Array1::zeros(out_features);

        for o in 0..out_features {
            let mut sum = 0.0;
            for i in 0..in_features {
                sum += self.weights[[o, i]] * input[i];
            }
            output[o] = sum + self.bias[o];
        }

        output
    }
}

pub fn relu4(x: &Array4<f32>) -> Array4<f32> {
    x.mapv(|v| v.max(0.0))
}

pub fn relu1(x: &Array1<f32>) -> Array1<f32> {
    x.mapv(|v| v.max(0.0))
}

pub fn sigmoid1(x: &Array1<f32>) -> Array1<f32> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Fonction squash: ramène la norme de chaque vecteur capsule dans [0, 1)
/// en préservant sa direction. Le vecteur nul reste nul.
pub fn squash(vectors: &ArrayView3<f32>) -> Array3<f32> {
    let (batch_size, num_capsules, capsule_dim) = vectors.dim();
    let mut result = vectors.to_owned();

    for b in 0..batch_size {
        for cap in 0..num_capsules {
            let mut norm_squared = 0.0;

            for d in 0..capsule_dim {
                let val = vectors[[b, cap, d]];
                norm_squared += val * val;
            }

            let norm = norm_squared.sqrt();
            let factor = (norm_squared / (1.0 + norm_squared)) / (norm + SQUASH_EPS);

            for d in 0..capsule_dim {
                result[[b, cap, d]] = vectors[[b, cap, d]] * factor;
            }
        }
    }

    result
}
