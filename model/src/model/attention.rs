use ndarray::{Array1, Array4, ArrayView4};

use super::layers::{relu1, sigmoid1, Linear};

/// Bloc squeeze-excitation: repondère chaque canal selon son activation
/// moyenne globale
pub struct SEBlock {
    pub fc1: Linear,
    pub fc2: Linear,
}

impl SEBlock {
    pub fn new(fc1: Linear, fc2: Linear) -> Self {
        Self { fc1, fc2 }
    }

    pub fn forward(&self, input: &ArrayView4<f32>) -> Array4<f32> {
        let (batch_size, channels, height, width) = input.dim();
        let mut output = Array4::zeros(input.dim());
        let area = (height * width) as f32;

        for b in 0..batch_size {
            // Squeeze: moyenne globale par canal
            let mut pooled = Array1::zeros(channels);
            for c in 0..channels {
                let mut sum = 0.0;
                for h in 0..height {
                    for w in 0..width {
                        sum += input[[b, c, h, w]];
                    }
                }
                pooled[c] = sum / area;
            }

            // Excitation: fc1 -> ReLU -> fc2 -> sigmoïde
            let hidden = relu1(&self.fc1.forward(&pooled));
            let gates = sigmoid1(&self.fc2.forward(&hidden));

            for c in 0..channels {
                let gate = gates[c];
                for h in 0..height {
                    for w in 0..width {
                        output[[b, c, h, w]] = input[[b, c, h, w]] * gate;
                    }
                }
            }
        }

        output
    }
}
