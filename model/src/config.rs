use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Configuration du réseau (géométrie figée au chargement)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// (canaux, hauteur, largeur) de l'image d'entrée
    pub input_shape: (usize, usize, usize),
    /// Canaux de sortie des trois blocs convolutifs
    pub feature_channels: [usize; 3],
    /// Strides des trois blocs convolutifs
    pub feature_strides: [usize; 3],
    /// Facteur de réduction des blocs squeeze-excitation
    pub se_reduction: usize,
    pub primary: CapsuleConfig,
    pub class_capsules: ClassCapsuleConfig,
    pub routing_iterations: usize,
    /// Noms de classes, dans l'ordre des capsules de sortie
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleConfig {
    pub num_capsules: usize,
    pub capsule_dim: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassCapsuleConfig {
    pub capsule_dim: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            input_shape: (1, 128, 128),
            feature_channels: [16, 32, 64],
            feature_strides: [1, 2, 2],
            se_reduction: 16,
            primary: CapsuleConfig {
                num_capsules: 8,
                capsule_dim: 8,
                kernel_size: 3,
                stride: 2,
                padding: 1,
            },
            class_capsules: ClassCapsuleConfig { capsule_dim: 16 },
            routing_iterations: 3,
            class_names: vec![
                "benign".to_string(),
                "malignant".to_string(),
                "normal".to_string(),
            ],
        }
    }
}

/// Sortie spatiale d'une convolution k3/p1
fn conv_out(side: usize, kernel: usize, stride: usize, padding: usize) -> usize {
    (side + 2 * padding - kernel) / stride + 1
}

impl NetworkConfig {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Côté de la carte de features en sortie de l'extracteur
    pub fn feature_map_side(&self) -> usize {
        let (_, h, _) = self.input_shape;
        self.feature_strides
            .iter()
            .fold(h, |side, &stride| conv_out(side, 3, stride, 1))
    }

    /// Grille spatiale des capsules primaires
    pub fn primary_grid_side(&self) -> usize {
        conv_out(
            self.feature_map_side(),
            self.primary.kernel_size,
            self.primary.stride,
            self.primary.padding,
        )
    }

    /// Nombre total de capsules primaires (types × positions spatiales)
    pub fn num_primary_capsules(&self) -> usize {
        let grid = self.primary_grid_side();
        self.primary.num_capsules * grid * grid
    }

    pub fn validate(&self) -> Result<()> {
        let (channels, height, width) = self.input_shape;
        if channels == 0 || height == 0 || width == 0 {
            return Err(ModelError::Config(
                "input_shape ne peut pas contenir de dimension nulle".into(),
            ));
        }
        if height != width {
            return Err(ModelError::Config(format!(
                "l'entrée doit être carrée, reçue {height}x{width}"
            )));
        }
        if self.class_names.is_empty() {
            return Err(ModelError::Config("class_names est vide".into()));
        }
        if self.primary.num_capsules == 0 || self.primary.capsule_dim == 0 {
            return Err(ModelError::Config(
                "les capsules primaires doivent avoir un nombre et une dimension non nuls".into(),
            ));
        }
        if self.class_capsules.capsule_dim == 0 {
            return Err(ModelError::Config(
                "les capsules de classe doivent avoir une dimension non nulle".into(),
            ));
        }
        if self.primary.stride == 0 {
            return Err(ModelError::Config("stride des capsules primaires nul".into()));
        }
        if self.se_reduction == 0 {
            return Err(ModelError::Config("se_reduction nul".into()));
        }
        for &c in &self.feature_channels {
            if c == 0 || c % self.se_reduction != 0 {
                return Err(ModelError::Config(format!(
                    "canaux de features {c} incompatibles avec se_reduction {}",
                    self.se_reduction
                )));
            }
        }
        for &s in &self.feature_strides {
            if s == 0 {
                return Err(ModelError::Config("stride de bloc convolutif nul".into()));
            }
        }
        let feature_side = self.feature_map_side();
        if self.primary.kernel_size > feature_side + 2 * self.primary.padding {
            return Err(ModelError::Config(format!(
                "noyau des capsules primaires ({}) plus grand que la carte de features ({feature_side})",
                self.primary.kernel_size
            )));
        }
        Ok(())
    }
}
