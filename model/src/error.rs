use thiserror::Error;

/// Erreurs du modèle et de son chargement
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("tenseur manquant dans le checkpoint: {0}")]
    MissingTensor(String),

    #[error("forme invalide pour `{name}`: attendue {expected:?}, reçue {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("type de données non supporté pour `{name}`: {dtype} (seul f32 est accepté)")]
    Dtype { name: String, dtype: String },

    #[error("checkpoint illisible: {0}")]
    Checkpoint(String),

    #[error("image invalide: {0}")]
    Image(String),

    #[error("configuration invalide: {0}")]
    Config(String),

    #[error("erreur E/S: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
