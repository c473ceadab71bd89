//! Réseau à capsules pour la classification d'échographies en trois
//! catégories diagnostiques (benign / malignant / normal).
//!
//! Pipeline: extracteur convolutif avec blocs squeeze-excitation ->
//! capsules primaires -> routage dynamique par agreement -> normes des
//! capsules de classe comme scores.
//!
//! L'inférence est pure et sans état partagé: les logits de routage sont
//! réalloués et remis à zéro à chaque appel, les poids sont immuables après
//! chargement. Une même instance peut donc servir des requêtes concurrentes
//! sans verrou.

pub mod config;
pub mod error;
pub mod model;
pub mod preprocess;
pub mod weights;

pub use config::NetworkConfig;
pub use error::{ModelError, Result};
pub use model::{CapsNet, DynamicRouting, Prediction};
