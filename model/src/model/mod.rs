pub mod attention;
pub mod capsule;
pub mod features;
pub mod layers;
pub mod network;
pub mod routing;

// Réexportations principales
pub use capsule::{ClassCapsLayer, PrimaryCapsLayer};
pub use layers::squash;
pub use network::{CapsNet, Prediction};
pub use routing::DynamicRouting;
