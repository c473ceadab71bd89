//! Génère un checkpoint de démonstration à poids aléatoires.
//!
//! Usage: `cargo run --bin init_weights [chemin]`
//! (chemin par défaut: weights/capsnet.safetensors)

use capsnet_model::{weights, CapsNet, NetworkConfig};

fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "weights/capsnet.safetensors".to_string());

    println!("🏗️  Génération d'un checkpoint de démonstration...");

    let config = NetworkConfig::default();
    let model = match CapsNet::random(config) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("❌ Construction impossible: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = weights::export_model(&model, &path) {
        eprintln!("❌ Écriture impossible: {e}");
        std::process::exit(1);
    }

    println!("✅ Checkpoint écrit: {path}");
    println!("   ⚠️  Poids aléatoires — uniquement pour tester la chaîne de service");
}
