use std::path::PathBuf;

/// Configuration du serveur, lue dans l'environnement au démarrage.
///
/// Variables reconnues:
///   CAPSNET_HOST                (défaut: 0.0.0.0)
///   CAPSNET_PORT                (défaut: 8080)
///   CAPSNET_WEIGHTS             (défaut: weights/capsnet.safetensors)
///   CAPSNET_STATIC_DIR          (défaut: static)
///   CAPSNET_LOG_LEVEL           (défaut: info)
///   CAPSNET_ROUTING_ITERATIONS  (défaut: 3)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub weights_path: PathBuf,
    pub static_dir: PathBuf,
    pub log_level: String,
    pub routing_iterations: usize,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or("CAPSNET_HOST", "0.0.0.0"),
            port: env_or("CAPSNET_PORT", "8080").parse().unwrap_or(8080),
            weights_path: PathBuf::from(env_or(
                "CAPSNET_WEIGHTS",
                "weights/capsnet.safetensors",
            )),
            static_dir: PathBuf::from(env_or("CAPSNET_STATIC_DIR", "static")),
            log_level: env_or("CAPSNET_LOG_LEVEL", "info"),
            routing_iterations: env_or("CAPSNET_ROUTING_ITERATIONS", "3")
                .parse()
                .unwrap_or(3),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        // Défauts quand rien n'est défini
        std::env::remove_var("CAPSNET_PORT");
        std::env::remove_var("CAPSNET_ROUTING_ITERATIONS");
        let config = Config::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.routing_iterations, 3);
        assert_eq!(config.server_addr(), "0.0.0.0:8080");

        // Valeur invalide: retour au défaut
        std::env::set_var("CAPSNET_PORT", "pas-un-port");
        assert_eq!(Config::from_env().port, 8080);

        std::env::set_var("CAPSNET_PORT", "9191");
        std::env::set_var("CAPSNET_ROUTING_ITERATIONS", "5");
        let config = Config::from_env();
        assert_eq!(config.port, 9191);
        assert_eq!(config.routing_iterations, 5);

        std::env::remove_var("CAPSNET_PORT");
        std::env::remove_var("CAPSNET_ROUTING_ITERATIONS");
    }
}
