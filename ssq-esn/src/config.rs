use serde::{Deserialize, Serialize};

use ssq_db::models::Pool;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    OneHot,
    Normalized,
}

impl Encoding {
    pub fn input_dim(&self) -> usize {
        match self {
            Encoding::OneHot => Pool::Red.size() + Pool::Blue.size(), // 49
            Encoding::Normalized => Pool::Red.pick_count() + Pool::Blue.pick_count(), // 7
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EsnConfig {
    pub reservoir_size: usize,
    pub spectral_radius: f64,
    pub sparsity: f64,
    pub leaking_rate: f64,
    pub ridge_lambda: f64,
    pub input_scaling: f64,
    pub encoding: Encoding,
    pub washout: usize,
    pub noise_amplitude: f64,
    pub seed: u64,
}

impl Default for EsnConfig {
    fn default() -> Self {
        Self {
            reservoir_size: 200,
            spectral_radius: 0.95,
            sparsity: 0.9,
            leaking_rate: 0.3,
            ridge_lambda: 1e-2,
            input_scaling: 0.1,
            encoding: Encoding::OneHot,
            washout: 10,
            noise_amplitude: 0.0,
            seed: 42,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_input_dim() {
        assert_eq!(Encoding::OneHot.input_dim(), 49);
        assert_eq!(Encoding::Normalized.input_dim(), 7);
    }

    #[test]
    fn test_default_config() {
        let config = EsnConfig::default();
        assert_eq!(config.reservoir_size, 200);
        assert!((config.spectral_radius - 0.95).abs() < 1e-10);
        assert_eq!(config.encoding, Encoding::OneHot);
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config: EsnConfig = serde_json::from_str(r#"{"reservoir_size": 50, "encoding": "normalized"}"#).unwrap();
        assert_eq!(config.reservoir_size, 50);
        assert_eq!(config.encoding, Encoding::Normalized);
        assert_eq!(config.washout, EsnConfig::default().washout);
    }
}
