use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ssq_db::models::Algorithm;
use ssq_esn::config::EsnConfig;

pub const DEFAULT_CONFIG_FILE: &str = "ssq.json";

/// Configuration complète du moteur. Tout champ absent du fichier JSON
/// prend sa valeur par défaut.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_dataset_size: usize,
    pub recommended_dataset_size: usize,
    pub predictor_timeout_ms: u64,
    pub total_budget_ms: u64,
    /// Heure (UTC) du tirage, utilisée pour dater les tirages à l'évaluation.
    pub draw_time: NaiveTime,
    pub fallback_confidence: f64,
    pub adaptive_weights: bool,
    pub ensemble: EnsembleConfig,
    pub frequency: FrequencyConfig,
    pub trend: TrendConfig,
    pub forest: ForestConfig,
    pub sequence: SequenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub members: Vec<Algorithm>,
    pub weights: BTreeMap<Algorithm, f64>,
    pub score_weights: ScoreWeights,
    pub ewma_alpha: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
}

/// Poids du score composite : fréquence, momentum, retard, votes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub frequency: f64,
    pub momentum: f64,
    pub gap: f64,
    pub votes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    pub min_draws: usize,
    pub hot_percentile: f64,
    pub cold_percentile: f64,
    pub max_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub min_draws: usize,
    pub max_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub min_draws: usize,
    pub n_trees: usize,
    pub max_depth: usize,
    pub window: usize,
    pub seed: u64,
    pub max_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub min_draws: usize,
    pub max_confidence: f64,
    pub esn: EsnConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_dataset_size: 50,
            recommended_dataset_size: 200,
            predictor_timeout_ms: 3_000,
            total_budget_ms: 5_000,
            draw_time: NaiveTime::from_hms_opt(13, 15, 0).unwrap_or_default(),
            fallback_confidence: 30.0,
            adaptive_weights: false,
            ensemble: EnsembleConfig::default(),
            frequency: FrequencyConfig::default(),
            trend: TrendConfig::default(),
            forest: ForestConfig::default(),
            sequence: SequenceConfig::default(),
        }
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            members: vec![
                Algorithm::Frequency,
                Algorithm::Trend,
                Algorithm::RandomForest,
                Algorithm::Lstm,
            ],
            weights: BTreeMap::from([
                (Algorithm::Frequency, 0.20),
                (Algorithm::Trend, 0.25),
                (Algorithm::RandomForest, 0.30),
                (Algorithm::Lstm, 0.25),
            ]),
            score_weights: ScoreWeights::default(),
            ewma_alpha: 0.9,
            min_confidence: 30.0,
            max_confidence: 80.0,
        }
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            frequency: 0.30,
            momentum: 0.20,
            gap: 0.15,
            votes: 0.35,
        }
    }
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            min_draws: 10,
            hot_percentile: 70.0,
            cold_percentile: 30.0,
            max_confidence: 75.0,
        }
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_draws: 30,
            max_confidence: 70.0,
        }
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            min_draws: 15,
            n_trees: 50,
            max_depth: 5,
            window: 100,
            seed: 42,
            max_confidence: 72.0,
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            min_draws: 60,
            max_confidence: 68.0,
            esn: EsnConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Charge le fichier s'il existe (défauts sinon), puis applique les
    /// surcharges d'environnement.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Impossible de lire {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("Configuration invalide : {}", path.display()))?
        } else {
            debug!(path = %path.display(), "pas de fichier de configuration, valeurs par défaut");
            EngineConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Impossible d'écrire {}", path.display()))?;
        Ok(())
    }

    /// `lookup` abstrait l'environnement pour les tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_override(&lookup, "SSQ_MIN_DATASET_SIZE") {
            self.min_dataset_size = v;
        }
        if let Some(v) = parse_override(&lookup, "SSQ_RECOMMENDED_DATASET_SIZE") {
            self.recommended_dataset_size = v;
        }
        if let Some(v) = parse_override(&lookup, "SSQ_PREDICTION_TIMEOUT_MS") {
            self.total_budget_ms = v;
        }
    }

    pub fn max_confidence(&self, algorithm: Algorithm) -> f64 {
        match algorithm {
            Algorithm::Frequency => self.frequency.max_confidence,
            Algorithm::Trend => self.trend.max_confidence,
            Algorithm::RandomForest => self.forest.max_confidence,
            Algorithm::Lstm => self.sequence.max_confidence,
            Algorithm::Ensemble => self.ensemble.max_confidence,
        }
    }
}

fn parse_override<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "surcharge d'environnement ignorée (valeur invalide)");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.min_dataset_size, 50);
        assert_eq!(config.recommended_dataset_size, 200);
        assert_eq!(config.draw_time, NaiveTime::from_hms_opt(13, 15, 0).unwrap());
        let total: f64 = config.ensemble.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-10);
        let sw = config.ensemble.score_weights;
        assert!((sw.frequency + sw.momentum + sw.gap + sw.votes - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "min_dataset_size": 80,
            "draw_time": "12:30:00",
            "ensemble": { "weights": { "frequency": 1.0, "trend": 1.0 } },
            "forest": { "n_trees": 10 }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.min_dataset_size, 80);
        assert_eq!(config.draw_time, NaiveTime::from_hms_opt(12, 30, 0).unwrap());
        assert_eq!(config.ensemble.weights.len(), 2);
        assert_eq!(config.ensemble.members.len(), 4);
        assert_eq!(config.forest.n_trees, 10);
        assert_eq!(config.forest.max_depth, 5);
        assert_eq!(config.sequence.esn.reservoir_size, 200);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config.apply_env_overrides(|key| match key {
            "SSQ_MIN_DATASET_SIZE" => Some("20".to_string()),
            "SSQ_PREDICTION_TIMEOUT_MS" => Some("pas un nombre".to_string()),
            _ => None,
        });
        assert_eq!(config.min_dataset_size, 20);
        assert_eq!(config.total_budget_ms, 5_000);
        assert_eq!(config.recommended_dataset_size, 200);
    }

    #[test]
    fn test_save_load_file() {
        let path = std::env::temp_dir().join(format!("ssq-config-{}.json", std::process::id()));
        let mut config = EngineConfig::default();
        config.adaptive_weights = true;
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(loaded.adaptive_weights);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/ssq.json")).unwrap();
        assert_eq!(config.predictor_timeout_ms, 3_000);
    }
}
