use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const RED_COUNT: usize = 6;
pub const RED_MAX: u8 = 33;
pub const BLUE_MAX: u8 = 16;

/// Un tirage historique : 6 rouges triées (1-33) + 1 bleue (1-16).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub period: String,
    pub date: NaiveDate,
    pub reds: [u8; 6],
    pub blue: u8,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Red,
    Blue,
}

impl Pool {
    pub fn size(&self) -> usize {
        match self {
            Pool::Red => RED_MAX as usize,
            Pool::Blue => BLUE_MAX as usize,
        }
    }

    pub fn pick_count(&self) -> usize {
        match self {
            Pool::Red => RED_COUNT,
            Pool::Blue => 1,
        }
    }

    pub fn numbers_from<'a>(&self, draw: &'a Draw) -> &'a [u8] {
        match self {
            Pool::Red => &draw.reds,
            Pool::Blue => std::slice::from_ref(&draw.blue),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Frequency,
    Trend,
    RandomForest,
    Lstm,
    Ensemble,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Frequency,
        Algorithm::Trend,
        Algorithm::RandomForest,
        Algorithm::Lstm,
        Algorithm::Ensemble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Frequency => "frequency",
            Algorithm::Trend => "trend",
            Algorithm::RandomForest => "random_forest",
            Algorithm::Lstm => "lstm",
            Algorithm::Ensemble => "ensemble",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.as_str() == s)
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Candidat produit par un algorithme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub reds: [u8; 6],
    pub blue: u8,
    pub confidence: f64,
    pub algorithm: Algorithm,
    pub dataset_size: usize,
    pub generated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl Prediction {
    pub fn is_valid(&self) -> bool {
        validate_draw(&self.reds, self.blue).is_ok()
            && self.reds.windows(2).all(|w| w[0] < w[1])
            && (0.0..=100.0).contains(&self.confidence)
    }
}

/// Prédiction persistée, avec la cible éventuellement fixée par l'évaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrediction {
    pub id: i64,
    pub prediction: Prediction,
    pub target_period: Option<String>,
    pub is_top_tier: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmPerformance {
    pub algorithm: Algorithm,
    pub total_runs: u64,
    pub avg_confidence: f64,
    pub last_run_at: DateTime<Utc>,
}

impl AlgorithmPerformance {
    pub fn first_run(algorithm: Algorithm, confidence: f64, at: DateTime<Utc>) -> Self {
        Self {
            algorithm,
            total_runs: 1,
            avg_confidence: confidence,
            last_run_at: at,
        }
    }

    /// Moyenne glissante : avg' = (avg·n + x) / (n + 1).
    pub fn with_run(&self, confidence: f64, at: DateTime<Utc>) -> Self {
        let n = self.total_runs as f64;
        Self {
            algorithm: self.algorithm,
            total_runs: self.total_runs + 1,
            avg_confidence: (self.avg_confidence * n + confidence) / (n + 1.0),
            last_run_at: at,
        }
    }
}

pub fn validate_draw(reds: &[u8; 6], blue: u8) -> Result<()> {
    for &r in reds {
        if r < 1 || r > RED_MAX {
            bail!("Boule rouge {} hors limites (1-{})", r, RED_MAX);
        }
    }
    if blue < 1 || blue > BLUE_MAX {
        bail!("Boule bleue {} hors limites (1-{})", blue, BLUE_MAX);
    }
    for i in 0..reds.len() {
        for j in (i + 1)..reds.len() {
            if reds[i] == reds[j] {
                bail!("Boule rouge en double : {}", reds[i]);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_draw() -> Draw {
        Draw {
            period: "2024001".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            reds: [1, 2, 3, 4, 5, 6],
            blue: 7,
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_validate_draw_ok() {
        assert!(validate_draw(&[1, 2, 3, 4, 5, 6], 1).is_ok());
        assert!(validate_draw(&[28, 29, 30, 31, 32, 33], 16).is_ok());
    }

    #[test]
    fn test_validate_draw_red_out_of_range() {
        assert!(validate_draw(&[0, 2, 3, 4, 5, 6], 1).is_err());
        assert!(validate_draw(&[1, 2, 3, 4, 5, 34], 1).is_err());
    }

    #[test]
    fn test_validate_draw_blue_out_of_range() {
        assert!(validate_draw(&[1, 2, 3, 4, 5, 6], 0).is_err());
        assert!(validate_draw(&[1, 2, 3, 4, 5, 6], 17).is_err());
    }

    #[test]
    fn test_validate_draw_duplicate_reds() {
        assert!(validate_draw(&[1, 1, 3, 4, 5, 6], 2).is_err());
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(Pool::Red.size(), 33);
        assert_eq!(Pool::Blue.size(), 16);
        assert_eq!(Pool::Red.pick_count(), 6);
        assert_eq!(Pool::Blue.pick_count(), 1);
    }

    #[test]
    fn test_pool_numbers_from() {
        let draw = test_draw();
        assert_eq!(Pool::Red.numbers_from(&draw), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(Pool::Blue.numbers_from(&draw), &[7]);
    }

    #[test]
    fn test_algorithm_parse_roundtrip() {
        for algo in Algorithm::ALL {
            assert_eq!(Algorithm::parse(algo.as_str()), Some(algo));
        }
        assert_eq!(Algorithm::parse("arima"), None);
    }

    #[test]
    fn test_running_average() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let perf = AlgorithmPerformance::first_run(Algorithm::Trend, 80.0, t0).with_run(90.0, t1);
        assert_eq!(perf.total_runs, 2);
        assert!((perf.avg_confidence - 85.0).abs() < 1e-10);
        assert_eq!(perf.last_run_at, t1);
    }

    #[test]
    fn test_prediction_validity() {
        let mut p = Prediction {
            reds: [3, 8, 15, 21, 28, 33],
            blue: 9,
            confidence: 55.0,
            algorithm: Algorithm::Frequency,
            dataset_size: 50,
            generated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            metadata: serde_json::Value::Null,
        };
        assert!(p.is_valid());
        p.reds = [8, 3, 15, 21, 28, 33];
        assert!(!p.is_valid());
        p.reds = [3, 8, 15, 21, 28, 33];
        p.confidence = 101.0;
        assert!(!p.is_valid());
    }
}
