use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};

use ssq_db::db::{count_draws, fetch_last_draws, fetch_predictions, insert_draw, insert_prediction, migrate, open_db};
use ssq_db::models::{validate_draw, Algorithm, AlgorithmPerformance, Draw, Prediction, StoredPrediction};
use ssq_db::rusqlite::Connection;

use crate::config::EngineConfig;
use crate::ensemble::{adjust_weights, EnsembleCombiner};
use crate::error::EngineError;
use crate::evaluation::{evaluate_all, persist_targets, EvaluationReport};
use crate::models::predictor_for;
use crate::performance::PerformanceTracker;

/// Entrée du catalogue d'algorithmes.
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmInfo {
    pub algorithm: Algorithm,
    pub name: &'static str,
    pub description: &'static str,
    pub default_weight: f64,
    pub min_draws: usize,
    pub max_confidence: f64,
}

/// Façade du moteur : prédiction, historique, performance, évaluation.
pub struct PredictionService {
    conn: Connection,
    config: EngineConfig,
}

impl PredictionService {
    pub fn new(conn: Connection, config: EngineConfig) -> anyhow::Result<Self> {
        migrate(&conn)?;
        Ok(Self { conn, config })
    }

    pub fn open(path: &Path, config: EngineConfig) -> anyhow::Result<Self> {
        let conn = open_db(path)?;
        Self::new(conn, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Produit, persiste et comptabilise une prédiction.
    /// `dataset_size` absent : taille recommandée. L'ensemble sur une fenêtre
    /// plus courte que `min_dataset_size` renvoie le candidat aléatoire de repli.
    pub fn predict(&self, algorithm: Algorithm, dataset_size: Option<usize>) -> Result<Prediction, EngineError> {
        let size = dataset_size.unwrap_or(self.config.recommended_dataset_size);
        if size < self.config.min_dataset_size {
            return Err(EngineError::InsufficientData {
                algorithm,
                required: self.config.min_dataset_size,
                actual: size,
            });
        }

        let limit = u32::try_from(size).unwrap_or(u32::MAX);
        let draws = fetch_last_draws(&self.conn, limit)?;
        if algorithm != Algorithm::Ensemble && draws.len() < size {
            return Err(EngineError::InsufficientData {
                algorithm,
                required: size,
                actual: draws.len(),
            });
        }

        let start = Instant::now();
        let prediction = match algorithm {
            Algorithm::Ensemble if draws.len() < self.config.min_dataset_size => {
                warn!(
                    available = draws.len(),
                    minimum = self.config.min_dataset_size,
                    "fenêtre trop courte pour l'ensemble, candidat aléatoire"
                );
                EnsembleCombiner::from_config(&self.config).fallback(
                    draws.len(),
                    "fenêtre inférieure au minimum configuré",
                    Vec::new(),
                )?
            }
            Algorithm::Ensemble => {
                let mut combiner = EnsembleCombiner::from_config(&self.config);
                if self.config.adaptive_weights {
                    let report = self.evaluation_report(None)?;
                    let adjusted = adjust_weights(combiner.weights(), &report.per_algorithm);
                    combiner = combiner.with_weights(adjusted);
                }
                run_with_budget(algorithm, self.config.total_budget_ms, move || combiner.predict(&draws))?
            }
            _ => {
                let predictor = predictor_for(algorithm, &self.config)
                    .ok_or_else(|| EngineError::UnknownAlgorithm(algorithm.to_string()))?;
                run_with_budget(algorithm, self.config.total_budget_ms, move || predictor.predict(&draws))?
            }
        };

        let id = insert_prediction(&self.conn, &prediction)?;
        PerformanceTracker::new(&self.conn).record(&prediction)?;
        info!(
            id,
            %algorithm,
            confidence = prediction.confidence,
            dataset_size = prediction.dataset_size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "prédiction enregistrée"
        );
        Ok(prediction)
    }

    pub fn prediction_history(&self, limit: u32) -> Result<Vec<StoredPrediction>, EngineError> {
        Ok(fetch_predictions(&self.conn, limit)?)
    }

    pub fn algorithm_performance(&self) -> Result<Vec<AlgorithmPerformance>, EngineError> {
        Ok(PerformanceTracker::new(&self.conn).all()?)
    }

    /// Évalue les `limit` prédictions les plus récentes et reporte les cibles trouvées.
    pub fn evaluate_predictions(&self, limit: u32) -> Result<EvaluationReport, EngineError> {
        let report = self.evaluation_report(Some(limit))?;
        persist_targets(&self.conn, &report)?;
        info!(
            total = report.summary.total,
            evaluated = report.summary.evaluated,
            pending = report.summary.pending,
            high_matches = report.summary.high_matches,
            "évaluation terminée"
        );
        Ok(report)
    }

    fn evaluation_report(&self, limit: Option<u32>) -> anyhow::Result<EvaluationReport> {
        let predictions = fetch_predictions(&self.conn, limit.unwrap_or(u32::MAX))?;
        evaluate_all(&predictions, &self.conn, self.config.draw_time)
    }

    pub fn list_algorithms(&self) -> Vec<AlgorithmInfo> {
        Algorithm::ALL
            .iter()
            .map(|&algorithm| {
                let (name, description) = describe(algorithm);
                let (default_weight, min_draws) = match algorithm {
                    Algorithm::Ensemble => (1.0, 0),
                    _ => (
                        self.config.ensemble.weights.get(&algorithm).copied().unwrap_or(0.0),
                        predictor_for(algorithm, &self.config).map_or(0, |p| p.min_draws()),
                    ),
                };
                AlgorithmInfo {
                    algorithm,
                    name,
                    description,
                    default_weight,
                    min_draws,
                    max_confidence: self.config.max_confidence(algorithm),
                }
            })
            .collect()
    }

    /// Ajoute un tirage validé ; false s'il existait déjà.
    pub fn add_draw(&self, draw: &Draw) -> anyhow::Result<bool> {
        validate_draw(&draw.reds, draw.blue)?;
        let mut draw = draw.clone();
        draw.reds.sort_unstable();
        let inserted = insert_draw(&self.conn, &draw)?;
        debug!(period = %draw.period, inserted, "tirage ajouté");
        Ok(inserted)
    }

    pub fn recent_draws(&self, limit: u32) -> anyhow::Result<Vec<Draw>> {
        fetch_last_draws(&self.conn, limit)
    }

    pub fn draw_count(&self) -> anyhow::Result<u32> {
        count_draws(&self.conn).context("Comptage des tirages impossible")
    }
}

fn describe(algorithm: Algorithm) -> (&'static str, &'static str) {
    match algorithm {
        Algorithm::Frequency => ("Analyse de fréquence", "Retient les numéros les plus fréquents de la fenêtre"),
        Algorithm::Trend => ("Analyse de tendance", "Moyenne mobile, pente récente et retard par numéro"),
        Algorithm::RandomForest => ("Forêt aléatoire", "Arbres de régression entraînés sur des features historiques"),
        Algorithm::Lstm => ("Modèle séquentiel", "Réseau à réservoir modélisant la suite des tirages"),
        Algorithm::Ensemble => ("Prédiction ensembliste", "Fusion pondérée des algorithmes, poids ajustables selon la performance"),
    }
}

/// Exécute `job` sur un thread dédié ; au-delà de `budget_ms`, renvoie `Timeout`.
fn run_with_budget<F>(algorithm: Algorithm, budget_ms: u64, job: F) -> Result<Prediction, EngineError>
where
    F: FnOnce() -> Result<Prediction, EngineError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name(format!("ssq-{algorithm}"))
        .spawn(move || {
            // le demandeur a pu abandonner
            let _ = tx.send(job());
        })
        .map_err(|e| EngineError::PredictorFailure {
            algorithm,
            reason: format!("thread de prédiction : {e}"),
        })?;

    match rx.recv_timeout(Duration::from_millis(budget_ms)) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout { budget_ms }),
        Err(RecvTimeoutError::Disconnected) => Err(EngineError::PredictorFailure {
            algorithm,
            reason: "le calcul s'est interrompu".to_string(),
        }),
    }
}
