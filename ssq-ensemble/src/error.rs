use ssq_db::models::Algorithm;
use thiserror::Error;

/// Erreurs typées du moteur de prédiction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Données insuffisantes pour {algorithm} : {required} tirages requis, {actual} disponibles")]
    InsufficientData {
        algorithm: Algorithm,
        required: usize,
        actual: usize,
    },

    #[error("Échec du prédicteur {algorithm} : {reason}")]
    PredictorFailure { algorithm: Algorithm, reason: String },

    #[error("Budget de prédiction dépassé ({budget_ms} ms)")]
    Timeout { budget_ms: u64 },

    #[error("Algorithme inconnu : {0}")]
    UnknownAlgorithm(String),

    #[error("Erreur de stockage : {0}")]
    Storage(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Storage(format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_insufficient_data_message() {
        let err = EngineError::InsufficientData {
            algorithm: Algorithm::Lstm,
            required: 60,
            actual: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("lstm"));
        assert!(msg.contains("60"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_storage_keeps_context_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
        let err: EngineError = inner.context("écriture").unwrap_err().into();
        match err {
            EngineError::Storage(msg) => {
                assert!(msg.contains("écriture"));
                assert!(msg.contains("disk full"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
