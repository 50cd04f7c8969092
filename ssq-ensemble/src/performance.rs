use anyhow::Result;
use tracing::debug;

use ssq_db::db::{fetch_algorithm_performance, record_algorithm_run};
use ssq_db::models::{AlgorithmPerformance, Prediction};
use ssq_db::rusqlite::Connection;

/// Suivi des exécutions par algorithme, adossé à la table `algorithm_performance`.
pub struct PerformanceTracker<'a> {
    conn: &'a Connection,
}

impl<'a> PerformanceTracker<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Met à jour la moyenne glissante de confiance dans une transaction immédiate.
    pub fn record(&self, prediction: &Prediction) -> Result<AlgorithmPerformance> {
        let perf = record_algorithm_run(
            self.conn,
            prediction.algorithm,
            prediction.confidence,
            prediction.generated_at,
        )?;
        debug!(
            algorithm = %perf.algorithm,
            runs = perf.total_runs,
            avg = perf.avg_confidence,
            "performance mise à jour"
        );
        Ok(perf)
    }

    pub fn all(&self) -> Result<Vec<AlgorithmPerformance>> {
        fetch_algorithm_performance(self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ssq_db::db::migrate;
    use ssq_db::models::Algorithm;

    fn prediction(algorithm: Algorithm, confidence: f64, hour: u32) -> Prediction {
        Prediction {
            reds: [1, 5, 9, 13, 17, 21],
            blue: 3,
            confidence,
            algorithm,
            dataset_size: 50,
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_running_average_two_runs() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let tracker = PerformanceTracker::new(&conn);

        tracker.record(&prediction(Algorithm::Frequency, 80.0, 8)).unwrap();
        let perf = tracker.record(&prediction(Algorithm::Frequency, 90.0, 9)).unwrap();
        assert_eq!(perf.total_runs, 2);
        assert!((perf.avg_confidence - 85.0).abs() < 1e-10);

        let all = tracker.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].last_run_at, Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_algorithms_tracked_separately() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let tracker = PerformanceTracker::new(&conn);

        tracker.record(&prediction(Algorithm::Trend, 60.0, 8)).unwrap();
        tracker.record(&prediction(Algorithm::Ensemble, 70.0, 8)).unwrap();
        let all = tracker.all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|p| p.total_runs == 1));
    }
}
