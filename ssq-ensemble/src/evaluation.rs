use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ssq_db::db::{find_draw_by_period, find_first_draw_from, update_prediction_target};
use ssq_db::models::{Algorithm, Draw, StoredPrediction};
use ssq_db::rusqlite::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLevel {
    Jackpot,
    Excellent,
    Great,
    Good,
    Low,
    Blue,
    Miss,
}

impl MatchLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchLevel::Jackpot => "jackpot",
            MatchLevel::Excellent => "excellent",
            MatchLevel::Great => "great",
            MatchLevel::Good => "good",
            MatchLevel::Low => "low",
            MatchLevel::Blue => "blue",
            MatchLevel::Miss => "miss",
        }
    }
}

pub fn classify(red_hits: u8, blue_hit: bool) -> MatchLevel {
    match (red_hits, blue_hit) {
        (6, true) => MatchLevel::Jackpot,
        (6, false) | (5, true) => MatchLevel::Excellent,
        (5, false) | (4, true) => MatchLevel::Great,
        (4, false) | (3, true) => MatchLevel::Good,
        (3, false) => MatchLevel::Low,
        (_, true) => MatchLevel::Blue,
        (_, false) => MatchLevel::Miss,
    }
}

/// Correspondance haute : au moins 4 rouges, ou 3 rouges + la bleue.
pub fn is_top_tier(red_hits: u8, blue_hit: bool) -> bool {
    red_hits >= 4 || (red_hits == 3 && blue_hit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    Evaluated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub prediction_id: i64,
    pub algorithm: Algorithm,
    pub status: EvaluationStatus,
    pub target_period: Option<String>,
    pub red_hits: Option<u8>,
    pub blue_hit: Option<bool>,
    pub match_level: Option<MatchLevel>,
    pub is_top_tier: Option<bool>,
    pub note: String,
}

/// Accès aux tirages nécessaire à l'évaluation.
pub trait DrawLookup {
    /// Premier tirage dont la date est >= `date`.
    fn first_draw_from(&self, date: NaiveDate) -> Result<Option<Draw>>;
    fn draw_by_period(&self, period: &str) -> Result<Option<Draw>>;
}

impl DrawLookup for [Draw] {
    fn first_draw_from(&self, date: NaiveDate) -> Result<Option<Draw>> {
        Ok(self
            .iter()
            .filter(|d| d.date >= date)
            .min_by(|a, b| a.date.cmp(&b.date).then_with(|| a.period.cmp(&b.period)))
            .cloned())
    }

    fn draw_by_period(&self, period: &str) -> Result<Option<Draw>> {
        Ok(self.iter().find(|d| d.period == period).cloned())
    }
}

impl DrawLookup for Connection {
    fn first_draw_from(&self, date: NaiveDate) -> Result<Option<Draw>> {
        find_first_draw_from(self, date)
    }

    fn draw_by_period(&self, period: &str) -> Result<Option<Draw>> {
        find_draw_by_period(self, period)
    }
}

/// Première date de tirage strictement postérieure à `generated_at`, le
/// tirage ayant lieu à `draw_time` (UTC).
pub fn min_qualifying_date(generated_at: DateTime<Utc>, draw_time: NaiveTime) -> NaiveDate {
    let day = generated_at.date_naive();
    if generated_at.time() < draw_time {
        day
    } else {
        day.checked_add_days(Days::new(1)).unwrap_or(day)
    }
}

pub fn evaluate_prediction<L: DrawLookup + ?Sized>(
    stored: &StoredPrediction,
    lookup: &L,
    draw_time: NaiveTime,
) -> Result<EvaluationRecord> {
    let prediction = &stored.prediction;
    let target = match &stored.target_period {
        Some(period) => lookup.draw_by_period(period)?,
        None => lookup.first_draw_from(min_qualifying_date(prediction.generated_at, draw_time))?,
    };

    let Some(draw) = target else {
        return Ok(EvaluationRecord {
            prediction_id: stored.id,
            algorithm: prediction.algorithm,
            status: EvaluationStatus::Pending,
            target_period: stored.target_period.clone(),
            red_hits: None,
            blue_hit: None,
            match_level: None,
            is_top_tier: None,
            note: "En attente du tirage".to_string(),
        });
    };

    let red_hits = prediction.reds.iter().filter(|r| draw.reds.contains(r)).count() as u8;
    let blue_hit = prediction.blue == draw.blue;
    let level = classify(red_hits, blue_hit);

    Ok(EvaluationRecord {
        prediction_id: stored.id,
        algorithm: prediction.algorithm,
        status: EvaluationStatus::Evaluated,
        note: format!(
            "Tirage {} : {} rouge(s){}",
            draw.period,
            red_hits,
            if blue_hit { " + bleue" } else { "" }
        ),
        target_period: Some(draw.period),
        red_hits: Some(red_hits),
        blue_hit: Some(blue_hit),
        match_level: Some(level),
        is_top_tier: Some(is_top_tier(red_hits, blue_hit)),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmStats {
    pub algorithm: Algorithm,
    pub evaluated: u32,
    pub pending: u32,
    pub jackpots: u32,
    pub blue_hits: u32,
    pub high_matches: u32,
    pub avg_red_hits: f64,
}

impl AlgorithmStats {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            evaluated: 0,
            pending: 0,
            jackpots: 0,
            blue_hits: 0,
            high_matches: 0,
            avg_red_hits: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total: u32,
    pub evaluated: u32,
    pub pending: u32,
    pub jackpots: u32,
    pub blue_hits: u32,
    pub high_matches: u32,
    pub avg_red_hits: f64,
    pub high_match_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub summary: EvaluationSummary,
    pub per_algorithm: Vec<AlgorithmStats>,
    pub evaluations: Vec<EvaluationRecord>,
}

/// Statistiques recalculées intégralement à partir des enregistrements.
pub fn aggregate(records: &[EvaluationRecord]) -> (EvaluationSummary, Vec<AlgorithmStats>) {
    let mut summary = EvaluationSummary::default();
    let mut per_algorithm: Vec<AlgorithmStats> = Vec::new();
    let mut red_totals: Vec<u32> = Vec::new();
    let mut global_red_total = 0u32;

    for record in records {
        let idx = match per_algorithm.iter().position(|s| s.algorithm == record.algorithm) {
            Some(i) => i,
            None => {
                per_algorithm.push(AlgorithmStats::new(record.algorithm));
                red_totals.push(0);
                per_algorithm.len() - 1
            }
        };
        let stats = &mut per_algorithm[idx];
        summary.total += 1;

        let (Some(red_hits), Some(blue_hit)) = (record.red_hits, record.blue_hit) else {
            stats.pending += 1;
            summary.pending += 1;
            continue;
        };

        let jackpot = classify(red_hits, blue_hit) == MatchLevel::Jackpot;
        let high = is_top_tier(red_hits, blue_hit);

        stats.evaluated += 1;
        stats.jackpots += jackpot as u32;
        stats.blue_hits += blue_hit as u32;
        stats.high_matches += high as u32;
        red_totals[idx] += red_hits as u32;

        summary.evaluated += 1;
        summary.jackpots += jackpot as u32;
        summary.blue_hits += blue_hit as u32;
        summary.high_matches += high as u32;
        global_red_total += red_hits as u32;
    }

    for (stats, &total) in per_algorithm.iter_mut().zip(&red_totals) {
        if stats.evaluated > 0 {
            stats.avg_red_hits = total as f64 / stats.evaluated as f64;
        }
    }
    per_algorithm.sort_by_key(|s| s.algorithm);

    if summary.evaluated > 0 {
        summary.avg_red_hits = global_red_total as f64 / summary.evaluated as f64;
        summary.high_match_rate = summary.high_matches as f64 / summary.evaluated as f64;
    }
    (summary, per_algorithm)
}

/// Évaluation pure : aucune écriture.
pub fn evaluate_all<L: DrawLookup + ?Sized>(
    predictions: &[StoredPrediction],
    lookup: &L,
    draw_time: NaiveTime,
) -> Result<EvaluationReport> {
    let evaluations = predictions
        .iter()
        .map(|p| evaluate_prediction(p, lookup, draw_time))
        .collect::<Result<Vec<_>>>()?;
    let (summary, per_algorithm) = aggregate(&evaluations);
    Ok(EvaluationReport { summary, per_algorithm, evaluations })
}

/// Reporte cible et statut haut de gamme sur les prédictions dont la valeur
/// stockée diffère. Retourne le nombre de lignes modifiées.
pub fn persist_targets(conn: &Connection, report: &EvaluationReport) -> Result<usize> {
    let mut updated = 0;
    for record in &report.evaluations {
        if let (Some(period), Some(top)) = (&record.target_period, record.is_top_tier) {
            if update_prediction_target(conn, record.prediction_id, period, top)? {
                updated += 1;
            }
        }
    }
    if updated > 0 {
        info!(updated, "cibles d'évaluation mises à jour");
    } else {
        debug!("aucune cible modifiée");
    }
    Ok(updated)
}
