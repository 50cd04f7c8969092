use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use ssq_db::models::{AlgorithmPerformance, Draw, Prediction, StoredPrediction};
use crate::evaluation::{EvaluationReport, EvaluationStatus};
use crate::service::AlgorithmInfo;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn reds_str(reds: &[u8]) -> String {
    reds.iter()
        .map(|r| format!("{:2}", r))
        .collect::<Vec<_>>()
        .join(" - ")
}

fn confidence_color(confidence: f64) -> Color {
    if confidence >= 65.0 {
        Color::Green
    } else if confidence >= 45.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn display_prediction(prediction: &Prediction) {
    println!("\n== Prédiction ({}) ==\n", prediction.algorithm);

    let mut table = new_table();
    table.set_header(vec!["Rouges", "Bleue", "Confiance", "Tirages", "Généré le"]);
    table.add_row(vec![
        Cell::new(reds_str(&prediction.reds)).fg(Color::Red),
        Cell::new(format!("{:2}", prediction.blue)).fg(Color::Blue),
        Cell::new(format!("{:.1}", prediction.confidence)).fg(confidence_color(prediction.confidence)),
        Cell::new(prediction.dataset_size),
        Cell::new(prediction.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
    ]);
    println!("{table}");

    if prediction.metadata["fallback"].as_bool() == Some(true) {
        println!(
            "  Grille aléatoire de repli : {}.",
            prediction.metadata["reason"].as_str().unwrap_or("raison inconnue")
        );
    }

    if let Some(subs) = prediction.metadata["sub_predictions"].as_array() {
        println!("\n── Membres de l'ensemble ──");
        let mut table = new_table();
        table.set_header(vec!["Algorithme", "Rouges", "Bleue", "Confiance", "Poids"]);
        for sub in subs {
            let reds: Vec<u8> = sub["reds"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_u64()).map(|v| v as u8).collect())
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(sub["algorithm"].as_str().unwrap_or("?")),
                Cell::new(reds_str(&reds)),
                Cell::new(sub["blue"].as_u64().unwrap_or(0)),
                Cell::new(format!("{:.1}", sub["confidence"].as_f64().unwrap_or(0.0))),
                Cell::new(format!("{:.3}", sub["weight"].as_f64().unwrap_or(0.0))),
            ]);
        }
        println!("{table}");
    }

    if let Some(excluded) = prediction.metadata["excluded"].as_array() {
        for ex in excluded {
            println!(
                "  Exclu : {} ({})",
                ex["algorithm"].as_str().unwrap_or("?"),
                ex["reason"].as_str().unwrap_or("")
            );
        }
    }
}

pub fn display_history(history: &[StoredPrediction]) {
    println!("\n== Historique des prédictions ==\n");

    if history.is_empty() {
        println!("  (Aucune prédiction)");
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["ID", "Algorithme", "Rouges", "Bleue", "Confiance", "Généré le", "Cible"]);

    for stored in history {
        let p = &stored.prediction;
        let target = match (&stored.target_period, stored.is_top_tier) {
            (Some(period), Some(true)) => Cell::new(format!("{period} ★")).fg(Color::Green),
            (Some(period), _) => Cell::new(period),
            (None, _) => Cell::new("—"),
        };
        table.add_row(vec![
            Cell::new(stored.id),
            Cell::new(p.algorithm.as_str()),
            Cell::new(reds_str(&p.reds)),
            Cell::new(format!("{:2}", p.blue)),
            Cell::new(format!("{:.1}", p.confidence)),
            Cell::new(p.generated_at.format("%Y-%m-%d %H:%M").to_string()),
            target,
        ]);
    }
    println!("{table}");
}

pub fn display_performance(perf: &[AlgorithmPerformance]) {
    println!("\n== Performance des algorithmes ==\n");

    if perf.is_empty() {
        println!("  (Aucune exécution enregistrée)");
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["Algorithme", "Exécutions", "Confiance moy.", "Dernière exécution"]);
    for p in perf {
        table.add_row(vec![
            Cell::new(p.algorithm.as_str()),
            Cell::new(p.total_runs),
            Cell::new(format!("{:.2}", p.avg_confidence)).fg(confidence_color(p.avg_confidence)),
            Cell::new(p.last_run_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    println!("{table}");
}

pub fn display_evaluation(report: &EvaluationReport) {
    println!("\n== Évaluation des prédictions ==\n");

    let mut table = new_table();
    table.set_header(vec!["ID", "Algorithme", "Tirage", "Rouges", "Bleue", "Niveau", "Note"]);
    for rec in &report.evaluations {
        let level = match (rec.status, rec.match_level) {
            (EvaluationStatus::Evaluated, Some(level)) => {
                let cell = Cell::new(level.as_str());
                if rec.is_top_tier == Some(true) {
                    cell.fg(Color::Green)
                } else {
                    cell
                }
            }
            _ => Cell::new("en attente").fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(rec.prediction_id),
            Cell::new(rec.algorithm.as_str()),
            Cell::new(rec.target_period.as_deref().unwrap_or("—")),
            Cell::new(rec.red_hits.map_or("—".to_string(), |h| format!("{h}/6"))),
            Cell::new(match rec.blue_hit {
                Some(true) => "oui",
                Some(false) => "non",
                None => "—",
            }),
            level,
            Cell::new(&rec.note),
        ]);
    }
    println!("{table}");

    println!("\n── Par algorithme ──");
    let mut table = new_table();
    table.set_header(vec!["Algorithme", "Évaluées", "En attente", "Jackpots", "Bleues", "Hauts", "Rouges moy."]);
    for s in &report.per_algorithm {
        table.add_row(vec![
            Cell::new(s.algorithm.as_str()),
            Cell::new(s.evaluated),
            Cell::new(s.pending),
            Cell::new(s.jackpots),
            Cell::new(s.blue_hits),
            Cell::new(s.high_matches),
            Cell::new(format!("{:.2}", s.avg_red_hits)),
        ]);
    }
    println!("{table}");

    let s = &report.summary;
    println!("\n── Résumé ──");
    println!("  Prédictions      : {} ({} évaluées, {} en attente)", s.total, s.evaluated, s.pending);
    println!("  Jackpots         : {}", s.jackpots);
    println!("  Bleues trouvées  : {}", s.blue_hits);
    println!("  Rouges moy.      : {:.2}/6", s.avg_red_hits);
    println!("  Taux haut niveau : {:.1}%", s.high_match_rate * 100.0);
}

pub fn display_algorithms(algorithms: &[AlgorithmInfo]) {
    println!("\n== Algorithmes disponibles ==\n");

    let mut table = new_table();
    table.set_header(vec!["Clé", "Nom", "Description", "Poids", "Min. tirages", "Confiance max"]);
    for a in algorithms {
        table.add_row(vec![
            Cell::new(a.algorithm.as_str()),
            Cell::new(a.name),
            Cell::new(a.description),
            Cell::new(format!("{:.2}", a.default_weight)),
            Cell::new(a.min_draws),
            Cell::new(format!("{:.0}", a.max_confidence)),
        ]);
    }
    println!("{table}");
}

pub fn display_draws(draws: &[Draw]) {
    println!("\n== Derniers tirages ==\n");

    if draws.is_empty() {
        println!("  (Aucun tirage en base)");
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["Période", "Date", "Rouges", "Bleue"]);
    for d in draws {
        table.add_row(vec![
            Cell::new(&d.period),
            Cell::new(d.date.format("%Y-%m-%d").to_string()),
            Cell::new(reds_str(&d.reds)).fg(Color::Red),
            Cell::new(format!("{:2}", d.blue)).fg(Color::Blue),
        ]);
    }
    println!("{table}");
}
