use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ssq_db::db::db_path;
use ssq_db::models::{Algorithm, Draw};
use ssq_ensemble::config::{EngineConfig, DEFAULT_CONFIG_FILE};
use ssq_ensemble::display;
use ssq_ensemble::service::PredictionService;

#[derive(Parser)]
#[command(name = "ssq", about = "Prédiction ensembliste du Double Couleur (SSQ)")]
struct Cli {
    /// Fichier de configuration JSON
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Base SQLite (défaut: data/ssq.db)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Générer une prédiction
    Predict {
        /// frequency, trend, random_forest, lstm ou ensemble
        #[arg(short, long, default_value = "ensemble")]
        algorithm: String,

        /// Nombre de tirages utilisés (défaut: taille recommandée)
        #[arg(short, long)]
        size: Option<usize>,
    },

    /// Historique des prédictions
    History {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Performance cumulée par algorithme
    Performance,

    /// Évaluer les prédictions contre les tirages publiés
    Evaluate {
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Lister les algorithmes
    Algorithms,

    /// Derniers tirages en base
    Draws {
        #[arg(short, long, default_value = "10")]
        last: u32,
    },

    /// Ajouter un tirage : période, date, 6 rouges puis la bleue
    Add {
        period: String,
        /// Date au format YYYY-MM-DD
        date: String,
        numbers: Vec<u8>,
    },

    /// Écrire la configuration effective dans le fichier de configuration
    InitConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(&cli.config)
        .with_context(|| format!("Configuration illisible : {:?}", cli.config))?;

    if let Command::InitConfig = cli.command {
        config.save(&cli.config)?;
        println!("Configuration écrite dans {:?}", cli.config);
        return Ok(());
    }

    let path = cli.db.unwrap_or_else(db_path);
    let service = PredictionService::open(&path, config)?;

    match cli.command {
        Command::Predict { algorithm, size } => cmd_predict(&service, &algorithm, size),
        Command::History { limit } => {
            display::display_history(&service.prediction_history(limit)?);
            Ok(())
        }
        Command::Performance => {
            display::display_performance(&service.algorithm_performance()?);
            Ok(())
        }
        Command::Evaluate { limit } => {
            display::display_evaluation(&service.evaluate_predictions(limit)?);
            Ok(())
        }
        Command::Algorithms => {
            display::display_algorithms(&service.list_algorithms());
            Ok(())
        }
        Command::Draws { last } => {
            display::display_draws(&service.recent_draws(last)?);
            Ok(())
        }
        Command::Add { period, date, numbers } => cmd_add(&service, period, &date, &numbers),
        Command::InitConfig => Ok(()),
    }
}

fn cmd_predict(service: &PredictionService, algorithm: &str, size: Option<usize>) -> Result<()> {
    let algorithm = Algorithm::parse(algorithm)
        .ok_or_else(|| ssq_ensemble::error::EngineError::UnknownAlgorithm(algorithm.to_string()))?;

    let available = service.draw_count()?;
    let wanted = size.unwrap_or(service.config().recommended_dataset_size);
    if (available as usize) < wanted {
        println!("{} tirage(s) en base pour {} demandés.", available, wanted);
    }

    let prediction = service.predict(algorithm, size)?;
    display::display_prediction(&prediction);
    Ok(())
}

fn cmd_add(service: &PredictionService, period: String, date: &str, numbers: &[u8]) -> Result<()> {
    if numbers.len() != 7 {
        bail!("7 nombres attendus (6 rouges + 1 bleue), {} reçus", numbers.len());
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Date invalide : {date}"))?;

    let mut reds = [0u8; 6];
    reds.copy_from_slice(&numbers[..6]);
    let draw = Draw {
        period,
        date,
        reds,
        blue: numbers[6],
        source: "manual".to_string(),
    };

    if service.add_draw(&draw)? {
        println!("Tirage {} ajouté.", draw.period);
    } else {
        println!("Tirage {} déjà présent.", draw.period);
    }
    Ok(())
}
