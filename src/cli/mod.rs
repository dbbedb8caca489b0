//! Command-line interface: search, predict and inspect datasets

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::automl::{AutoTabular, AutoTabularConfig};
use crate::registry::{DatasetProfile, Registries, StageCandidates};
use crate::search::TrialStatus;
use crate::stages::TaskType;
use crate::utils::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(230, 110, 110) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-autotab")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pipeline search for tabular data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search for the best pipeline and save it
    Search {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Task type (classification, regression); inferred when omitted
        #[arg(long)]
        task: Option<String>,

        /// Number of trials
        #[arg(long)]
        trials: Option<usize>,

        /// Time budget in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Objective metric (accuracy, f1, auc, mse, r2, ...)
        #[arg(long)]
        objective: Option<String>,

        /// Number of pipelines in the final ensemble
        #[arg(long)]
        n_estimators: Option<usize>,

        /// Directory for trial artifacts and the saved model
        #[arg(long)]
        temp_dir: Option<PathBuf>,

        /// Name of the saved model
        #[arg(long)]
        model_name: Option<String>,

        /// JSON file with the full run configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Continue an interrupted search
        #[arg(long)]
        resume: bool,
    },

    /// Predict with a saved model
    Predict {
        /// Saved model file (model.json)
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Column to drop before predicting, if present
        #[arg(short, long)]
        target: Option<String>,

        /// Output CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show dataset profile and candidate methods
    Info {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: Option<String>,

        /// Task type when no target is given
        #[arg(long, default_value = "classification")]
        task: String,
    },
}

/// Dispatch a parsed command line
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Search {
            data,
            target,
            task,
            trials,
            timeout,
            objective,
            n_estimators,
            temp_dir,
            model_name,
            config,
            seed,
            resume,
        } => {
            let mut run_config = match config {
                Some(path) => load_config(&path)?,
                None => AutoTabularConfig::default(),
            };
            if let Some(task) = task {
                run_config.task_type = Some(TaskType::parse(&task)?);
            }
            if trials.is_some() {
                run_config.max_evals = trials;
            }
            if let Some(secs) = timeout {
                run_config.time_budget = Some(Duration::from_secs(secs));
            }
            if objective.is_some() {
                run_config.objective = objective;
            }
            if let Some(n) = n_estimators {
                run_config.n_estimators = n;
            }
            if let Some(dir) = temp_dir {
                run_config.temp_dir = dir;
            }
            if let Some(name) = model_name {
                run_config.model_name = name;
            }
            if let Some(seed) = seed {
                run_config.seed = seed;
            }
            run_config.resume |= resume;
            cmd_search(&data, &target, run_config)
        }
        Commands::Predict {
            model,
            data,
            target,
            output,
        } => cmd_predict(&model, &data, target.as_deref(), output.as_deref()),
        Commands::Info { data, target, task } => cmd_info(&data, target.as_deref(), &task),
    }
}

fn load_config(path: &Path) -> anyhow::Result<AutoTabularConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

// ─── Search ────────────────────────────────────────────────────────────────────

pub fn cmd_search(data_path: &Path, target: &str, config: AutoTabularConfig) -> anyhow::Result<()> {
    section("Search");

    step_run("Loading data");
    let start = Instant::now();
    let data = DataLoader::new().load_supervised(data_path, target, config.task_type)?;
    step_done(&format!(
        "{} rows × {} cols, {} in {:?}",
        data.x.height(),
        data.x.width(),
        data.task_type,
        start.elapsed()
    ));

    step_run("Searching pipelines");
    let start = Instant::now();
    let mut model = AutoTabular::new(config);
    model.fit_labeled(&data)?;
    step_done(&format!("{:?}", start.elapsed()));

    if let Some(result) = model.search_result() {
        println!();
        println!(
            "  {:<6} {:<10} {:>12}  {}",
            muted("Trial"),
            muted("Status"),
            muted("Loss"),
            muted("Pipeline")
        );
        println!("  {}", dim(&"─".repeat(72)));
        for record in result.ranking().iter().take(10) {
            println!(
                "  {:<6} {:<10} {:>12}  {}",
                record.trial_id,
                ok("fitted"),
                format!("{:.6}", record.loss.unwrap_or(f64::NAN)).white(),
                dim(&record.config.summary())
            );
        }
        let failed = result.failures().len();
        let timed_out = result
            .records
            .iter()
            .filter(|r| r.status == TrialStatus::Timeout)
            .count();
        println!();
        println!("  {:<16} {}", muted("Trials"), result.records.len().to_string().white());
        if failed > 0 {
            println!("  {:<16} {}", muted("Failed"), bad(&failed.to_string()));
        }
        if timed_out > 0 {
            println!("  {:<16} {}", muted("Timed out"), timed_out.to_string().yellow());
        }
        println!("  {:<16} {}", muted("Stopped by"), result.stop_reason.to_string().white());
    } else {
        println!("  {}", muted("stored model found, search skipped"));
    }

    if let Some(ensemble) = model.ensemble() {
        println!("  {:<16} {}", muted("Members"), ensemble.len().to_string().white().bold());
    }
    if model.config().save {
        println!(
            "  {:<16} {}",
            muted("Saved to"),
            model.config().model_path().display().to_string().white()
        );
    }
    println!();
    Ok(())
}

// ─── Predict ───────────────────────────────────────────────────────────────────

pub fn cmd_predict(
    model_path: &Path,
    data_path: &Path,
    target: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let model = AutoTabular::load(model_path, Registries::default())?;
    step_done(&format!("{} members", model.ensemble().map_or(0, |e| e.len())));

    step_run("Loading data");
    let mut df = DataLoader::new().load_csv(data_path)?;
    if let Some(target) = target {
        if df.column(target).is_ok() {
            df = df.drop(target)?;
        }
    }
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    step_run("Predicting");
    let start = Instant::now();
    let labels = model.predict_labels(&df)?;
    step_done(&format!("{:?}", start.elapsed()));

    match output {
        Some(path) => {
            let mut out = DataFrame::new(vec![Column::new("prediction".into(), labels)])?;
            let mut file = std::fs::File::create(path)?;
            CsvWriter::new(&mut file).finish(&mut out)?;
            println!("  {} {}", ok("✓"), format!("wrote {}", path.display()).white());
        }
        None => {
            for (i, label) in labels.iter().take(20).enumerate() {
                println!("  {:<6} {}", muted(&i.to_string()), label.white());
            }
            if labels.len() > 20 {
                println!("  {}", dim(&format!("… {} more", labels.len() - 20)));
            }
        }
    }
    println!();
    Ok(())
}

// ─── Info ──────────────────────────────────────────────────────────────────────

pub fn cmd_info(data_path: &Path, target: Option<&str>, task: &str) -> anyhow::Result<()> {
    section("Data Info");

    let loader = DataLoader::new();
    let (df, task_type) = match target {
        Some(target) => {
            let data = loader.load_supervised(data_path, target, None)?;
            (data.x, data.task_type)
        }
        None => (loader.load_csv(data_path)?, TaskType::parse(task)?),
    };

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());
    println!("  {:<12} {}", muted("Task"), task_type);
    println!();

    println!("  {:<20} {:<12} {:>6} {:>8}", muted("Column"), muted("Type"), muted("Nulls"), muted("Unique"));
    println!("  {}", dim(&"─".repeat(50)));
    for col in df.get_columns() {
        println!(
            "  {:<20} {:<12} {:>6} {:>8}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
            col.n_unique().unwrap_or(0)
        );
    }

    let profile = DatasetProfile::from_frame(&df, task_type);
    let candidates = StageCandidates::resolve(
        &Registries::default(),
        &profile,
        &Default::default(),
        &Default::default(),
    )?;
    section("Candidates");
    println!("  {:<12} {}", muted("Missing"), profile.has_missing);
    for (stage, names) in candidates.summary() {
        println!("  {:<18} {}", muted(stage.as_str()), names.join(", ").white());
    }
    println!();
    Ok(())
}
