use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use likeness_core::{FaceModels, FaceSelection, Threshold};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod batch;
mod config;
mod engine;
mod report;

use config::Config;
use engine::EngineHandle;
use report::{JsonReport, PairResult};

#[derive(Parser)]
#[command(name = "likeness", version, about = "Decide whether two photos show the same face")]
struct Cli {
    /// TOML config file (default: $LIKENESS_CONFIG, if set)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing the detector, landmark and recognition models
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Maximum descriptor distance counted as a match (exclusive) [default: 0.5]
    #[arg(short, long, global = true)]
    threshold: Option<Threshold>,

    /// Face to compare when an image holds several: highest-confidence or largest-area
    #[arg(long, global = true)]
    select: Option<FaceSelection>,

    /// Minimum detector confidence for a face
    #[arg(long, global = true)]
    min_confidence: Option<f32>,

    /// Give up on a comparison after this many seconds (0 = never)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Print JSON instead of the human-readable line
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the faces in two images
    Compare {
        first: PathBuf,
        second: PathBuf,
    },
    /// Compare every pair listed in a file (one "IMAGE_A IMAGE_B" per line)
    Batch {
        pairs: PathBuf,
    },
    /// Load the models and report where they were found
    CheckModels,
}

impl Cli {
    fn apply_to(&self, config: &mut Config) {
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(t) = self.threshold {
            config.threshold = t.value();
        }
        if let Some(s) = self.select {
            config.selection = s;
        }
        if let Some(c) = self.min_confidence {
            config.min_confidence = c;
        }
        if let Some(t) = self.timeout_secs {
            config.timeout_secs = t;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply_to(&mut config);
    config.validate().context("invalid configuration")?;

    match &cli.command {
        Commands::CheckModels => {
            let models = load_models(&config)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(models.paths())?);
            } else {
                let paths = models.paths();
                println!("detector:   {}", paths.detector.display());
                println!("landmarks:  {}", paths.landmarks.display());
                println!("recognizer: {}", paths.recognizer.display());
                println!("descriptor: {} values", models.descriptor_dim());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Compare { first, second } => {
            let engine = engine::spawn_engine(load_models(&config)?)?;
            let result = run_pair(&engine, &config, first, second).await?;
            emit(&cli, None, first, second, &result)?;
            Ok(ExitCode::from(report::exit_code(&result)))
        }
        Commands::Batch { pairs } => {
            let text = std::fs::read_to_string(pairs)
                .with_context(|| format!("reading pairs file {}", pairs.display()))?;
            let pairs = batch::parse_pairs(&text)?;

            let engine = engine::spawn_engine(load_models(&config)?)?;
            let mut code = report::EXIT_DECIDED;

            for (first, second) in &pairs {
                let result = run_pair(&engine, &config, first, second).await?;
                let label = format!("{} {}", first.display(), second.display());
                emit(&cli, Some(&label), first, second, &result)?;

                let pair_code = report::exit_code(&result);
                if code == report::EXIT_DECIDED {
                    code = pair_code;
                }
            }

            tracing::info!(pairs = pairs.len(), "batch finished");
            Ok(ExitCode::from(code))
        }
    }
}

/// Load the models once; any failure aborts before a comparison is attempted.
fn load_models(config: &Config) -> Result<FaceModels> {
    FaceModels::load(&config.model_dir, &config.models, config.analyzer_options())
        .with_context(|| format!("loading models from {}", config.model_dir.display()))
}

async fn run_pair(engine: &EngineHandle, config: &Config, first: &Path, second: &Path) -> Result<PairResult> {
    Ok(engine
        .compare_outcome(
            first.to_path_buf(),
            second.to_path_buf(),
            config.threshold()?,
            config.timeout(),
        )
        .await)
}

fn emit(cli: &Cli, label: Option<&str>, first: &Path, second: &Path, result: &PairResult) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(&JsonReport::new(first, second, result))?);
    } else {
        report::print_human(label, result);
    }
    Ok(())
}
