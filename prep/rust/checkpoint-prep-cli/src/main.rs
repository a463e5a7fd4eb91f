use anyhow::{Context, Result};
use checkpoint_prep::convert::{ExternalConverter, OnFailure};
use checkpoint_prep::fetch::{AssetFetcher, HubFetcher, LocalDirFetcher};
use checkpoint_prep::{archive, pipeline, registry, PrepConfig};
use std::path::PathBuf;
use std::str::FromStr;

mod logging;

#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// TOML config file; every field has a default.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Registry model to prepare, overrides `model_name`.
    #[clap(long)]
    model: Option<String>,

    /// Directory the namespace lives in, overrides `home_directory`.
    #[clap(long)]
    home: Option<PathBuf>,

    #[clap(long)]
    namespace: Option<String>,
}

impl ModelArgs {
    fn load(&self) -> Result<PrepConfig> {
        let mut config = match &self.config {
            Some(path) => PrepConfig::load(path).with_context(|| format!("loading {path:?}"))?,
            None => PrepConfig::default(),
        };
        if let Some(model) = &self.model {
            config.model_name = model.clone();
        }
        if let Some(home) = &self.home {
            config.home_directory = Some(home.clone());
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        Ok(config)
    }
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Read config.json, vocab.json, merges.txt and pytorch_model.bin from
    /// this directory instead of the hub.
    #[clap(long)]
    input_dir: Option<PathBuf>,

    /// Hub cache directory, defaults to `$HF_HOME`.
    #[clap(long)]
    cache_dir: Option<PathBuf>,

    /// Stop after writing model.npz.
    #[clap(long)]
    no_convert: bool,

    /// Print the converter command instead of executing it.
    #[clap(long)]
    dry_run: bool,

    /// Converter executable, overrides `converter.program`.
    #[clap(long)]
    converter: Option<String>,

    /// Log a failing converter instead of failing the run.
    #[clap(long)]
    ignore_converter_failure: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Download, remap and convert a checkpoint.
    Run(RunArgs),
    /// List the models with built-in download locations.
    Models,
    /// Parse config files without running anything.
    Validate { configs: Vec<PathBuf> },
    /// Report runtime files missing from the target directory.
    Check(ModelArgs),
    /// List the tensors stored in an npz archive.
    Inspect { archive: PathBuf },
}

#[derive(clap::Parser, Debug)]
#[clap(name = "checkpoint-prep", about = "Prepare GPT-2 checkpoints for the rust runtime")]
struct Args {
    #[clap(short = 'l', long = "log", default_value = "info", global = true)]
    log_level: String,

    /// Use JSON structured logging.
    #[clap(long, global = true)]
    json: bool,

    /// Console log style: compact, pretty, or verbose.
    #[clap(long, default_value = "pretty", global = true)]
    log_style: String,

    #[command(subcommand)]
    command: Command,
}

fn tracing_init(args: &Args) -> Result<()> {
    use tracing_subscriber::fmt::time::ChronoLocal;
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::filter::LevelFilter::from_str(&args.log_level)?;
    let timer = ChronoLocal::new("%H:%M:%S%.3f".to_string());
    let layer = if args.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_timer(timer)
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        let style = args.log_style.parse().unwrap_or_else(|e: String| {
            eprintln!("Warning: {e}, using 'pretty'");
            logging::LogStyle::Pretty
        });
        tracing_subscriber::fmt::layer()
            .event_format(logging::ConsoleFormatter::new(timer, style))
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };
    tracing_subscriber::registry().with(layer).init();
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = args.model.load()?;
    if let Some(program) = args.converter {
        config.converter.program = program;
    }
    if args.ignore_converter_failure {
        config.converter.on_failure = OnFailure::Warn;
    }
    config.validate()?;

    let fetcher: Box<dyn AssetFetcher> = match &args.input_dir {
        Some(dir) => Box::new(LocalDirFetcher::new(dir)),
        None => Box::new(HubFetcher::new(config.asset_sources()?).with_cache_dir(args.cache_dir)),
    };
    let converter: Option<ExternalConverter> = if args.no_convert {
        None
    } else {
        config.converter().map(|c| c.with_dry_run(args.dry_run))
    };

    let report = pipeline::run(&config, fetcher.as_ref(), converter.as_ref())?;
    tracing::info!(
        target_dir = ?report.target_dir,
        source_tensors = report.source_tensors,
        written_tensors = report.written_tensors,
        converted = report.converted(),
        "done"
    );
    Ok(())
}

fn main_() -> Result<()> {
    // HF_TOKEN and HF_HOME may come from a .env file.
    dotenvy::dotenv().ok();

    let args = <Args as clap::Parser>::parse();
    tracing_init(&args)?;
    match args.command {
        Command::Run(run_args) => run(run_args)?,
        Command::Models => {
            for m in registry::MODELS {
                let marker = if m.name == registry::DEFAULT_MODEL { " (default)" } else { "" };
                println!("{:<12} {:<32} {}{marker}", m.name, m.repo, m.description);
            }
        }
        Command::Validate { configs } => {
            for path in configs.iter() {
                let config = PrepConfig::load(path)?;
                config.validate().with_context(|| format!("validating {path:?}"))?;
                tracing::info!(?path, model = %config.model_name, "loaded successfully")
            }
        }
        Command::Check(model) => {
            let layout = model.load()?.layout()?;
            let missing = layout.missing();
            if missing.is_empty() {
                tracing::info!(dir = ?layout.root(), "all runtime files present");
            } else {
                for path in missing.iter() {
                    tracing::warn!(?path, "missing");
                }
                anyhow::bail!(
                    "{} file(s) missing in {:?}, run `checkpoint-prep run` first",
                    missing.len(),
                    layout.root()
                );
            }
        }
        Command::Inspect { archive: path } => {
            let entries = archive::summarize(&path)?;
            let mut total = 0;
            for e in entries.iter() {
                println!("{:<48} {:<5} {:?}", e.name, e.dtype.as_str(), e.shape);
                total += e.numel();
            }
            println!("{} tensors, {total} elements", entries.len());
        }
    }
    Ok(())
}

fn main() {
    if let Err(err) = main_() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
