//! csdi CLI: prepares windowed datasets and run folders for CSDI forecasting
//! experiments.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use csdi_core::{Mode, Seed};
use csdi_data::{
    get_dataloaders, list_datasets, registry, ForecastingConfig, ForecastingDataset, SeriesSource,
    DEFAULT_PREDICTION_LENGTH,
};

use crate::config::{ConditioningOptions, ExperimentConfig, RunFolder};

#[derive(Parser)]
#[command(name = "csdi")]
#[command(author, version)]
#[command(about = "Prepare windowed datasets and run folders for CSDI forecasting")]
#[command(long_about = "csdi: data preparation for conditional diffusion forecasting.

EXAMPLES:
  # List registered datasets
  csdi datasets

  # Build train/valid/test loaders and a fresh run folder
  csdi prepare --datatype electricity --n-condit-features 5

  # Reuse an earlier run's config
  csdi prepare --modelfolder run_20260101_120000

  # Look at one validation window
  csdi inspect --mode valid --index 3")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered datasets
    Datasets,
    /// Build the loaders for an experiment and write its run folder
    Prepare {
        #[command(flatten)]
        data: DataArgs,

        /// Base experiment config (TOML)
        #[arg(long, default_value = "config/base_forecasting.toml", value_name = "PATH")]
        config: PathBuf,

        /// Folder holding run folders
        #[arg(long, default_value = "./save", value_name = "DIR")]
        save: PathBuf,

        /// Reuse the config of an existing run folder under --save
        #[arg(long, value_name = "NAME")]
        modelfolder: Option<String>,

        /// Condition on noise instead of observations
        #[arg(long)]
        pseudo_unconditional: bool,

        /// Conditioning strategy forwarded to the model
        #[arg(long, default_value = "pca")]
        condit_strat: String,

        /// Number of samples drawn per window at evaluation
        #[arg(long, default_value = "100", value_name = "N")]
        nsample: usize,

        /// Override the config's batch size
        #[arg(long, value_name = "SIZE")]
        batch_size: Option<usize>,

        /// Tensor device for the batches handed to the model
        #[arg(long, default_value = "cpu")]
        device: String,
    },
    /// Print one window of a partition
    Inspect {
        #[command(flatten)]
        data: DataArgs,

        /// Partition: train, valid or test
        #[arg(long, default_value = "train")]
        mode: Mode,

        /// Ordinal of the window within the partition
        #[arg(long, default_value = "0")]
        index: usize,
    },
}

/// Options that shape the windowed datasets.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Registered dataset identifier
    #[arg(long, default_value = "electricity")]
    datatype: String,

    /// Base storage location of dataset folders [default: $CSDI_DATA_ROOT or ./data]
    #[arg(long, value_name = "DIR")]
    data_root: Option<PathBuf>,

    /// Random seed for the conditioning draw and shuffling
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Attach one-hot metadata to every window
    #[arg(long)]
    time_weaver: bool,

    /// Drop the history segment
    #[arg(long)]
    true_unconditional: bool,

    /// History steps per window
    #[arg(long, default_value = "168")]
    history_length: usize,

    /// Number of conditioning channels (-1 for all, 0 for true-unconditional)
    #[arg(long, default_value = "-1", allow_negative_numbers = true)]
    n_condit_features: i64,
}

impl DataArgs {
    fn data_root(&self) -> PathBuf {
        self.data_root.clone().unwrap_or_else(csdi_data::data_root)
    }

    fn forecasting_config(
        &self,
        opts: &ConditioningOptions,
        time_weaver: bool,
    ) -> ForecastingConfig {
        ForecastingConfig::new(&self.datatype)
            .with_time_weaver(time_weaver)
            .with_true_unconditional(opts.true_unconditional)
            .with_history_length(opts.history_length)
            .with_prediction_length(DEFAULT_PREDICTION_LENGTH)
            .with_n_condit_features(opts.n_condit_features)
            .with_seed(Seed::new(self.seed))
    }

    fn conditioning_options(
        &self,
        pseudo_unconditional: bool,
        condit_strat: String,
    ) -> ConditioningOptions {
        let mut opts = ConditioningOptions {
            pseudo_unconditional,
            true_unconditional: self.true_unconditional,
            history_length: self.history_length,
            n_condit_features: self.n_condit_features,
            condit_strat,
        };
        if opts.normalize() {
            tracing::warn!("n_condit_features is 0: running true-unconditional");
        }
        opts
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Datasets => handle_datasets(),
        Commands::Prepare {
            data,
            config,
            save,
            modelfolder,
            pseudo_unconditional,
            condit_strat,
            nsample,
            batch_size,
            device,
        } => handle_prepare(PrepareArgs {
            data,
            config,
            save,
            modelfolder,
            pseudo_unconditional,
            condit_strat,
            nsample,
            batch_size,
            device,
        }),
        Commands::Inspect { data, mode, index } => handle_inspect(data, mode, index),
    }
}

fn handle_datasets() -> Result<()> {
    println!("Registered datasets:\n");
    for name in list_datasets() {
        if let Some(info) = registry::get_dataset_info(name) {
            println!(
                "  {:<15} {:>5} channels  {:<8} folder: {}",
                info.name, info.n_channels, info.frequency, info.folder
            );
        }
    }
    println!(
        "\nExpected files per folder: data.npz (data, mask), meanstd.npz (mean, std), \
         metadata.npy (optional)"
    );
    Ok(())
}

struct PrepareArgs {
    data: DataArgs,
    config: PathBuf,
    save: PathBuf,
    modelfolder: Option<String>,
    pseudo_unconditional: bool,
    condit_strat: String,
    nsample: usize,
    batch_size: Option<usize>,
    device: String,
}

/// Resolve a `--device` name to a backend device.
fn parse_device(name: &str) -> Result<NdArrayDevice> {
    match name {
        "cpu" => Ok(NdArrayDevice::Cpu),
        other => bail!("Unsupported device '{}': only 'cpu' is available", other),
    }
}

fn handle_prepare(args: PrepareArgs) -> Result<()> {
    let device = parse_device(&args.device)?;
    let opts = args
        .data
        .conditioning_options(args.pseudo_unconditional, args.condit_strat.clone());

    let mut experiment = ExperimentConfig::from_toml_file(&args.config)?;
    experiment.apply(&opts)?;
    tracing::info!("Experiment config:\n{}", serde_json::to_string_pretty(&experiment)?);

    let mut time_weaver = args.data.time_weaver;
    let run = match &args.modelfolder {
        Some(name) => {
            let run = RunFolder::reuse(&args.save, name)?;
            experiment = ExperimentConfig::from_json_file(&run.config_path())?;
            if experiment.weaver.included {
                time_weaver = true;
            }
            run
        }
        None => {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
            let run = RunFolder::create(&args.save, &timestamp)?;
            experiment.save_json(&run.config_path())?;
            run
        }
    };
    println!("Run folder: {}", run.path.display());

    if let Some(batch_size) = args.batch_size {
        experiment.train.batch_size = batch_size;
    }

    let data_config = args.data.forecasting_config(&opts, time_weaver);
    let source = SeriesSource::load(args.data.data_root(), &data_config.dataset, time_weaver)
        .with_context(|| format!("Failed to load dataset '{}'", data_config.dataset))?;
    let loaders = get_dataloaders(
        Arc::new(source),
        &data_config,
        experiment.train.batch_size,
        Seed::new(args.data.seed),
    )
    .context("Failed to build dataloaders")?;

    if let Some(k_meta) = loaders.metadata_width() {
        experiment.record_metadata(k_meta);
    }
    if !run.reused {
        experiment.save_json(&run.config_path())?;
    }

    let first_batch = loaders
        .train()
        .iter()
        .next()
        .transpose()?
        .map(|batch| batch.to_tensors::<NdArray>(&device));

    let scalers_path = run.path.join("scalers.json");
    let scalers = serde_json::json!({
        "mean": loaders.scalers().mean.to_vec(),
        "std": loaders.scalers().std.to_vec(),
    });
    std::fs::write(&scalers_path, serde_json::to_string_pretty(&scalers)?)
        .with_context(|| format!("Failed to write {:?}", scalers_path))?;

    println!();
    println!("Dataset: {}", data_config.dataset);
    println!("─────────────────────────────────────────");
    println!("  Channels:        {}", loaders.n_channels());
    println!(
        "  Window:          {} history + {} prediction",
        data_config.effective_history_length(),
        data_config.prediction_length
    );
    for mode in Mode::ALL {
        if let Some(features) = loaders.get(mode).dataset().condit_features() {
            println!("  Condit features ({}): {:?}", mode, features);
        }
    }
    if let Some(k_meta) = loaders.metadata_width() {
        println!("  Metadata width:  {}", k_meta);
    }
    println!("  Batch size:      {}", experiment.train.batch_size);
    println!("  Eval samples:    {}", args.nsample);
    if let Some(tensors) = &first_batch {
        println!(
            "  First batch:     {:?} on {}",
            tensors.observed_data.dims(),
            args.device
        );
    }
    println!();
    for mode in Mode::ALL {
        let loader = loaders.get(mode);
        println!(
            "  {:<6} windows: {:>7}  batches: {:>6}",
            mode,
            loader.len(),
            loader.n_batches()
        );
    }
    println!();
    println!("Saved config to {:?}", run.config_path());
    println!("Saved scalers to {:?}", scalers_path);

    Ok(())
}

fn handle_inspect(data: DataArgs, mode: Mode, index: usize) -> Result<()> {
    let opts = data.conditioning_options(false, "pca".to_string());
    let config = data.forecasting_config(&opts, data.time_weaver);
    let root = data.data_root();
    let dataset = ForecastingDataset::load(&root, mode, &config)
        .with_context(|| format!("Failed to load dataset '{}' from {:?}", config.dataset, root))?;
    let record = dataset.get(index)?;
    let start = dataset.use_index()[index];

    print_window(&dataset, index, start, &record, &root);
    Ok(())
}

fn print_window(
    dataset: &ForecastingDataset,
    index: usize,
    start: usize,
    record: &csdi_data::WindowRecord,
    root: &Path,
) {
    let observed = record.observed_mask.iter().filter(|&&v| v > 0.0).count();
    let given = record.gt_mask.iter().filter(|&&v| v > 0.0).count();

    println!(
        "Window {} of {} ({} partition, root {:?})",
        index,
        dataset.len(),
        dataset.mode(),
        root
    );
    println!("─────────────────────────────────────────");
    println!("  Start offset:     {}", start);
    println!(
        "  Steps:            {} ({} history + {} prediction)",
        dataset.window_length(),
        dataset.history_length(),
        dataset.prediction_length()
    );
    println!("  Channels:         {}", dataset.n_channels());
    println!("  Observed values:  {}", observed);
    println!("  Given as input:   {}", given);
    if let Some(metadata) = &record.metadata {
        println!("  Metadata:         {:?}", metadata.dim());
    }
    if let Some(features) = &record.condit_features {
        println!("  Condit features:  {:?}", features);
    }
}
