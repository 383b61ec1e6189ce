use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insect_id::{config::Config, inference::InferenceEngine, web::serve};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "insect-id")]
#[command(about = "Hierarchical insect classification service powered by ONNX Runtime")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Number of worker threads
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, global = true, default_value = "models")]
    models_dir: String,

    /// Classification model file (overrides <models-dir>/insect_model.onnx)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Taxonomy document (overrides <models-dir>/hierarchy_map.json)
    #[arg(long, global = true)]
    taxonomy: Option<PathBuf>,

    /// Enable development mode
    #[arg(long, global = true)]
    dev: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Server bind address
        #[arg(long, default_value = "0.0.0.0:5005")]
        bind: String,
    },
    /// Classify a single image file and print the result as JSON
    Classify {
        /// Image file path
        image: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let bind = match &args.command {
        Command::Serve { bind } => bind.clone(),
        Command::Classify { .. } => String::new(),
    };

    // 创建配置
    let config = Config::new(bind, args.models_dir, args.workers, args.dev)?
        .with_model_file(args.model)
        .with_taxonomy_file(args.taxonomy);

    match args.command {
        Command::Serve { .. } => {
            tracing::info!("Starting insect classification service...");
            tracing::info!("Bind address: {}", config.bind_addr);
            tracing::info!("Model: {}", config.model_path().display());
            tracing::info!("Taxonomy: {}", config.taxonomy_path().display());

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.workers)
                .enable_all()
                .build()
                .context("Failed to build tokio runtime")?;

            runtime.block_on(serve(config))?;
        }
        Command::Classify { image } => {
            let engine = InferenceEngine::new(config.onnx_config.clone());
            engine.initialize_from_config(&config)?;

            let result = engine
                .classify_path(&image)
                .with_context(|| format!("Failed to classify {}", image.display()))?;

            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
