use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use bench_catalog::config::{QueueConfig, ServiceConfig};
use bench_catalog::hardware::{vram, HardwareCandidate, HardwareConstraints, HardwareMatcher, Quantization};
use bench_catalog::queue::matrix::{BATCH_SIZES, SEQUENCE_LENGTHS, WORKLOAD_TYPES};
use bench_catalog::queue::MatrixSpec;
use bench_catalog::service::CatalogService;
use bench_catalog::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "bench-catalog")]
#[command(version)]
#[command(about = "Benchmark matrix queue and model recommendation service")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the HTTP service
    Server(ServerArgs),

    /// Preview a benchmark matrix without writing it
    Matrix(MatrixArgs),

    /// Estimate VRAM and list GPU configurations for a model
    Estimate(EstimateArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port for the HTTP API
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Minutes before a running config is considered abandoned
    #[arg(long, default_value = "120")]
    stale_timeout_minutes: u32,

    /// Seconds between stale sweeps
    #[arg(long, default_value = "1800")]
    reaper_interval_secs: u64,

    /// Stale recycles before a config is marked failed (unbounded when omitted)
    #[arg(long)]
    max_retries: Option<u32>,
}

#[derive(Parser, Debug)]
struct MatrixArgs {
    /// Model version the matrix belongs to (random when omitted)
    #[arg(long)]
    model_version_id: Option<Uuid>,

    /// Hardware configurations (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    hardware: Vec<String>,

    /// Inference frameworks (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    frameworks: Vec<String>,

    /// Workload types (comma-separated)
    #[arg(long, value_delimiter = ',')]
    workloads: Vec<String>,

    /// Batch sizes (comma-separated)
    #[arg(long, value_delimiter = ',')]
    batch_sizes: Vec<u32>,

    /// Sequence lengths (comma-separated)
    #[arg(long, value_delimiter = ',')]
    sequence_lengths: Vec<u32>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Parser, Debug)]
struct EstimateArgs {
    /// Parameter count (e.g. 7000000000)
    #[arg(long)]
    params: u64,

    /// Quantization scheme (fp32, fp16, bf16, int8, int4, awq, gptq)
    #[arg(long, default_value = "fp16")]
    quantization: String,

    #[arg(long, default_value = "1")]
    batch_size: u32,

    /// Price every GPU on demand
    #[arg(long)]
    no_spot: bool,

    /// Maximum hourly cost in USD
    #[arg(long)]
    max_cost: Option<f64>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct EstimateOutput {
    parameter_count: u64,
    quantization: Quantization,
    batch_size: u32,
    vram_gb: f64,
    comparison: Vec<QuantizationRow>,
    candidates: Vec<HardwareCandidate>,
}

#[derive(Serialize)]
struct QuantizationRow {
    quantization: Quantization,
    vram_gb: f64,
}

// =============================================================================
// Handlers
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let queue = QueueConfig::default()
        .with_stale_timeout_minutes(args.stale_timeout_minutes)
        .with_reaper_interval_secs(args.reaper_interval_secs)
        .with_max_retries(args.max_retries);
    let config = ServiceConfig::new(SocketAddr::new(args.host, args.port)).with_queue(queue);

    let shutdown = install_shutdown_handler();
    CatalogService::new(config).run(shutdown).await?;
    Ok(())
}

fn handle_matrix(args: MatrixArgs) -> Result<(), Box<dyn std::error::Error>> {
    let or_default = |given: Vec<String>| {
        if given.is_empty() {
            WORKLOAD_TYPES.iter().map(|w| w.to_string()).collect()
        } else {
            given
        }
    };
    let spec = MatrixSpec::new(
        args.model_version_id.unwrap_or_else(Uuid::new_v4),
        args.hardware,
        args.frameworks,
    )
    .with_workloads(or_default(args.workloads))
    .with_batch_sizes(if args.batch_sizes.is_empty() {
        BATCH_SIZES.to_vec()
    } else {
        args.batch_sizes
    })
    .with_sequence_lengths(if args.sequence_lengths.is_empty() {
        SEQUENCE_LENGTHS.to_vec()
    } else {
        args.sequence_lengths
    });

    let preview = spec.preview()?;
    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        OutputFormat::Table => {
            println!("Model version: {}", preview.model_version_id);
            println!(
                "Dimensions: {} hardware x {} frameworks x {} workloads x {} batch sizes x {} sequence lengths",
                preview.hardware_configs,
                preview.frameworks,
                preview.workload_types,
                preview.batch_sizes,
                preview.sequence_lengths
            );
            println!("Total configs: {}", preview.total);
            println!();
            println!("{:<12} COUNT", "PRIORITY");
            println!("{}", "-".repeat(20));
            for (bucket, count) in &preview.priority_distribution {
                println!("{:<12} {}", bucket, count);
            }
        }
    }
    Ok(())
}

fn handle_estimate(args: EstimateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let quantization: Quantization = args.quantization.parse()?;
    let vram_gb = vram::estimate_with_batch(args.params, quantization, args.batch_size);
    let constraints = HardwareConstraints {
        max_cost_per_hour: args.max_cost,
        allow_spot: !args.no_spot,
        preferred_gpu_type: None,
    };
    let candidates = HardwareMatcher::default().find(vram_gb, &constraints);
    let comparison: Vec<QuantizationRow> = vram::quantization_comparison(args.params)
        .into_iter()
        .map(|(quantization, vram_gb)| QuantizationRow {
            quantization,
            vram_gb,
        })
        .collect();

    match args.output {
        OutputFormat::Json => {
            let output = EstimateOutput {
                parameter_count: args.params,
                quantization,
                batch_size: args.batch_size,
                vram_gb,
                comparison,
                candidates,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!(
                "{} parameters at {} (batch {}): {:.2} GB",
                args.params, quantization, args.batch_size, vram_gb
            );
            println!();
            println!("{:<8} VRAM (GB)", "QUANT");
            println!("{}", "-".repeat(20));
            for row in &comparison {
                println!("{:<8} {:.2}", row.quantization, row.vram_gb);
            }
            println!();
            if candidates.is_empty() {
                println!("No GPU configuration fits.");
            } else {
                println!(
                    "{:<12} {:<6} {:<10} {:<10} {:<6} UTIL %",
                    "GPU", "COUNT", "MEM (GB)", "$/HOUR", "SPOT"
                );
                println!("{}", "-".repeat(58));
                for c in &candidates {
                    println!(
                        "{:<12} {:<6} {:<10.0} {:<10.3} {:<6} {:.1}",
                        c.gpu_type,
                        c.gpu_count,
                        c.total_memory_gb,
                        c.cost_per_hour,
                        if c.spot { "yes" } else { "no" },
                        c.utilization_pct
                    );
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await?,
        Commands::Matrix(matrix_args) => handle_matrix(matrix_args)?,
        Commands::Estimate(estimate_args) => handle_estimate(estimate_args)?,
    }

    Ok(())
}
