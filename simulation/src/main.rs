//! qnet-sim: run entanglement distribution scenarios from the command line

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use qnet_logging::{FileConfig, LogConfig, SubscriberBuilder};
use qnet_simulation::scenarios::{self, COHERENCE_SWEEP, MEMORY_SPLITS};
use qnet_simulation::{MuxKind, NetworkReport, ScenarioConfig};

#[derive(Parser)]
#[command(name = "qnet-sim", about = "Proactive entanglement distribution simulator", version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Also write JSONL protocol traces to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario described by a JSON file
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// 3-node end-to-end rate versus memory coherence time
    Thruput {
        /// Seeds per coherence time
        #[arg(short, long, default_value = "5")]
        runs: usize,

        #[arg(long, default_value = "100")]
        seed: u64,
    },

    /// 3-node rate and fidelity for each repeater memory split
    Asymmetric {
        /// Link architectures of the two channels: SR-SR, SIM-DIM or DIM-SIM
        #[arg(short, long, default_value = "SR-SR")]
        archs: String,

        /// Memory coherence time in seconds
        #[arg(short, long, default_value = "0.01")]
        t_coherence: f64,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Linear chain with one end-to-end request
    Chain {
        /// Number of nodes
        #[arg(short, long, default_value = "4")]
        nodes: usize,

        #[arg(short, long, value_enum, default_value = "buffer-space")]
        mux: MuxArg,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MuxArg {
    BufferSpace,
    Statistical,
    Coordinated,
    DynamicEpr,
}

impl From<MuxArg> for MuxKind {
    fn from(arg: MuxArg) -> Self {
        match arg {
            MuxArg::BufferSpace => MuxKind::BufferSpace,
            MuxArg::Statistical => MuxKind::Statistical { coordinated_decisions: false },
            MuxArg::Coordinated => MuxKind::Statistical { coordinated_decisions: true },
            MuxArg::DynamicEpr => MuxKind::DynamicEpr { path_selection: Default::default() },
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log = LogConfig::default();
    if cli.verbose {
        log.default_level = "debug".to_string();
    } else if cli.json {
        log.default_level = "warn".to_string();
    }
    let mut builder = SubscriberBuilder::new().with_config(log);
    if let Some(dir) = &cli.log_dir {
        builder = builder.with_file_output(FileConfig { directory: dir.clone(), ..FileConfig::default() });
    }
    let _guard = builder.init().context("failed to set up logging")?;

    match cli.command {
        Commands::Run { config } => {
            let scenario = ScenarioConfig::from_json_file(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            print_report(&scenario.run()?, cli.json)?;
        }
        Commands::Thruput { runs, seed } => {
            let points = scenarios::coherence_sweep(&COHERENCE_SWEEP, runs, seed)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&points)?);
            } else {
                println!("T_coh    Rate");
                for p in &points {
                    println!("{:<7.3}  {:>5.1} ({:.1})", p.t_coherence, p.mean_rate, p.std_rate);
                }
            }
        }
        Commands::Asymmetric { archs, t_coherence, seed } => {
            let archs = scenarios::arch_pair(&archs)?;
            let mut rows = Vec::new();
            for split in MEMORY_SPLITS {
                let report = scenarios::asymmetric_three_node(split, archs, t_coherence, seed).run()?;
                let path = report.paths.first().context("scenario installed no path")?;
                info!(?split, rate = path.throughput, fidelity = path.mean_fidelity, "memory split done");
                rows.push((split, path.throughput, path.mean_fidelity));
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("Split    Rate     Fidelity");
                for ((left, right), rate, fidelity) in rows {
                    println!("({left}, {right})   {rate:>6.1}   {fidelity:.4}");
                }
            }
        }
        Commands::Chain { nodes, mux, seed } => {
            let report = scenarios::linear_chain(nodes, mux.into(), seed).run()?;
            print_report(&report, cli.json)?;
        }
    }

    Ok(())
}

fn print_report(report: &NetworkReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("=== Run {} (seed {}, {}) ===", report.run_id, report.seed, report.mux);
    println!("  Simulated: {:.3} s, {} events", report.duration_secs, report.events);
    for path in &report.paths {
        let route: Vec<&str> = path.route.iter().map(|n| n.as_str()).collect();
        println!(
            "  Path {} [{}]: {} pairs, {:.1}/s, fidelity {:.4}",
            path.path_id,
            route.join("-"),
            path.e2e_pairs,
            path.throughput,
            path.mean_fidelity
        );
    }
    let t = &report.totals;
    println!("  Elementary pairs: {}", t.n_entg);
    println!("  Swaps: {} ok, {} failed", t.n_swapped, t.n_swap_failed);
    println!("  Purifications: {} started, {} failed", t.n_purif, t.n_purif_failed);
    println!("  Decohered: {}", t.n_decohered);
    println!("  Parallel swap conflicts: {}", t.n_parallel_conflicts);
    Ok(())
}
