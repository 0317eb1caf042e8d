use scour_core::campaign::Campaign;
use scour_core::config::ScourConfig;
use scour_core::registry::load_standard_targets;
use scour_core::sink::FileLog;

use clap::Parser;
use log::info;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    #[clap(short, long)]
    rounds: Option<u32>,
    #[clap(short, long)]
    seed: Option<u64>,
    #[clap(short, long)]
    log_file: Option<PathBuf>,
    /// Write the campaign summary to this file as JSON.
    #[clap(long)]
    summary_json: Option<PathBuf>,
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match cli.config_file {
        Some(config_path) => {
            println!("Loading configuration from specified path: {config_path:?}",);
            ScourConfig::load_from_file(&config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("config.toml");
            if default_config_path.exists() {
                println!(
                    "No config file specified via CLI, loading default: {default_config_path:?}",
                );
                ScourConfig::load_from_file(&default_config_path)?
            } else {
                println!(
                    "No config file specified and default 'config.toml' not found, using built-in defaults."
                );
                ScourConfig::default()
            }
        }
    };

    if let Some(rounds) = cli.rounds {
        config.campaign.rounds = rounds;
    }
    if let Some(seed) = cli.seed {
        config.campaign.seed = Some(seed);
    }
    if let Some(log_file) = cli.log_file {
        config.campaign.log_file = log_file;
    }

    println!("Effective configuration: {config:#?}");

    let seed = config.campaign.seed.unwrap_or_else(rand::random);
    info!("Using seed {seed} (pass --seed {seed} to replay this campaign)");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut loaded = load_standard_targets(&config.sources, &config.loader.denylist())?;
    let mut sink = FileLog::new(&config.campaign.log_file);
    let campaign = Campaign::new(config.campaign.rounds).with_timestamp(&loaded.timestamp);

    println!(
        "Starting campaign for {} rounds over {} targets, logging to {:?}...",
        campaign.rounds(),
        loaded.targets.len(),
        sink.path()
    );
    let start_time = Instant::now();
    let summary = campaign.run(&mut loaded.targets, &mut sink, &mut rng)?;
    let elapsed_total = start_time.elapsed();

    println!("Campaign finished in {elapsed_total:.2?}.");
    println!(
        "Total Invocations: {}, Ok: {}, Failed: {}, Distinct Failures: {}",
        summary.invocations,
        summary.ok,
        summary.failed,
        summary.distinct_failures.len()
    );
    for (target, tally) in &summary.per_target {
        println!("  {target}: {} ok, {} failed", tally.ok, tally.failed);
    }
    for failure in &summary.distinct_failures {
        println!(
            "  [{}] {} {:?} x{}: {}",
            &failure.report.signature[..8],
            failure.report.target,
            failure.report.kind,
            failure.occurrences,
            failure.report.message
        );
    }

    if let Some(path) = cli.summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&path, json)
            .map_err(|e| anyhow::anyhow!("Failed to write summary to {:?}: {}", path, e))?;
        println!("Summary written to {path:?}");
    }

    Ok(())
}
