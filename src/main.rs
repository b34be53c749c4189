//! Triangulate - weighted multi-source analysis for a subject and target.
//!
//! Exit codes:
//!   0 - Success (recommendation above --fail-on, or no --fail-on set)
//!   1 - Runtime error (config, synthesis failure, etc.)
//!   2 - Recommendation at or below the --fail-on threshold

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use triangulate::analysis::extractors::render_value;
use triangulate::cli::Args;
use triangulate::config::{Config, DEFAULT_CONFIG_FILE};
use triangulate::{JsonFileRenderer, ResultBundle, RunHandle, TaskStatus};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args)?;

    info!("Triangulate v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_analysis(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .triangulate.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to point each capability at its provider.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run the complete analysis workflow. Returns exit code (0 or 2).
async fn run_analysis(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    if args.dry_run {
        return handle_dry_run(&config);
    }

    let output = config.general.output.clone();
    let orchestrator = Arc::new(
        config
            .orchestrator()?
            .renderer(JsonFileRenderer::new(&output))
            .build()?,
    );

    println!(
        "🔬 Analyzing {} for {} across {} capabilities (timeout {}s)",
        args.subject(),
        args.target(),
        orchestrator.capability_names().len(),
        config.dispatch.task_timeout_seconds
    );

    let run = orchestrator.start(args.subject(), args.target());
    let bundle = watch_run(run, config.dispatch.progress_interval(), args.quiet).await?;

    print_summary(&bundle);

    if let Some(fail_level) = args.fail_on {
        if fail_level.is_tripped_by(bundle.synthesis.recommendation) {
            eprintln!(
                "\n⛔ Recommendation {} is at or below {:?}. Failing (exit code 2).",
                bundle.synthesis.recommendation, fail_level
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Poll the run's progress until it settles.
async fn watch_run(run: RunHandle, interval: Duration, quiet: bool) -> Result<ResultBundle> {
    let progress_bar = if quiet {
        None
    } else {
        let pb = ProgressBar::new(run.progress().len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    };

    while !run.is_finished() {
        tokio::time::sleep(interval).await;

        if let Some(ref pb) = progress_bar {
            let snapshot = run.progress();
            let settled = snapshot.values().filter(|s| s.is_terminal()).count();
            let running: Vec<&str> = snapshot
                .iter()
                .filter(|(_, s)| **s == TaskStatus::Running)
                .map(|(name, _)| name.as_str())
                .collect();
            pb.set_position(settled as u64);
            pb.set_message(running.join(", "));
        }
    }

    let bundle = run.join().await?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message("done");
    }

    Ok(bundle)
}

/// Handle --dry-run: validate the configuration and print the capability
/// table without invoking any provider.
fn handle_dry_run(config: &Config) -> Result<i32> {
    println!("\n🔍 Dry run: validating configuration (no providers invoked)...\n");

    let weights = config.validate()?;

    println!("   {} capabilities:\n", weights.len());
    for line in config.capability_table() {
        println!("     {}", line);
    }
    println!("\n   Weight total: {:.6}", weights.total());
    println!("   Conflict rules: {}", config.conflicts.len());
    println!("   Task timeout: {}s", config.dispatch.task_timeout_seconds);

    println!("\n✅ Dry run complete. No providers were invoked.");
    Ok(0)
}

fn print_summary(bundle: &ResultBundle) {
    let synthesis = &bundle.synthesis;

    println!("\n📊 Analysis Summary:");
    println!(
        "   {} {} (confidence {:.3})",
        synthesis.recommendation.emoji(),
        synthesis.recommendation,
        synthesis.overall_confidence
    );

    println!("\n   Key factors:");
    for factor in &synthesis.key_factors {
        println!("     - {}", factor);
    }

    println!("\n   Risks:");
    for risk in &synthesis.risks {
        println!("     - {}", risk);
    }

    if bundle.conflicts.conflict_detected {
        println!("\n   ⚠️  Conflicts:");
        for conflict in &bundle.conflicts.conflicts {
            let values: Vec<String> = conflict
                .sources
                .iter()
                .map(|s| {
                    format!(
                        "{}={} ({:.2})",
                        s.source_name,
                        render_value(Some(&s.value)),
                        s.confidence
                    )
                })
                .collect();
            println!("     - {}: {}", conflict.field, values.join(", "));
            println!("       {}", conflict.resolution);
        }
    }

    let degraded = bundle.degraded_capabilities();
    if !degraded.is_empty() {
        println!("\n   Degraded: {}", degraded.join(", "));
    }

    println!("\n   Next steps: {}", synthesis.next_steps);
    println!("   Duration: {:.1}s", bundle.duration_seconds);

    if bundle.cancelled {
        println!("\n⚠️  Run was cancelled; results are partial.");
    }

    match (&bundle.artifact, &bundle.render_error) {
        (Some(artifact), _) => println!("\n✅ Analysis complete! Bundle saved to: {}", artifact),
        (None, Some(e)) => println!("\n⚠️  Analysis complete, but the bundle was not saved: {}", e),
        (None, None) => println!("\n✅ Analysis complete!"),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
