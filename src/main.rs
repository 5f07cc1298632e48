use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repomirror::config::LoggingConfig;
use repomirror::daemon::build_mirror;
use repomirror::health::CheckResult;
use repomirror::sync::Classification;
use repomirror::{Config, Daemon, HealthCheck, SyncEngine};

#[derive(Parser)]
#[command(name = "repomirror")]
#[command(about = "Keeps a public GitHub mirror in sync with a GitLab group")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Full sync, then serve webhooks and resync periodically (default)
    Serve,

    /// Run one full sync and print a summary
    Sync {
        /// Show what would be created or updated without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// System health check and diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    init_logging(cli.verbose, &config.logging)?;
    info!("Starting repomirror v{}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(config).await,
        Commands::Sync { dry_run } => cmd_sync(dry_run, &config).await,
        Commands::Doctor => cmd_doctor(&config),
    }
}

/// Initialize logging from the config; `RUST_LOG` wins, `--verbose` forces debug
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format.as_str() {
        "json" => registry.with(fmt::layer().json()).init(),
        "pretty" => registry.with(fmt::layer().pretty()).init(),
        _ => registry.with(fmt::layer().compact()).init(),
    }

    Ok(())
}

async fn cmd_serve(config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let daemon = Daemon::new(config).context("Failed to create daemon")?;
    daemon.run().await
}

async fn cmd_sync(dry_run: bool, config: &Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let mirror = build_mirror(config)?;
    let engine = SyncEngine::new(mirror, config);

    if dry_run {
        println!("🔍 Dry run mode - classifying repositories");
        let plan = engine.plan().await.context("Failed to list repositories")?;

        for action in &plan.actions {
            let icon = match action.classification {
                Classification::Create => "📥",
                Classification::Update => "🔄",
                Classification::Skip(_) => "⏭️ ",
            };
            println!("   {} {}: {}", icon, action.repo.name, action.classification);
        }

        println!();
        println!(
            "📊 {} to create, {} to update, {} skipped",
            plan.creates(),
            plan.updates(),
            plan.skipped()
        );
        return Ok(());
    }

    let summary = engine.run().await.context("Full sync failed")?;

    println!("📊 Sync Results:");
    println!("   📥 Created: {}", summary.created);
    println!("   🔄 Updated: {}", summary.updated);
    println!("   ⏭️  Skipped: {}", summary.skipped);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    for outcome in summary.outcomes.iter().filter(|o| o.error.is_some()) {
        println!(
            "   ❌ {}: {}",
            outcome.name,
            outcome.error.as_deref().unwrap_or_default()
        );
    }

    Ok(())
}

fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config);
    print_health_report(&health);

    if !health.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 repomirror System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}
