//! Command-line interface components.

use crate::config::PipelineConfig;
use crate::models::ProcessingStats;
use crate::pipeline::Pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "cng-telemetry")]
#[command(about = "Extract CNG telemetry from operator chat logs into per-source Parquet tables")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Chat log CSV export, or a directory of exports
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory holding the per-source Parquet tables
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Tracker state snapshot (JSON)
    #[arg(short, long)]
    pub state_file: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of sources processed at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Process and report without writing tables or state
    #[arg(long)]
    pub dry_run: bool,

    /// Track pressure and flow independently when one of them is malformed
    #[arg(long)]
    pub independent_readings: bool,

    /// Clamp negative volumes to zero
    #[arg(long)]
    pub clamp_negative_volume: bool,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors and skip the progress bar
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet
    }

    /// Layer CLI flags over the configuration file (or the defaults)
    pub fn build_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(output_dir) = &self.output_dir {
            config = config.with_output_dir(output_dir.clone());
        }
        if let Some(state_file) = &self.state_file {
            config = config.with_state_path(state_file.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_max_concurrent_sources(concurrency);
        }
        if self.dry_run {
            config = config.with_dry_run();
        }
        if self.independent_readings {
            config = config.with_independent_readings();
        }
        if self.clamp_negative_volume {
            config = config.with_clamped_volume();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Filter directive used when `RUST_LOG` is unset
pub fn default_log_filter(args: &Args) -> String {
    format!("{}={}", env!("CARGO_CRATE_NAME"), args.get_log_level())
}

/// Set up structured logging on stderr.
///
/// Quiet runs log compactly; otherwise lines carry the time since startup.
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(args)));

    let compact = args.quiet.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
    });
    let timed = (!args.quiet).then(|| {
        fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::uptime())
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(compact)
        .with(timed)
        .init();

    debug!("Logging initialized at level: {}", args.get_log_level());
}

/// Run one batch over the input
pub async fn run(args: Args) -> Result<ProcessingStats> {
    setup_logging(&args);

    let config = args.build_config()?;
    info!(
        "Writing tables to {} (state: {})",
        config.output_dir.display(),
        config.state_path.display()
    );

    let dry_run = config.dry_run;
    let pipeline = Pipeline::new(config)
        .context("Failed to set up pipeline")?
        .with_progress(args.show_progress());

    let stats = pipeline
        .run(&args.input)
        .await
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    if !args.quiet {
        print_summary(&stats, dry_run);
    }
    Ok(stats)
}

fn print_summary(stats: &ProcessingStats, dry_run: bool) {
    let title = if dry_run {
        "CNG Telemetry Dry Run Complete"
    } else {
        "CNG Telemetry Extraction Complete"
    };

    println!();
    println!("{}", title.bright_green().bold());
    println!("{}", "━".repeat(42));
    println!("   • Input files: {}", stats.input_files);
    println!("   • Messages read: {}", stats.total_messages);
    println!("   • Sources processed: {}", stats.sources_processed);
    println!("   • Records accepted: {}", stats.totals.accepted);
    println!("   • Records discarded: {}", stats.totals.discarded);
    println!("   • Duplicates skipped: {}", stats.totals.duplicates);
    println!("   • Changeovers detected: {}", stats.totals.changeovers);
    println!(
        "   • Rows written: {}",
        stats.totals.rows_written.to_string().bright_cyan()
    );
    println!("   • Processing time: {} ms", stats.processing_time_ms);

    if stats.sources_failed > 0 {
        println!(
            "{}",
            format!("   ⚠ Sources failed: {}", stats.sources_failed).yellow()
        );
    }
    if stats.totals.insert_failures > 0 {
        println!(
            "{}",
            format!("   ⚠ Insert failures: {}", stats.totals.insert_failures).yellow()
        );
    }
    if !stats.unknown_sources.is_empty() {
        println!(
            "{}",
            format!(
                "   ⚠ Unknown sources skipped ({} messages):",
                stats.skipped_messages
            )
            .yellow()
        );
        for source in &stats.unknown_sources {
            println!("      - {}", source);
        }
    }

    if !dry_run {
        println!();
        println!("   Tables: {}", stats.output_path.display());
        println!("   State:  {}", stats.state_path.display());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NegativeVolumePolicy, ReadingCoupling};

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "cng-telemetry",
            "chat_logs.csv",
            "--output-dir",
            "/tmp/tables",
            "--concurrency",
            "3",
            "--dry-run",
            "--independent-readings",
            "--clamp-negative-volume",
        ]);

        let config = args.build_config().unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/tables"));
        assert_eq!(config.max_concurrent_sources, 3);
        assert!(config.dry_run);
        assert_eq!(config.reading_coupling, ReadingCoupling::Independent);
        assert_eq!(config.negative_volume, NegativeVolumePolicy::Clamp);
    }

    #[test]
    fn test_log_levels() {
        let args = Args::parse_from(["cng-telemetry", "in.csv", "-vv"]);
        assert_eq!(args.get_log_level(), "debug");

        let args = Args::parse_from(["cng-telemetry", "in.csv", "-q"]);
        assert_eq!(args.get_log_level(), "error");
        assert!(!args.show_progress());
    }

    #[test]
    fn test_default_log_filter_targets_crate() {
        let args = Args::parse_from(["cng-telemetry", "in.csv", "-v"]);
        assert_eq!(default_log_filter(&args), "cng_telemetry=info");

        let args = Args::parse_from(["cng-telemetry", "in.csv"]);
        assert_eq!(default_log_filter(&args), "cng_telemetry=warn");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let args = Args::parse_from(["cng-telemetry", "in.csv", "--concurrency", "0"]);
        assert!(args.build_config().is_err());
    }

    #[test]
    fn test_config_file_then_flags() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{"max_concurrent_sources": 5, "source_aliases": {"Lekki Ops": "wasil"}}"#,
        )
        .unwrap();

        let args = Args::parse_from([
            "cng-telemetry",
            "in.csv",
            "--config",
            config_path.to_str().unwrap(),
            "--state-file",
            "/tmp/state.json",
        ]);

        let config = args.build_config().unwrap();
        assert_eq!(config.max_concurrent_sources, 5);
        assert_eq!(config.state_path, PathBuf::from("/tmp/state.json"));
        assert!(config.source_aliases.contains_key("Lekki Ops"));
    }
}
