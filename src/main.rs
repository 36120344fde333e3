//! Evidence correlator: command-line entry point.

use evidence_correlator::classifier;
use evidence_correlator::core::config::EngineConfig;
use evidence_correlator::core::error::{Error, Result};
use evidence_correlator::core::reporting::{error_to_exit_code, format_error_for_user};
use evidence_correlator::core::types::{IndicatorKey, IndicatorKind};
use evidence_correlator::pipeline::CaseEngine;
use evidence_correlator::reputation::{
    create_provider, ProviderSpec, ReputationProvider, ReputationStore,
};
use evidence_correlator::ui::cli::{Cli, Commands, ConfigAction, OutputFormat, StoreAction};
use evidence_correlator::ui::manifest::CaseManifest;
use evidence_correlator::ui::report::{generate_report, CsvExporter, ReportFormat, TextReporter};
use evidence_correlator::utils::logging::{init_logging, LogConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprint!("{}", format_error_for_user(&e));
            ExitCode::from(error_to_exit_code(&e))
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default(),
    };

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::from_config(&config)
    };
    init_logging(log_config)?;

    log::debug!("evidence-correlator v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Analyze {
            manifest,
            lists,
            store,
            default_store,
            record,
            output,
            no_timeline,
            all,
        }) => {
            let store = match (store, default_store) {
                (Some(path), _) => Some(ReputationStore::open(&path)?),
                (None, true) => Some(ReputationStore::open_default()?),
                (None, false) => None,
            };
            let options = AnalyzeOptions {
                record,
                output,
                no_timeline,
                all,
                format: cli.format,
            };
            run_analyze(config, &manifest, &lists, store, options).await
        }
        Some(Commands::Store { path, action }) => run_store(path, action, cli.format),
        Some(Commands::Config { action }) => run_config(action, &config, cli.config.as_deref()),
        Some(Commands::Info) => run_info(&config),
        None => {
            println!("Evidence Correlator - Forensic Indicator and Timeline Analysis");
            println!();
            println!("Use --help for usage information");
            println!();
            println!("Quick start:");
            println!("  evidence-correlator analyze case.json              Analyze a case");
            println!("  evidence-correlator analyze case.json -l intel.json  ...with a reputation list");
            println!("  evidence-correlator store stats                    Inspect stored verdicts");
            Ok(())
        }
    }
}

struct AnalyzeOptions {
    record: bool,
    output: Option<PathBuf>,
    no_timeline: bool,
    all: bool,
    format: OutputFormat,
}

/// Analyze a case manifest.
async fn run_analyze(
    config: EngineConfig,
    manifest_path: &Path,
    lists: &[PathBuf],
    store: Option<ReputationStore>,
    options: AnalyzeOptions,
) -> Result<()> {
    let manifest = CaseManifest::load(manifest_path)?;

    let mut specs: Vec<ProviderSpec> = lists
        .iter()
        .map(|path| ProviderSpec::StaticList {
            id: path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("static-list")
                .to_string(),
            path: path.clone(),
        })
        .collect();
    specs.extend(manifest.providers.iter().cloned());

    let mut providers: Vec<Arc<dyn ReputationProvider>> = specs
        .iter()
        .map(create_provider)
        .collect::<Result<_>>()?;

    let store = store.map(Arc::new);
    if let Some(store) = &store {
        providers.push(Arc::clone(store) as Arc<dyn ReputationProvider>);
    }

    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let case = manifest.into_case(base_dir)?;

    log::info!(
        "Analyzing {} sources from {}",
        case.sources().len(),
        manifest_path.display()
    );

    let engine = CaseEngine::new(config, providers)?;
    let report = engine.run(&case).await?;

    if let Some(store) = &store {
        if options.record {
            let written = store.record(&report.scored)?;
            log::info!("Recorded {} verdicts in the verdict store", written);
        }
    }

    if let Some(path) = &options.output {
        let format = ReportFormat::from_path(path);
        generate_report(&report, format, path)?;
        log::info!("Report written to {}", path.display());
        if format == ReportFormat::Csv {
            log::info!(
                "Indicators written to {}",
                CsvExporter::indicators_path(path).display()
            );
        }
    }

    match options.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            let reporter = TextReporter::new()
                .with_timeline(!options.no_timeline)
                .with_all_indicators(options.all);
            print!("{}", reporter.render(&report));
        }
    }

    Ok(())
}

/// Inspect or edit the verdict store.
fn run_store(path: Option<PathBuf>, action: StoreAction, format: OutputFormat) -> Result<()> {
    let store = match &path {
        Some(path) => ReputationStore::open(path)?,
        None => ReputationStore::open_default()?,
    };

    match action {
        StoreAction::Stats => {
            let counts = store.count_by_kind()?;
            match format {
                OutputFormat::Json => {
                    let counts: std::collections::BTreeMap<IndicatorKind, u64> =
                        counts.into_iter().collect();
                    println!("{}", serde_json::to_string_pretty(&counts)?);
                }
                OutputFormat::Text => {
                    if let Some(path) = store.path() {
                        println!("Store:     {}", path.display());
                    }
                    println!("Verdicts:  {}", store.count()?);
                    for (kind, count) in counts {
                        println!("  {:<14} {}", kind, count);
                    }
                }
            }
        }
        StoreAction::Get { kind, value } => {
            let key = parse_key(&kind, &value)?;
            match (store.get(&key)?, format) {
                (Some(verdict), OutputFormat::Json) => {
                    println!("{}", serde_json::to_string_pretty(&verdict)?);
                }
                (Some(verdict), OutputFormat::Text) => {
                    println!(
                        "{} {} ({}) from {}: {}",
                        key,
                        if verdict.malicious { "malicious" } else { "clean" },
                        verdict.ratio,
                        verdict.provider,
                        verdict.rationale
                    );
                }
                (None, _) => println!("No stored verdict for {}", key),
            }
        }
        StoreAction::Remove { kind, value } => {
            let key = parse_key(&kind, &value)?;
            if store.remove(&key)? {
                println!("Removed {}", key);
            } else {
                println!("No stored verdict for {}", key);
            }
        }
    }
    Ok(())
}

/// Build a lookup key, normalizing the value the way indicators are.
fn parse_key(kind: &str, value: &str) -> Result<IndicatorKey> {
    let kind = IndicatorKind::parse(kind).ok_or_else(|| {
        Error::config_invalid("kind", format!("Unknown indicator kind '{}'", kind))
    })?;
    let value = match classifier::validate(kind, value) {
        Ok(validated) => validated.value,
        Err(rejected) => {
            log::warn!("{}; using value as given", rejected);
            value.to_string()
        }
    };
    Ok(IndicatorKey::new(kind, value))
}

/// Handle configuration commands.
fn run_config(action: ConfigAction, config: &EngineConfig, custom: Option<&Path>) -> Result<()> {
    let path = custom
        .map(Path::to_path_buf)
        .unwrap_or_else(EngineConfig::default_config_path);

    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigAction::Reset { yes } => {
            if !yes {
                println!("This overwrites {} with defaults.", path.display());
                println!("Run again with --yes to confirm.");
                return Ok(());
            }
            log::info!("Resetting configuration to defaults...");
            EngineConfig::default().save(&path)?;
            println!("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Show application information.
fn run_info(config: &EngineConfig) -> Result<()> {
    println!("Evidence Correlator - Forensic Indicator and Timeline Analysis");
    println!();
    println!("Version:          {}", env!("CARGO_PKG_VERSION"));
    println!("Config Path:      {}", EngineConfig::default_config_path().display());
    println!("Data Directory:   {}", EngineConfig::data_dir().display());
    println!();
    println!("Scan Settings:");
    println!("  Chunk Size:     {} bytes", config.scan.chunk_size);
    println!("  Chunk Overlap:  {} bytes", config.scan.chunk_overlap);
    println!("  Extra Patterns: {}", config.scan.extra_patterns.len());
    println!("  Disabled:       {}", config.scan.disabled_patterns.len());
    println!();
    println!("Scoring Settings:");
    println!(
        "  Detection Ratio > {:.2}",
        config.scoring.detection_ratio_threshold
    );
    println!(
        "  Risk Bands:     low < {:.0}%, elevated <= {:.0}%",
        config.scoring.risk.low * 100.0,
        config.scoring.risk.elevated * 100.0
    );
    println!();
    println!("Reputation Settings:");
    println!("  Concurrency:    {}", config.reputation.concurrency_limit);
    println!(
        "  Timeout:        {} ms",
        config.reputation.default_policy.timeout_ms
    );
    println!(
        "  Max Attempts:   {}",
        config.reputation.default_policy.max_attempts
    );
    println!(
        "  Overrides:      {}",
        config.reputation.provider_policies.len()
    );
    Ok(())
}
