//! Autoquant CLI
//!
//! Works on qconf files and run configurations without a model.
//!
//! # Usage
//!
//! ```bash
//! # Summarize a qconf file
//! autoquant inspect qconf.json
//!
//! # Decode every entry (dtype, qscheme and observer names, parameters)
//! autoquant check qconf.json
//!
//! # Validate a run configuration
//! autoquant validate autoquant.yaml --detailed
//!
//! # Re-encode a qconf file
//! autoquant convert qconf.json qconf.yaml
//! ```

use autoquant::config::{
    load_config, CheckArgs, Cli, Command, ConvertArgs, InspectArgs, OutputFormat, ValidateArgs,
};
use autoquant::persist::{ConfigFormat, QConfSummary};
use clap::Parser;
use std::fs;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.quiet {
        "autoquant=error"
    } else if cli.verbose {
        "autoquant=debug"
    } else {
        "autoquant=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let log_level = if cli.quiet {
        LogLevel::Quiet
    } else if cli.verbose {
        LogLevel::Verbose
    } else {
        LogLevel::Normal
    };

    let result = match cli.command {
        Command::Inspect(args) => run_inspect(args, log_level),
        Command::Check(args) => run_check(args, log_level),
        Command::Validate(args) => run_validate(args, log_level),
        Command::Convert(args) => run_convert(args, log_level),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LogLevel {
    Quiet,
    Normal,
    Verbose,
}

fn log(level: LogLevel, required: LogLevel, msg: &str) {
    if level != LogLevel::Quiet && (level == required || required == LogLevel::Normal) {
        println!("{msg}");
    }
}

fn scope_label(fqn: &str) -> &str {
    if fqn.is_empty() {
        "<root>"
    } else {
        fqn
    }
}

fn run_inspect(args: InspectArgs, level: LogLevel) -> Result<(), String> {
    let summary = QConfSummary::read(&args.qconf).map_err(|e| format!("Read error: {e}"))?;
    let stats = summary.summary();

    match args.format {
        OutputFormat::Text => {
            log(
                level,
                LogLevel::Normal,
                &format!("Qconf: {}", args.qconf.display()),
            );
            println!("Scopes: {}", stats.scopes);
            println!("Quantizable ops: {}", stats.q_ops);
            println!("Non-quantizable ops: {}", stats.nonq_ops);
            println!("Activation parameters: {}", stats.activation_params);
            println!("Weight parameters: {}", stats.weight_params);

            for (fqn, layer) in summary.layers() {
                println!();
                println!("{}:", scope_label(fqn));
                for (idx, op) in &layer.q_op_infos {
                    println!(
                        "  [{idx}] {} at '{}' ({})",
                        op.op_type, op.fqn, op.activation_observer.name
                    );
                }
                for (idx, op) in &layer.nonq_op_infos {
                    println!("  (nonq {idx}) {} at '{}'", op.op_type, op.fqn);
                }
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&stats)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&stats)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}

fn run_check(args: CheckArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Checking qconf: {}", args.qconf.display()),
    );

    let summary = QConfSummary::read(&args.qconf).map_err(|e| format!("Read error: {e}"))?;
    summary.validate().map_err(|e| {
        if e.is_lookup() {
            format!("Unknown name: {e}")
        } else {
            format!("Check failed: {e}")
        }
    })?;

    let stats = summary.summary();
    log(
        level,
        LogLevel::Normal,
        &format!(
            "Qconf is valid ({} scopes, {} quantizable ops)",
            stats.scopes, stats.q_ops
        ),
    );
    Ok(())
}

fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Validating config: {}", args.config.display()),
    );

    let config = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    log(level, LogLevel::Normal, "Configuration is valid");

    if args.detailed {
        println!();
        println!("Configuration Summary:");
        println!("  Activation observer: {}", config.qconfig.activation.name);
        if let Some(dtype) = &config.qconfig.activation.dtype {
            println!("    dtype: {dtype}");
        }
        if let Some(qscheme) = &config.qconfig.activation.qscheme {
            println!("    qscheme: {qscheme}");
        }
        println!("  Weight observer: {}", config.qconfig.weight.name);
        if let Some(dtype) = &config.qconfig.weight.dtype {
            println!("    dtype: {dtype}");
        }
        if let Some(qscheme) = &config.qconfig.weight.qscheme {
            println!("    qscheme: {qscheme}");
        }
        println!();
        println!("  Calibration passes: {}", config.calibration.passes);
        println!("  Sync pool scales: {}", config.calibration.sync_pool_scales);
        if let Some(path) = &config.output.path {
            println!();
            println!("  Output: {} ({:?})", path.display(), config.output.format);
        }
    }

    Ok(())
}

fn run_convert(args: ConvertArgs, level: LogLevel) -> Result<(), String> {
    let format = ConfigFormat::from_path(&args.output)
        .ok_or_else(|| format!("Unsupported output extension: {}", args.output.display()))?;
    let summary = QConfSummary::read(&args.input).map_err(|e| format!("Read error: {e}"))?;
    let data = summary
        .to_string(format, !args.compact)
        .map_err(|e| format!("Serialization error: {e}"))?;
    fs::write(&args.output, data).map_err(|e| format!("Write error: {e}"))?;

    log(
        level,
        LogLevel::Normal,
        &format!(
            "Converted {} -> {}",
            args.input.display(),
            args.output.display()
        ),
    );
    Ok(())
}
