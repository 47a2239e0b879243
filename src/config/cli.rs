//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! autoquant inspect qconf.json
//! autoquant inspect qconf.yaml --format json
//! autoquant check qconf.json
//! autoquant validate autoquant.yaml --detailed
//! autoquant convert qconf.json qconf.yaml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Automatic quantization toolkit
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "autoquant")]
#[command(version)]
#[command(about = "Inspect, check and convert automatic quantization configurations")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Summarize a qconf file
    Inspect(InspectArgs),

    /// Decode every entry of a qconf file and report problems
    Check(CheckArgs),

    /// Validate a run configuration
    Validate(ValidateArgs),

    /// Rewrite a qconf file in another format
    Convert(ConvertArgs),
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InspectArgs {
    /// Path to a qconf file (.json, .yaml)
    #[arg(value_name = "QCONF")]
    pub qconf: PathBuf,

    /// Output format (text, json, yaml)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct CheckArgs {
    #[arg(value_name = "QCONF")]
    pub qconf: PathBuf,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML run configuration
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Print the resolved configuration
    #[arg(short, long)]
    pub detailed: bool,
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ConvertArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Destination; the format follows its extension
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Write compact JSON
    #[arg(long)]
    pub compact: bool,
}

/// Output format for the inspect command
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            _ => Err(format!(
                "Unknown output format: {s}. Valid formats: text, json, yaml"
            )),
        }
    }
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inspect_command() {
        let cli = parse_args(["autoquant", "inspect", "qconf.json"]).unwrap();
        match cli.command {
            Command::Inspect(args) => {
                assert_eq!(args.qconf, PathBuf::from("qconf.json"));
                assert_eq!(args.format, OutputFormat::Text);
            }
            _ => panic!("Expected Inspect command"),
        }
    }

    #[test]
    fn test_parse_inspect_json_format() {
        let cli = parse_args(["autoquant", "inspect", "qconf.yaml", "--format", "json"]).unwrap();
        match cli.command {
            Command::Inspect(args) => assert_eq!(args.format, OutputFormat::Json),
            _ => panic!("Expected Inspect command"),
        }
    }

    #[test]
    fn test_parse_check_command() {
        let cli = parse_args(["autoquant", "check", "qconf.json"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Check(CheckArgs {
                qconf: PathBuf::from("qconf.json")
            })
        );
    }

    #[test]
    fn test_parse_validate_detailed() {
        let cli = parse_args(["autoquant", "validate", "run.yaml", "-d"]).unwrap();
        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.config, PathBuf::from("run.yaml"));
                assert!(args.detailed);
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_parse_convert_command() {
        let cli = parse_args(["autoquant", "convert", "a.json", "b.yaml", "--compact"]).unwrap();
        match cli.command {
            Command::Convert(args) => {
                assert_eq!(args.input, PathBuf::from("a.json"));
                assert_eq!(args.output, PathBuf::from("b.yaml"));
                assert!(args.compact);
            }
            _ => panic!("Expected Convert command"),
        }
    }

    #[test]
    fn test_global_verbose_flag() {
        let cli = parse_args(["autoquant", "check", "qconf.json", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_invalid_output_format() {
        let result = parse_args(["autoquant", "inspect", "q.json", "--format", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(parse_args(["autoquant"]).is_err());
    }
}
