//! doomscope CLI
//!
//! Commands:
//! - replay: Replay a recorded gesture log and print the emitted events
//! - validate: Validate a detection configuration file
//! - presets: Print the built-in configuration presets
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use doomscope::config::{DetectionConfig, HeuristicsPreset, SensitivityPreset};
use doomscope::replay::{self, ReplayEntry};
use doomscope::{DetectorError, DOOMSCOPE_VERSION, PRODUCER_NAME};

/// doomscope - On-device doom-scrolling detection
#[derive(Parser)]
#[command(name = "doomscope")]
#[command(version = DOOMSCOPE_VERSION)]
#[command(about = "Replay scroll logs and inspect detection configurations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an NDJSON gesture log and print the event log
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Sensitivity preset
        #[arg(long, default_value = "medium")]
        preset: SensitivityPreset,

        /// Heuristics preset
        #[arg(long)]
        heuristics: Option<HeuristicsPreset>,

        /// Configuration file (overrides --preset)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Validate a detection configuration
    Validate {
        /// Configuration file path (use - for stdin)
        #[arg(short, long)]
        config: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the built-in presets
    Presets {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), DoomscopeCliError> {
    match cli.command {
        Commands::Replay {
            input,
            preset,
            heuristics,
            config,
            output_format,
        } => cmd_replay(&input, preset, heuristics, config.as_deref(), output_format),

        Commands::Validate { config, json } => cmd_validate(&config, json),

        Commands::Presets { json } => cmd_presets(json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn read_input(path: &Path) -> Result<String, DoomscopeCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn cmd_replay(
    input: &Path,
    preset: SensitivityPreset,
    heuristics: Option<HeuristicsPreset>,
    config: Option<&Path>,
    output_format: OutputFormat,
) -> Result<(), DoomscopeCliError> {
    let mut detection = match config {
        Some(path) => DetectionConfig::from_json(&fs::read_to_string(path)?)?,
        None => DetectionConfig::preset(preset),
    };
    if let Some(heuristics) = heuristics {
        detection = detection.with_heuristics(heuristics);
    }
    let detection = detection.validated()?;

    let records = replay::parse_ndjson(&read_input(input)?)?;
    if records.is_empty() {
        return Err(DoomscopeCliError::NoRecords);
    }

    let log = replay::replay(detection, &records);
    print!("{}", format_output(&log, &output_format)?);
    Ok(())
}

fn cmd_validate(config: &Path, json: bool) -> Result<(), DoomscopeCliError> {
    let detection = DetectionConfig::from_json(&read_input(config)?)?;
    let issues = detection.validate();

    let report = ValidationReport {
        valid: issues.is_empty(),
        issue_count: issues.len(),
        issues,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Valid:  {}", report.valid);
        println!("Issues: {}", report.issue_count);

        if !report.issues.is_empty() {
            println!("\nIssues:");
            for issue in &report.issues {
                println!("  - {}", issue);
            }
        }
    }

    if report.valid {
        Ok(())
    } else {
        Err(DoomscopeCliError::ValidationFailed(report.issue_count))
    }
}

fn cmd_presets(json: bool) -> Result<(), DoomscopeCliError> {
    if json {
        let presets: serde_json::Map<String, serde_json::Value> = SensitivityPreset::ALL
            .into_iter()
            .map(|preset| -> Result<(String, serde_json::Value), serde_json::Error> {
                Ok((preset.name().to_string(), serde_json::to_value(DetectionConfig::preset(preset))?))
            })
            .collect::<Result<_, _>>()?;
        println!("{}", serde_json::to_string_pretty(&presets)?);
        return Ok(());
    }

    println!("Sensitivity presets");
    println!("===================");
    for preset in SensitivityPreset::ALL {
        let c = DetectionConfig::preset(preset);
        println!();
        println!("{}", preset);
        println!(
            "  interventions: gentle {:.2}, firm {:.2}, mandatory break {:.2}",
            c.intensity.gentle, c.intensity.firm, c.intensity.mandatory_break
        );
        println!(
            "  cooldowns: gentle {}s, firm {}s, mandatory break {}s, post-break {}s",
            c.cooldown.gentle_sec, c.cooldown.firm_sec, c.cooldown.mandatory_break_sec, c.cooldown.post_break_sec
        );
        println!(
            "  session: minimum {}s, extended {}s, maximum {}s",
            c.session.minimum_session_duration_sec,
            c.session.extended_session_duration_sec,
            c.session.maximum_session_duration_sec
        );
    }

    println!();
    println!("Heuristics presets: {}", HeuristicsPreset::ALL.map(|p| p.name()).join(", "));
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), DoomscopeCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "doomscope_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("doomscope version {}", DOOMSCOPE_VERSION),
    });

    let defaults_issues = DetectionConfig::default().validate();
    checks.push(if defaults_issues.is_empty() {
        DoctorCheck {
            name: "default_config".to_string(),
            status: CheckStatus::Ok,
            message: "Medium preset validates".to_string(),
        }
    } else {
        DoctorCheck {
            name: "default_config".to_string(),
            status: CheckStatus::Error,
            message: defaults_issues.join("; "),
        }
    });

    if let Some(config_path) = config {
        let check = if !config_path.exists() {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Configuration file does not exist".to_string(),
            }
        } else {
            match fs::read_to_string(config_path) {
                Ok(content) => match DetectionConfig::from_json(&content) {
                    Ok(detection) => {
                        let issues = detection.validate();
                        if issues.is_empty() {
                            DoctorCheck {
                                name: "config".to_string(),
                                status: CheckStatus::Ok,
                                message: "Configuration file valid".to_string(),
                            }
                        } else {
                            DoctorCheck {
                                name: "config".to_string(),
                                status: CheckStatus::Error,
                                message: format!("{} configuration issue(s): {}", issues.len(), issues.join("; ")),
                            }
                        }
                    }
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read configuration file: {}", e),
                },
            }
        };
        checks.push(check);
    }

    checks.push(if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay input ready)".to_string(),
        }
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: DOOMSCOPE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("doomscope Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    if report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error)) {
        Err(DoomscopeCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn format_output(log: &[ReplayEntry], format: &OutputFormat) -> Result<String, DoomscopeCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::with_capacity(log.len());
            for entry in log {
                lines.push(serde_json::to_string(entry)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(log)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(log)?),
    }
}

// Error types

#[derive(Debug)]
enum DoomscopeCliError {
    Io(io::Error),
    Detector(DetectorError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for DoomscopeCliError {
    fn from(e: io::Error) -> Self {
        DoomscopeCliError::Io(e)
    }
}

impl From<DetectorError> for DoomscopeCliError {
    fn from(e: DetectorError) -> Self {
        DoomscopeCliError::Detector(e)
    }
}

impl From<serde_json::Error> for DoomscopeCliError {
    fn from(e: serde_json::Error) -> Self {
        DoomscopeCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DoomscopeCliError> for CliError {
    fn from(e: DoomscopeCliError) -> Self {
        match e {
            DoomscopeCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DoomscopeCliError::Detector(e) => {
                let (code, hint) = match &e {
                    DetectorError::InvalidConfiguration(_) => {
                        ("INVALID_CONFIG", "Run 'doomscope validate' for details")
                    }
                    DetectorError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    DetectorError::ParseError(_) => {
                        ("PARSE_ERROR", "Each line needs a timestamp and a record type")
                    }
                    DetectorError::UnknownPreset(_) => ("UNKNOWN_PRESET", "Run 'doomscope presets' to list presets"),
                    DetectorError::RuntimeError(_) => ("RUNTIME_ERROR", "Retry the command"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            DoomscopeCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DoomscopeCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No replay records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            DoomscopeCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} configuration issue(s) found", count),
                hint: Some("Fix the reported issues and retry".to_string()),
            },
            DoomscopeCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    valid: bool,
    issue_count: usize,
    issues: Vec<String>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
