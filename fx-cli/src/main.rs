//! fx command-line interface

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fx::config::presets;
use fx::{load_program, EffectSet, FxConfig, FxError, Outcome, Pipeline, Value};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "fx")]
#[command(about = "Effect checker and speculative runtime for fx programs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the effects of a program document
    Check(CheckArgs),

    /// Check a program, then run one of its functions
    Run(RunArgs),

    /// Show the effect set a list of specifiers declares
    Effects {
        /// Specifiers such as `reads` or `<decides>`
        specifiers: Vec<String>,
    },

    /// Create default configuration file
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "fx.toml")]
        output: PathBuf,

        /// Start from a preset (strict, sandbox, debug)
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Validate configuration file
    ValidateConfig {
        /// Configuration file path
        path: PathBuf,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Program document (JSON)
    input: PathBuf,

    /// Print inferred and declared effects of every function
    #[arg(long)]
    effects: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Program document (JSON)
    input: PathBuf,

    /// Function to run
    #[arg(short, long, default_value = "main")]
    entry: String,

    /// Arguments passed to the entry function
    #[arg(short, long = "arg")]
    args: Vec<String>,

    /// Output format (pretty, json)
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Check(args) => handle_check(args, cli.config.as_deref()),
        Commands::Run(args) => handle_run(args, cli.config.as_deref()),
        Commands::Effects { specifiers } => handle_effects(&specifiers),
        Commands::InitConfig { output, preset } => handle_init_config(&output, preset.as_deref()),
        Commands::ValidateConfig { path } => handle_validate_config(&path),
    }
}

fn load_config(path: Option<&Path>) -> Result<FxConfig> {
    let config = match path {
        Some(path) => FxConfig::from_file(path)?,
        None => FxConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn handle_check(args: CheckArgs, config_path: Option<&Path>) -> Result<()> {
    info!("Checking {}", args.input.display());

    let config = load_config(config_path)?;
    let program = load_program(&args.input)?;
    let pipeline = Pipeline::new(config);

    match pipeline.check(&program) {
        Ok(result) => {
            for diagnostic in &result.diagnostics {
                warn!("{}", diagnostic.message);
            }
            if args.effects {
                for (id, def) in program.functions() {
                    let effective = result.result.effects_of(id).unwrap_or_default();
                    let required = result.result.required_of(id).unwrap_or_default();
                    println!("{} ({}): declares {} requires {}", def.signature.name, id, effective, required);
                }
            }
            info!(
                "{} functions checked in {:?} ({} rounds)",
                program.len(),
                result.duration,
                result.result.rounds
            );
            Ok(())
        }
        Err(FxError::Violations(violations)) => {
            error!("Effect checking failed:");
            for violation in &violations {
                error!("  {}", violation);
            }
            bail!("{} effect violation(s)", violations.len())
        }
        Err(other) => Err(other.into()),
    }
}

fn handle_run(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let program = load_program(&args.input)?;
    let values: Vec<Value> = args.args.iter().map(|arg| parse_arg(arg)).collect();

    info!("Running {} from {}", args.entry, args.input.display());
    let report = Pipeline::new(config)
        .run(&program, &args.entry, values)
        .with_context(|| format!("running `{}`", args.entry))?;

    for diagnostic in &report.diagnostics {
        warn!("{}", diagnostic.message);
    }

    match args.format.as_str() {
        "json" => {
            let tasks: Vec<_> = report
                .tasks
                .iter()
                .map(|(handle, status)| serde_json::json!({ "task": handle.0, "status": status }))
                .collect();
            let json = serde_json::json!({
                "entry": report.entry.0,
                "outcome": report.outcome,
                "tasks": tasks,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        "pretty" => {
            match &report.outcome {
                Outcome::Succeeded(value) => println!("succeeded: {}", value),
                Outcome::Failed => println!("failed"),
            }
            for (handle, status) in &report.tasks {
                println!("  {}: {:?}", handle, status);
            }
            info!("  Check time: {:?}", report.check_time);
            info!("  Execute time: {:?}", report.execute_time);
        }
        other => bail!("Unknown format: {}", other),
    }

    Ok(())
}

fn handle_effects(specifiers: &[String]) -> Result<()> {
    let effects = EffectSet::from_specifiers(specifiers.iter().map(String::as_str))?;
    println!("{}", effects);
    Ok(())
}

fn handle_init_config(output: &Path, preset: Option<&str>) -> Result<()> {
    info!("Creating configuration file at {}", output.display());

    let config = match preset {
        None => FxConfig::default(),
        Some("strict") => presets::strict(),
        Some("sandbox") => presets::sandbox(),
        Some("debug") => presets::debug(),
        Some(other) => bail!("Unknown preset: {}", other),
    };
    config.to_file(output)?;

    info!("Configuration file created successfully!");
    Ok(())
}

fn handle_validate_config(path: &Path) -> Result<()> {
    info!("Validating configuration file {}", path.display());

    let config = FxConfig::from_file(path)?;
    config.validate()?;

    info!("Configuration file is valid!");
    Ok(())
}

/// Integers and booleans are taken literally, anything else as a string.
fn parse_arg(arg: &str) -> Value {
    if let Ok(n) = arg.parse::<i64>() {
        return Value::Int(n);
    }
    match arg {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "()" => Value::Unit,
        other => Value::Str(other.to_string()),
    }
}
