//! Command-line interface for the Osi2 plugin control layer.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use osi2_control::config::env_vars;
use osi2_control::manager::global;
use osi2_control::{
    library_file_name, Control, ControlConfig, ControlError, LogLevel, NativeManagerConfig,
    Status,
};

/// Osi2 plugin control - load plugin libraries and exercise their objects.
#[derive(Parser, Debug)]
#[command(name = "osi2ctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// TOML file with control settings.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Default directory of the plugin manager.
    #[arg(long, global = true)]
    manager_dir: Option<PathBuf>,

    /// Print one JSON record per step.
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Load a plugin library and report the outcome.
    Load {
        /// Short name to bind the library to.
        #[arg(required = true)]
        short_name: String,

        /// Library file name (defaults to the conventional name).
        #[arg(short, long)]
        lib: Option<String>,

        /// Directory to load from.
        #[arg(short, long)]
        dir: Option<String>,
    },

    /// Load a library, create and destroy one object, then unload.
    Probe {
        #[arg(required = true)]
        short_name: String,

        /// API the object must implement.
        #[arg(required = true)]
        api_name: String,

        #[arg(short, long)]
        lib: Option<String>,

        #[arg(short, long)]
        dir: Option<String>,
    },

    /// Print the conventional library file name for a short name.
    Name {
        #[arg(required = true)]
        short_name: String,
    },
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(args.verbose));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Command::Name { ref short_name } => {
            let name = library_file_name(short_name)
                .with_context(|| format!("Invalid short name: {:?}", short_name))?;
            println!("{}", name);
            Ok(ExitCode::SUCCESS)
        }
        Command::Load {
            ref short_name,
            ref lib,
            ref dir,
        } => {
            let mut control = build_control(&args)?;
            let result = load(&mut control, short_name, lib.as_deref(), dir.as_deref());
            let ok = print_step(args.json, "load", result);
            Ok(exit_code(ok))
        }
        Command::Probe {
            ref short_name,
            ref api_name,
            ref lib,
            ref dir,
        } => {
            let mut control = build_control(&args)?;
            let ok = probe(
                &mut control,
                args.json,
                short_name,
                api_name,
                lib.as_deref(),
                dir.as_deref(),
            );
            Ok(exit_code(ok))
        }
    }
}

/// Filter used when `RUST_LOG` is unset. The crate directive follows the
/// verbosity so debug events from the control pass with `--verbose`.
fn default_filter(verbose: bool) -> tracing_subscriber::EnvFilter {
    let (crate_level, global_level) = if verbose {
        ("debug", tracing::Level::DEBUG)
    } else {
        ("info", tracing::Level::WARN)
    };
    tracing_subscriber::EnvFilter::new(format!("osi2_control={}", crate_level))
        .add_directive(global_level.into())
}

/// Control over the process-wide native manager.
fn build_control(args: &Args) -> Result<Control> {
    let mut config = match &args.config {
        Some(path) => ControlConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ControlConfig::from_env().context("Invalid environment configuration")?,
    };
    if args.verbose {
        config.log_level = LogLevel::Debug;
    }

    let manager_config = match &args.manager_dir {
        Some(dir) => NativeManagerConfig::with_default_dir(dir),
        None => NativeManagerConfig::from_env(),
    };
    let manager = global::get_or_init_native(manager_config);

    Ok(Control::with_config(config).with_manager(manager))
}

fn load(
    control: &mut Control,
    short_name: &str,
    lib: Option<&str>,
    dir: Option<&str>,
) -> Result<Status, ControlError> {
    match (lib, dir) {
        (Some(lib), Some(dir)) => control.load_from(short_name, lib, Some(dir)),
        (Some(lib), None) => control.load_with(short_name, lib),
        (None, Some(dir)) => {
            let lib = library_file_name(short_name)
                .ok_or_else(|| ControlError::InvalidShortName(short_name.to_string()))?;
            control.load_from(short_name, &lib, Some(dir))
        }
        (None, None) => control.load(short_name),
    }
}

fn probe(
    control: &mut Control,
    json: bool,
    short_name: &str,
    api_name: &str,
    lib: Option<&str>,
    dir: Option<&str>,
) -> bool {
    let loaded = load(control, short_name, lib, dir);
    if !print_step(json, "load", loaded) {
        return false;
    }

    let mut ok = match control.create_object(api_name, Some(short_name)) {
        Ok((object, status)) => {
            print_step(json, "create", Ok(status));
            let destroyed = control
                .destroy_object(object)
                .map_err(|failure| failure.error);
            print_step(json, "destroy", destroyed)
        }
        Err(err) => print_step(json, "create", Err(err)),
    };

    ok &= print_step(json, "unload", control.unload(short_name));
    ok
}

/// Print one step's outcome and return whether it succeeded.
fn print_step(json: bool, step: &str, result: Result<Status, ControlError>) -> bool {
    let (status, detail) = match &result {
        Ok(status) => (*status, None),
        Err(err) => (err.status(), Some(err.to_string())),
    };

    if json {
        let record = serde_json::json!({
            "step": step,
            "status": status,
            "code": status.code(),
            "error": detail,
        });
        println!("{}", record);
    } else {
        match detail {
            Some(detail) => println!("{:<8} {}: {}", step, status, detail),
            None => println!("{:<8} {}", step, status),
        }
    }
    status.is_success()
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
