//! ASG Loader CLI - разрешение имён и обход пакетов из командной строки.
//!
//! ```bash
//! # Объект по составному имени
//! asg-loader -I plugins resolve pipeline.stages.clean.NAME
//!
//! # Модуль по пути или по имени
//! asg-loader load plugins/pipeline
//!
//! # Все модули пакета (директория или zip в пути поиска)
//! asg-loader -I bundle.zip walk pipeline
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::debug;

use asg_loader::{ImportResult, ModuleConfig, ModuleLoader};

/// ASG Loader
#[derive(Parser)]
#[command(name = "asg-loader")]
#[command(author = "Pavel (Xzdes)")]
#[command(version)]
#[command(about = "Resolve dotted names and walk packages of ASG modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Extra search path (directory or zip archive), searched first
    #[arg(short = 'I', long = "path", global = true)]
    paths: Vec<PathBuf>,

    /// Loader configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a dotted identifier to a value
    Resolve {
        /// Identifier, e.g. pkg.module.NAME
        id: String,
    },

    /// Load a module from a filesystem path, or resolve a dotted name
    Load {
        /// Path to a module file or package directory, or a dotted name
        target: String,
    },

    /// List a package and all of its submodules
    Walk {
        /// Dotted package name
        package: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ImportResult<()> {
    let mut config = match &cli.config {
        Some(path) => ModuleConfig::from_toml_file(path)?,
        None => ModuleConfig::default(),
    }
    .with_env();

    let mut paths = cli.paths;
    paths.append(&mut config.search_paths);
    config.search_paths = paths;
    debug!("search paths: {:?}", config.search_paths);

    let mut loader = ModuleLoader::with_config(config);
    match cli.command {
        Commands::Resolve { id } => {
            println!("{}", loader.load_object(id)?);
        }
        Commands::Load { target } => {
            println!("{}", loader.load_module_or_object(&target)?);
        }
        Commands::Walk { package } => {
            for module in loader.walk_modules(&package)? {
                println!("{}", module?.name());
            }
        }
    }
    Ok(())
}
