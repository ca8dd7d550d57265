//! quay CLI - one set of verbs for C/C++ build systems

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use quay::util::config::{global_config_path, GlobalConfig};
use quay::util::shell::{ColorChoice, Shell};
use quay::{BackendContext, BackendKind, BuildBackend};

/// Settings every command receives from the global flags.
pub struct GlobalOptions {
    pub shell: Shell,
    pub verbose: bool,
    pub backend: Option<BackendKind>,
    pub project_root: PathBuf,
}

impl GlobalOptions {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let color = if cli.no_color {
            ColorChoice::Never
        } else {
            ColorChoice::Auto
        };

        let cwd = std::env::current_dir().context("failed to read the current directory")?;
        let project_root = match &cli.directory {
            Some(dir) => cwd.join(dir),
            None => cwd,
        };

        Ok(GlobalOptions {
            shell: Shell::from_flags(cli.quiet, cli.verbose, color),
            verbose: cli.verbose,
            backend: cli.backend,
            project_root,
        })
    }

    pub fn config(&self) -> GlobalConfig {
        global_config_path()
            .map(|path| GlobalConfig::load_or_default(&path))
            .unwrap_or_default()
    }

    pub fn context_for(&self, root: PathBuf) -> BackendContext {
        BackendContext::from_config(root, &self.config()).with_shell(self.shell.clone())
    }

    /// The backend for the project at `-C` (or the current directory).
    pub fn backend(&self) -> Result<Box<dyn BuildBackend>> {
        quay::open_backend(self.context_for(self.project_root.clone()), self.backend)
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            if let Some(hint) = quay::util::backend_error(&e).and_then(|err| err.hint()) {
                eprintln!("help: {}", hint);
            }
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("quay=debug")
    } else {
        EnvFilter::new("quay=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let opts = GlobalOptions::from_cli(&cli)?;

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &opts),
        Commands::Build(args) => commands::build::execute(args, &opts),
        Commands::Test(args) => commands::test::execute(args, &opts),
        Commands::Run(args) => commands::run::execute(args, &opts),
        Commands::Bench(args) => commands::bench::execute(args, &opts),
        Commands::Clean(args) => commands::clean::execute(args, &opts),
        Commands::Ci(args) => commands::ci::execute(args, &opts),
        Commands::Add(args) => commands::deps::add(args, &opts),
        Commands::Remove(args) => commands::deps::remove(args, &opts),
        Commands::List => commands::deps::list(&opts),
        Commands::Search(args) => commands::deps::search(args, &opts),
        Commands::Info(args) => commands::deps::info(args, &opts),
        Commands::Doctor => commands::doctor::execute(&opts),
        Commands::Config(args) => commands::config::execute(args, &opts),
    }
}
