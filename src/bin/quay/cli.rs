//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use quay::core::{BenchFramework, OptLevel, Sanitizer, TestFramework};
use quay::BackendKind;

/// quay - one set of verbs for CMake+vcpkg, Bazel and Meson projects
#[derive(Parser)]
#[command(name = "quay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Stream toolchain output and enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Use this backend instead of detecting one from marker files
    #[arg(long, global = true, value_name = "vcpkg|bazel|meson")]
    pub backend: Option<BackendKind>,

    /// Run as if started in <DIR>
    #[arg(short = 'C', global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create build files for a new project
    Init(InitArgs),

    /// Build the project and collect artifacts in .bin/native
    Build(BuildArgs),

    /// Run the project's tests
    Test(TestArgs),

    /// Build, then run an executable
    Run(RunArgs),

    /// Run a benchmark executable
    Bench(BenchArgs),

    /// Remove build directories and collected artifacts
    Clean(CleanArgs),

    /// Build for every toolchain in quay-ci.toml, in containers or on the host
    Ci(CiArgs),

    /// Add a dependency to the backend's manifest
    Add(AddArgs),

    /// Remove a dependency from the backend's manifest
    Remove(RemoveArgs),

    /// List declared dependencies
    List,

    /// Search the local package registry
    Search(SearchArgs),

    /// Show registry metadata for a package
    Info(InfoArgs),

    /// Check which build tools are installed
    Doctor,

    /// Show or change the user configuration
    Config(ConfigArgs),
}

/// Optimization and sanitizer selection shared by `build` and `run`.
#[derive(Args, Debug, Clone, Default)]
#[command(group(ArgGroup::new("sanitizers").multiple(false)))]
pub struct ProfileArgs {
    /// Build with optimizations
    #[arg(short, long)]
    pub release: bool,

    /// Optimization level: 0, 1, 2, 3, s or fast (overrides --release)
    #[arg(short = 'O', long = "opt", value_name = "LEVEL")]
    pub opt_level: Option<OptLevel>,

    /// AddressSanitizer
    #[arg(long, group = "sanitizers")]
    pub asan: bool,

    /// ThreadSanitizer
    #[arg(long, group = "sanitizers")]
    pub tsan: bool,

    /// MemorySanitizer
    #[arg(long, group = "sanitizers")]
    pub msan: bool,

    /// UndefinedBehaviorSanitizer
    #[arg(long, group = "sanitizers")]
    pub ubsan: bool,

    /// Sanitizer by short name; unknown names are ignored
    #[arg(long, group = "sanitizers", value_name = "NAME")]
    pub sanitizer: Option<String>,

    /// Toolchain override (CMake toolchain file, Bazel config or Meson native file)
    #[arg(long)]
    pub toolchain: Option<String>,
}

impl ProfileArgs {
    pub fn sanitizer(&self) -> Option<Sanitizer> {
        if self.asan {
            Some(Sanitizer::Address)
        } else if self.tsan {
            Some(Sanitizer::Thread)
        } else if self.msan {
            Some(Sanitizer::Memory)
        } else if self.ubsan {
            Some(Sanitizer::UndefinedBehavior)
        } else {
            self.sanitizer.as_deref().and_then(Sanitizer::parse_lenient)
        }
    }
}

#[derive(Args)]
pub struct InitArgs {
    /// Project name
    pub name: String,

    /// Directory to create the project in (defaults to the name)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Create a library instead of an executable
    #[arg(long)]
    pub lib: bool,

    /// C++ standard
    #[arg(long = "std", default_value_t = 20)]
    pub cpp_standard: u32,

    /// googletest, catch2 or doctest
    #[arg(long)]
    pub test_framework: Option<TestFramework>,

    /// google-benchmark or catch2-benchmark
    #[arg(long)]
    pub bench_framework: Option<BenchFramework>,

    /// Initial dependencies
    #[arg(long = "dep", value_name = "NAME")]
    pub dependencies: Vec<String>,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Build only this target
    #[arg(long)]
    pub target: Option<String>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Clean this configuration first
    #[arg(long)]
    pub clean: bool,

    /// List buildable targets instead of building
    #[arg(long)]
    pub list: bool,
}

#[derive(Args)]
pub struct TestArgs {
    /// Only run tests matching this filter
    pub filter: Option<String>,

    #[arg(long)]
    pub toolchain: Option<String>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Executable to run when the project has several
    #[arg(long)]
    pub target: Option<String>,

    /// Arguments passed to the program
    #[arg(last = true)]
    pub args: Vec<String>,
}

#[derive(Args)]
pub struct BenchArgs {
    /// Benchmark executable to run
    #[arg(long)]
    pub target: Option<String>,

    #[arg(long)]
    pub toolchain: Option<String>,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Also remove dependency caches
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct CiArgs {
    /// Build only this toolchain, even if it is inactive
    #[arg(long, value_name = "NAME")]
    pub target: Option<String>,

    /// Rebuild toolchain images that are already up to date
    #[arg(long)]
    pub rebuild: bool,

    /// Run the built executable afterwards
    #[arg(long)]
    pub run: bool,

    /// Run the tests after building
    #[arg(long)]
    pub test: bool,

    /// Run benchmark executables after building
    #[arg(long)]
    pub bench: bool,
}

#[derive(Args)]
pub struct AddArgs {
    /// Package name
    pub name: String,

    /// Version to pin (defaults to the latest in the registry)
    #[arg(long, default_value = "")]
    pub version: String,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Package name to remove
    pub name: String,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Substring of the package name
    pub query: String,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Package name
    pub name: String,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the configuration and resolved registry roots
    Show,

    /// Record the vcpkg checkout to use
    SetVcpkgRoot {
        path: PathBuf,
    },

    /// Record the Bazel Central Registry checkout to use
    SetBcrRoot {
        path: PathBuf,
    },
}
