//! Per-verb option structs.
//!
//! Pure data. Backends read these; nothing here touches the filesystem.

use std::fmt;
use std::str::FromStr;

use crate::core::profile::{OptLevel, Profile, Sanitizer};

/// One build request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub release: bool,
    /// Overrides `release` when set.
    pub opt_level: Option<OptLevel>,
    pub sanitizer: Option<Sanitizer>,
    pub target: Option<String>,
    /// Parallel jobs; `None` lets quay pick the number of CPUs.
    pub jobs: Option<usize>,
    /// Clean this configuration before building.
    pub clean: bool,
    pub verbose: bool,
    pub toolchain: Option<String>,
}

impl BuildOptions {
    pub fn profile(&self) -> Profile {
        Profile::new(self.opt_level, self.release, self.sanitizer)
    }

    /// Job count to hand to the toolchain.
    pub fn job_count(&self) -> usize {
        self.jobs.filter(|&j| j > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOptions {
    pub verbose: bool,
    /// Only run tests whose name matches.
    pub filter: Option<String>,
    pub toolchain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub release: bool,
    pub opt_level: Option<OptLevel>,
    pub sanitizer: Option<Sanitizer>,
    pub target: Option<String>,
    /// Arguments passed through to the program.
    pub args: Vec<String>,
    pub verbose: bool,
    pub toolchain: Option<String>,
}

impl RunOptions {
    /// The build that must succeed before anything runs.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            release: self.release,
            opt_level: self.opt_level,
            sanitizer: self.sanitizer,
            target: self.target.clone(),
            jobs: None,
            clean: false,
            verbose: self.verbose,
            toolchain: self.toolchain.clone(),
        }
    }

    pub fn profile(&self) -> Profile {
        Profile::new(self.opt_level, self.release, self.sanitizer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchOptions {
    pub verbose: bool,
    pub target: Option<String>,
    pub toolchain: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanOptions {
    /// Also remove dependency caches fetched by the backend.
    pub all: bool,
    pub verbose: bool,
}

/// Test framework chosen at project creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFramework {
    GoogleTest,
    Catch2,
    Doctest,
}

impl TestFramework {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestFramework::GoogleTest => "googletest",
            TestFramework::Catch2 => "catch2",
            TestFramework::Doctest => "doctest",
        }
    }

    /// Port name in the vcpkg registry.
    pub fn vcpkg_port(&self) -> &'static str {
        match self {
            TestFramework::GoogleTest => "gtest",
            TestFramework::Catch2 => "catch2",
            TestFramework::Doctest => "doctest",
        }
    }

    /// Module name in the Bazel Central Registry.
    pub fn bcr_module(&self) -> &'static str {
        match self {
            TestFramework::GoogleTest => "googletest",
            TestFramework::Catch2 => "catch2",
            TestFramework::Doctest => "doctest",
        }
    }

    /// Wrap name in Meson's wrapdb.
    pub fn wrap_name(&self) -> &'static str {
        match self {
            TestFramework::GoogleTest => "gtest",
            TestFramework::Catch2 => "catch2",
            TestFramework::Doctest => "doctest",
        }
    }
}

impl FromStr for TestFramework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "googletest" | "gtest" => Ok(TestFramework::GoogleTest),
            "catch2" => Ok(TestFramework::Catch2),
            "doctest" => Ok(TestFramework::Doctest),
            _ => Err(format!("unknown test framework '{}'", s)),
        }
    }
}

impl fmt::Display for TestFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Benchmark framework chosen at project creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchFramework {
    GoogleBenchmark,
    Catch2Benchmark,
}

impl BenchFramework {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchFramework::GoogleBenchmark => "google-benchmark",
            BenchFramework::Catch2Benchmark => "catch2-benchmark",
        }
    }

    pub fn vcpkg_port(&self) -> &'static str {
        match self {
            BenchFramework::GoogleBenchmark => "benchmark",
            BenchFramework::Catch2Benchmark => "catch2",
        }
    }

    pub fn bcr_module(&self) -> &'static str {
        match self {
            BenchFramework::GoogleBenchmark => "google_benchmark",
            BenchFramework::Catch2Benchmark => "catch2",
        }
    }

    pub fn wrap_name(&self) -> &'static str {
        match self {
            BenchFramework::GoogleBenchmark => "google-benchmark",
            BenchFramework::Catch2Benchmark => "catch2",
        }
    }
}

impl FromStr for BenchFramework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google-benchmark" | "benchmark" => Ok(BenchFramework::GoogleBenchmark),
            "catch2-benchmark" => Ok(BenchFramework::Catch2Benchmark),
            _ => Err(format!("unknown benchmark framework '{}'", s)),
        }
    }
}

/// Project settings handed to the generation hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConfig {
    pub name: String,
    pub version: String,
    pub is_library: bool,
    /// C++ standard, e.g. `20`.
    pub cpp_standard: u32,
    pub test_framework: Option<TestFramework>,
    pub bench_framework: Option<BenchFramework>,
    pub dependencies: Vec<String>,
}

impl InitConfig {
    pub fn new(name: impl Into<String>) -> Self {
        InitConfig {
            name: name.into(),
            version: "0.1.0".to_string(),
            is_library: false,
            cpp_standard: 20,
            test_framework: None,
            bench_framework: None,
            dependencies: Vec::new(),
        }
    }
}
