//! Build profile: optimization level, release flag and sanitizer.
//!
//! Every backend derives its flags, the human label and the output directory
//! name from one [`Profile`], so all three agree on what "-O2" or
//! "release+asan" means.

use std::fmt;
use std::str::FromStr;

/// Explicit optimization level. When present it overrides the release flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
    Size,
    Fast,
}

impl OptLevel {
    pub const ALL: [OptLevel; 6] = [
        OptLevel::O0,
        OptLevel::O1,
        OptLevel::O2,
        OptLevel::O3,
        OptLevel::Size,
        OptLevel::Fast,
    ];

    /// The code accepted on the command line (`0`, `1`, `2`, `3`, `s`, `fast`).
    pub fn code(&self) -> &'static str {
        match self {
            OptLevel::O0 => "0",
            OptLevel::O1 => "1",
            OptLevel::O2 => "2",
            OptLevel::O3 => "3",
            OptLevel::Size => "s",
            OptLevel::Fast => "fast",
        }
    }

    /// The compiler flag, e.g. `-O2`.
    pub fn flag(&self) -> String {
        format!("-O{}", self.code())
    }

    /// Parse an optional code; the empty string means "not set".
    pub fn from_code(code: &str) -> Result<Option<OptLevel>, String> {
        if code.is_empty() {
            Ok(None)
        } else {
            code.parse().map(Some)
        }
    }
}

impl FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("-O").trim_start_matches('O') {
            "0" => Ok(OptLevel::O0),
            "1" => Ok(OptLevel::O1),
            "2" => Ok(OptLevel::O2),
            "3" => Ok(OptLevel::O3),
            "s" => Ok(OptLevel::Size),
            "fast" => Ok(OptLevel::Fast),
            _ => Err(format!(
                "invalid optimization level '{}'; expected 0, 1, 2, 3, s or fast",
                s
            )),
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Runtime sanitizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sanitizer {
    Address,
    Thread,
    Memory,
    UndefinedBehavior,
}

impl Sanitizer {
    pub const ALL: [Sanitizer; 4] = [
        Sanitizer::Address,
        Sanitizer::Thread,
        Sanitizer::Memory,
        Sanitizer::UndefinedBehavior,
    ];

    /// Parse a short sanitizer name. Anything unrecognised means "no sanitizer".
    pub fn parse_lenient(name: &str) -> Option<Sanitizer> {
        match name.trim().to_ascii_lowercase().as_str() {
            "asan" => Some(Sanitizer::Address),
            "tsan" => Some(Sanitizer::Thread),
            "msan" => Some(Sanitizer::Memory),
            "ubsan" => Some(Sanitizer::UndefinedBehavior),
            "" => None,
            other => {
                tracing::debug!("ignoring unknown sanitizer '{}'", other);
                None
            }
        }
    }

    /// Short name used in labels and directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Sanitizer::Address => "asan",
            Sanitizer::Thread => "tsan",
            Sanitizer::Memory => "msan",
            Sanitizer::UndefinedBehavior => "ubsan",
        }
    }

    /// Value for `-fsanitize=` and Meson's `b_sanitize`.
    pub fn runtime_name(&self) -> &'static str {
        match self {
            Sanitizer::Address => "address",
            Sanitizer::Thread => "thread",
            Sanitizer::Memory => "memory",
            Sanitizer::UndefinedBehavior => "undefined",
        }
    }

    pub fn compile_flags(&self) -> Vec<String> {
        let mut flags = vec![format!("-fsanitize={}", self.runtime_name())];
        if matches!(self, Sanitizer::Address | Sanitizer::Memory) {
            flags.push("-fno-omit-frame-pointer".to_string());
        }
        flags
    }

    pub fn link_flags(&self) -> Vec<String> {
        vec![format!("-fsanitize={}", self.runtime_name())]
    }
}

impl fmt::Display for Sanitizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Profile {
    pub opt_level: Option<OptLevel>,
    pub release: bool,
    pub sanitizer: Option<Sanitizer>,
}

impl Profile {
    pub fn new(opt_level: Option<OptLevel>, release: bool, sanitizer: Option<Sanitizer>) -> Self {
        Profile {
            opt_level,
            release,
            sanitizer,
        }
    }

    /// Human-readable label, e.g. `-O2`, `-Os (size)` or `release+asan`.
    pub fn label(&self) -> String {
        let base = match self.opt_level {
            Some(OptLevel::O0) => "-O0 (debug)".to_string(),
            Some(OptLevel::Size) => "-Os (size)".to_string(),
            Some(level) => level.flag(),
            None if self.release => "release".to_string(),
            None => "debug".to_string(),
        };

        match self.sanitizer {
            Some(san) => format!("{}+{}", base, san),
            None => base,
        }
    }

    /// Directory name under the canonical output root, e.g. `O2` or `release-asan`.
    pub fn dir_name(&self) -> String {
        let base = match self.opt_level {
            Some(level) => format!("O{}", level.code()),
            None if self.release => "release".to_string(),
            None => "debug".to_string(),
        };

        match self.sanitizer {
            Some(san) => format!("{}-{}", base, san),
            None => base,
        }
    }

    /// Every directory name Clean must know about, sanitizer variants included.
    pub fn all_dir_names() -> Vec<String> {
        let mut bases: Vec<String> = vec!["debug".into(), "release".into()];
        bases.extend(OptLevel::ALL.iter().map(|l| format!("O{}", l.code())));

        let mut names = bases.clone();
        for base in &bases {
            for san in Sanitizer::ALL {
                names.push(format!("{}-{}", base, san));
            }
        }
        names
    }

    /// `CMAKE_BUILD_TYPE` for this profile.
    pub fn cmake_build_type(&self) -> &'static str {
        match self.opt_level {
            Some(OptLevel::O0) => "Debug",
            Some(OptLevel::O1) => "RelWithDebInfo",
            Some(OptLevel::O2 | OptLevel::O3 | OptLevel::Fast) => "Release",
            Some(OptLevel::Size) => "MinSizeRel",
            None if self.release => "Release",
            None => "Debug",
        }
    }

    /// Meson `(buildtype, optimization)` pair.
    pub fn meson_build_type(&self) -> (&'static str, &'static str) {
        match self.opt_level {
            Some(OptLevel::O0) => ("debug", "0"),
            Some(OptLevel::O1) => ("debugoptimized", "1"),
            Some(OptLevel::O2) => ("release", "2"),
            Some(OptLevel::O3 | OptLevel::Fast) => ("release", "3"),
            Some(OptLevel::Size) => ("minsize", "s"),
            None if self.release => ("release", "2"),
            None => ("debug", "0"),
        }
    }

    /// Bazel flags selecting compilation mode and sanitizer.
    pub fn bazel_flags(&self) -> Vec<String> {
        let mut flags = match self.opt_level {
            Some(OptLevel::O0) => vec!["--copt=-O0".into(), "-c".into(), "dbg".into()],
            Some(level) => vec![format!("--copt={}", level.flag()), "-c".into(), "opt".into()],
            None if self.release => vec!["--config=release".into()],
            None => vec!["--config=debug".into()],
        };

        if let Some(san) = self.sanitizer {
            flags.extend(san.compile_flags().iter().map(|f| format!("--copt={}", f)));
            flags.extend(san.link_flags().iter().map(|f| format!("--linkopt={}", f)));
        }
        flags
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
