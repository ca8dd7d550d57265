//! Initial build-file bodies for new projects.
//!
//! Backends decide which files a project gets and where they go; the text of
//! each file comes from a [`Scaffolder`]. Manifests (`vcpkg.json`,
//! `MODULE.bazel`) are structured data and are written by the backends
//! themselves.

use std::fmt::Write as _;

use crate::core::{BackendKind, BenchFramework, InitConfig, TestFramework};

/// A file a backend may ask to have rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaffoldFile {
    CMakeLists,
    CMakeTests,
    CMakeBench,
    CMakePresets,
    BazelBuild,
    BazelTests,
    BazelBench,
    Bazelrc,
    MesonBuild,
    MesonTests,
    MesonBench,
    Gitignore(BackendKind),
}

/// Renders file bodies for a project configuration.
pub trait Scaffolder: Send + Sync {
    fn render(&self, file: ScaffoldFile, config: &InitConfig) -> String;
}

/// Short, working skeletons. Projects are expected to grow them by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalScaffolder;

impl Scaffolder for MinimalScaffolder {
    fn render(&self, file: ScaffoldFile, config: &InitConfig) -> String {
        match file {
            ScaffoldFile::CMakeLists => cmake_lists(config),
            ScaffoldFile::CMakeTests => cmake_tests(config),
            ScaffoldFile::CMakeBench => cmake_bench(config),
            ScaffoldFile::CMakePresets => CMAKE_PRESETS.to_string(),
            ScaffoldFile::BazelBuild => bazel_build(config),
            ScaffoldFile::BazelTests => bazel_tests(config),
            ScaffoldFile::BazelBench => bazel_bench(config),
            ScaffoldFile::Bazelrc => bazelrc(config),
            ScaffoldFile::MesonBuild => meson_build(config),
            ScaffoldFile::MesonTests => meson_tests(config),
            ScaffoldFile::MesonBench => meson_bench(config),
            ScaffoldFile::Gitignore(kind) => gitignore(kind),
        }
    }
}

const CMAKE_PRESETS: &str = r#"{
  "version": 3,
  "configurePresets": [
    {
      "name": "default",
      "generator": "Ninja",
      "binaryDir": "${sourceDir}/.cache/native/default",
      "toolchainFile": "$env{VCPKG_ROOT}/scripts/buildsystems/vcpkg.cmake"
    }
  ]
}
"#;

fn lib_target(config: &InitConfig) -> String {
    format!("{}_lib", config.name)
}

fn cmake_lists(config: &InitConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "cmake_minimum_required(VERSION 3.21)");
    let _ = writeln!(
        out,
        "project({} VERSION {} LANGUAGES CXX)\n",
        config.name, config.version
    );
    let _ = writeln!(out, "set(CMAKE_CXX_STANDARD {})", config.cpp_standard);
    let _ = writeln!(out, "set(CMAKE_CXX_STANDARD_REQUIRED ON)");
    let _ = writeln!(out, "set(CMAKE_EXPORT_COMPILE_COMMANDS ON)\n");

    for dep in &config.dependencies {
        let _ = writeln!(out, "find_package({} CONFIG REQUIRED)", dep);
    }
    if !config.dependencies.is_empty() {
        out.push('\n');
    }

    let lib = lib_target(config);
    let _ = writeln!(out, "file(GLOB LIB_SOURCES CONFIGURE_DEPENDS src/*.cpp)");
    let _ = writeln!(out, "list(FILTER LIB_SOURCES EXCLUDE REGEX \".*/main\\\\.cpp$\")");
    let _ = writeln!(out, "add_library({} ${{LIB_SOURCES}})", lib);
    let _ = writeln!(out, "target_include_directories({} PUBLIC include)", lib);
    if !config.is_library {
        let _ = writeln!(out, "\nadd_executable({} src/main.cpp)", config.name);
        let _ = writeln!(out, "target_link_libraries({} PRIVATE {})", config.name, lib);
    }

    if config.test_framework.is_some() {
        out.push_str("\noption(ENABLE_TESTING \"Build tests\" OFF)\n");
        out.push_str("if(ENABLE_TESTING)\n  enable_testing()\n  add_subdirectory(tests)\nendif()\n");
    }
    if config.bench_framework.is_some() {
        out.push_str("\noption(ENABLE_BENCHMARKS \"Build benchmarks\" OFF)\n");
        out.push_str("if(ENABLE_BENCHMARKS)\n  add_subdirectory(bench)\nendif()\n");
    }
    out
}

fn cmake_tests(config: &InitConfig) -> String {
    let (package, target) = match config.test_framework.unwrap_or(TestFramework::GoogleTest) {
        TestFramework::GoogleTest => ("GTest", "GTest::gtest_main"),
        TestFramework::Catch2 => ("Catch2", "Catch2::Catch2WithMain"),
        TestFramework::Doctest => ("doctest", "doctest::doctest"),
    };
    let name = format!("{}_tests", config.name);

    format!(
        "find_package({package} CONFIG REQUIRED)\n\n\
         file(GLOB TEST_SOURCES CONFIGURE_DEPENDS *.cpp)\n\
         add_executable({name} ${{TEST_SOURCES}})\n\
         target_link_libraries({name} PRIVATE {lib} {target})\n\
         add_test(NAME {name} COMMAND {name})\n",
        lib = lib_target(config),
    )
}

fn cmake_bench(config: &InitConfig) -> String {
    let (package, target) = match config
        .bench_framework
        .unwrap_or(BenchFramework::GoogleBenchmark)
    {
        BenchFramework::GoogleBenchmark => ("benchmark", "benchmark::benchmark_main"),
        BenchFramework::Catch2Benchmark => ("Catch2", "Catch2::Catch2WithMain"),
    };
    let name = format!("{}_bench", config.name);

    format!(
        "find_package({package} CONFIG REQUIRED)\n\n\
         file(GLOB BENCH_SOURCES CONFIGURE_DEPENDS *.cpp)\n\
         add_executable({name} ${{BENCH_SOURCES}})\n\
         target_link_libraries({name} PRIVATE {lib} {target})\n",
        lib = lib_target(config),
    )
}

fn bazel_build(config: &InitConfig) -> String {
    let lib = lib_target(config);
    let deps: String = config
        .dependencies
        .iter()
        .map(|d| format!("\n        \"@{}\",", d))
        .collect();

    let mut out = format!(
        "cc_library(\n    \
             name = \"{lib}\",\n    \
             srcs = glob([\"src/*.cpp\"], exclude = [\"src/main.cpp\"]),\n    \
             hdrs = glob([\"include/**/*.h\", \"include/**/*.hpp\"]),\n    \
             includes = [\"include\"],\n    \
             deps = [{deps}\n    ],\n    \
             visibility = [\"//visibility:public\"],\n\
         )\n"
    );
    if !config.is_library {
        let _ = write!(
            out,
            "\ncc_binary(\n    name = \"{}\",\n    srcs = [\"src/main.cpp\"],\n    deps = [\":{}\"],\n)\n",
            config.name, lib
        );
    }
    out
}

fn bazel_tests(config: &InitConfig) -> String {
    let dep = match config.test_framework.unwrap_or(TestFramework::GoogleTest) {
        TestFramework::GoogleTest => "@googletest//:gtest_main",
        TestFramework::Catch2 => "@catch2//:catch2_main",
        TestFramework::Doctest => "@doctest//doctest:main",
    };
    format!(
        "cc_test(\n    name = \"{}_test\",\n    srcs = glob([\"*.cpp\"]),\n    deps = [\n        \"//:{}\",\n        \"{}\",\n    ],\n)\n",
        config.name,
        lib_target(config),
        dep
    )
}

fn bazel_bench(config: &InitConfig) -> String {
    let dep = match config
        .bench_framework
        .unwrap_or(BenchFramework::GoogleBenchmark)
    {
        BenchFramework::GoogleBenchmark => "@google_benchmark//:benchmark_main",
        BenchFramework::Catch2Benchmark => "@catch2//:catch2_main",
    };
    format!(
        "cc_binary(\n    name = \"{}_bench\",\n    srcs = glob([\"*.cpp\"]),\n    deps = [\n        \"//:{}\",\n        \"{}\",\n    ],\n)\n",
        config.name,
        lib_target(config),
        dep
    )
}

fn bazelrc(config: &InitConfig) -> String {
    format!(
        "build --cxxopt=-std=c++{std}\n\
         build --host_cxxopt=-std=c++{std}\n\n\
         build:debug -c dbg\n\
         build:release -c opt\n\n\
         test --test_output=errors\n",
        std = config.cpp_standard
    )
}

fn meson_build(config: &InitConfig) -> String {
    let mut out = format!(
        "project('{}', 'cpp',\n  version : '{}',\n  default_options : ['cpp_std=c++{}', 'warning_level=3'])\n\n",
        config.name, config.version, config.cpp_standard
    );

    let deps: Vec<String> = config
        .dependencies
        .iter()
        .map(|d| format!("dependency('{}')", d))
        .collect();
    let _ = writeln!(out, "deps = [{}]", deps.join(", "));
    out.push_str("inc = include_directories('include')\n\n");

    let lib = lib_target(config);
    let _ = writeln!(
        out,
        "{lib} = static_library('{name}', files(), include_directories : inc, dependencies : deps)",
        name = config.name
    );
    let _ = writeln!(
        out,
        "{lib}_dep = declare_dependency(link_with : {lib}, include_directories : inc, dependencies : deps)"
    );
    if !config.is_library {
        let _ = writeln!(
            out,
            "\nexecutable('{}', 'src/main.cpp', dependencies : {}_dep)",
            config.name, lib
        );
    }

    if config.test_framework.is_some() {
        out.push_str("\nsubdir('tests')\n");
    }
    if config.bench_framework.is_some() {
        out.push_str("subdir('bench')\n");
    }
    out
}

fn meson_tests(config: &InitConfig) -> String {
    let dep = match config.test_framework.unwrap_or(TestFramework::GoogleTest) {
        TestFramework::GoogleTest => "dependency('gtest', main : true)",
        TestFramework::Catch2 => "dependency('catch2-with-main')",
        TestFramework::Doctest => "dependency('doctest')",
    };
    format!(
        "test_exe = executable('{name}_tests', files('test_main.cpp'),\n  dependencies : [{lib}_dep, {dep}])\n\
         test('{name}_tests', test_exe, suite : 'unit')\n",
        name = config.name,
        lib = lib_target(config),
    )
}

fn meson_bench(config: &InitConfig) -> String {
    let dep = match config
        .bench_framework
        .unwrap_or(BenchFramework::GoogleBenchmark)
    {
        BenchFramework::GoogleBenchmark => "dependency('benchmark-main')",
        BenchFramework::Catch2Benchmark => "dependency('catch2-with-main')",
    };
    format!(
        "executable('{name}_bench', files('bench_main.cpp'),\n  dependencies : [{lib}_dep, {dep}])\n",
        name = config.name,
        lib = lib_target(config),
    )
}

fn gitignore(kind: BackendKind) -> String {
    let mut out = String::from("# quay outputs\n.bin/\n.cache/\n");
    out.push_str(match kind {
        BackendKind::Vcpkg => "\n# CMake\nbuild-*/\nout/\ncmake-build-*/\nvcpkg_installed/\n",
        BackendKind::Bazel => "\n# Bazel\n/bazel-*\n/.bazel-*\nMODULE.bazel.lock\n",
        BackendKind::Meson => {
            "\n# Meson\nbuilddir/\nbuild-*/\nsubprojects/*\n!subprojects/*.wrap\n"
        }
    });
    out.push_str("\n# Editors\n.vscode/\n.idea/\ncompile_commands.json\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InitConfig {
        let mut config = InitConfig::new("calc");
        config.test_framework = Some(TestFramework::Catch2);
        config.bench_framework = Some(BenchFramework::GoogleBenchmark);
        config.dependencies = vec!["fmt".into()];
        config
    }

    #[test]
    fn test_cmake_lists_wires_tests_and_benches() {
        let text = MinimalScaffolder.render(ScaffoldFile::CMakeLists, &config());

        assert!(text.contains("project(calc VERSION 0.1.0 LANGUAGES CXX)"));
        assert!(text.contains("set(CMAKE_CXX_STANDARD 20)"));
        assert!(text.contains("find_package(fmt CONFIG REQUIRED)"));
        assert!(text.contains("add_executable(calc src/main.cpp)"));
        assert!(text.contains("add_subdirectory(tests)"));
        assert!(text.contains("add_subdirectory(bench)"));
        assert_eq!(crate::core::project::cmake_project_name(&text).as_deref(), Some("calc"));
    }

    #[test]
    fn test_library_has_no_executable() {
        let mut config = InitConfig::new("geom");
        config.is_library = true;

        let cmake = MinimalScaffolder.render(ScaffoldFile::CMakeLists, &config);
        assert!(!cmake.contains("add_executable"));

        let bazel = MinimalScaffolder.render(ScaffoldFile::BazelBuild, &config);
        assert!(bazel.contains("name = \"geom_lib\""));
        assert!(!bazel.contains("cc_binary"));
    }

    #[test]
    fn test_test_targets_follow_framework() {
        let config = config();

        let cmake = MinimalScaffolder.render(ScaffoldFile::CMakeTests, &config);
        assert!(cmake.contains("Catch2::Catch2WithMain"));
        assert!(cmake.contains("add_executable(calc_tests"));

        let meson = MinimalScaffolder.render(ScaffoldFile::MesonTests, &config);
        assert!(meson.contains("catch2-with-main"));

        let bench = MinimalScaffolder.render(ScaffoldFile::BazelBench, &config);
        assert!(bench.contains("name = \"calc_bench\""));
        assert!(bench.contains("@google_benchmark//:benchmark_main"));
    }

    #[test]
    fn test_meson_build_names_project() {
        let text = MinimalScaffolder.render(ScaffoldFile::MesonBuild, &config());

        assert_eq!(crate::core::project::meson_project_name(&text).as_deref(), Some("calc"));
        assert!(text.contains("dependency('fmt')"));
        assert!(text.contains("subdir('tests')"));
    }

    #[test]
    fn test_gitignore_per_backend() {
        let config = InitConfig::new("calc");
        let bazel = MinimalScaffolder.render(ScaffoldFile::Gitignore(BackendKind::Bazel), &config);
        assert!(bazel.contains("/.bazel-*"));
        assert!(bazel.contains(".bin/"));

        let meson = MinimalScaffolder.render(ScaffoldFile::Gitignore(BackendKind::Meson), &config);
        assert!(meson.contains("!subprojects/*.wrap"));
    }
}
