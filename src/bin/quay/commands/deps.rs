//! Dependency commands: `add`, `remove`, `list`, `search` and `info`.

use anyhow::Result;

use crate::cli::{AddArgs, InfoArgs, RemoveArgs, SearchArgs};
use crate::GlobalOptions;
use quay::{Dependency, DependencyInfo};

pub fn add(args: AddArgs, opts: &GlobalOptions) -> Result<i32> {
    let backend = opts.backend()?;
    let dep = backend.add_dependency(&args.name, &args.version)?;
    tracing::debug!("declared {}", dep);
    Ok(0)
}

pub fn remove(args: RemoveArgs, opts: &GlobalOptions) -> Result<i32> {
    opts.backend()?.remove_dependency(&args.name)?;
    Ok(0)
}

pub fn list(opts: &GlobalOptions) -> Result<i32> {
    let deps = opts.backend()?.list_dependencies()?;
    if deps.is_empty() {
        opts.shell.note("no dependencies declared");
    }
    for dep in deps {
        println!("{}", dep);
    }
    Ok(0)
}

pub fn search(args: SearchArgs, opts: &GlobalOptions) -> Result<i32> {
    let found = opts.backend()?.search_dependencies(&args.query)?;
    if found.is_empty() {
        opts.shell.note(format!("no packages match `{}`", args.query));
    }
    print!("{}", format_search(&found));
    Ok(0)
}

pub fn info(args: InfoArgs, opts: &GlobalOptions) -> Result<i32> {
    let info = opts.backend()?.dependency_info(&args.name)?;
    print!("{}", format_info(&info));
    Ok(0)
}

/// One row per package with the columns aligned.
fn format_search(found: &[Dependency]) -> String {
    let width = found
        .iter()
        .map(|dep| dep.to_string().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for dep in found {
        let head = dep.to_string();
        if dep.description.is_empty() {
            out.push_str(&head);
        } else {
            out.push_str(&format!("{:<width$}  {}", head, dep.description, width = width));
        }
        out.push('\n');
    }
    out
}

fn format_info(info: &DependencyInfo) -> String {
    let mut out = format!("{} {}\n", info.name, info.version);
    for (label, value) in [
        ("description", &info.description),
        ("homepage", &info.homepage),
        ("license", &info.license),
    ] {
        if !value.is_empty() {
            out.push_str(&format!("{}: {}\n", label, value));
        }
    }
    if !info.maintainers.is_empty() {
        out.push_str(&format!("maintainers: {}\n", info.maintainers.join(", ")));
    }
    if !info.dependencies.is_empty() {
        out.push_str(&format!("dependencies: {}\n", info.dependencies.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_search_aligns_descriptions() {
        let found = vec![
            Dependency::new("fmt", "10.2.1").with_description("Formatting library"),
            Dependency::new("fmtlog", "2.2.1"),
            Dependency::new("spdlog", "1.13.0").with_description("Logging"),
        ];

        assert_eq!(
            format_search(&found),
            "fmt 10.2.1     Formatting library\nfmtlog 2.2.1\nspdlog 1.13.0  Logging\n"
        );
    }

    #[test]
    fn test_format_info_skips_empty_fields() {
        let info = DependencyInfo {
            name: "fmt".into(),
            version: "10.2.1".into(),
            homepage: "https://github.com/fmtlib/fmt".into(),
            maintainers: vec!["vitaut".into()],
            dependencies: vec!["vcpkg-cmake".into(), "vcpkg-cmake-config".into()],
            ..Default::default()
        };

        assert_eq!(
            format_info(&info),
            "fmt 10.2.1\nhomepage: https://github.com/fmtlib/fmt\nmaintainers: vitaut\ndependencies: vcpkg-cmake, vcpkg-cmake-config\n"
        );
    }
}
