//! Import resolution.
//!
//! The compiler core takes already-loaded source units keyed by logical
//! path; this host-side resolver loads the requested files and chases their
//! `import` directives relative to the importing unit, breadth first, so the
//! resulting source set is closed under imports. Each unit is loaded once.

use anyhow::Context;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Load `files` and everything they transitively import.
///
/// Returns (logical path, content) pairs in a deterministic order: the
/// requested files first, then imports in discovery order.
pub fn load_with_imports(files: &[PathBuf]) -> anyhow::Result<Vec<(String, String)>> {
    let mut sources = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut pending: VecDeque<PathBuf> = files.iter().cloned().collect();

    while let Some(path) = pending.pop_front() {
        let logical = logical_path(&path);
        if !seen.insert(logical.clone()) {
            continue;
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;

        for import in import_paths(&logical, &content) {
            pending.push_back(PathBuf::from(import));
        }
        sources.push((logical, content));
    }

    Ok(sources)
}

/// Normalised logical path of a unit.
fn logical_path(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    // collapse a leading ./
    text.strip_prefix("./").unwrap_or(&text).to_string()
}

/// Resolve the import strings of one unit against its own path.
fn import_paths(importer: &str, content: &str) -> Vec<String> {
    let unit = match vela_parser::Parser::new(importer.to_string(), content) {
        Ok(parser) => match parser.parse() {
            Ok(unit) => unit,
            // parse errors surface later through the compiler proper
            Err(_) => return Vec::new(),
        },
        Err(_) => return Vec::new(),
    };

    let base = Path::new(importer)
        .parent()
        .unwrap_or_else(|| Path::new(""));
    let mut imports = Vec::new();
    for item in &unit.items {
        if let vela_parser::ast::SourceItem::Import(import) = item {
            let resolved = resolve_relative(base, &import.path);
            imports.push(resolved);
        }
    }
    imports
}

/// Resolve `./x` and `../x` against the importing unit's directory; other
/// paths pass through unchanged.
fn resolve_relative(base: &Path, import: &str) -> String {
    if !import.starts_with("./") && !import.starts_with("../") {
        return import.to_string();
    }
    let base_text = base.to_string_lossy();
    let mut segments: Vec<String> = base_text
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    for segment in import.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other.to_string()),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_path_normalisation() {
        assert_eq!(logical_path(Path::new("./a/b.vela")), "a/b.vela");
        assert_eq!(logical_path(Path::new("a/b.vela")), "a/b.vela");
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative(Path::new("contracts"), "./lib.vela"),
            "contracts/lib.vela"
        );
        assert_eq!(
            resolve_relative(Path::new("contracts/token"), "../lib.vela"),
            "contracts/lib.vela"
        );
        assert_eq!(
            resolve_relative(Path::new("contracts"), "vendor/lib.vela"),
            "vendor/lib.vela"
        );
    }

    #[test]
    fn test_import_extraction() {
        let imports = import_paths(
            "contracts/token.vela",
            "import \"./math.vela\"; import \"../base.vela\"; contract T {}",
        );
        assert_eq!(imports, vec!["contracts/math.vela", "base.vela"]);
    }
}
