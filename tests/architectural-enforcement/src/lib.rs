//! Architectural Enforcement Integration Tests
//!
//! Source-scanning checks that keep the workspace layered:
//! - The rendering core never depends on the HTTP framework
//! - No sleep() calls in production code outside the demo routes
//!
//! The tests live under `tests/`; this library holds the shared scanning
//! helpers.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root, two levels above this package
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file under `dir` (relative to the workspace root)
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    walkdir::WalkDir::new(workspace_root().join(dir))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Lines of `path` before its `#[cfg(test)]` module, with comments stripped
///
/// Returns `(line number, code)` pairs.
pub fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            (idx + 1, code.to_string())
        })
        .filter(|(_, code)| !code.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let dir = std::env::temp_dir().join(format!("arch-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("sample.rs");
        fs::write(
            &file,
            "fn a() {} // trailing\n// comment only\n\n#[cfg(test)]\nmod tests { fn b() {} }\n",
        )
        .unwrap();

        let lines = production_lines(&file);
        assert_eq!(lines, vec![(1, "fn a() {} ".to_string())]);
        fs::remove_dir_all(&dir).unwrap();
    }
}
