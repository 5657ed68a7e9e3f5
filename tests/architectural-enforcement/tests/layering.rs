//! Integration Test: Layering
//!
//! **Policy**: `spool-core` produces status, headers and string fragments
//! only. HTTP framework types stay in `spool-server`.

use std::fs;

use architectural_enforcement::{production_lines, rust_files, workspace_root};

const FRAMEWORK_CRATES: &[&str] = &["axum", "hyper", "tower", "reqwest"];

#[test]
fn test_core_manifest_has_no_http_framework() {
    let manifest = fs::read_to_string(workspace_root().join("spool/core/Cargo.toml")).unwrap();
    let dependencies = manifest
        .split("[dev-dependencies]")
        .next()
        .unwrap_or_default();

    for krate in FRAMEWORK_CRATES {
        let declared = dependencies.lines().any(|line| {
            let line = line.trim_start();
            line.starts_with(&format!("{krate} ")) || line.starts_with(&format!("{krate}="))
        });
        assert!(!declared, "spool-core must not depend on {krate}");
    }
}

#[test]
fn test_core_sources_never_name_http_framework() {
    let mut violations = Vec::new();
    for file in rust_files("spool/core/src") {
        for (line, code) in production_lines(&file) {
            for krate in FRAMEWORK_CRATES {
                if code.contains(&format!("{krate}::")) {
                    violations.push(format!("{}:{line} - {}", file.display(), code.trim()));
                }
            }
        }
    }
    assert!(violations.is_empty(), "framework types in core:\n{}", violations.join("\n"));
}
