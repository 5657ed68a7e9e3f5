//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Producers wait on
//! real I/O or on channels, never on the clock.
//! **Exceptions**: The demo routes, which simulate slow data sources.

use architectural_enforcement::{production_lines, rust_files};

const CHECKED: &[&str] = &["spool/core/src", "spool/server/src"];
const ALLOWED: &[&str] = &["spool/server/src/routes"];

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for dir in CHECKED {
        for file in rust_files(dir) {
            let display = file.to_string_lossy().replace('\\', "/");
            if ALLOWED.iter().any(|allowed| display.contains(allowed)) {
                continue;
            }
            for (line, code) in production_lines(&file) {
                if code.contains("::sleep(") || code.contains(".sleep(") {
                    violations.push(format!("{display}:{line} - {}", code.trim()));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Wait on a channel, a Notify or real I/O instead.");
        panic!("Found {} sleep violation(s)", violations.len());
    }
}

#[test]
fn test_checked_directories_exist() {
    for dir in CHECKED {
        assert!(
            !rust_files(dir).is_empty(),
            "{dir} has no Rust sources; update the policy paths"
        );
    }
}
