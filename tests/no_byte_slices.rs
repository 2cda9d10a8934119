//! Source guard against literal-range string slicing.
//!
//! Tool output, audit lines and previews are all capped by character count.
//! A literal byte range such as `text[..50]` panics on a multibyte boundary,
//! so none may appear under `src/`. Ranges ending in a variable (`&buf[..n]`)
//! are not flagged.

use anyhow::Context;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read_dir failed: {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_rs_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
    Ok(())
}

#[test]
fn no_literal_byte_index_string_slices() -> anyhow::Result<()> {
    let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");

    // `[..123]` and `[123..]`
    let patterns = [
        Regex::new(r"\[\s*\.\.\s*\d+\s*\]")?,
        Regex::new(r"\[\s*\d+\s*\.\.\s*\]")?,
    ];

    let mut files = Vec::new();
    collect_rs_files(&src_dir, &mut files)?;
    files.sort();

    let mut failures = Vec::new();
    for path in files {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for (i, line) in text.lines().enumerate() {
            if patterns.iter().any(|re| re.is_match(line)) {
                failures.push(format!("{}:{}: {}", path.display(), i + 1, line.trim()));
            }
        }
    }

    if !failures.is_empty() {
        anyhow::bail!(
            "Found literal-range slices in source files:\n{}",
            failures.join("\n")
        );
    }
    Ok(())
}
