//! Shared helpers for the autoescape golden tests.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

pub const PIPELINE_FORMAT_V1: &str = "autoescape-pipeline-v1";

/// Expected outcome of one fixture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpectedStatus {
    Ok,
    Error,
}

#[derive(Clone, Debug)]
pub struct ExpectedPipeline {
    pub status: ExpectedStatus,
    pub lines: Vec<String>,
}

/// One fixture directory: `input.tmpl` plus `expected.txt`.
#[derive(Clone, Debug)]
pub struct PipelineFixture {
    pub name: String,
    pub input: String,
    pub expected: ExpectedPipeline,
}

/// Escape control characters so a line stays on one line in a snapshot.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch < ' ' && ch != '\n' => {
                let _ = write!(&mut out, "\\u{{{:02X}}}", ch as u32);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Snapshot lines of a text: one per source line, trailing whitespace marked.
/// A single final newline does not produce an extra empty line.
pub fn text_lines(text: &str) -> Vec<String> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    escape_text(text)
        .split('\n')
        .map(|line| {
            if line.ends_with(' ') {
                format!("{line}$")
            } else {
                line.to_string()
            }
        })
        .collect()
}

pub fn diff_lines(expected: &[String], actual: &[String]) -> String {
    let max = expected.len().max(actual.len());
    let missing = "<missing>";
    let line = |lines: &[String], idx: usize| -> String {
        lines
            .get(idx)
            .map(String::as_str)
            .unwrap_or(missing)
            .to_string()
    };
    let mut out = String::new();
    let mismatch = (0..max).find(|&idx| line(expected, idx) != line(actual, idx));
    if let Some(idx) = mismatch {
        let start = idx.saturating_sub(2);
        let end = (idx + 3).min(max);
        let _ = writeln!(
            &mut out,
            "first mismatch at line {} (showing {}..={}):",
            idx + 1,
            start + 1,
            end
        );
        for at in start..end {
            let marker = if at == idx { ">" } else { " " };
            let _ = writeln!(&mut out, "{marker} {:>4}  expected: {}", at + 1, line(expected, at));
            let _ = writeln!(&mut out, "{marker} {:>4}    actual: {}", at + 1, line(actual, at));
        }
    }
    let _ = writeln!(
        &mut out,
        "expected {} lines, actual {} lines",
        expected.len(),
        actual.len()
    );
    out
}

/// Parse `expected.txt`: `# key: value` headers (`format` first, then
/// `status`), followed by snapshot lines. Blank lines are kept because they are
/// part of the escaped template text.
pub fn parse_expected(path: &Path) -> ExpectedPipeline {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read expected file {path:?}: {err}"));
    let mut headers = BTreeMap::<String, String>::new();
    let mut lines = Vec::new();
    let mut in_headers = true;
    for raw_line in content.lines() {
        if in_headers && let Some(header) = raw_line.strip_prefix('#') {
            let Some((key, value)) = header.split_once(':') else {
                panic!("malformed header {raw_line:?} in {path:?}");
            };
            let key = key.trim().to_ascii_lowercase();
            assert!(
                matches!(key.as_str(), "format" | "status"),
                "unsupported header '{key}' in {path:?}"
            );
            if headers.is_empty() {
                assert_eq!(key, "format", "first header must be 'format' in {path:?}");
            }
            if headers.insert(key.clone(), value.trim().to_string()).is_some() {
                panic!("duplicate header '{key}' in {path:?}");
            }
            continue;
        }
        in_headers = false;
        lines.push(raw_line.trim_end_matches('\r').to_string());
    }
    assert_eq!(
        headers.get("format").map(String::as_str),
        Some(PIPELINE_FORMAT_V1),
        "missing or unsupported format in {path:?}"
    );
    let status = match headers.get("status").map(String::as_str) {
        None | Some("ok") => ExpectedStatus::Ok,
        Some("error") => ExpectedStatus::Error,
        Some(other) => panic!("invalid status '{other}' in {path:?}"),
    };
    ExpectedPipeline { status, lines }
}

/// Load every fixture under `root`, sorted by directory name.
pub fn load_fixtures(root: &Path) -> Vec<PipelineFixture> {
    let entries = fs::read_dir(root)
        .unwrap_or_else(|err| panic!("failed to read fixture root {root:?}: {err}"));
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs.into_iter()
        .map(|dir| {
            let name = dir
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();
            let input_path = dir.join("input.tmpl");
            let input = fs::read_to_string(&input_path)
                .unwrap_or_else(|err| panic!("failed to read {input_path:?}: {err}"));
            let expected = parse_expected(&dir.join("expected.txt"));
            PipelineFixture {
                name,
                input,
                expected,
            }
        })
        .collect()
}
