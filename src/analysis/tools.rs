//! # External Tools
//!
//! The pipeline never detects refactorings or counts lines itself. It runs
//! a refactoring detector (RefactoringMiner) once per repository and a line
//! counter (scc) once per checkout, and parses what they print.

use serde::Deserialize;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

use crate::config::MinerConfig;
use crate::error::{MineError, Result};
use crate::retry::RetryPolicy;
use crate::types::{RefactoringReport, SizeMetric};
use crate::utils::redact;

/// Produces the refactoring report for a working tree.
pub trait RefactoringDetector: Send + Sync {
    /// Analyze the full history of the repository at `repo_root`.
    ///
    /// The raw report is written to `output`; the parsed report is returned.
    fn detect_refactorings(&self, repo_root: &Path, output: &Path) -> Result<RefactoringReport>;
}

/// Measures recognized lines of code in the current checkout of a tree.
pub trait SizeMeter: Send + Sync {
    fn measure_size(&self, root: &Path) -> Result<SizeMetric>;
}

/// Resolves tool binaries: explicit path, next to our executable, then `PATH`.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    search_dir: Option<PathBuf>,
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolLocator {
    pub fn new() -> Self {
        let search_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self { search_dir }
    }

    /// Look next to `dir` instead of the running executable
    pub fn with_search_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            search_dir: Some(dir.into()),
        }
    }

    pub fn locate(&self, name: &str, explicit: Option<&Path>) -> Result<PathBuf> {
        let mut searched = Vec::new();

        if let Some(path) = explicit {
            if is_executable(path) {
                return Ok(path.to_path_buf());
            }
            searched.push(path.display().to_string());
        }

        if let Some(dir) = &self.search_dir {
            let local = dir.join(format!("{name}{}", env::consts::EXE_SUFFIX));
            if is_executable(&local) {
                return Ok(local);
            }
            searched.push(local.display().to_string());
        }

        match which::which(name) {
            Ok(path) => Ok(path),
            Err(_) => {
                searched.push("PATH".to_string());
                Err(MineError::ToolNotFound {
                    tool: name.to_string(),
                    searched,
                })
            }
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Allow-list of recognized language names, matched case-insensitively as substrings.
#[derive(Debug, Clone)]
pub struct LanguageFilter {
    names: Vec<String>,
}

impl LanguageFilter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, language: &str) -> bool {
        let language = language.to_lowercase();
        self.names.iter().any(|name| language.contains(name.as_str()))
    }

    /// Sum code lines of recognized languages
    pub fn summarize(&self, entries: &[LanguageSummary]) -> SizeMetric {
        let mut metric = SizeMetric::default();
        for entry in entries {
            if self.matches(&entry.name) {
                metric.add(&entry.name, entry.code_lines());
            } else {
                debug!(language = %entry.name, "ignoring unrecognized language");
            }
        }
        metric
    }
}

/// Per-file counts inside a [`LanguageSummary`]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileSummary {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub code: u64,
}

/// One record of the line counter's JSON output
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LanguageSummary {
    pub name: String,
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub files: Vec<FileSummary>,
}

impl LanguageSummary {
    /// The record's code lines, summing its files when no total is given
    pub fn code_lines(&self) -> u64 {
        self.code
            .unwrap_or_else(|| self.files.iter().map(|f| f.code).sum())
    }
}

/// Parse the line counter's `--format json` output
pub fn parse_line_counts(stdout: &[u8]) -> Result<Vec<LanguageSummary>> {
    let trimmed = String::from_utf8_lossy(stdout);
    if trimmed.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Option<Vec<LanguageSummary>> = serde_json::from_str(trimmed.trim())?;
    Ok(entries.unwrap_or_default())
}

/// Parse the refactoring detector's JSON document
pub fn parse_refactoring_report(text: &str) -> Result<RefactoringReport> {
    Ok(serde_json::from_str(text)?)
}

/// Runs the real refactoring detector and line counter binaries.
#[derive(Debug, Clone)]
pub struct ExternalToolAdapter {
    refactoring_tool: PathBuf,
    line_counter: PathBuf,
    languages: LanguageFilter,
    retry: RetryPolicy,
    secret: Option<String>,
}

impl ExternalToolAdapter {
    pub fn new(
        refactoring_tool: PathBuf,
        line_counter: PathBuf,
        languages: LanguageFilter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            refactoring_tool,
            line_counter,
            languages,
            retry,
            secret: None,
        }
    }

    /// Mask `secret` wherever tool output is echoed into errors
    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret.filter(|s| !s.is_empty());
        self
    }

    /// Resolve both binaries now so a missing tool fails before any clone
    pub fn locate(config: &MinerConfig) -> Result<Self> {
        Self::locate_with(config, &ToolLocator::new())
    }

    pub fn locate_with(config: &MinerConfig, locator: &ToolLocator) -> Result<Self> {
        let refactoring_tool = locator.locate(
            &config.refactoring_tool,
            config.refactoring_tool_path.as_deref(),
        )?;
        let line_counter =
            locator.locate(&config.line_counter, config.line_counter_path.as_deref())?;
        info!(
            refactoring_tool = %refactoring_tool.display(),
            line_counter = %line_counter.display(),
            "located external tools"
        );

        Ok(Self::new(
            refactoring_tool,
            line_counter,
            LanguageFilter::new(&config.languages),
            config.retry.clone(),
        )
        .with_secret(config.token.clone()))
    }

    fn tool_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }

    fn run(&self, tool: &Path, args: &[&OsStr]) -> Result<Output> {
        let step = Self::tool_name(tool);
        self.retry
            .run(&step, || Command::new(tool).args(args).output())
            .map_err(|e| MineError::ToolInvocationFailure {
                tool: step.clone(),
                reason: format!("could not start: {e}"),
            })
    }

    /// Last few lines of stderr with secrets removed
    fn stderr_excerpt(&self, output: &Output) -> String {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().rev().take(5).collect();
        let excerpt: Vec<&str> = lines.into_iter().rev().collect();
        redact(&excerpt.join(" | "), self.secret.as_deref())
    }
}

impl RefactoringDetector for ExternalToolAdapter {
    fn detect_refactorings(&self, repo_root: &Path, output: &Path) -> Result<RefactoringReport> {
        let tool = Self::tool_name(&self.refactoring_tool);
        let args = [
            OsStr::new("-a"),
            repo_root.as_os_str(),
            OsStr::new("-json"),
            output.as_os_str(),
        ];
        let result = self.run(&self.refactoring_tool, &args)?;

        if !result.status.success() {
            return Err(MineError::ToolInvocationFailure {
                tool,
                reason: format!("{}: {}", result.status, self.stderr_excerpt(&result)),
            });
        }

        let text = std::fs::read_to_string(output).map_err(|e| MineError::ToolInvocationFailure {
            tool: tool.clone(),
            reason: format!("no output at {}: {e}", output.display()),
        })?;
        let report = parse_refactoring_report(&text).map_err(|e| MineError::ToolInvocationFailure {
            tool,
            reason: format!("malformed output: {e}"),
        })?;
        info!(commits = report.commits.len(), "refactoring detection finished");
        Ok(report)
    }
}

impl SizeMeter for ExternalToolAdapter {
    fn measure_size(&self, root: &Path) -> Result<SizeMetric> {
        let args = [root.as_os_str(), OsStr::new("--format"), OsStr::new("json")];
        let failure = |reason: String| MineError::MeasurementFailure {
            path: root.to_path_buf(),
            reason,
        };

        let result = self
            .run(&self.line_counter, &args)
            .map_err(|e| failure(e.to_string()))?;
        if !result.status.success() {
            return Err(failure(format!(
                "{}: {}",
                result.status,
                self.stderr_excerpt(&result)
            )));
        }

        let entries = parse_line_counts(&result.stdout)
            .map_err(|e| failure(format!("malformed output: {e}")))?;
        Ok(self.languages.summarize(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_language_filter_substring_case_insensitive() {
        let filter = LanguageFilter::new(["Java", "Python"]);
        assert!(filter.matches("Java"));
        assert!(filter.matches("JAVA"));
        assert!(filter.matches("JavaScript"));
        assert!(filter.matches("python"));
        assert!(!filter.matches("Markdown"));
        assert!(!filter.matches("YAML"));
    }

    #[test]
    fn test_summarize_excludes_unrecognized() {
        let json = br#"[
            {"Name": "Java", "Code": 120, "Filename": "A.java"},
            {"Name": "Markdown", "Code": 40, "Filename": "README.md"},
            {"Name": "Python", "Code": 30, "Filename": "tool.py"},
            {"Name": "Java", "Code": 5, "Filename": "B.java"}
        ]"#;
        let entries = parse_line_counts(json).unwrap();
        let metric = LanguageFilter::new(["java", "python"]).summarize(&entries);

        assert_eq!(metric.total, 155);
        assert_eq!(metric.by_language.get("Java"), Some(&125));
        assert_eq!(metric.by_language.get("Python"), Some(&30));
        assert!(!metric.by_language.contains_key("Markdown"));
    }

    #[test]
    fn test_language_records_with_files() {
        let json = br#"[
            {"Name": "Rust", "Lines": 60, "Code": 50, "Files": [{"Filename": "src/lib.rs", "Code": 50}]},
            {"Name": "TOML", "Code": 12, "Files": []},
            {"Name": "Go", "Files": [{"Filename": "a.go", "Code": 7}, {"Filename": "b.go", "Code": 3}]}
        ]"#;
        let entries = parse_line_counts(json).unwrap();
        let metric = LanguageFilter::new(["Rust", "Go"]).summarize(&entries);
        assert_eq!(metric.total, 60);
        assert_eq!(metric.by_language.get("Go"), Some(&10));
    }

    #[test]
    fn test_empty_line_counter_output() {
        assert!(parse_line_counts(b"").unwrap().is_empty());
        assert!(parse_line_counts(b"null\n").unwrap().is_empty());
        assert!(parse_line_counts(b"{not json").is_err());
    }

    #[test]
    fn test_parse_report_preserves_order_and_fields() {
        let text = r#"{"commits": [
            {"repository": "r", "sha1": "bbb", "url": "u", "refactorings": [
                {"type": "Extract Method", "description": "Extract Method foo()",
                 "leftSideLocations": [{"filePath": "A.java", "startLine": 3, "endLine": 9, "codeElementType": "METHOD_DECLARATION"}],
                 "rightSideLocations": []}
            ]},
            {"repository": "r", "sha1": "aaa", "url": "u", "refactorings": []}
        ]}"#;
        let report = parse_refactoring_report(text).unwrap();
        assert_eq!(report.target_hashes(), vec!["bbb", "aaa"]);

        let event = &report.commits[0].refactorings[0];
        assert_eq!(event.kind, "Extract Method");
        assert_eq!(event.left_side_locations[0].file_path, "A.java");
        assert_eq!(event.left_side_locations[0].start_line, 3);
        assert_eq!(
            event.left_side_locations[0].extra.get("codeElementType"),
            Some(&serde_json::json!("METHOD_DECLARATION"))
        );
        assert_eq!(report.commits[0].extra.get("url"), Some(&serde_json::json!("u")));
    }

    #[test]
    fn test_parse_report_rejects_malformed() {
        assert!(parse_refactoring_report("{}").is_err());
        assert!(parse_refactoring_report("[1, 2").is_err());
    }

    #[test]
    fn test_locate_missing_tool() {
        let dir = tempfile::TempDir::new().unwrap();
        let locator = ToolLocator::with_search_dir(dir.path());
        let err = locator
            .locate("definitely-not-a-real-tool-7f3a", None)
            .unwrap_err();
        match err {
            MineError::ToolNotFound { tool, searched } => {
                assert_eq!(tool, "definitely-not-a-real-tool-7f3a");
                assert!(searched.iter().any(|s| s == "PATH"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
