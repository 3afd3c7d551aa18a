//! JSON artifacts written into each repository's result directory.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const REFACTORINGS_FILE: &str = "refactorings.json";
pub const DIFF_ANALYSIS_FILE: &str = "diff_analysis.json";
pub const EFFORT_ANALYSIS_FILE: &str = "effort_analysis.json";
pub const SUMMARY_FILE: &str = "summary.json";

/// Every file the pipeline writes, in the order it writes them
pub const ALL_ARTIFACTS: &[&str] = &[
    REFACTORINGS_FILE,
    DIFF_ANALYSIS_FILE,
    EFFORT_ANALYSIS_FILE,
    SUMMARY_FILE,
];

/// Serialize `value` as pretty JSON, replacing `path` atomically
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Remove artifacts left by an earlier run so a failed run cannot leave them behind
pub fn clear_artifacts(dir: &Path) -> Result<()> {
    for name in ALL_ARTIFACTS {
        match fs::remove_file(dir.join(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ChangeType, CommitWarning, DiffRecord, DiffStats, EffortRecord, FileDiffStat,
        RefactoringReport, SkipReason,
    };
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_effort_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(EFFORT_ANALYSIS_FILE);
        let records = vec![
            EffortRecord {
                commit_hash: "b".repeat(40),
                previous_commit_hash: "a".repeat(40),
                developer: "Ada".to_string(),
                loc_before: 10,
                loc_after: 4,
                delta: 6,
            },
            EffortRecord {
                commit_hash: "c".repeat(40),
                previous_commit_hash: "b".repeat(40),
                developer: "Grace".to_string(),
                loc_before: 4,
                loc_after: 9,
                delta: 5,
            },
        ];

        write_json(&path, &records).unwrap();
        let loaded: Vec<EffortRecord> = read_json(&path).unwrap();
        assert_eq!(loaded, records);
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_diff_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DIFF_ANALYSIS_FILE);
        let mut content = BTreeMap::new();
        content.insert("src/A.java".to_string(), "@@ -1 +1 @@\n-a\n+b\n".to_string());
        let records = vec![DiffRecord {
            commit_hash: "b".repeat(40),
            previous_commit_hash: None,
            author: "Ada".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            message: "Rename things".to_string(),
            diff_stats: DiffStats {
                files_changed: 1,
                insertions: 1,
                deletions: 1,
                files: vec![FileDiffStat {
                    path: "src/A.java".to_string(),
                    old_path: Some("src/Old.java".to_string()),
                    change_type: ChangeType::Renamed,
                    insertions: 1,
                    deletions: 1,
                    binary: false,
                }],
            },
            diff_content: content,
        }];

        write_json(&path, &records).unwrap();
        let loaded: Vec<DiffRecord> = read_json(&path).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_refactorings_round_trip_keeps_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(REFACTORINGS_FILE);
        let text = r#"{"commits":[{"repository":"r","sha1":"abc","url":"u","refactorings":[
            {"type":"Rename Method","description":"d","leftSideLocations":[{"filePath":"A.java","startLine":1,"endLine":2,"startColumn":3}],"rightSideLocations":[]}
        ]}]}"#;
        let report: RefactoringReport = serde_json::from_str(text).unwrap();

        write_json(&path, &report).unwrap();
        let loaded: RefactoringReport = read_json(&path).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(
            loaded.commits[0].refactorings[0].left_side_locations[0]
                .extra
                .get("startColumn"),
            Some(&serde_json::json!(3))
        );
    }

    #[test]
    fn test_clear_artifacts() {
        let dir = TempDir::new().unwrap();
        write_json(&dir.path().join(DIFF_ANALYSIS_FILE), &Vec::<DiffRecord>::new()).unwrap();
        write_json(
            &dir.path().join(SUMMARY_FILE),
            &vec![CommitWarning {
                commit_hash: "x".to_string(),
                reason: SkipReason::NoParent,
                detail: String::new(),
            }],
        )
        .unwrap();

        clear_artifacts(dir.path()).unwrap();
        for name in ALL_ARTIFACTS {
            assert!(!dir.path().join(name).exists());
        }
        // Clearing an empty directory is fine
        clear_artifacts(dir.path()).unwrap();
    }
}
