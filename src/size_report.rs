//! Artifact size reporting (`spec.md` §1 out-of-scope, `SPEC_FULL.md` §H —
//! still implemented as the thin external wrapper the CLI's `--stats` needs).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::orchestrator::CompileResult;

#[derive(Debug, Clone, Serialize)]
pub struct FileSize {
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetSizeReport {
    pub target_name: String,
    pub total_bytes: u64,
    pub files: Vec<FileSize>,
}

/// Walks each result's `out_dir` (`walkdir`, the same crate the teacher uses
/// for source discovery) and totals byte sizes per file and per target.
pub fn report(results: &[CompileResult]) -> Result<Vec<TargetSizeReport>> {
    let mut reports = Vec::with_capacity(results.len());
    for result in results {
        let mut files = Vec::new();
        let mut total = 0u64;

        if result.out_dir.is_dir() {
            for entry in walkdir::WalkDir::new(&result.out_dir) {
                let entry = entry.map_err(|e| {
                    crate::error::WarpError::with_cause(
                        crate::error::ErrorKind::DistMissing,
                        "failed walking out_dir for size report",
                        std::io::Error::from(e),
                    )
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
                total += bytes;
                files.push(FileSize {
                    path: entry.path().strip_prefix(&result.out_dir).unwrap().to_path_buf(),
                    bytes,
                });
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        reports.push(TargetSizeReport { target_name: result.target_name.clone(), total_bytes: total, files });
    }
    Ok(reports)
}

pub fn total_bytes_by_target(reports: &[TargetSizeReport]) -> BTreeMap<&str, u64> {
    reports.iter().map(|r| (r.target_name.as_str(), r.total_bytes)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn result(out_dir: PathBuf) -> CompileResult {
        CompileResult {
            target_name: "esm".into(),
            success: true,
            diagnostics: Vec::new(),
            diagnostic_text: String::new(),
            out_dir,
            root_dir: PathBuf::new(),
            compile_time_ms: 0,
            deduped: false,
        }
    }

    #[test]
    fn totals_bytes_across_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("index.js"), "abcd").unwrap();
        fs::write(dir.path().join("nested/util.js"), "abcdefgh").unwrap();

        let reports = report(&[result(dir.path().to_path_buf())]).unwrap();
        assert_eq!(reports[0].total_bytes, 12);
        assert_eq!(reports[0].files.len(), 2);
    }

    #[test]
    fn missing_out_dir_reports_zero_without_error() {
        let reports = report(&[result(PathBuf::from("/nonexistent/dir/xyz"))]).unwrap();
        assert_eq!(reports[0].total_bytes, 0);
        assert!(reports[0].files.is_empty());
    }
}
