use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Written next to the executable when a session reported missing libraries.
pub const REPORT_FILE: &str = "Analyzable-logs.txt";

const FAILURE_MARKERS: &[&str] = &["not found", "cannot", "error"];

/**
 * If `line` looks like a library loading failure, the token to report for it:
 * the line's first word, lower-cased.
 */
pub fn missing_dependency_token(line: &str) -> Option<String> {
    let lower = line.to_lowercase();
    if !lower.contains(".dll") {
        return None;
    }
    if !FAILURE_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return None;
    }
    lower.split_whitespace().next().map(str::to_string)
}

/**
 * Writes the sorted tokens, one per line, to the report file in `dir`. With
 * nothing to report a report left over from an earlier run is removed.
 * Returns the report path if one was written.
 */
pub fn write_report(dir: &Path, tokens: &BTreeSet<String>) -> Result<Option<PathBuf>> {
    let report = dir.join(REPORT_FILE);
    if tokens.is_empty() {
        info!("No missing dependencies detected");
        if report.exists() {
            std::fs::remove_file(&report).context(format!(
                "failed to remove stale {}",
                report.display()
            ))?;
        }
        return Ok(None);
    }

    let content = tokens.iter().cloned().collect::<Vec<_>>().join("\n");
    std::fs::write(&report, content)
        .context(format!("failed to write {}", report.display()))?;
    info!(
        "{} possibly missing dependencies written to {}",
        tokens.len(),
        report.display()
    );
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_extraction() {
        assert_eq!(
            missing_dependency_token("foo.dll not found"),
            Some("foo.dll".to_string())
        );
        assert_eq!(
            missing_dependency_token("  D3DX9_43.DLL: Cannot load"),
            Some("d3dx9_43.dll:".to_string())
        );
        assert_eq!(
            missing_dependency_token("err:module:import_dll Library MSVCP140.dll ERROR"),
            Some("err:module:import_dll".to_string())
        );
        assert_eq!(missing_dependency_token("loaded foo.dll"), None);
        assert_eq!(missing_dependency_token("file not found"), None);
    }

    #[test]
    fn test_report_written_sorted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let tokens = BTreeSet::from(["zlib.dll".to_string(), "a.dll".to_string()]);
        let report = write_report(dir.path(), &tokens)?;
        assert_eq!(report, Some(dir.path().join(REPORT_FILE)));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(REPORT_FILE))?,
            "a.dll\nzlib.dll"
        );
        Ok(())
    }

    #[test]
    fn test_stale_report_removed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(REPORT_FILE), "old.dll")?;
        assert_eq!(write_report(dir.path(), &BTreeSet::new())?, None);
        assert!(!dir.path().join(REPORT_FILE).exists());
        Ok(())
    }
}
