//! Local HTML cache: one dated document per day, so repeated runs within a
//! day re-read the saved page instead of re-fetching it.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn cache_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}_output.html", date.format("%Y-%m-%d")))
}

/// Returns the cached document, or None when it is absent or empty.
pub fn load_cached(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let html = fs::read_to_string(path)
        .with_context(|| format!("Could not read cache {:?}", path))?;
    if html.trim().is_empty() {
        debug!("cache {:?} is empty, ignoring", path);
        return Ok(None);
    }
    Ok(Some(html))
}

pub fn save_cache(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    fs::write(path, html).with_context(|| format!("Could not write cache {:?}", path))?;
    debug!("cached document at {:?}", path);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_round_trip() {
        let dir = std::env::temp_dir().join("cb_etl_loader_test");
        let date = NaiveDate::from_ymd_opt(2022, 7, 23).unwrap();
        let path = cache_path(&dir, date);
        assert!(path.ends_with("2022-07-23_output.html"));

        save_cache(&path, "<tr></tr>").unwrap();
        assert_eq!(load_cached(&path).unwrap().as_deref(), Some("<tr></tr>"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_or_empty_cache_is_none() {
        let dir = std::env::temp_dir().join("cb_etl_loader_empty_test");
        let path = cache_path(&dir, NaiveDate::from_ymd_opt(2022, 7, 23).unwrap());
        assert_eq!(load_cached(&path).unwrap(), None);

        save_cache(&path, "  \n").unwrap();
        assert_eq!(load_cached(&path).unwrap(), None);

        std::fs::remove_dir_all(&dir).ok();
    }
}
