use crate::types::SampleEntry;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// マニフェスト（meta.json）を読み込む
pub fn load_manifest(path: &Path) -> Result<Vec<SampleEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {:?}", path))?;
    let entries: Vec<SampleEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Malformed manifest: {:?}", path))?;

    log::info!("マニフェストを読み込みました: {} 件 ({})", entries.len(), path.display());
    Ok(entries)
}

/// マニフェストを2スペースインデントのJSONで保存
pub fn save_manifest(path: &Path, entries: &[SampleEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }
    let content = serde_json::to_string_pretty(entries)?;
    fs::write(path, content).with_context(|| format!("Failed to write manifest: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        let entries = vec![SampleEntry::new(0, 5), SampleEntry::new(1, 0)];

        save_manifest(&path, &entries).unwrap();
        let loaded = load_manifest(&path).unwrap();
        assert_eq!(loaded, entries);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  {"));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(&dir.path().join("meta.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("meta.json"));
    }

    #[test]
    fn test_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, r#"[{"index": 0}]"#).unwrap();
        assert!(load_manifest(&path).is_err());
    }
}
