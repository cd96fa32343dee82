//! サンプル画像の3次元座標計算
//!
//! マニフェスト順に画像を特徴ベクトル化し、t-SNEで3次元に埋め込んで
//! `[[x, y, z], ...]` 形式のJSONとして保存します。

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::projection::features::load_feature_matrix;
use crate::projection::tsne::{Tsne, TsneConfig};
use crate::types::{CoordTriple, SampleEntry};

/// マニフェストの全サンプルについて3次元座標を計算
///
/// 戻り値の件数は常にマニフェストの件数と一致する。
pub fn compute_coordinates(
    sample_dir: &Path,
    manifest: &[SampleEntry],
    image_size: u32,
    tsne_config: &TsneConfig,
) -> Result<Vec<CoordTriple>> {
    if manifest.is_empty() {
        anyhow::bail!("マニフェストが空です");
    }
    if tsne_config.n_components != 3 {
        anyhow::bail!(
            "座標出力は3次元のみ対応しています (n_components = {})",
            tsne_config.n_components
        );
    }

    log::info!("{} 枚の画像を読み込み中...", manifest.len());
    let features = load_feature_matrix(sample_dir, manifest, image_size)?;

    log::info!("Running t-SNE...");
    let result = Tsne::new(tsne_config.clone()).fit_transform(&features)?;

    let coords: Vec<CoordTriple> = result
        .embedding
        .iter()
        .map(|row| [row[0], row[1], row[2]])
        .collect();

    if coords.len() != manifest.len() {
        anyhow::bail!(
            "座標数がマニフェストと一致しません: 座標 {} 件, マニフェスト {} 件",
            coords.len(),
            manifest.len()
        );
    }
    Ok(coords)
}

/// 座標をJSON配列として保存
pub fn write_coordinates(path: &Path, coords: &[CoordTriple]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }
    let json = serde_json::to_string(coords)?;
    fs::write(path, json).with_context(|| format!("Failed to write coordinates: {:?}", path))?;
    log::info!("Saved 3D coordinates to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_coordinates_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("coords.json");
        let coords = vec![[1.0, -2.5, 0.0], [0.25, 0.5, 0.75]];

        write_coordinates(&path, &coords).unwrap();
        let parsed: Vec<Vec<f64>> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, vec![vec![1.0, -2.5, 0.0], vec![0.25, 0.5, 0.75]]);
    }

    #[test]
    fn test_empty_manifest_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(compute_coordinates(dir.path(), &[], 28, &TsneConfig::default()).is_err());
    }

    #[test]
    fn test_only_three_components() {
        let dir = tempfile::tempdir().unwrap();
        let config = TsneConfig {
            n_components: 2,
            ..Default::default()
        };
        let manifest = vec![SampleEntry::new(0, 0)];
        assert!(compute_coordinates(dir.path(), &manifest, 28, &config).is_err());
    }
}
