//! 可視化用サンプルの書き出し
//!
//! 先頭N枚をグレースケールPNGとして保存し、順序を記録した meta.json を生成します。

use anyhow::{Context, Result};
use image::GrayImage;
use std::fs;
use std::path::Path;

use crate::manifest::save_manifest;
use crate::mnist::MnistData;
use crate::types::SampleEntry;

/// マニフェストのファイル名
pub const MANIFEST_FILE: &str = "meta.json";

/// サンプル画像とマニフェストを書き出す
pub fn export_sample(data: &MnistData, out_dir: &Path, sample_size: usize) -> Result<Vec<SampleEntry>> {
    let count = if sample_size > data.len() {
        log::warn!(
            "サンプル数 {} がデータ数 {} を超えています。{} 枚に制限します",
            sample_size,
            data.len(),
            data.len()
        );
        data.len()
    } else {
        sample_size
    };

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    let mut meta = Vec::with_capacity(count);
    for i in 0..count {
        let entry = SampleEntry::new(i as u32, data.labels[i]);
        let img = GrayImage::from_raw(data.cols as u32, data.rows as u32, data.image(i).to_vec())
            .ok_or_else(|| anyhow::anyhow!("画像バッファのサイズが不正です: index {}", i))?;

        let out_path = out_dir.join(&entry.file);
        img.save(&out_path)
            .with_context(|| format!("Failed to write image: {:?}", out_path))?;
        meta.push(entry);
    }

    save_manifest(&out_dir.join(MANIFEST_FILE), &meta)?;
    log::info!("{} 枚のサンプルを書き出しました: {}", meta.len(), out_dir.display());
    Ok(meta)
}
