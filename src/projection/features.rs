//! 画像から特徴ベクトルへの変換

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use std::path::Path;

use crate::types::SampleEntry;

/// 特徴抽出時の画像サイズ（正方形）
pub const FEATURE_IMAGE_SIZE: u32 = 28;

/// 画像を読み込んでグレースケール化・リサイズし、[0, 1] に正規化して平坦化
///
/// 戻り値は行優先で `size * size` 要素。
pub fn load_feature_vector(path: &Path, size: u32) -> Result<Vec<f32>> {
    let img = image::open(path)
        .with_context(|| format!("Failed to open image: {:?}", path))?
        .to_luma8();

    let img = if img.dimensions() == (size, size) {
        img
    } else {
        imageops::resize(&img, size, size, FilterType::CatmullRom)
    };

    Ok(img.pixels().map(|p| p[0] as f32 / 255.0).collect())
}

/// マニフェスト順に全サンプルの特徴ベクトルを読み込む
pub fn load_feature_matrix(sample_dir: &Path, entries: &[SampleEntry], size: u32) -> Result<Vec<Vec<f32>>> {
    entries
        .iter()
        .map(|entry| load_feature_vector(&sample_dir.join(&entry.file), size))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_normalized_flatten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        let mut img = GrayImage::new(2, 2);
        img.put_pixel(1, 0, Luma([255]));
        img.put_pixel(0, 1, Luma([51]));
        img.save(&path).unwrap();

        let v = load_feature_vector(&path, 2).unwrap();
        assert_eq!(v.len(), 4);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[1], 1.0);
        assert!((v[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_color_and_resize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.png");
        let img = RgbImage::from_pixel(56, 56, Rgb([255, 255, 255]));
        img.save(&path).unwrap();

        let v = load_feature_vector(&path, FEATURE_IMAGE_SIZE).unwrap();
        assert_eq!(v.len(), 784);
        assert!(v.iter().all(|x| (*x - 1.0).abs() < 1e-3));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![SampleEntry::new(0, 0)];
        assert!(load_feature_matrix(dir.path(), &entries, FEATURE_IMAGE_SIZE).is_err());
    }
}
