//! MNISTのダウンロードとキャッシュ

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::mnist::idx::{header_count, parse_images, parse_labels, IMAGE_MAGIC};
use crate::mnist::MnistData;

/// 既定の配布元
pub const DEFAULT_BASE_URL: &str = "https://raw.githubusercontent.com/fgnt/mnist/master/";

/// データセットの分割
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn image_file(&self) -> &'static str {
        match self {
            Split::Train => "train-images-idx3-ubyte.gz",
            Split::Test => "t10k-images-idx3-ubyte.gz",
        }
    }

    pub fn label_file(&self) -> &'static str {
        match self {
            Split::Train => "train-labels-idx1-ubyte.gz",
            Split::Test => "t10k-labels-idx1-ubyte.gz",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// URLからgzファイルを取得（展開はしない）
pub fn download(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::blocking::get(url).with_context(|| format!("Failed to fetch {}", url))?;
    if !response.status().is_success() {
        anyhow::bail!("Failed to fetch {}: HTTP {}", url, response.status());
    }
    let bytes = response
        .bytes()
        .with_context(|| format!("Failed to read response body from {}", url))?;
    Ok(bytes.to_vec())
}

/// gzip圧縮されたバイト列を展開
pub fn gunzip(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut buffer = Vec::new();
    decoder
        .read_to_end(&mut buffer)
        .context("Failed to decompress gzip data")?;
    Ok(buffer)
}

/// URLからダウンロードして展開
pub fn download_and_extract(url: &str) -> Result<Vec<u8>> {
    gunzip(&download(url)?)
}

/// キャッシュ付きMNISTローダー
///
/// `cache_dir` に `.gz` が存在すればそれを使い、無ければ取得して保存する。
pub struct MnistLoader {
    base_url: String,
    cache_dir: PathBuf,
}

impl MnistLoader {
    pub fn new<P: AsRef<Path>>(base_url: &str, cache_dir: P) -> Self {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Self {
            base_url,
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn fetch(&self, file_name: &str) -> Result<Vec<u8>> {
        let cached = self.cache_dir.join(file_name);
        let compressed = if cached.exists() {
            log::debug!("キャッシュを使用します: {}", cached.display());
            fs::read(&cached).with_context(|| format!("Failed to read cache file: {:?}", cached))?
        } else {
            let url = format!("{}{}", self.base_url, file_name);
            log::info!("ダウンロード中: {}", url);
            let bytes = download(&url)?;
            fs::create_dir_all(&self.cache_dir)
                .with_context(|| format!("Failed to create cache directory: {:?}", self.cache_dir))?;
            fs::write(&cached, &bytes)
                .with_context(|| format!("Failed to write cache file: {:?}", cached))?;
            bytes
        };
        gunzip(&compressed).with_context(|| format!("Corrupt archive: {}", file_name))
    }

    /// 指定した分割を読み込む（`limit` で先頭から件数を制限）
    ///
    /// `limit` がファイル内の件数を超える場合は全件を返す。
    pub fn load(&self, split: Split, limit: Option<usize>) -> Result<MnistData> {
        let image_bytes = self.fetch(split.image_file())?;
        let label_bytes = self.fetch(split.label_file())?;

        let available = header_count(&image_bytes, IMAGE_MAGIC)
            .with_context(|| format!("Failed to parse {}", split.image_file()))?;
        let limit = limit.map(|n| n.min(available));

        let images = parse_images(&image_bytes, limit)
            .with_context(|| format!("Failed to parse {}", split.image_file()))?;
        let labels = parse_labels(&label_bytes, limit)
            .with_context(|| format!("Failed to parse {}", split.label_file()))?;

        let data = MnistData::new(images.pixels, labels, images.rows, images.cols)?;
        log::info!(
            "MNIST {} を読み込みました: {} 枚 ({}x{})",
            split,
            data.len(),
            data.rows,
            data.cols
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnist::idx::tests::{image_file, label_file};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_load_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(Split::Test.image_file()),
            gzip(&image_file(4, 3, 3)),
        )
        .unwrap();
        fs::write(
            dir.path().join(Split::Test.label_file()),
            gzip(&label_file(&[3, 1, 4, 1])),
        )
        .unwrap();

        // キャッシュがあればネットワークには触れない
        let loader = MnistLoader::new("http://127.0.0.1:9/unreachable", dir.path());
        let data = loader.load(Split::Test, Some(2)).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.labels, vec![3, 1]);
        assert_eq!(data.image(1).len(), 9);
    }

    #[test]
    fn test_limit_larger_than_file_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(Split::Train.image_file()),
            gzip(&image_file(4, 3, 3)),
        )
        .unwrap();
        fs::write(
            dir.path().join(Split::Train.label_file()),
            gzip(&label_file(&[5, 0, 4, 1])),
        )
        .unwrap();

        let loader = MnistLoader::new("http://127.0.0.1:9/unreachable", dir.path());
        let data = loader.load(Split::Train, Some(10)).unwrap();
        assert_eq!(data.len(), 4);

        let out_dir = dir.path().join("sample");
        let manifest = crate::mnist::export_sample(&data, &out_dir, 10).unwrap();
        assert_eq!(manifest.len(), 4);
        assert_eq!(manifest[3].file, "3.png");
        assert!(out_dir.join("meta.json").exists());
    }

    #[test]
    fn test_corrupt_cache() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(Split::Train.image_file()), b"not gzip").unwrap();
        fs::write(dir.path().join(Split::Train.label_file()), b"not gzip").unwrap();

        let loader = MnistLoader::new(DEFAULT_BASE_URL, dir.path());
        assert!(loader.load(Split::Train, None).is_err());
    }

    #[test]
    fn test_base_url_slash() {
        let loader = MnistLoader::new("http://example.com/mnist", "cache");
        assert_eq!(loader.base_url, "http://example.com/mnist/");
    }
}
