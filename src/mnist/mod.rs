pub mod idx;
pub mod loader;
pub mod sample;

pub use idx::{header_count, parse_images, parse_labels, IdxError, IdxImages};
pub use loader::{download_and_extract, MnistLoader, Split, DEFAULT_BASE_URL};
pub use sample::export_sample;

/// MNISTの画像とラベル
#[derive(Debug, Clone)]
pub struct MnistData {
    /// 全画像のピクセル（行優先で連結）
    pub images: Vec<u8>,
    pub labels: Vec<u8>,
    pub rows: usize,
    pub cols: usize,
}

impl MnistData {
    pub fn new(images: Vec<u8>, labels: Vec<u8>, rows: usize, cols: usize) -> anyhow::Result<Self> {
        let pixels_per_image = rows
            .checked_mul(cols)
            .ok_or_else(|| anyhow::anyhow!("画像サイズが大きすぎます: {}x{}", rows, cols))?;
        if pixels_per_image == 0 || images.len() % pixels_per_image != 0 {
            anyhow::bail!(
                "画像データ長が不正です: {} バイト ({}x{})",
                images.len(),
                rows,
                cols
            );
        }
        let count = images.len() / pixels_per_image;
        if count != labels.len() {
            anyhow::bail!(
                "画像数とラベル数が一致しません: 画像 {} 枚, ラベル {} 件",
                count,
                labels.len()
            );
        }
        Ok(Self {
            images,
            labels,
            rows,
            cols,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn pixels_per_image(&self) -> usize {
        self.rows * self.cols
    }

    /// i番目の画像
    pub fn image(&self, index: usize) -> &[u8] {
        let size = self.pixels_per_image();
        &self.images[index * size..(index + 1) * size]
    }

    /// 先頭n件に切り詰める
    pub fn truncate(&mut self, n: usize) {
        if n < self.len() {
            self.labels.truncate(n);
            self.images.truncate(n * self.pixels_per_image());
        }
    }
}
