use serde::{Deserialize, Serialize};

/// マニフェストの1エントリ
///
/// `meta.json` の要素。座標計算では `file` のみ必須。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleEntry {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub label: u8,
    pub file: String,
}

impl SampleEntry {
    pub fn new(index: u32, label: u8) -> Self {
        Self {
            index,
            label,
            file: format!("{}.png", index),
        }
    }
}

/// 3次元座標（x, y, z）
pub type CoordTriple = [f64; 3];

/// 1サンプル分の分類結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplePrediction {
    pub index: u32,
    pub file: String,
    pub digit: u8,
    pub confidence: f32,
}
