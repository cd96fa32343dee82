//! モデルメタデータの定義
//!
//! チェックポイント（tar.gz）に metadata.json として同梱され、
//! 推論時のモデル再構築に使われます。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ml::CLASS_NAMES;

/// モデルメタデータ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// 全クラスラベル（出力インデックス順）
    /// 例: ["0", "1", ..., "9"]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形、通常28）
    pub image_size: u32,

    /// 学習エポック数
    pub num_epochs: u32,

    /// バッチサイズ
    pub batch_size: u32,

    /// 学習率
    pub learning_rate: f64,

    /// 学習に使った枚数
    pub train_samples: u32,

    /// 検証に使った枚数
    pub test_samples: u32,

    /// テストデータでの正解率（0.0-1.0）
    pub test_accuracy: f32,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        image_size: u32,
        num_epochs: u32,
        batch_size: u32,
        learning_rate: f64,
        train_samples: u32,
        test_samples: u32,
        test_accuracy: f32,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            class_labels: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            image_size,
            num_epochs,
            batch_size,
            learning_rate,
            train_samples,
            test_samples,
            test_accuracy,
            trained_at,
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
