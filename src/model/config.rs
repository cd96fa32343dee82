//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、入出力パス、学習・t-SNEのパラメータをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::projection::TsneConfig;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    #[default]
    Wgpu,
    /// WGPU (CPU) バックエンド
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "WGPU (CPU)"),
        }
    }
}

/// 入出力パス
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// サンプル画像と meta.json / coords.json を置くディレクトリ
    pub sample_dir: PathBuf,
    /// マニフェストのファイル名（sample_dir からの相対）
    pub manifest_file: String,
    /// 座標出力のファイル名（sample_dir からの相対）
    pub coords_file: String,
    /// 予測結果のファイル名（sample_dir からの相対）
    pub predictions_file: String,
    /// TF.js形式モデルの出力ディレクトリ
    pub web_model_dir: PathBuf,
    /// ネイティブチェックポイント（tar.gz）
    pub checkpoint_path: PathBuf,
    /// MNISTアーカイブのキャッシュディレクトリ
    pub data_dir: PathBuf,
    /// MNISTの配布元URL
    pub mnist_base_url: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            sample_dir: PathBuf::from("public/mnist-sample"),
            manifest_file: "meta.json".to_string(),
            coords_file: "coords.json".to_string(),
            predictions_file: "predictions.json".to_string(),
            web_model_dir: PathBuf::from("public/models/mnist"),
            checkpoint_path: PathBuf::from("models/mnist.tar.gz"),
            data_dir: PathBuf::from("data/mnist"),
            mnist_base_url: crate::mnist::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl PathSettings {
    pub fn manifest_path(&self) -> PathBuf {
        self.sample_dir.join(&self.manifest_file)
    }

    pub fn coords_path(&self) -> PathBuf {
        self.sample_dir.join(&self.coords_file)
    }

    pub fn predictions_path(&self) -> PathBuf {
        self.sample_dir.join(&self.predictions_file)
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// ワーカー数
    pub num_workers: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ランダムシード
    pub seed: u64,
    /// 学習に使う最大枚数（Noneで全件）
    pub max_train_samples: Option<usize>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 5,
            batch_size: 32,
            num_workers: 1,
            learning_rate: 1e-3,
            seed: 42,
            max_train_samples: None,
        }
    }
}

/// サンプル書き出し設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleSettings {
    /// 書き出す枚数
    pub sample_size: usize,
    /// 特徴抽出時の画像サイズ
    pub image_size: u32,
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            image_size: 28,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// 入出力パス
    pub paths: PathSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
    /// t-SNE設定
    pub tsne: TsneConfig,
    /// サンプル設定
    pub sample: SampleSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない・壊れている場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    log::info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            log::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// デフォルトパスから設定を読み込む
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報をログに出力
    pub fn display(&self) {
        log::info!("=== アプリケーション設定 ===");
        log::info!("計算デバイス: {}", self.device_type);
        log::info!("サンプルディレクトリ: {}", self.paths.sample_dir.display());
        log::info!("Webモデル出力先: {}", self.paths.web_model_dir.display());
        log::info!("チェックポイント: {}", self.paths.checkpoint_path.display());
        log::info!(
            "学習: エポック数 {}, バッチサイズ {}, 学習率 {}, シード {}",
            self.training.num_epochs,
            self.training.batch_size,
            self.training.learning_rate,
            self.training.seed
        );
        log::info!(
            "t-SNE: {}次元, perplexity {}, 反復 {}, シード {}",
            self.tsne.n_components,
            self.tsne.perplexity,
            self.tsne.n_iter,
            self.tsne.random_state
        );
    }
}
