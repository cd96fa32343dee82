//! バイナリ共通の初期化処理

use env_logger::{Builder, Env};
use std::path::Path;

use crate::model::AppConfig;

/// `RUST_LOG` 未指定時は info レベルでログを初期化
pub fn init_logging() {
    Builder::from_env(Env::default().default_filter_or("info")).init();
}

/// `--config` 指定があればそのパス、なければ `config.json` から設定を読み込む
pub fn load_config(path: Option<&Path>) -> AppConfig {
    match path {
        Some(path) => AppConfig::load_or_default_from(path),
        None => AppConfig::load_or_default(),
    }
}
