//! MNIST 3D可視化のためのオフラインデータ準備
//!
//! - `mnist`: IDXアーカイブの取得・パースとサンプル画像の書き出し
//! - `projection`: 画像特徴量の読み込みと t-SNE による3次元座標の計算
//! - `ml`: 手書き数字分類CNNの学習と推論（`ml` フィーチャー）
//! - `model`: 設定、チェックポイント、TF.js 形式でのエクスポート

pub mod cli;
pub mod manifest;
pub mod mnist;
pub mod model;
pub mod projection;
pub mod types;

#[cfg(feature = "ml")]
pub mod ml;

pub use manifest::{load_manifest, save_manifest};
pub use types::{CoordTriple, SampleEntry, SamplePrediction};
