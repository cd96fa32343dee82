//! チェックポイントでサンプル画像を分類し predictions.json に書き出す

use anyhow::Context;
use burn_wgpu::Wgpu;
use clap::Parser;
use mnist_prep_lib::cli::{init_logging, load_config};
use mnist_prep_lib::manifest::load_manifest;
use mnist_prep_lib::ml::{predict_manifest, wgpu_device, InferenceEngine};
use mnist_prep_lib::model::{print_metadata_info, DeviceType};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "predict_digits", about = "Classify the sample manifest with a trained checkpoint")]
struct Args {
    /// 設定ファイル（省略時は config.json）
    #[arg(long)]
    config: Option<PathBuf>,
    /// チェックポイント（tar.gz）
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    /// サンプル画像ディレクトリ
    #[arg(long)]
    sample_dir: Option<PathBuf>,
    /// 出力先（省略時は <sample_dir>/predictions.json）
    #[arg(long)]
    output: Option<PathBuf>,
    /// WGPUのCPUアダプタを使う
    #[arg(long)]
    cpu: bool,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref());

    if let Some(sample_dir) = args.sample_dir {
        config.paths.sample_dir = sample_dir;
    }
    if args.cpu {
        config.device_type = DeviceType::Cpu;
    }

    let checkpoint = args.checkpoint.unwrap_or_else(|| config.paths.checkpoint_path.clone());
    let engine = InferenceEngine::<Wgpu>::load(&checkpoint, wgpu_device(config.device_type))?;
    print_metadata_info(engine.metadata());

    let manifest = load_manifest(&config.paths.manifest_path())?;
    let predictions = predict_manifest(&engine, &config.paths.sample_dir, &manifest)?;

    let correct = manifest
        .iter()
        .zip(&predictions)
        .filter(|(entry, prediction)| entry.label == prediction.digit)
        .count();
    log::info!(
        "マニフェストラベルとの一致: {}/{} ({:.2}%)",
        correct,
        manifest.len(),
        correct as f64 / manifest.len().max(1) as f64 * 100.0
    );

    let output = args.output.unwrap_or_else(|| config.paths.predictions_path());
    let json = serde_json::to_string_pretty(&predictions)?;
    std::fs::write(&output, json).with_context(|| format!("Failed to write predictions: {:?}", output))?;

    log::info!("✓ {} 件の予測を {} に書き出しました", predictions.len(), output.display());
    Ok(())
}
