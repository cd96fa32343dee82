//! MNISTでCNNを学習し、TF.js形式とネイティブチェックポイントを書き出す
#![recursion_limit = "256"]

use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn_autodiff::Autodiff;
use burn_wgpu::Wgpu;
use clap::Parser;
use mnist_prep_lib::cli::{init_logging, load_config};
use mnist_prep_lib::ml::{train_model, wgpu_device, IMAGE_SIZE};
use mnist_prep_lib::mnist::{MnistLoader, Split};
use mnist_prep_lib::model::{export_tfjs, print_metadata_info, save_model_with_metadata, DeviceType, ModelMetadata};
use std::path::PathBuf;

type TrainBackend = Autodiff<Wgpu>;

#[derive(Parser, Debug)]
#[command(name = "train_model", about = "Train the digit CNN and export it for the web")]
struct Args {
    /// 設定ファイル（省略時は config.json）
    #[arg(long)]
    config: Option<PathBuf>,
    /// TF.jsモデルの出力ディレクトリ
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// ネイティブチェックポイントの出力先
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    #[arg(long)]
    epochs: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// 学習に使う最大枚数
    #[arg(long)]
    max_train_samples: Option<usize>,
    /// WGPUのCPUアダプタを使う
    #[arg(long)]
    cpu: bool,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref());

    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if args.max_train_samples.is_some() {
        config.training.max_train_samples = args.max_train_samples;
    }
    if args.cpu {
        config.device_type = DeviceType::Cpu;
    }
    config.display();

    let loader = MnistLoader::new(&config.paths.mnist_base_url, &config.paths.data_dir);
    let mut train_data = loader.load(Split::Train, None)?;
    if let Some(max) = config.training.max_train_samples {
        train_data.truncate(max);
    }
    let test_data = loader.load(Split::Test, None)?;

    let device = wgpu_device(config.device_type);
    let trained = train_model::<TrainBackend>(&config.training, train_data, test_data, device)?;

    let web_dir = args.out_dir.unwrap_or(config.paths.web_model_dir);
    export_tfjs(&trained.model, IMAGE_SIZE, &web_dir)?;

    let metadata = ModelMetadata::new(
        IMAGE_SIZE as u32,
        config.training.num_epochs as u32,
        config.training.batch_size as u32,
        config.training.learning_rate,
        trained.train_samples as u32,
        trained.test_samples as u32,
        trained.test_accuracy,
    );
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let model_binary = Recorder::<Wgpu>::record(&recorder, trained.model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデルのシリアライズエラー: {:?}", e))?;

    let checkpoint = args.checkpoint.unwrap_or(config.paths.checkpoint_path);
    save_model_with_metadata(&checkpoint, &metadata, &model_binary)?;
    print_metadata_info(&metadata);

    log::info!("✓ Webモデル: {}", web_dir.display());
    log::info!("✓ チェックポイント: {}", checkpoint.display());
    Ok(())
}
