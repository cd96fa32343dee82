//! MNISTの先頭N枚をPNGとmeta.jsonとして書き出す

use clap::Parser;
use mnist_prep_lib::cli::{init_logging, load_config};
use mnist_prep_lib::mnist::{export_sample, MnistLoader, Split};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "download_sample", about = "Export the first N MNIST training images as PNG + meta.json")]
struct Args {
    /// 設定ファイル（省略時は config.json）
    #[arg(long)]
    config: Option<PathBuf>,
    /// 出力ディレクトリ
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// 書き出す枚数
    #[arg(long)]
    sample_size: Option<usize>,
    /// IDXアーカイブのキャッシュディレクトリ
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// MNISTの配布元URL
    #[arg(long)]
    base_url: Option<String>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let config = load_config(args.config.as_deref());

    let out_dir = args.out_dir.unwrap_or(config.paths.sample_dir);
    let sample_size = args.sample_size.unwrap_or(config.sample.sample_size);
    let data_dir = args.data_dir.unwrap_or(config.paths.data_dir);
    let base_url = args.base_url.unwrap_or(config.paths.mnist_base_url);

    let loader = MnistLoader::new(&base_url, &data_dir);
    let data = loader.load(Split::Train, Some(sample_size))?;
    let manifest = export_sample(&data, &out_dir, sample_size)?;

    log::info!("✓ {} 枚を {} に書き出しました", manifest.len(), out_dir.display());
    Ok(())
}
