//! サンプル画像の t-SNE 3次元座標を計算して coords.json に書き出す

use clap::Parser;
use mnist_prep_lib::cli::{init_logging, load_config};
use mnist_prep_lib::manifest::load_manifest;
use mnist_prep_lib::projection::{compute_coordinates, write_coordinates};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "compute_coords", about = "Compute 3D t-SNE coordinates for the sample manifest")]
struct Args {
    /// 設定ファイル（省略時は config.json）
    #[arg(long)]
    config: Option<PathBuf>,
    /// サンプル画像ディレクトリ
    #[arg(long)]
    sample_dir: Option<PathBuf>,
    /// マニフェスト（省略時は <sample_dir>/meta.json）
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// 出力先（省略時は <sample_dir>/coords.json）
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    perplexity: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    n_iter: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref());

    if let Some(sample_dir) = args.sample_dir {
        config.paths.sample_dir = sample_dir;
    }
    if let Some(perplexity) = args.perplexity {
        config.tsne.perplexity = perplexity;
    }
    if let Some(seed) = args.seed {
        config.tsne.random_state = seed;
    }
    if let Some(n_iter) = args.n_iter {
        config.tsne.n_iter = n_iter;
    }
    config.display();

    let manifest_path = args.manifest.unwrap_or_else(|| config.paths.manifest_path());
    let output_path = args.output.unwrap_or_else(|| config.paths.coords_path());

    let manifest = load_manifest(&manifest_path)?;
    let coords = compute_coordinates(
        &config.paths.sample_dir,
        &manifest,
        config.sample.image_size,
        &config.tsne,
    )?;
    write_coordinates(&output_path, &coords)?;

    log::info!("✓ {} 点の座標を {} に書き出しました", coords.len(), output_path.display());
    Ok(())
}
