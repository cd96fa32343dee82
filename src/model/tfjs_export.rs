//! TensorFlow.js layers-model 形式でのエクスポート
//!
//! ブラウザから `tf.loadLayersModel("models/mnist/model.json")` で読み込める形式で、
//! `model.json` と重みシャード `group1-shard1of1.bin` を書き出します。
//!
//! burn と Keras ではテンソルのレイアウトが異なるため、書き出し時に変換します。
//! - Conv2D カーネル: burn `[out, in, kh, kw]` -> Keras `[kh, kw, in, out]`
//! - 最初の Dense カーネル: Flatten 順序 `(c, h, w)` -> `(h, w, c)` の行並べ替え
//! - Dense カーネルは burn・Keras ともに `[in, out]`

use anyhow::{Context, Result};
use burn::tensor::{backend::Backend, Tensor};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::ml::{DigitClassifier, CONV1_CHANNELS, CONV2_CHANNELS, HIDDEN_UNITS};

pub const MODEL_JSON_FILE: &str = "model.json";
pub const WEIGHTS_SHARD_FILE: &str = "group1-shard1of1.bin";

/// 書き出す1つの重みテンソル
#[derive(Debug, Clone, PartialEq)]
pub struct WeightEntry {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// エクスポート結果
#[derive(Debug, Clone)]
pub struct TfjsExport {
    pub model_json: PathBuf,
    pub weights_file: PathBuf,
    pub weight_bytes: usize,
}

fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("重みの取得エラー: {:?}", e))
}

/// Conv2D カーネルを `[out, in, kh, kw]` から `[kh, kw, in, out]` に並べ替え
pub fn conv_kernel_to_keras(values: &[f32], out_ch: usize, in_ch: usize, kh: usize, kw: usize) -> Vec<f32> {
    let mut keras = vec![0.0; values.len()];
    for o in 0..out_ch {
        for i in 0..in_ch {
            for y in 0..kh {
                for x in 0..kw {
                    let src = ((o * in_ch + i) * kh + y) * kw + x;
                    let dst = ((y * kw + x) * in_ch + i) * out_ch + o;
                    keras[dst] = values[src];
                }
            }
        }
    }
    keras
}

/// Dense カーネル `[c*h*w, out]` の行を `(c, h, w)` 順から `(h, w, c)` 順へ並べ替え
pub fn dense_rows_to_channels_last(
    values: &[f32],
    channels: usize,
    height: usize,
    width: usize,
    units: usize,
) -> Vec<f32> {
    let mut permuted = vec![0.0; values.len()];
    for c in 0..channels {
        for h in 0..height {
            for w in 0..width {
                let src_row = (c * height + h) * width + w;
                let dst_row = (h * width + w) * channels + c;
                permuted[dst_row * units..(dst_row + 1) * units]
                    .copy_from_slice(&values[src_row * units..(src_row + 1) * units]);
            }
        }
    }
    permuted
}

/// モデルから Keras レイアウトの重み一覧を作成（layers-model の読み込み順）
pub fn collect_weights<B: Backend>(model: &DigitClassifier<B>) -> Result<Vec<WeightEntry>> {
    let mut entries = Vec::new();

    for (name, conv) in [("conv2d", &model.conv1), ("conv2d_1", &model.conv2)] {
        let [out_ch, in_ch, kh, kw] = conv.weight.val().dims();
        let kernel = tensor_values(conv.weight.val())?;
        entries.push(WeightEntry {
            name: format!("{}/kernel", name),
            shape: vec![kh, kw, in_ch, out_ch],
            values: conv_kernel_to_keras(&kernel, out_ch, in_ch, kh, kw),
        });
        let bias = match &conv.bias {
            Some(bias) => tensor_values(bias.val())?,
            None => vec![0.0; out_ch],
        };
        entries.push(WeightEntry {
            name: format!("{}/bias", name),
            shape: vec![out_ch],
            values: bias,
        });
    }

    for (index, (name, linear)) in [("dense", &model.fc1), ("dense_1", &model.fc2)].into_iter().enumerate() {
        let [d_in, d_out] = linear.weight.val().dims();
        let mut kernel = tensor_values(linear.weight.val())?;
        if index == 0 {
            let spatial = ((d_in / CONV2_CHANNELS) as f64).sqrt() as usize;
            if spatial * spatial * CONV2_CHANNELS != d_in {
                anyhow::bail!("Dense 入力次元 {} が特徴マップと一致しません", d_in);
            }
            kernel = dense_rows_to_channels_last(&kernel, CONV2_CHANNELS, spatial, spatial, d_out);
        }
        entries.push(WeightEntry {
            name: format!("{}/kernel", name),
            shape: vec![d_in, d_out],
            values: kernel,
        });
        let bias = match &linear.bias {
            Some(bias) => tensor_values(bias.val())?,
            None => vec![0.0; d_out],
        };
        entries.push(WeightEntry {
            name: format!("{}/bias", name),
            shape: vec![d_out],
            values: bias,
        });
    }

    Ok(entries)
}

fn conv_layer(name: &str, filters: usize) -> Value {
    json!({
        "class_name": "Conv2D",
        "config": {
            "name": name,
            "trainable": true,
            "dtype": "float32",
            "filters": filters,
            "kernel_size": [3, 3],
            "strides": [1, 1],
            "padding": "valid",
            "data_format": "channels_last",
            "dilation_rate": [1, 1],
            "activation": "relu",
            "use_bias": true,
        }
    })
}

fn pool_layer(name: &str) -> Value {
    json!({
        "class_name": "MaxPooling2D",
        "config": {
            "name": name,
            "trainable": true,
            "dtype": "float32",
            "pool_size": [2, 2],
            "strides": [2, 2],
            "padding": "valid",
            "data_format": "channels_last",
        }
    })
}

fn dense_layer(name: &str, units: usize, activation: &str) -> Value {
    json!({
        "class_name": "Dense",
        "config": {
            "name": name,
            "trainable": true,
            "dtype": "float32",
            "units": units,
            "activation": activation,
            "use_bias": true,
        }
    })
}

fn input_layer(image_size: usize) -> Value {
    json!({
        "class_name": "InputLayer",
        "config": {
            "name": "input_1",
            "batch_input_shape": [null, image_size, image_size, 1],
            "dtype": "float32",
            "sparse": false,
        }
    })
}

/// Keras Sequential 互換の modelTopology を生成
pub fn model_topology(image_size: usize, num_classes: usize) -> Value {
    json!({
        "class_name": "Sequential",
        "config": {
            "name": "sequential",
            "layers": [
                input_layer(image_size),
                conv_layer("conv2d", CONV1_CHANNELS),
                pool_layer("max_pooling2d"),
                conv_layer("conv2d_1", CONV2_CHANNELS),
                pool_layer("max_pooling2d_1"),
                {
                    "class_name": "Flatten",
                    "config": { "name": "flatten", "trainable": true, "dtype": "float32", "data_format": "channels_last" }
                },
                dense_layer("dense", HIDDEN_UNITS, "relu"),
                dense_layer("dense_1", num_classes, "softmax"),
            ]
        }
    })
}

/// `model.json` の内容を生成
pub fn model_json(image_size: usize, num_classes: usize, weights: &[WeightEntry]) -> Value {
    let specs: Vec<Value> = weights
        .iter()
        .map(|w| json!({ "name": w.name, "shape": w.shape, "dtype": "float32" }))
        .collect();

    json!({
        "format": "layers-model",
        "generatedBy": concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"), " (burn)"),
        "convertedBy": null,
        "modelTopology": model_topology(image_size, num_classes),
        "weightsManifest": [
            { "paths": [WEIGHTS_SHARD_FILE], "weights": specs }
        ]
    })
}

/// モデルを TF.js layers-model としてディレクトリに書き出す
pub fn export_tfjs<B: Backend>(model: &DigitClassifier<B>, image_size: usize, out_dir: &Path) -> Result<TfjsExport> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("Failed to create directory: {:?}", out_dir))?;

    let weights = collect_weights(model)?;
    let num_classes = weights.last().map(|w| w.shape[0]).unwrap_or(0);

    let mut shard = Vec::with_capacity(weights.iter().map(|w| w.values.len() * 4).sum());
    for weight in &weights {
        for value in &weight.values {
            shard.extend_from_slice(&value.to_le_bytes());
        }
    }

    let weights_file = out_dir.join(WEIGHTS_SHARD_FILE);
    std::fs::write(&weights_file, &shard)
        .with_context(|| format!("Failed to write weights: {:?}", weights_file))?;

    let model_json_path = out_dir.join(MODEL_JSON_FILE);
    let json_str = serde_json::to_string(&model_json(image_size, num_classes, &weights))?;
    std::fs::write(&model_json_path, json_str)
        .with_context(|| format!("Failed to write model.json: {:?}", model_json_path))?;

    log::info!(
        "Webモデルを書き出しました: {} ({} bytes)",
        out_dir.display(),
        shard.len()
    );

    Ok(TfjsExport {
        model_json: model_json_path,
        weights_file,
        weight_bytes: shard.len(),
    })
}
