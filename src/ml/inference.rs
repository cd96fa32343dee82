//! モデル推論機能

use anyhow::Result;
use std::path::Path;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};

use crate::ml::{DigitClassifier, ModelConfig};
use crate::model::{load_model_with_metadata, ModelMetadata};
use crate::projection::load_feature_vector;
use crate::types::{SampleEntry, SamplePrediction};

/// 1枚分の予測
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub digit: u8,
    pub confidence: f32,
}

/// 推論エンジン
pub struct InferenceEngine<B: Backend> {
    model: DigitClassifier<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// チェックポイント（tar.gz）を読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;
        Self::from_binary(metadata, model_binary, device)
    }

    /// メタデータとモデルバイナリから初期化
    pub fn from_binary(metadata: ModelMetadata, model_binary: Vec<u8>, device: B::Device) -> Result<Self> {
        let model_config = ModelConfig::new()
            .with_num_classes(metadata.class_labels.len())
            .with_image_size(metadata.image_size as usize);
        let model = model_config.init::<B>(&device)?;

        // モデルの重みを復元
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(model_binary, &device)
            .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;
        let model = model.load_record(record);

        Ok(Self {
            model,
            metadata,
            device,
        })
    }

    /// 正規化済みピクセル（行優先, [0, 1]）を分類
    pub fn classify_pixels(&self, pixels: &[f32]) -> Result<Prediction> {
        let size = self.metadata.image_size as usize;
        if pixels.len() != size * size {
            anyhow::bail!(
                "入力サイズが不正です: {} 要素 (期待: {})",
                pixels.len(),
                size * size
            );
        }

        let tensor = Tensor::<B, 1>::from_floats(pixels, &self.device).reshape([1, 1, size, size]);
        let probs = self
            .model
            .probabilities(tensor)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))?;

        let (index, confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        let digit = self
            .metadata
            .class_labels
            .get(index)
            .and_then(|label| label.parse::<u8>().ok())
            .ok_or_else(|| anyhow::anyhow!("クラスインデックス {} は範囲外です", index))?;

        Ok(Prediction { digit, confidence })
    }

    /// 単一画像を分類
    pub fn classify_image<P: AsRef<Path>>(&self, image_path: P) -> Result<Prediction> {
        let pixels = load_feature_vector(image_path.as_ref(), self.metadata.image_size)?;
        self.classify_pixels(&pixels)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

/// マニフェスト順に全サンプルを分類
pub fn predict_manifest<B: Backend>(
    engine: &InferenceEngine<B>,
    sample_dir: &Path,
    manifest: &[SampleEntry],
) -> Result<Vec<SamplePrediction>> {
    manifest
        .iter()
        .map(|entry| {
            let prediction = engine.classify_image(sample_dir.join(&entry.file))?;
            Ok(SamplePrediction {
                index: entry.index,
                file: entry.file.clone(),
                digit: prediction.digit,
                confidence: prediction.confidence,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{IMAGE_SIZE, NUM_CLASSES};
    use crate::model::save_model_with_metadata;
    use burn_ndarray::NdArray;
    use image::GrayImage;

    type TestBackend = NdArray<f32>;

    fn metadata() -> ModelMetadata {
        ModelMetadata::new(IMAGE_SIZE as u32, 1, 32, 1e-3, 10, 10, 0.5)
    }

    fn model_binary() -> Vec<u8> {
        let model = ModelConfig::new().init::<TestBackend>(&Default::default()).unwrap();
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        Recorder::<TestBackend>::record(&recorder, model.into_record(), ()).unwrap()
    }

    #[test]
    fn test_roundtrip_through_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnist.tar.gz");
        save_model_with_metadata(&path, &metadata(), &model_binary()).unwrap();

        let engine = InferenceEngine::<TestBackend>::load(&path, Default::default()).unwrap();
        assert_eq!(engine.metadata().class_labels.len(), NUM_CLASSES);

        let prediction = engine.classify_pixels(&vec![0.5; IMAGE_SIZE * IMAGE_SIZE]).unwrap();
        assert!(prediction.digit < 10);
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
    }

    #[test]
    fn test_wrong_input_size() {
        let engine =
            InferenceEngine::<TestBackend>::from_binary(metadata(), model_binary(), Default::default()).unwrap();
        assert!(engine.classify_pixels(&[0.0; 10]).is_err());
    }

    #[test]
    fn test_predict_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = vec![SampleEntry::new(0, 1), SampleEntry::new(1, 2)];
        for entry in &manifest {
            GrayImage::new(28, 28).save(dir.path().join(&entry.file)).unwrap();
        }
        let engine =
            InferenceEngine::<TestBackend>::from_binary(metadata(), model_binary(), Default::default()).unwrap();

        let predictions = predict_manifest(&engine, dir.path(), &manifest).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[1].file, "1.png");
        // 同一画像なら同一の予測
        assert_eq!(predictions[0].digit, predictions[1].digit);
    }
}
