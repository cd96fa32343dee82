//! モデル学習機能

use anyhow::Result;
use std::marker::PhantomData;
use std::path::PathBuf;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::Module,
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};
use burn_wgpu::WgpuDevice;

use crate::ml::{DigitClassifier, ModelConfig, CLASS_NAMES, IMAGE_SIZE, NUM_CLASSES};
use crate::mnist::MnistData;
use crate::model::config::{DeviceType, TrainingSettings};

/// MNISTデータセット（メモリ上）
pub struct MnistDataset {
    data: MnistData,
}

impl MnistDataset {
    pub fn new(data: MnistData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &MnistData {
        &self.data
    }
}

/// データセットアイテム
#[derive(Clone, Debug)]
pub struct MnistItem {
    /// 行優先のピクセル値（0-255）
    pub pixels: Vec<u8>,
    pub label: u8,
}

impl Dataset<MnistItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        if index >= self.data.len() {
            return None;
        }
        Some(MnistItem {
            pixels: self.data.image(index).to_vec(),
            label: self.data.labels[index],
        })
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

/// バッチャー
#[derive(Clone)]
pub struct MnistBatcher<B: Backend> {
    image_size: usize,
    _backend: PhantomData<B>,
}

impl<B: Backend> MnistBatcher<B> {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Default for MnistBatcher<B> {
    fn default() -> Self {
        Self::new(IMAGE_SIZE)
    }
}

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher<B> {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * size * size);
        let mut targets_vec = Vec::with_capacity(batch_size);

        for item in items {
            // 0-255 -> 0.0-1.0
            all_pixels.extend(item.pixels.iter().map(|p| *p as f32 / 255.0));
            targets_vec.push(item.label as i64);
        }

        // 1回の転送でバッチ全体をデバイスへ
        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), device)
            .reshape([batch_size, 1, size, size]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), device);

        MnistBatch { images, targets }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: AutodiffBackend> TrainStep<MnistBatch<B>, ClassificationOutput<B>> for DigitClassifier<B> {
    fn step(&self, batch: MnistBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> ValidStep<MnistBatch<B>, ClassificationOutput<B>> for DigitClassifier<B> {
    fn step(&self, batch: MnistBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

/// 設定からWGPUデバイスを選択
pub fn wgpu_device(device_type: DeviceType) -> WgpuDevice {
    match device_type {
        DeviceType::Wgpu => WgpuDevice::DefaultDevice,
        DeviceType::Cpu => WgpuDevice::Cpu,
    }
}

/// 学習結果
pub struct TrainedModel<B: Backend> {
    pub model: DigitClassifier<B>,
    pub test_accuracy: f32,
    pub train_samples: usize,
    pub test_samples: usize,
}

/// データセット全体に対する正解率
pub fn evaluate_accuracy<B: Backend>(
    model: &DigitClassifier<B>,
    data: &MnistData,
    batch_size: usize,
    device: &B::Device,
) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let dataset = MnistDataset::new(data.clone());
    let batcher = MnistBatcher::<B>::new(data.rows);
    let batch_size = batch_size.max(1);

    let mut correct = 0i64;
    let mut start = 0;
    while start < dataset.len() {
        let end = (start + batch_size).min(dataset.len());
        let items: Vec<MnistItem> = (start..end).filter_map(|i| dataset.get(i)).collect();
        let batch = batcher.batch(items, device);
        let count = end - start;

        let predictions = model.forward(batch.images).argmax(1).reshape([count]);
        correct += predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        start = end;
    }

    correct as f32 / data.len() as f32
}

/// モデル学習を実行
///
/// 学習データで `num_epochs` エポック学習し、テストデータで検証します。
pub fn train_model<B: AutodiffBackend>(
    settings: &TrainingSettings,
    train_data: MnistData,
    test_data: MnistData,
    device: B::Device,
) -> Result<TrainedModel<B::InnerBackend>> {
    use burn::{
        data::dataloader::DataLoaderBuilder,
        optim::AdamConfig,
        train::{
            metric::{AccuracyMetric, LossMetric},
            LearnerBuilder, LearningStrategy,
        },
    };

    if train_data.is_empty() {
        anyhow::bail!("学習データが見つかりません");
    }
    if train_data.rows != IMAGE_SIZE || train_data.cols != IMAGE_SIZE {
        anyhow::bail!(
            "画像サイズが不正です: {}x{} (期待: {}x{})",
            train_data.rows,
            train_data.cols,
            IMAGE_SIZE,
            IMAGE_SIZE
        );
    }

    let train_samples = train_data.len();
    let test_samples = test_data.len();
    log::info!("学習データ: {} 枚", train_samples);
    log::info!("検証データ: {} 枚", test_samples);

    let model_config = ModelConfig::new()
        .with_num_classes(NUM_CLASSES)
        .with_image_size(IMAGE_SIZE);
    log::info!(
        "モデル設定: {} クラス ({}), 入力サイズ: {}x{}",
        model_config.num_classes,
        CLASS_NAMES.join(","),
        IMAGE_SIZE,
        IMAGE_SIZE
    );
    let model = model_config.init::<B>(&device)?;

    let batcher_train = MnistBatcher::<B>::new(IMAGE_SIZE);
    let batcher_val = MnistBatcher::<B::InnerBackend>::new(IMAGE_SIZE);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(settings.batch_size)
        .shuffle(settings.seed)
        .num_workers(settings.num_workers)
        .build(MnistDataset::new(train_data));

    let dataloader_val = DataLoaderBuilder::new(batcher_val)
        .batch_size(settings.batch_size)
        .num_workers(settings.num_workers)
        .build(MnistDataset::new(test_data.clone()));

    // アーティファクトディレクトリ（学習ログとチェックポイント）
    let artifact_dir: PathBuf = std::env::temp_dir().join("mnist_prep_training");
    std::fs::create_dir_all(&artifact_dir)?;
    let artifact_dir_str = artifact_dir.to_string_lossy().to_string();

    log::info!(
        "学習を開始します... エポック数: {}, バッチサイズ: {}, 学習率: {}",
        settings.num_epochs,
        settings.batch_size,
        settings.learning_rate
    );

    let learner = LearnerBuilder::new(&artifact_dir_str)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
        .num_epochs(settings.num_epochs)
        .summary()
        .build(model, AdamConfig::new().init(), settings.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_val);
    let trained = model_trained.model;
    log::info!("学習完了: パラメータ数 {}", trained.num_params());

    let test_accuracy = evaluate_accuracy(&trained, &test_data, settings.batch_size, &device);
    log::info!("テスト正解率: {:.2}%", test_accuracy * 100.0);

    std::fs::remove_dir_all(&artifact_dir).ok();

    Ok(TrainedModel {
        model: trained,
        test_accuracy,
        train_samples,
        test_samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::optim::{AdamConfig, GradientsParams, Optimizer};
    use burn::module::AutodiffModule;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    /// クラスごとに明るさの異なる単純な画像
    fn synthetic_data(count: usize) -> MnistData {
        let mut images = Vec::with_capacity(count * IMAGE_SIZE * IMAGE_SIZE);
        let mut labels = Vec::with_capacity(count);
        for i in 0..count {
            let label = (i % 2) as u8;
            for y in 0..IMAGE_SIZE {
                for x in 0..IMAGE_SIZE {
                    let on = if label == 0 { x < IMAGE_SIZE / 2 } else { y < IMAGE_SIZE / 2 };
                    images.push(if on { 255 } else { 0 });
                }
            }
            labels.push(label);
        }
        MnistData::new(images, labels, IMAGE_SIZE, IMAGE_SIZE).unwrap()
    }

    #[test]
    fn test_dataset_get() {
        let dataset = MnistDataset::new(synthetic_data(3));
        assert_eq!(dataset.len(), 3);
        let item = dataset.get(1).unwrap();
        assert_eq!(item.label, 1);
        assert_eq!(item.pixels.len(), IMAGE_SIZE * IMAGE_SIZE);
        assert!(dataset.get(3).is_none());
    }

    #[test]
    fn test_batcher_normalizes() {
        let device = Default::default();
        let dataset = MnistDataset::new(synthetic_data(4));
        let items: Vec<MnistItem> = (0..4).filter_map(|i| dataset.get(i)).collect();
        let batch = MnistBatcher::<TestBackend>::default().batch(items, &device);

        assert_eq!(batch.images.dims(), [4, 1, IMAGE_SIZE, IMAGE_SIZE]);
        assert_eq!(batch.targets.dims(), [4]);
        let max = batch.images.clone().max().into_scalar();
        let min = batch.images.min().into_scalar();
        assert_eq!(max, 1.0);
        assert_eq!(min, 0.0);
    }

    #[test]
    fn test_optimizer_steps_reduce_loss() {
        let device = Default::default();
        let data = synthetic_data(8);
        let dataset = MnistDataset::new(data.clone());
        let items: Vec<MnistItem> = (0..8).filter_map(|i| dataset.get(i)).collect();
        let batch = MnistBatcher::<TestAutodiffBackend>::default().batch(items, &device);

        let mut model = ModelConfig::new().init::<TestAutodiffBackend>(&device).unwrap();
        let mut optim = AdamConfig::new().init();

        let initial = model
            .forward_classification(batch.images.clone(), batch.targets.clone())
            .loss
            .into_scalar();
        for _ in 0..15 {
            let output = model.forward_classification(batch.images.clone(), batch.targets.clone());
            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optim.step(1e-3, model, grads);
        }
        let last = model
            .forward_classification(batch.images, batch.targets)
            .loss
            .into_scalar();
        assert!(last < initial, "loss did not decrease: {} -> {}", initial, last);

        let accuracy = evaluate_accuracy(&model.valid(), &data, 3, &device);
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn test_evaluate_empty() {
        let device = Default::default();
        let model = ModelConfig::new().init::<TestBackend>(&device).unwrap();
        let empty = MnistData::new(Vec::new(), Vec::new(), IMAGE_SIZE, IMAGE_SIZE).unwrap();
        assert_eq!(evaluate_accuracy(&model, &empty, 4, &device), 0.0);
    }
}
