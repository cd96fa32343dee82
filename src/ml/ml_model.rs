//! 機械学習モデルの共通定義
//!
//! 手書き数字分類用のCNNモデルと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};

/// クラス数
pub const NUM_CLASSES: usize = 10;

/// 画像サイズ
pub const IMAGE_SIZE: usize = 28;

/// クラス名の定義
pub const CLASS_NAMES: [&str; NUM_CLASSES] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

/// 畳み込み層のチャネル数
pub const CONV1_CHANNELS: usize = 32;
pub const CONV2_CHANNELS: usize = 64;
/// 隠れ層のユニット数
pub const HIDDEN_UNITS: usize = 128;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    #[config(default = 10)]
    pub num_classes: usize,
    /// 入力画像サイズ（正方形）
    #[config(default = 28)]
    pub image_size: usize,
}

impl ModelConfig {
    /// 最終プーリング後の特徴マップサイズ
    ///
    /// Conv (3x3, no padding): size -> size - 2
    /// Pool (2x2, stride 2): size -> size / 2（切り捨て）
    pub fn feature_map_size(&self) -> usize {
        let after_conv1 = self.image_size.saturating_sub(2);
        let after_pool1 = after_conv1 / 2;
        let after_conv2 = after_pool1.saturating_sub(2);
        after_conv2 / 2
    }

    /// Flatten後の特徴次元
    pub fn flatten_dim(&self) -> usize {
        let size = self.feature_map_size();
        CONV2_CHANNELS * size * size
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> anyhow::Result<DigitClassifier<B>> {
        if self.feature_map_size() == 0 {
            anyhow::bail!("入力サイズが小さすぎます: {} (最小10x10が必要)", self.image_size);
        }
        let d = self.flatten_dim();
        log::debug!(
            "[Model] 入力 {}x{} -> Flatten後 {} -> FC {} -> {}",
            self.image_size,
            self.image_size,
            d,
            HIDDEN_UNITS,
            self.num_classes
        );

        Ok(DigitClassifier {
            conv1: Conv2dConfig::new([1, CONV1_CHANNELS], [3, 3])
                .with_stride([1, 1])
                .init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2: Conv2dConfig::new([CONV1_CHANNELS, CONV2_CHANNELS], [3, 3])
                .with_stride([1, 1])
                .init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(d, HIDDEN_UNITS).init(device),
            fc2: LinearConfig::new(HIDDEN_UNITS, self.num_classes).init(device),
            activation: Relu::new(),
        })
    }
}

/// 手書き数字分類用CNNモデル
///
/// # アーキテクチャ
/// - Conv 3x3 (32ch) + ReLU + MaxPool 2x2
/// - Conv 3x3 (64ch) + ReLU + MaxPool 2x2
/// - Flatten
/// - FC: d -> 128 + ReLU
/// - FC: 128 -> num_classes
/// - Softmax (分類時)
#[derive(Module, Debug)]
pub struct DigitClassifier<B: Backend> {
    pub(crate) conv1: Conv2d<B>, // 1 -> 32
    pub(crate) pool1: MaxPool2d,
    pub(crate) conv2: Conv2d<B>, // 32 -> 64
    pub(crate) pool2: MaxPool2d,

    // 全結合層
    pub(crate) fc1: Linear<B>, // d -> 128
    pub(crate) fc2: Linear<B>, // 128 -> num_classes

    pub(crate) activation: Relu,
}

impl<B: Backend> DigitClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 1, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 予測を実行
    ///
    /// # 戻り値
    /// - (予測クラスID [batch_size, 1], 確率 [batch_size, num_classes])
    pub fn predict(&self, images: Tensor<B, 4>) -> (Tensor<B, 2, Int>, Tensor<B, 2>) {
        let probs = self.probabilities(images);
        let predictions = probs.clone().argmax(1);
        (predictions, probs)
    }

    /// 順伝播と損失計算（学習用）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}
