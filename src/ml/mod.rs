pub mod inference;
pub mod ml_model;
pub mod training;

pub use inference::{predict_manifest, InferenceEngine, Prediction};
pub use ml_model::{
    DigitClassifier, ModelConfig, CLASS_NAMES, CONV1_CHANNELS, CONV2_CHANNELS, HIDDEN_UNITS, IMAGE_SIZE, NUM_CLASSES,
};
pub use training::{
    evaluate_accuracy, train_model, wgpu_device, MnistBatch, MnistBatcher, MnistDataset, MnistItem, TrainedModel,
};
