//! Neural-network surrogate of the simulator: maps the study parameters of
//! a sample to its outcome metrics.
//!
//! Training follows the usual sequence: split the collected dataset, fit
//! normalizers on the training rows, search hyperparameters, refit the best
//! configuration and persist it with its (de)normalization layers.
//! Networks and optimizers run on candle; fixed baseline architectures can
//! be trained on the same split for comparison.

pub mod data;
pub mod gp;
pub mod model;
pub mod network;
pub mod normalize;
pub mod optimizer;
pub mod pipeline;
pub mod search;
pub mod train;
pub mod tuner;

pub use data::{load_dataset, split_dataset, Dataset, Partition, Split, SplitRatios};
pub use model::{predict_csv, SurrogateModel, TrainingMetrics};
pub use network::{Activation, LayerSpec, Mlp, MlpRecord};
pub use normalize::{Denormalizer, Normalizer};
pub use optimizer::OptimizerKind;
pub use pipeline::{
    default_baselines, train_and_save, train_baselines, train_baselines_and_save,
    train_surrogate, BaselineReport, BaselineResult, TrainingReport, BASELINES_FILE, TRIALS_FILE,
};
pub use search::{Hyperparameters, SearchSpace};
pub use tuner::{tune, SearchOutcome, Trial, TunerOptions};
