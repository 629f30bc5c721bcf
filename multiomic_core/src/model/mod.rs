//! Encoders, supervisory heads and the multi-task model.

pub mod core;
pub mod encoder;
pub mod feed_forward;
pub mod graph_encoder;
pub mod triplet;
pub mod variational;
pub mod weighting;

pub use self::core::{
    EmbeddingTable, ModelCore, ModelOptions, ModelState, Prediction, Predictions, StepReport,
};
pub use encoder::{AuxiliaryLoss, Encoder, Mode};
pub use feed_forward::FeedForwardEncoder;
pub use graph_encoder::GraphEncoder;
pub use triplet::TripletEncoder;
pub use variational::VariationalEncoder;
pub use weighting::{combine_losses, CombinedLoss, LogVariances};
