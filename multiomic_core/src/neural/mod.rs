//! Neural network building blocks.
//!
//! A small CPU substrate over `ndarray`: dense and graph-convolution layers
//! with explicit backward passes, masked losses, and an Adam optimizer. Every
//! encoder and supervisory head is assembled from these pieces.

pub mod graph_conv;
pub mod layer;
pub mod loss;
pub mod mlp;
pub mod optimizer;

pub use graph_conv::{GraphConv, GraphConvCache};
pub use layer::{Activation, Dense, DenseGrads};
pub use loss::{cox_ph_loss, masked_cross_entropy, masked_mse, softmax_rows, LossOutput, MISSING_CLASS};
pub use mlp::{Mlp, MlpCache, MlpGrads};
pub use optimizer::AdamOptimizer;
