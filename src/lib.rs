
pub mod config;
pub mod error;
pub mod corpus;
pub mod batch;
pub mod model;
pub mod optim;
pub mod sampling;
pub mod distribution;
pub mod train;
mod pipeline;

pub use config::{files_handling, Config, Params, TrainParams};
pub use error::Error;
pub use pipeline::Pipeline;
pub use train::Train;
