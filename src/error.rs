use rand::distributions::WeightedError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad flag, bad JSON value or an inconsistent combination of the two.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A language code that has no recorded vocabulary range.
    #[error("no vocabulary range recorded for language '{0}'")]
    UnknownLanguage(String),

    /// The smoothed unigram mass over a language slice is zero, or the slice
    /// runs past the frequency table.
    #[error("cannot build a sampling prior for language '{lang}' over ids {start}..{end}")]
    EmptyPrior {
        lang: String,
        start: usize,
        end: usize,
    },

    /// Word list and vector table disagree in length.
    #[error("{words} words for {rows} embedding rows")]
    RowMismatch {
        words: usize,
        rows: usize,
    },

    #[error("cannot build negative sampler: {0}")]
    Sampling(#[from] WeightedError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Npy(#[from] ndarray_npy::WriteNpyError),
}
