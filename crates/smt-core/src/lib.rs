pub mod chart;
pub mod context;
pub mod coverage;
pub mod error;
pub mod future;
pub mod kbest;
pub mod model;
pub mod output;
pub mod phrase;
pub mod search;
pub mod settings;

pub use context::{CancelToken, SearchContext};
pub use error::{DecodeError, DecodeResult};
pub use output::Translation;
pub use search::SearchResult;
