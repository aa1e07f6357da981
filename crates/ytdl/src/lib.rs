pub mod error;
pub mod extractor;
pub mod format;
pub mod metadata;
pub mod progress;
pub mod validate;
pub mod ytdlp;

pub use error::*;
pub use extractor::*;
pub use format::*;
pub use metadata::*;
pub use progress::*;
pub use validate::*;
pub use ytdlp::YtDlp;
