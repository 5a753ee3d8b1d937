//! Comment records and the stages around inference: loading, pre-filtering, the threshold
//! decision and persistence.

pub mod decision;
pub mod filter;
pub mod links;
pub mod record;
pub mod writer;

pub use decision::{is_positive, ScoredComment};
pub use filter::{evaluate, FilterVerdict};
pub use links::comment_link;
pub use record::{Comment, CommentId, CommentStream, LoadItem, SourceDir};
pub use writer::{PositiveCollection, PositiveComment, ResultWriter};
