//! Business logic between the HTTP handlers and the stores.

pub mod auto_response;
pub mod content;

pub use auto_response::{AutoResponseError, AutoResponseWorker};
pub use content::{CommentWrite, ContentService, PendingComment};
