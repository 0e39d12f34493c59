//! Axum extractors for request handling

mod path;
mod validated;

pub use path::SessionPath;
pub use validated::ValidatedJson;
