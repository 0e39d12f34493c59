//! Domain entities - core business objects

mod session;

pub use session::{SessionRecord, SessionStatus};
