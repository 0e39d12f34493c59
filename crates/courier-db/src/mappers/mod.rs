//! Record <-> model mappers

mod session;

pub use session::SessionInsert;
