//! Webhook delivery
//!
//! [`HttpWebhookNotifier`] posts deliveries over HTTP; [`RecordingNotifier`]
//! keeps them in memory for tests and dry runs.

mod http;
mod recording;

pub use http::{HttpWebhookNotifier, EVENT_HEADER, SESSION_HEADER};
pub use recording::RecordingNotifier;
