//! Protocol events - what the external protocol client reports per session

mod protocol_event;

pub use protocol_event::{
    MessageSummary, PairingEvent, PresenceSummary, ProtocolEvent, ReceiptSummary,
};
