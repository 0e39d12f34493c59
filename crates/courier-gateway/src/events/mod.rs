//! Protocol event pipeline
//!
//! Each subscribed session gets one pump task that drains the client's
//! callback channel into [`EventDispatcher::process`], preserving the order
//! the client delivered events in. Persistence and webhook calls leave the
//! pump through [`SideEffects`].

mod dispatcher;
mod side_effects;
mod subscription;

pub use dispatcher::{DispatcherConfig, EventDispatcher};
pub use side_effects::SideEffects;
pub use subscription::EventSubscription;
