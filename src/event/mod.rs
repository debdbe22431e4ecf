//! # Notifications
//!
//! Process-wide notifications are carried by a broadcast [`EventBus`]. The
//! registry emits `componentLoaded` and `registryLog` events for an external
//! log viewer, and every component instance publishes its own named events
//! (`badgeReady`, `badgeStateChanged`, ...) on the same bus.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────┐     ┌────────────┐
//! │ComponentRegistry │────▶│ EventBus │────▶│ log viewer │
//! └──────────────────┘     └──────────┘     └────────────┘
//!          Instance ──────────▲
//! ```
//!
//! Publishing never fails because nobody is listening; a bus without
//! subscribers simply drops the event.

pub mod event_bus;

pub use event_bus::{Event, EventBus, EventError, EventReceiver, EventResult, EventType};
