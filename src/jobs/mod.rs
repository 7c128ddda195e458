//! Discord-side work driven by expiry timers.

pub mod mutes;
pub mod tickets;

pub use mutes::{MuteManager, Unmuted};
pub use tickets::TicketCloser;
