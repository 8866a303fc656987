//! Competition data models shared by the upstream client, the store, and the sync engine.

mod event;
mod matches;
mod ranking;
mod team;

pub use event::*;
pub use matches::*;
pub use ranking::*;
pub use team::*;
