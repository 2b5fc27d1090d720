//! Import event log.
//!
//! Session activity is emitted as [`ImportEvent`]s through a cloneable
//! [`EventHandle`] and persisted by a background [`EventWriter`].

mod event;
mod handle;
mod sqlite;
mod store;
mod writer;

pub use event::*;
pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use writer::*;
