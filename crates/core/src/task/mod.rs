//! Import task model.
//!
//! An [`ImportTask`] is either an album group, a singleton item, or a
//! sentinel marking the end of a group of singletons. Album and singleton
//! tasks share the same [`MediaTask`] payload.

mod candidate;
mod import_task;
mod item;

pub use candidate::{AlbumInfo, AlbumMatch, Candidate, Distance, TrackInfo, TrackMapping, TrackMatch};
pub use import_task::{Choice, ImportTask, MediaTask, Recommendation, TaskId, TaskKind};
pub use item::{Item, ItemRef};

pub(crate) use import_task::plurality;
