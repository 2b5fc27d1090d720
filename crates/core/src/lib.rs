pub mod config;
pub mod events;
pub mod library;
pub mod lookup;
pub mod metrics;
pub mod pipeline;
pub mod placer;
pub mod reader;
pub mod session;
pub mod task;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ImportMode,
    SanitizedConfig,
};
pub use events::{
    create_event_system, EventFilter, EventHandle, EventRecord, EventStore, ImportEvent,
    SqliteEventStore,
};
pub use library::{Library, LibraryError, SqliteLibrary};
pub use lookup::{CandidateLookup, LookupError, LookupQuery, MusicBrainzLookup, Proposal};
pub use pipeline::{ExecutionMode, Pipeline, PipelineError, RunSummary, Stage, StageError};
pub use placer::{FsPlacer, Placer, PlacerError};
pub use session::{
    Disposition, DuplicateAction, ImportPlugin, ImportServices, ImportSession, SessionError,
    SessionHandle, SessionManager, SessionOptions, TaskHook, TaskSummary,
};
pub use task::{Choice, ImportTask, Item, Recommendation, TaskId};
