//! Persistence layer: libSQL-backed storage for profiles, conversation logs,
//! generated media and workflow checkpoints.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    CheckpointStore, ConversationEntry, ConversationLog, GeneratedMediaRecord, MediaStore,
    ProfileStore,
};
