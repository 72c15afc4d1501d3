//! Turn workflow: conversation state, the node graph and its checkpoints.

pub mod checkpoint;
pub mod locks;
pub mod orchestrator;
pub mod state;

pub use checkpoint::InMemoryCheckpointStore;
pub use locks::{TurnGuard, TurnLocks};
pub use orchestrator::{FALLBACK_RESPONSE, Node, NodeOutput, Orchestrator, TurnResult};
pub use state::{ChatTurn, ConversationState, Intent, MessageRole};
