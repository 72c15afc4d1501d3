//! Per-turn workflow: an explicit node graph over `ConversationState`.
//!
//! Every turn enters at `CheckProfile`. Onboarding turns end after one
//! `OnboardingStep`; everything else goes through the intent router, one of
//! the two handlers and the normalizer. Nodes only compute a `NodeOutput`;
//! `reduce` is the single place state is mutated, and `next` holds the edges.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assistant::{GeneralQueryHandler, IntentRouter, ResponseNormalizer, WelfareSearchHandler};
use crate::error::WorkflowError;
use crate::llm::LlmProvider;
use crate::onboarding::{OnboardingManager, OnboardingOutcome};
use crate::profile::{ProfileField, UserProfile};
use crate::search::SearchTool;
use crate::store::{CheckpointStore, ConversationLog, ProfileStore};

use super::locks::TurnLocks;
use super::state::{ChatTurn, ConversationState, Intent, MessageRole};

/// Used when a turn somehow ends without a reply.
pub const FALLBACK_RESPONSE: &str = "I'm sorry, I couldn't process that request.";

/// Workflow nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    CheckProfile,
    OnboardingStep,
    IntentRouter,
    WelfareSearch,
    GeneralQuery,
    NormalizeResponse,
}

impl Node {
    pub fn name(self) -> &'static str {
        match self {
            Self::CheckProfile => "check_profile",
            Self::OnboardingStep => "onboarding_step",
            Self::IntentRouter => "intent_router",
            Self::WelfareSearch => "welfare_search",
            Self::GeneralQuery => "general_query",
            Self::NormalizeResponse => "normalize_response",
        }
    }
}

/// What a node produced.
#[derive(Debug, Clone)]
pub enum NodeOutput {
    ProfileChecked {
        is_onboarding: bool,
        profile: Option<UserProfile>,
    },
    Onboarded(OnboardingOutcome),
    Routed(Intent),
    Handled(String),
    Normalized(String),
}

/// Apply a node's output to the state.
pub fn reduce(mut state: ConversationState, output: NodeOutput) -> ConversationState {
    match output {
        NodeOutput::ProfileChecked {
            is_onboarding,
            profile,
        } => {
            state.is_onboarding = is_onboarding;
            if let Some(stored) = &profile {
                if stored.is_complete() {
                    state.user_profile_data = stored.fields.clone();
                } else {
                    // Stored answers first, then whatever this conversation collected.
                    let mut fields = stored.fields.clone();
                    fields.merge(&state.user_profile_data);
                    state.user_profile_data = fields;
                }
            }
            state.profile = profile;
        }
        NodeOutput::Onboarded(outcome) => {
            state.user_profile_data = outcome.fields;
            state.is_onboarding = !outcome.done;
            state.backstory = outcome.backstory;
            state.messages.push(ChatTurn::assistant(outcome.message.clone()));
            state.final_response_text = Some(outcome.message);
        }
        NodeOutput::Routed(intent) => state.intent = Some(intent),
        NodeOutput::Handled(text) => state.tool_output = Some(text),
        NodeOutput::Normalized(text) => {
            state.messages.push(ChatTurn::assistant(text.clone()));
            state.final_response_text = Some(text);
        }
    }
    state
}

/// The node after `node`, or `None` when the turn is over.
pub fn next(node: Node, state: &ConversationState) -> Option<Node> {
    match node {
        Node::CheckProfile if state.is_onboarding => Some(Node::OnboardingStep),
        Node::CheckProfile => Some(Node::IntentRouter),
        Node::OnboardingStep => None,
        Node::IntentRouter => match state.intent {
            Some(Intent::WelfareSearch) => Some(Node::WelfareSearch),
            _ => Some(Node::GeneralQuery),
        },
        Node::WelfareSearch | Node::GeneralQuery => Some(Node::NormalizeResponse),
        Node::NormalizeResponse => None,
    }
}

/// Outcome of one turn, as handed to the transport.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub conversation_id: String,
    pub response_text: String,
    pub is_onboarding: bool,
    /// The field the next onboarding question asks for.
    pub onboarding_step: Option<ProfileField>,
    /// Known profile fields, if any.
    pub profile: Option<BTreeMap<String, String>>,
    /// Set only on the turn that generated it.
    pub backstory: Option<String>,
    pub intent: Option<Intent>,
}

pub struct Orchestrator {
    onboarding: OnboardingManager,
    router: IntentRouter,
    welfare: WelfareSearchHandler,
    general: GeneralQueryHandler,
    normalizer: ResponseNormalizer,
    profiles: Arc<dyn ProfileStore>,
    log: Arc<dyn ConversationLog>,
    checkpoints: Arc<dyn CheckpointStore>,
    /// Keyed by user id. Taken before `conversation_locks`.
    user_locks: TurnLocks,
    conversation_locks: TurnLocks,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchTool>,
        profiles: Arc<dyn ProfileStore>,
        log: Arc<dyn ConversationLog>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            onboarding: OnboardingManager::new(profiles.clone(), llm.clone()),
            router: IntentRouter::new(llm.clone()),
            welfare: WelfareSearchHandler::new(llm.clone(), search),
            general: GeneralQueryHandler::new(llm.clone()),
            normalizer: ResponseNormalizer::new(llm),
            profiles,
            log,
            checkpoints,
            user_locks: TurnLocks::new(),
            conversation_locks: TurnLocks::new(),
        }
    }

    /// Run one turn for `user_id`.
    ///
    /// Without a conversation id a fresh conversation is started; its id is
    /// returned in the result. Turns of the same user run one at a time, even
    /// across conversations, since they share one profile.
    pub async fn turn(
        &self,
        conversation_id: Option<&str>,
        user_id: &str,
        utterance: &str,
    ) -> Result<TurnResult, WorkflowError> {
        let user_id = validate_user_id(user_id)?;
        let conversation_id = match conversation_id.map(str::trim) {
            Some("") => {
                return Err(WorkflowError::InvalidIdentity(
                    "conversation_id must not be empty".to_string(),
                ));
            }
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        let _user_guard = self.user_locks.acquire(user_id).await;
        let _conversation_guard = self.conversation_locks.acquire(&conversation_id).await;

        let mut state = match self.checkpoints.load_checkpoint(&conversation_id).await {
            Ok(Some(state)) if state.user_id != user_id => {
                return Err(WorkflowError::InvalidIdentity(format!(
                    "conversation {conversation_id} belongs to another user"
                )));
            }
            Ok(Some(state)) => state,
            Ok(None) => ConversationState::new(user_id),
            Err(e) => {
                warn!(conversation_id = %conversation_id, "Checkpoint load failed, starting fresh: {}", e);
                ConversationState::new(user_id)
            }
        };

        state.begin_turn(utterance);
        self.log_message(user_id, MessageRole::Human, utterance).await;

        let mut node = Node::CheckProfile;
        loop {
            debug!(user_id, node = node.name(), "Running workflow node");
            let output = self.run_node(node, &state).await?;
            state = reduce(state, output);
            match next(node, &state) {
                Some(following) => node = following,
                None => break,
            }
        }

        let response_text = match state.final_response_text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => {
                warn!(user_id, "Turn ended without a reply");
                state.final_response_text = Some(FALLBACK_RESPONSE.to_string());
                FALLBACK_RESPONSE.to_string()
            }
        };

        self.checkpoints
            .save_checkpoint(&conversation_id, &state)
            .await?;
        self.log_message(user_id, MessageRole::Assistant, &response_text)
            .await;

        info!(
            user_id,
            conversation_id = %conversation_id,
            is_onboarding = state.is_onboarding,
            intent = ?state.intent,
            "Turn complete"
        );

        let profile = state.user_profile_data.to_string_map();
        Ok(TurnResult {
            conversation_id,
            response_text,
            is_onboarding: state.is_onboarding,
            onboarding_step: if state.is_onboarding {
                state.user_profile_data.first_missing()
            } else {
                None
            },
            profile: (!profile.is_empty()).then_some(profile),
            backstory: state.backstory,
            intent: state.intent,
        })
    }

    async fn run_node(
        &self,
        node: Node,
        state: &ConversationState,
    ) -> Result<NodeOutput, WorkflowError> {
        let user_id = state.user_id.as_str();
        let query = state.last_human_message().unwrap_or_default();

        let output = match node {
            Node::CheckProfile => {
                let check = self.onboarding.check(user_id).await;
                NodeOutput::ProfileChecked {
                    is_onboarding: check.is_onboarding,
                    profile: check.profile,
                }
            }
            Node::OnboardingStep => {
                let first_contact =
                    state.human_message_count() <= 1 && state.user_profile_data.is_empty();
                let outcome = self
                    .onboarding
                    .step(
                        user_id,
                        &state.user_profile_data,
                        state.last_human_message(),
                        first_contact,
                    )
                    .await?;
                NodeOutput::Onboarded(outcome)
            }
            Node::IntentRouter => {
                NodeOutput::Routed(self.router.classify(&state.user_profile_data, query).await)
            }
            Node::WelfareSearch => {
                NodeOutput::Handled(self.welfare.handle(&state.user_profile_data, query).await)
            }
            Node::GeneralQuery => {
                NodeOutput::Handled(self.general.handle(&state.user_profile_data, query).await)
            }
            Node::NormalizeResponse => {
                let raw = state.tool_output.as_deref().unwrap_or_default();
                NodeOutput::Normalized(self.normalizer.normalize(raw).await)
            }
        };
        Ok(output)
    }

    async fn log_message(&self, user_id: &str, role: MessageRole, content: &str) {
        if let Err(e) = self.log.append_message(user_id, role, content).await {
            warn!(user_id, role = role.as_str(), "Failed to log message: {}", e);
        }
    }

    /// The stored profile of `user_id`.
    pub async fn get_profile(&self, user_id: &str) -> Result<UserProfile, WorkflowError> {
        let user_id = validate_user_id(user_id)?;
        self.profiles
            .get_profile(user_id)
            .await?
            .ok_or_else(|| not_found("User profile", user_id))
    }

    /// The backstory of `user_id`, once one has been generated.
    pub async fn get_backstory(&self, user_id: &str) -> Result<String, WorkflowError> {
        let profile = self.get_profile(user_id).await?;
        match profile.backstory {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(not_found("Backstory", &profile.user_id)),
        }
    }

    /// Remove the profile, the message log and every checkpoint of `user_id`.
    ///
    /// The next turn from this user starts onboarding from scratch.
    pub async fn delete_profile(&self, user_id: &str) -> Result<(), WorkflowError> {
        let user_id = validate_user_id(user_id)?;
        let _guard = self.user_locks.acquire(user_id).await;

        if !self.profiles.delete_profile(user_id).await? {
            return Err(not_found("User profile", user_id));
        }
        let messages = self.log.clear_messages(user_id).await?;
        let checkpoints = self.checkpoints.delete_checkpoints_for_user(user_id).await?;
        info!(user_id, messages, checkpoints, "Profile deleted");
        Ok(())
    }
}

fn validate_user_id(user_id: &str) -> Result<&str, WorkflowError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(WorkflowError::InvalidIdentity(
            "user_id must not be empty".to_string(),
        ));
    }
    Ok(user_id)
}

fn not_found(entity: &str, id: &str) -> WorkflowError {
    WorkflowError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}
