//! The conversation session service: the pipeline's single entry point.
//!
//! Owns the session store and the phase state machine. All mutation flows
//! through the methods here; one session is processed strictly
//! sequentially (a per-session lock is held for the whole turn), while
//! independent sessions share no mutable state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::orchestrator::AgentOrchestrator;
use crate::versions::VersionService;
use partforge_core::attachment::Attachment;
use partforge_core::config::ForgeConfig;
use partforge_core::geometry::GeometrySummary;
use partforge_core::params;
use partforge_core::session::{ConversationPhase, Message, Session, SessionView, SiblingPart};
use partforge_core::version::{VersionSource, VersionStatus};
use partforge_core::{ForgeError, Result};
use partforge_interaction::{LanguageModel, ScriptGenerator};
use partforge_kernel::ScriptExecutor;

use crate::repair::RepairLoop;
use crate::validator::Validator;

type SessionSlot = Arc<Mutex<Session>>;

/// Conversational design sessions over a language model and a geometry
/// kernel. Cheap to share: wrap in an `Arc` and clone across tasks.
pub struct ConversationService {
    sessions: RwLock<HashMap<String, SessionSlot>>,
    cancel_tokens: RwLock<HashMap<String, CancellationToken>>,
    orchestrator: AgentOrchestrator,
    executor: Arc<dyn ScriptExecutor>,
    versions: Option<Arc<VersionService>>,
}

impl ConversationService {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        executor: Arc<dyn ScriptExecutor>,
        config: ForgeConfig,
    ) -> Self {
        let generator = ScriptGenerator::new(Arc::clone(&model), &config);
        let validator = Validator::new(Arc::clone(&executor), config.printer.clone());
        let repair = RepairLoop::new(generator, validator, config.max_attempts);
        let turn_validator = Validator::new(Arc::clone(&executor), config.printer.clone());
        let orchestrator = AgentOrchestrator::new(model, repair, turn_validator, config);

        Self {
            sessions: RwLock::new(HashMap::new()),
            cancel_tokens: RwLock::new(HashMap::new()),
            orchestrator,
            executor,
            versions: None,
        }
    }

    /// Attaches a version ledger; generation results and parameter updates
    /// are then recorded for sessions linked to a part.
    pub fn with_versions(mut self, versions: Arc<VersionService>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Creates a session, optionally linked to a persisted part.
    pub async fn create_session(&self, part_id: Option<String>) -> SessionView {
        let session = Session::new(part_id);
        let view = SessionView::from(&session);
        info!(session = %session.id, "session created");
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), Arc::new(Mutex::new(session)));
        view
    }

    /// Opens the conversation with the coordinator's greeting.
    pub async fn start(&self, session_id: &str) -> Result<SessionView> {
        let slot = self.slot(session_id).await?;
        let mut session = slot.lock().await;
        session.push_message(Message::system(
            "Design session started. Describe the part you want to create.",
        ));
        Ok(SessionView::from(&*session))
    }

    /// Appends a user message and runs one turn of the agent pipeline.
    /// Honors `cancel` at the model/kernel suspension points.
    pub async fn handle_user_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<SessionView> {
        let slot = self.slot(session_id).await?;
        let cancel = self.fresh_token(session_id).await;
        let mut session = slot.lock().await;

        if session.phase.is_terminal() {
            return Err(ForgeError::state(
                "Session is complete; start a new session to keep designing",
            ));
        }
        if content.trim().is_empty() {
            return Err(ForgeError::input("Message must not be empty"));
        }

        session.push_message(Message::user(content));
        let script_before = session.current_script.clone();

        tokio::select! {
            result = self.orchestrator.run_turn(&mut session) => {
                result?;
            }
            _ = cancel.cancelled() => {
                warn!(session = %session.id, "turn cancelled");
                session.push_message(Message::system("Generation cancelled."));
            }
        }

        if session.current_script != script_before {
            self.record_generation(&session).await;
        }
        Ok(SessionView::from(&*session))
    }

    /// Quick action: skip straight to generation with whatever
    /// requirements exist.
    pub async fn generate_now(&self, session_id: &str) -> Result<SessionView> {
        let slot = self.slot(session_id).await?;
        let cancel = self.fresh_token(session_id).await;
        let mut session = slot.lock().await;

        // Re-entry from designing retries a failed generation
        if session.phase != ConversationPhase::Designing
            && !session
                .phase
                .can_transition_to(ConversationPhase::Designing)
        {
            return Err(ForgeError::state(format!(
                "Cannot generate from the '{}' phase",
                session.phase
            )));
        }
        if session.requirements.description.is_empty()
            && session.messages.iter().all(|m| m.agent_role.is_none())
        {
            return Err(ForgeError::input(
                "Describe the part before requesting generation",
            ));
        }

        session.phase = ConversationPhase::Designing;
        let script_before = session.current_script.clone();

        tokio::select! {
            result = self.orchestrator.run_generation(&mut session) => {
                result?;
            }
            _ = cancel.cancelled() => {
                warn!(session = %session.id, "generation cancelled");
                session.push_message(Message::system("Generation cancelled."));
            }
        }

        if session.current_script != script_before {
            self.record_generation(&session).await;
        }
        Ok(SessionView::from(&*session))
    }

    /// Accepts the validated design, completing the session.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::State`] unless the session is in the
    /// finalizing phase with a validator-confirmed script.
    pub async fn accept(&self, session_id: &str) -> Result<SessionView> {
        let slot = self.slot(session_id).await?;
        let mut session = slot.lock().await;

        if session.phase != ConversationPhase::Finalizing || !session.validated {
            return Err(ForgeError::state(format!(
                "Cannot accept from the '{}' phase; the design must pass \
                 validation first",
                session.phase
            )));
        }

        session.phase = ConversationPhase::Complete;
        session.push_message(Message::system("Design accepted. Session complete."));
        info!(session = %session.id, "session completed");
        Ok(SessionView::from(&*session))
    }

    /// Patches parameter values into the current script, re-executes the
    /// kernel, and refreshes the geometry summary.
    pub async fn update_parameters(
        &self,
        session_id: &str,
        updates: BTreeMap<String, f64>,
    ) -> Result<SessionView> {
        params::validate_values(&updates).map_err(ForgeError::input)?;

        let slot = self.slot(session_id).await?;
        let mut session = slot.lock().await;

        let Some(script) = session.current_script.clone() else {
            return Err(ForgeError::state(
                "No script to update; generate a design first",
            ));
        };

        let patched =
            params::patch(&script, &updates).map_err(|err| ForgeError::input(err.to_string()))?;

        let geometry = self
            .executor
            .execute(&patched)
            .await
            .map_err(|err| ForgeError::generation(err.to_string()))?;

        let summary = GeometrySummary {
            bounding_box: geometry.bounding_box,
            parameters: params::extract(&patched),
        };
        session.push_message(Message::system(format!(
            "Parameters updated; new bounding box: {}.",
            summary.bounding_box
        )));
        session.current_script = Some(patched.clone());
        session.current_geometry = Some(summary);

        if let (Some(versions), Some(part_id)) = (&self.versions, &session.part_id) {
            if let Err(err) = versions
                .record(
                    part_id,
                    &patched,
                    Some(geometry.bounding_box),
                    VersionStatus::Generated,
                    None,
                    VersionSource::ParameterUpdate,
                )
                .await
            {
                warn!(error = %err, "failed to record parameter-update version");
            }
        }

        Ok(SessionView::from(&*session))
    }

    /// Attaches a visual reference for subsequent generations.
    pub async fn add_attachment(
        &self,
        session_id: &str,
        attachment: Attachment,
    ) -> Result<SessionView> {
        let slot = self.slot(session_id).await?;
        let mut session = slot.lock().await;
        if session.phase.is_terminal() {
            return Err(ForgeError::state("Session is complete"));
        }
        session.attachments.push(attachment);
        Ok(SessionView::from(&*session))
    }

    /// Registers sibling-part context used by subsequent generations.
    pub async fn add_sibling_part(
        &self,
        session_id: &str,
        name: impl Into<String>,
        script: impl Into<String>,
    ) -> Result<SessionView> {
        let slot = self.slot(session_id).await?;
        let mut session = slot.lock().await;
        session.sibling_parts.push(SiblingPart {
            name: name.into(),
            script: script.into(),
        });
        Ok(SessionView::from(&*session))
    }

    /// Cancels any in-flight turn for the session.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let tokens = self.cancel_tokens.read().await;
        match tokens.get(session_id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(ForgeError::not_found("session", session_id)),
        }
    }

    /// The read surface for transport layers.
    pub async fn session_view(&self, session_id: &str) -> Result<SessionView> {
        let slot = self.slot(session_id).await?;
        let session = slot.lock().await;
        Ok(SessionView::from(&*session))
    }

    async fn slot(&self, session_id: &str) -> Result<SessionSlot> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| ForgeError::not_found("session", session_id))
    }

    /// Issues a fresh cancellation token for the next turn, superseding
    /// any earlier one.
    async fn fresh_token(&self, session_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancel_tokens
            .write()
            .await
            .insert(session_id.to_string(), token.clone());
        token
    }

    /// Records the session's current script in the version ledger, when a
    /// ledger and a part link exist. Only the final state of the turn is
    /// recorded; per-attempt history stays on the repair report.
    async fn record_generation(&self, session: &Session) {
        let (Some(versions), Some(part_id), Some(script)) =
            (&self.versions, &session.part_id, &session.current_script)
        else {
            return;
        };

        let bounding_box = session
            .current_geometry
            .as_ref()
            .map(|geometry| geometry.bounding_box);
        let status = if session.validated {
            VersionStatus::Generated
        } else {
            VersionStatus::Draft
        };

        if let Err(err) = versions
            .record(
                part_id,
                script,
                bounding_box,
                status,
                None,
                VersionSource::AiGenerate,
            )
            .await
        {
            warn!(error = %err, "failed to record generated version");
        }
    }
}
