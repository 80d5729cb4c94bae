//! The agent panel: a fixed role pipeline run once per user turn.
//!
//! coordinator -> requirements -> designer -> engineer -> physics ->
//! manufacturing -> validator. Role dispatch is a closed enum match. A role
//! may short-circuit the rest of the turn (a question back to the user);
//! role-level failures become transcript messages, never session aborts.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::repair::RepairLoop;
use crate::validator::Validator;
use partforge_core::config::ForgeConfig;
use partforge_core::geometry::GeometrySummary;
use partforge_core::params;
use partforge_core::requirements::RequirementsUpdate;
use partforge_core::session::{AgentRole, ConversationPhase, Message, Session};
use partforge_core::{ForgeError, Result};
use partforge_interaction::prompts;
use partforge_interaction::{CompletionRequest, GenerationRequest, LanguageModel};

const TRANSCRIPT_TAIL: usize = 12;
const ROLE_MAX_TOKENS: u32 = 1024;

// Pulls the outermost JSON object out of a prose-wrapped reply.
static JSON_OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

/// What a role decided about the rest of the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Hand over to the next role.
    Continue,
    /// Stop the turn and wait for the user.
    AwaitUser,
    /// The session reached its terminal state.
    Complete,
}

/// Structured reply expected from the requirements role.
#[derive(Debug, Deserialize, Default)]
struct RequirementsReply {
    #[serde(default)]
    updates: UpdatesJson,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    question: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UpdatesJson {
    description: Option<String>,
    use_case: Option<String>,
    dimensions: Option<DimensionsJson>,
    dimensions_unspecified: Option<bool>,
    material: Option<String>,
    wall_thickness: Option<f64>,
    expected_load: Option<f64>,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    constraints: Vec<String>,
    style: Option<String>,
    fillet_radius: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DimensionsJson {
    length: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
}

impl UpdatesJson {
    fn into_update(self) -> RequirementsUpdate {
        let dimensions = self.dimensions.unwrap_or_default();
        RequirementsUpdate {
            description: self.description,
            use_case: self.use_case,
            length: dimensions.length,
            width: dimensions.width,
            height: dimensions.height,
            dimensions_unspecified: self.dimensions_unspecified,
            material: self.material,
            wall_thickness: self.wall_thickness,
            expected_load: self.expected_load,
            features: self.features,
            constraints: self.constraints,
            style: self.style,
            fillet_radius: self.fillet_radius,
        }
    }
}

/// Drives the role pipeline over a session.
pub struct AgentOrchestrator {
    model: Arc<dyn LanguageModel>,
    repair: RepairLoop,
    validator: Validator,
    config: ForgeConfig,
}

impl AgentOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        repair: RepairLoop,
        validator: Validator,
        config: ForgeConfig,
    ) -> Self {
        Self {
            model,
            repair,
            validator,
            config,
        }
    }

    /// Runs one full turn of the role pipeline over the session. The
    /// session must not be complete; the conversation service enforces
    /// that before calling in.
    pub async fn run_turn(&self, session: &mut Session) -> Result<ControlSignal> {
        if let ControlSignal::AwaitUser = self.coordinator(session) {
            return Ok(ControlSignal::AwaitUser);
        }

        if let ControlSignal::AwaitUser = self.requirements(session).await? {
            return Ok(ControlSignal::AwaitUser);
        }

        if session.phase == ConversationPhase::Analyzing {
            self.designer(session).await;
            session.phase = ConversationPhase::Designing;
        }

        self.run_generation(session).await
    }

    /// The generation half of the pipeline: engineer, physics,
    /// manufacturing, validator. Entered directly by the `generate_now`
    /// quick action.
    pub async fn run_generation(&self, session: &mut Session) -> Result<ControlSignal> {
        if session.phase == ConversationPhase::Designing {
            if let ControlSignal::AwaitUser = self.engineer(session).await {
                return Ok(ControlSignal::AwaitUser);
            }
        }

        if session.phase == ConversationPhase::Reviewing {
            self.physics(session).await;
            self.manufacturing(session).await;
            if let ControlSignal::AwaitUser = self.validator_role(session).await {
                return Ok(ControlSignal::AwaitUser);
            }
        }

        if session.phase == ConversationPhase::Finalizing {
            session.push_message(Message::agent(
                AgentRole::Coordinator,
                "The design is validated. Review the part and accept it to finish, \
                 or tell me what to change.",
            ));
        }

        Ok(ControlSignal::AwaitUser)
    }

    /// Greets on the first turn; otherwise silent routing.
    fn coordinator(&self, session: &mut Session) -> ControlSignal {
        let agent_spoke = session.messages.iter().any(|m| m.agent_role.is_some());
        if !agent_spoke {
            session.push_message(Message::agent(
                AgentRole::Coordinator,
                "Hi! I'll coordinate the design team for you. Tell me what you want \
                 to build and we'll take it from there.",
            ));
        }
        ControlSignal::Continue
    }

    /// Extracts structured requirements from the latest user message and
    /// decides whether the record is complete enough to design from.
    async fn requirements(&self, session: &mut Session) -> Result<ControlSignal> {
        let prompt = format!(
            "Current requirements record:\n{}\n\nConversation so far:\n{}",
            serde_json::to_string_pretty(&session.requirements)?,
            session.transcript_tail(TRANSCRIPT_TAIL),
        );

        let reply = match self.call_role(AgentRole::Requirements, &prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "requirements role failed");
                session.push_message(Message::agent(
                    AgentRole::Requirements,
                    "I could not process that just now; please rephrase or try again.",
                ));
                return Ok(ControlSignal::AwaitUser);
            }
        };

        let parsed: RequirementsReply = match extract_json(&reply) {
            Some(parsed) => parsed,
            None => {
                warn!("requirements reply carried no parseable JSON");
                session.push_message(Message::agent(AgentRole::Requirements, reply));
                return Ok(ControlSignal::AwaitUser);
            }
        };

        let update = parsed.updates.into_update();

        // A changed dimension invalidates any script built on the old
        // value: discard it and re-enter analysis.
        if update.invalidates(&session.requirements)
            && session.current_script.is_some()
            && session.phase.can_transition_to(ConversationPhase::Analyzing)
        {
            info!(session = %session.id, "requirements change invalidates current script");
            session.phase = ConversationPhase::Analyzing;
            session.current_script = None;
            session.current_geometry = None;
            session.validated = false;
            session.push_message(Message::system(
                "Requirements changed; the previous script was discarded and the \
                 design will be regenerated.",
            ));
        }

        session.requirements.merge(update);

        let ready = parsed.ready && session.requirements.is_ready_for_design();
        if !ready {
            let question = parsed.question.unwrap_or_else(|| {
                "Could you tell me the approximate dimensions and what the part \
                 will be used for?"
                    .to_string()
            });
            session.push_message(Message::question(
                AgentRole::Requirements,
                question,
                Vec::new(),
            ));
            return Ok(ControlSignal::AwaitUser);
        }

        if session.phase == ConversationPhase::Gathering {
            session.phase = ConversationPhase::Analyzing;
        }
        Ok(ControlSignal::Continue)
    }

    /// Advisory pass; failures reduce to a skipped suggestion.
    async fn designer(&self, session: &mut Session) {
        let prompt = format!(
            "Requirements:\n{}\n\nGive your design recommendation for this part.",
            session.requirements.to_design_prompt()
        );
        match self.call_role(AgentRole::Designer, &prompt).await {
            Ok(reply) => {
                session.push_message(Message::agent(AgentRole::Designer, reply));
            }
            Err(err) => {
                warn!(error = %err, "designer role failed");
            }
        }
    }

    /// Runs the repair loop and installs the result on the session.
    async fn engineer(&self, session: &mut Session) -> ControlSignal {
        let mut request = GenerationRequest::new(session.requirements.to_design_prompt())
            .with_attachments(session.attachments.clone())
            .with_sibling_context(
                session
                    .sibling_parts
                    .iter()
                    .map(|part| (part.name.clone(), part.script.clone()))
                    .collect(),
            );
        if let Some(script) = &session.current_script {
            request = request.with_existing_script(script.clone());
        }

        let report = self.repair.run(request).await;
        session.iteration_count = report.attempt_count();

        match report.script.clone() {
            Some(script) if report.success => {
                session.current_geometry = report.bounding_box.map(|bounding_box| {
                    GeometrySummary {
                        bounding_box,
                        parameters: params::extract(&script),
                    }
                });
                let summary = match report.bounding_box {
                    Some(bbox) => format!("Generated a part measuring {bbox}."),
                    None => "Generated the part.".to_string(),
                };
                session.push_message(Message::code(
                    AgentRole::Engineer,
                    summary,
                    script.clone(),
                    report.bounding_box,
                ));
                session.current_script = Some(script);
                session.phase = ConversationPhase::Reviewing;
                ControlSignal::Continue
            }
            _ => {
                let detail = if report.errors.is_empty() {
                    "the model produced no usable script".to_string()
                } else {
                    report.errors.join("; ")
                };
                session.push_message(Message::agent(
                    AgentRole::Engineer,
                    format!(
                        "I could not produce a valid script after {} attempts: {}. \
                         You can adjust the requirements and try again.",
                        report.attempt_count(),
                        detail
                    ),
                ));
                ControlSignal::AwaitUser
            }
        }
    }

    /// Structural commentary on the produced geometry.
    async fn physics(&self, session: &mut Session) {
        let Some(geometry) = &session.current_geometry else {
            return;
        };
        let prompt = format!(
            "Part bounding box: {}.\nRequirements:\n{}\n\nAssess the structural \
             soundness for the stated load and material.",
            geometry.bounding_box,
            session.requirements.to_design_prompt()
        );
        match self.call_role(AgentRole::Physics, &prompt).await {
            Ok(reply) => {
                session.push_message(Message::agent(AgentRole::Physics, reply));
            }
            Err(err) => warn!(error = %err, "physics role failed"),
        }
    }

    /// Printability commentary on the produced geometry.
    async fn manufacturing(&self, session: &mut Session) {
        let Some(geometry) = &session.current_geometry else {
            return;
        };
        let prompt = format!(
            "Part bounding box: {}.\nMaterial: {}.\n\nAssess printability: \
             orientation, supports, and any dimension that will print badly.",
            geometry.bounding_box, session.requirements.material
        );
        match self.call_role(AgentRole::Manufacturing, &prompt).await {
            Ok(reply) => {
                session.push_message(Message::agent(AgentRole::Manufacturing, reply));
            }
            Err(err) => warn!(error = %err, "manufacturing role failed"),
        }
    }

    /// Re-validates the final script. The only role whose failure blocks
    /// the reviewing -> finalizing transition.
    async fn validator_role(&self, session: &mut Session) -> ControlSignal {
        let Some(script) = session.current_script.clone() else {
            return ControlSignal::AwaitUser;
        };

        let outcome = self.validator.validate(&script).await;
        if outcome.valid {
            session.validated = true;
            let mut content = match outcome.bounding_box {
                Some(bbox) => format!("Validation passed. Bounding box: {bbox}."),
                None => "Validation passed.".to_string(),
            };
            if !outcome.warnings.is_empty() {
                content.push_str(&format!("\nWarnings:\n- {}", outcome.warnings.join("\n- ")));
            }
            session.push_message(Message::validation(AgentRole::Validator, content));
            session.phase = ConversationPhase::Finalizing;
            ControlSignal::Continue
        } else {
            session.validated = false;
            session.push_message(Message::validation(
                AgentRole::Validator,
                format!("Validation failed:\n- {}", outcome.errors.join("\n- ")),
            ));
            ControlSignal::AwaitUser
        }
    }

    /// One fast-model call with the role's system prompt.
    async fn call_role(&self, role: AgentRole, prompt: &str) -> Result<String> {
        let request = CompletionRequest::new(prompts::role_system_prompt(role), prompt)
            .with_model(self.config.conversation_model())
            .with_max_tokens(ROLE_MAX_TOKENS);
        self.model
            .complete(request)
            .await
            .map_err(|err| ForgeError::generation(err.to_string()))
    }
}

/// Parses the outermost JSON object out of a prose-wrapped reply.
fn extract_json<T: for<'de> Deserialize<'de>>(reply: &str) -> Option<T> {
    let candidate = JSON_OBJECT_RE.find(reply)?.as_str();
    serde_json::from_str(candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_tolerates_prose() {
        let reply = "Sure, here is what I learned:\n{\"ready\": true, \"updates\": \
                     {\"use_case\": \"pen holder\"}}\nLet me know!";
        let parsed: RequirementsReply = extract_json(reply).unwrap();
        assert!(parsed.ready);
        assert_eq!(parsed.updates.use_case.as_deref(), Some("pen holder"));
    }

    #[test]
    fn test_extract_json_none_on_plain_text() {
        assert!(extract_json::<RequirementsReply>("no structure here").is_none());
    }

    #[test]
    fn test_updates_json_dimension_mapping() {
        let parsed: RequirementsReply = extract_json(
            r#"{"updates": {"dimensions": {"length": 50, "width": 30, "height": 20}}, "ready": false}"#,
        )
        .unwrap();
        let update = parsed.updates.into_update();
        assert_eq!(update.length, Some(50.0));
        assert_eq!(update.height, Some(20.0));
    }
}
