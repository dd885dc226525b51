use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use paintquote_core::config::LlmConfig;
use paintquote_core::intake::catalog::CatalogError;
use paintquote_core::intake::state::{FieldDelta, PartialState};
use paintquote_core::intake::{IntakeMachine, QuoteChatCatalog, SetupCatalog, TurnOutcome};
use paintquote_core::session::{ConversationSession, FlowKind, SessionUpdate};

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{HttpLlmClient, LlmClient};

const PHRASING_SYSTEM_PROMPT: &str = "You rephrase the next question of a painting contractor's \
quoting assistant so it sounds warm and natural. Keep it to one or two short sentences. Keep every \
question. Never state prices, costs, or numbers the original does not contain. Reply with the \
rephrased text only.";

/// One processed turn, whichever provider produced the wording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderReply {
    pub response: String,
    pub session: ConversationSession,
    pub update: SessionUpdate,
    pub next_step: &'static str,
    pub is_complete: bool,
    pub extracted: FieldDelta,
}

impl From<TurnOutcome> for ProviderReply {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            response: outcome.assistant_prompt,
            session: outcome.session,
            update: outcome.update,
            next_step: outcome.next_step,
            is_complete: outcome.is_complete,
            extracted: outcome.extracted,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("step catalog is invalid: {0}")]
    Catalog(#[from] CatalogError),
    #[error("llm client could not be built: {0}")]
    Client(String),
}

#[async_trait]
pub trait ConversationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prompt for a conversation that has not received a message yet.
    fn opening_prompt(&self, flow: FlowKind, state: &PartialState) -> String;

    async fn process_message(&self, message: &str, session: &ConversationSession)
        -> ProviderReply;
}

/// Catalog wording, no model involved.
#[derive(Clone, Debug)]
pub struct DeterministicProvider {
    quote_chat: IntakeMachine<QuoteChatCatalog>,
    setup: IntakeMachine<SetupCatalog>,
}

impl DeterministicProvider {
    pub fn new() -> Result<Self, CatalogError> {
        Ok(Self {
            quote_chat: IntakeMachine::new(QuoteChatCatalog::new()?),
            setup: IntakeMachine::new(SetupCatalog::new()?),
        })
    }

    pub fn advance(&self, message: &str, session: &ConversationSession) -> TurnOutcome {
        match session.flow {
            FlowKind::QuoteChat => self.quote_chat.advance(session, message),
            FlowKind::Setup => self.setup.advance(session, message),
        }
    }
}

#[async_trait]
impl ConversationProvider for DeterministicProvider {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    fn opening_prompt(&self, flow: FlowKind, state: &PartialState) -> String {
        match flow {
            FlowKind::QuoteChat => self.quote_chat.opening_prompt(state),
            FlowKind::Setup => self.setup.opening_prompt(state),
        }
    }

    async fn process_message(
        &self,
        message: &str,
        session: &ConversationSession,
    ) -> ProviderReply {
        self.advance(message, session).into()
    }
}

/// Deterministic turn handling with model-rephrased prompts.
///
/// The model only rewords the prompt; state transitions never depend on it.
/// A failed call or a rewrite the guardrail rejects falls back to the
/// catalog wording.
pub struct LlmPhrasedProvider {
    inner: DeterministicProvider,
    client: Arc<dyn LlmClient>,
    guardrail: GuardrailPolicy,
}

impl LlmPhrasedProvider {
    pub fn new(inner: DeterministicProvider, client: Arc<dyn LlmClient>) -> Self {
        Self { inner, client, guardrail: GuardrailPolicy::default() }
    }

    pub fn with_guardrail(mut self, guardrail: GuardrailPolicy) -> Self {
        self.guardrail = guardrail;
        self
    }

    async fn rephrase(&self, message: &str, session: &ConversationSession, original: String) -> String {
        let prompt = format!(
            "Customer said: \"{}\"\nQuestion to rephrase: \"{original}\"",
            message.trim()
        );
        let rewrite = match self.client.complete(PHRASING_SYSTEM_PROMPT, &prompt).await {
            Ok(rewrite) => rewrite,
            Err(error) => {
                warn!(
                    event_name = "intake.phrasing.failed",
                    session_id = %session.session_id,
                    error = %error,
                    "llm phrasing failed; using catalog prompt"
                );
                return original;
            }
        };

        match self.guardrail.evaluate(&original, &rewrite) {
            GuardrailDecision::Allow => {
                debug!(event_name = "intake.phrasing.applied", session_id = %session.session_id);
                rewrite.trim().to_owned()
            }
            GuardrailDecision::Deny { reason_code, fallback_path } => {
                warn!(
                    event_name = "intake.phrasing.rejected",
                    session_id = %session.session_id,
                    reason_code,
                    fallback_path,
                    "llm rewrite rejected by guardrail"
                );
                original
            }
        }
    }
}

#[async_trait]
impl ConversationProvider for LlmPhrasedProvider {
    fn name(&self) -> &'static str {
        "llm_phrased"
    }

    fn opening_prompt(&self, flow: FlowKind, state: &PartialState) -> String {
        self.inner.opening_prompt(flow, state)
    }

    async fn process_message(
        &self,
        message: &str,
        session: &ConversationSession,
    ) -> ProviderReply {
        let mut reply: ProviderReply = self.inner.advance(message, session).into();
        if !reply.is_complete {
            let original = std::mem::take(&mut reply.response);
            reply.response = self.rephrase(message, session, original).await;
        }
        reply
    }
}

/// Deterministic when the model provider is disabled, model-phrased otherwise.
pub fn select_provider(config: &LlmConfig) -> Result<Arc<dyn ConversationProvider>, ProviderError> {
    let inner = DeterministicProvider::new()?;
    match HttpLlmClient::from_config(config).map_err(|e| ProviderError::Client(e.to_string()))? {
        Some(client) => Ok(Arc::new(LlmPhrasedProvider::new(inner, Arc::new(client)))),
        None => Ok(Arc::new(inner)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use paintquote_core::config::{LlmConfig, LlmProvider};
    use paintquote_core::domain::company::CompanyId;
    use paintquote_core::session::{ConversationSession, FlowKind};

    use super::{
        select_provider, ConversationProvider, DeterministicProvider, LlmPhrasedProvider,
    };
    use crate::llm::LlmClient;

    struct ScriptedClient {
        reply: Option<String>,
        calls: Mutex<u32>,
    }

    impl ScriptedClient {
        fn new(reply: Option<&str>) -> Self {
            Self { reply: reply.map(str::to_owned), calls: Mutex::new(0) }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            *self.calls.lock().expect("calls lock") += 1;
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => bail!("connection refused"),
            }
        }
    }

    fn session(flow: FlowKind) -> ConversationSession {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid time");
        ConversationSession::new("sess-1", CompanyId(1), flow, now)
    }

    #[tokio::test]
    async fn deterministic_provider_dispatches_on_flow() {
        let provider = DeterministicProvider::new().expect("catalogs");

        let quote = provider.process_message("John Smith", &session(FlowKind::QuoteChat)).await;
        assert_eq!(quote.next_step, "surfaces");
        assert!(quote.extracted.contains("customer.name"));

        let setup =
            provider.process_message("Brightline Painting", &session(FlowKind::Setup)).await;
        assert!(setup.extracted.contains("company.name"));
        assert!(!setup.is_complete);
    }

    #[tokio::test]
    async fn allowed_rewrite_replaces_the_prompt() {
        let client = Arc::new(ScriptedClient::new(Some(
            "Thanks! Which surfaces are we painting: walls, ceilings, trim?",
        )));
        let provider =
            LlmPhrasedProvider::new(DeterministicProvider::new().expect("catalogs"), client.clone());

        let reply = provider.process_message("John Smith", &session(FlowKind::QuoteChat)).await;

        assert!(reply.response.starts_with("Thanks!"));
        assert_eq!(reply.next_step, "surfaces");
        assert_eq!(*client.calls.lock().expect("calls lock"), 1);
    }

    #[tokio::test]
    async fn rejected_or_failed_rewrite_falls_back_to_catalog_wording() {
        let deterministic = DeterministicProvider::new().expect("catalogs");
        let expected =
            deterministic.process_message("John Smith", &session(FlowKind::QuoteChat)).await;

        let pricey = LlmPhrasedProvider::new(
            deterministic.clone(),
            Arc::new(ScriptedClient::new(Some("Walls are $3 a foot. Which surfaces?"))),
        );
        let offline =
            LlmPhrasedProvider::new(deterministic, Arc::new(ScriptedClient::new(None)));

        let session = session(FlowKind::QuoteChat);
        assert_eq!(pricey.process_message("John Smith", &session).await, expected);
        assert_eq!(offline.process_message("John Smith", &session).await, expected);
    }

    #[test]
    fn disabled_llm_selects_deterministic_provider() {
        let config = LlmConfig {
            provider: LlmProvider::Disabled,
            api_key: None,
            base_url: None,
            model: "none".to_owned(),
            timeout_secs: 5,
            max_retries: 0,
        };
        let provider = select_provider(&config).expect("provider");
        assert_eq!(provider.name(), "deterministic");
    }
}
