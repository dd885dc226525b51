use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use paintquote_core::assembler::{
    AssemblyContext, AssemblyError, AssemblyOutcome, DirectQuoteRequest, QuoteAssembler,
};
use paintquote_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, NoopAuditSink};
use paintquote_core::domain::company::{CompanyDefaults, CompanyId, PaintProduct};
use paintquote_core::domain::quote::{Quote, QuoteId};
use paintquote_core::errors::{ApplicationError, FieldIssue};
use paintquote_core::intake::SetupOutcome;
use paintquote_core::session::{
    Clock, ConversationSession, FlowKind, RateQuota, SessionError, SessionLookup, SessionOrigin,
    SessionStore, SystemClock, TurnRateLimiter,
};
use paintquote_db::repositories::{CompanyRepository, QuoteRepository, RepositoryError};

use crate::provider::{ConversationProvider, ProviderReply};

pub const MAX_MESSAGE_CHARS: usize = 2_000;
const ACTOR: &str = "intake-runtime";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
    pub company_id: CompanyId,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub is_complete: bool,
    pub partial_quote: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_quote: Option<Quote>,
    pub remaining_turns: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupReply {
    pub response: String,
    pub is_complete: bool,
    pub partial_setup: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_preferences: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_products: Option<Vec<PaintProduct>>,
    pub remaining_turns: u32,
}

/// Handles one request per turn: rate limit, session load, provider call,
/// session write and, once a conversation completes, persistence.
pub struct IntakeRuntime {
    provider: Arc<dyn ConversationProvider>,
    sessions: Arc<dyn SessionStore>,
    companies: Arc<dyn CompanyRepository>,
    quotes: Arc<dyn QuoteRepository>,
    limiter: TurnRateLimiter,
    assembler: QuoteAssembler,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl IntakeRuntime {
    pub fn new(
        provider: Arc<dyn ConversationProvider>,
        sessions: Arc<dyn SessionStore>,
        companies: Arc<dyn CompanyRepository>,
        quotes: Arc<dyn QuoteRepository>,
    ) -> Self {
        Self {
            provider,
            sessions,
            companies,
            quotes,
            limiter: TurnRateLimiter::default(),
            assembler: QuoteAssembler::default(),
            audit: Arc::new(NoopAuditSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_limiter(mut self, limiter: TurnRateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_assembler(mut self, assembler: QuoteAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn handle_chat(
        &self,
        request: ChatRequest,
        correlation_id: &str,
    ) -> Result<ChatReply, ApplicationError> {
        let (quota, lookup, context) =
            self.open_turn(&request, FlowKind::QuoteChat, correlation_id).await?;
        if let Some(response) = self.opening(&request, &lookup, FlowKind::QuoteChat) {
            return Ok(ChatReply {
                response,
                is_complete: false,
                partial_quote: lookup.session.partial_state.to_json(),
                saved_quote: None,
                remaining_turns: quota.remaining,
            });
        }

        let mut reply = self.provider.process_message(&request.message, &lookup.session).await;
        if lookup.session.company_defaults.is_none() {
            reply.update.company_defaults = Some(self.defaults_for(request.company_id).await?);
        }

        let mut assembled = None;
        if reply.is_complete {
            let state = lookup.session.partial_state.merged(&reply.update.delta);
            let defaults = match reply
                .update
                .company_defaults
                .clone()
                .or_else(|| lookup.session.company_defaults.clone())
            {
                Some(defaults) => defaults,
                None => self.defaults_for(request.company_id).await?,
            };
            let assembly = AssemblyContext::chat(request.company_id, self.clock.now());
            match self.assembler.assemble(&state, &defaults, &assembly) {
                Ok(AssemblyOutcome::Assembled(quote)) => assembled = Some(*quote),
                Ok(AssemblyOutcome::MissingFields(missing)) => {
                    warn!(
                        event_name = "intake.quote.incomplete",
                        correlation_id,
                        session_id = %request.session_id,
                        missing = %missing.join(","),
                        "conversation completed without the fields pricing needs"
                    );
                    self.audit.emit(
                        context
                            .event("quote.assembly_deferred", AuditCategory::Assembly, AuditOutcome::Rejected)
                            .with_metadata("missing", missing.join(",")),
                    );
                    reply.response = missing_prompt(&missing);
                    reply.is_complete = false;
                }
                Err(AssemblyError::InvalidMeasurements(issues)) => {
                    let rejected: Vec<&RejectedMeasurement> = issues
                        .iter()
                        .filter_map(|issue| rejected_measurement(&issue.field))
                        .collect();
                    let fields: Vec<&str> = issues.iter().map(|issue| issue.field.as_str()).collect();
                    warn!(
                        event_name = "intake.quote.measurements_rejected",
                        correlation_id,
                        session_id = %request.session_id,
                        fields = %fields.join(","),
                        "collected measurements failed validation; asking again"
                    );
                    self.audit.emit(
                        context
                            .event("quote.assembly_deferred", AuditCategory::Assembly, AuditOutcome::Rejected)
                            .with_metadata("invalid", fields.join(",")),
                    );
                    reply.update.retracted =
                        rejected.iter().map(|measurement| measurement.path.to_owned()).collect();
                    if let Some(first) = rejected.first() {
                        reply.update.step_pointer = Some(first.step.to_owned());
                    }
                    reply.response = invalid_measurements_prompt(&issues, rejected.first().copied());
                    reply.is_complete = false;
                }
                Err(error @ AssemblyError::Pricing(_)) => return Err(error.into()),
            }
        }
        let session = self.record_turn(&request, &reply, correlation_id)?;

        let mut saved_quote = None;
        if let Some(quote) = assembled {
            self.quotes.save(quote.clone()).await.map_err(persistence)?;
            self.close_session(request.company_id, &request.session_id);

            let context = context.clone().with_quote(quote.id().clone());
            info!(
                event_name = "intake.quote.saved",
                correlation_id,
                session_id = %request.session_id,
                company_id = %request.company_id,
                quote_id = %quote.id().0,
                final_price = %quote.pricing.final_price,
                "conversation produced a saved quote"
            );
            self.audit.emit(context.event(
                "quote.assembled",
                AuditCategory::Assembly,
                AuditOutcome::Success,
            ));
            saved_quote = Some(quote);
        }

        Ok(ChatReply {
            response: reply.response,
            is_complete: reply.is_complete,
            partial_quote: session.partial_state.to_json(),
            saved_quote,
            remaining_turns: quota.remaining,
        })
    }

    pub async fn handle_setup(
        &self,
        request: ChatRequest,
        correlation_id: &str,
    ) -> Result<SetupReply, ApplicationError> {
        let (quota, lookup, context) =
            self.open_turn(&request, FlowKind::Setup, correlation_id).await?;
        if let Some(response) = self.opening(&request, &lookup, FlowKind::Setup) {
            return Ok(SetupReply {
                response,
                is_complete: false,
                partial_setup: lookup.session.partial_state.to_json(),
                saved_preferences: None,
                saved_products: None,
                remaining_turns: quota.remaining,
            });
        }

        let reply = self.provider.process_message(&request.message, &lookup.session).await;
        let session = self.record_turn(&request, &reply, correlation_id)?;

        let mut saved_preferences = None;
        let mut saved_products = None;
        if reply.is_complete {
            let outcome = SetupOutcome::from_state(request.company_id, &session.partial_state);
            self.companies.save_setup(&outcome).await.map_err(persistence)?;
            self.close_session(request.company_id, &request.session_id);

            info!(
                event_name = "intake.setup.saved",
                correlation_id,
                session_id = %request.session_id,
                company_id = %request.company_id,
                products = outcome.products.len(),
                "setup conversation saved company defaults"
            );
            self.audit.emit(
                context
                    .event("setup.saved", AuditCategory::Persistence, AuditOutcome::Success)
                    .with_metadata("products", outcome.products.len().to_string()),
            );
            saved_preferences = Some(outcome.preferences);
            saved_products = Some(outcome.products);
        }

        Ok(SetupReply {
            response: reply.response,
            is_complete: reply.is_complete,
            partial_setup: session.partial_state.to_json(),
            saved_preferences,
            saved_products,
            remaining_turns: quota.remaining,
        })
    }

    /// Prices and saves a quote from the quick-quote form.
    pub async fn create_quote(
        &self,
        request: DirectQuoteRequest,
        correlation_id: &str,
    ) -> Result<Quote, ApplicationError> {
        let company_id = request.company_id;
        self.require_company(company_id).await?;
        let defaults = self.defaults_for(company_id).await?;

        let quote = self.assembler.assemble_direct(
            request,
            &defaults,
            &AssemblyContext::quick(company_id, self.clock.now()),
        )?;
        self.quotes.save(quote.clone()).await.map_err(persistence)?;

        info!(
            event_name = "quote.direct.saved",
            correlation_id,
            company_id = %company_id,
            quote_id = %quote.id().0,
            final_price = %quote.pricing.final_price,
            "direct quote saved"
        );
        self.audit.emit(
            AuditContext::new(correlation_id, ACTOR)
                .with_company(company_id)
                .with_quote(quote.id().clone())
                .event("quote.assembled", AuditCategory::Assembly, AuditOutcome::Success),
        );
        Ok(quote)
    }

    pub async fn get_quote(&self, quote_id: &str) -> Result<Quote, ApplicationError> {
        self.quotes
            .find_by_id(&QuoteId(quote_id.to_owned()))
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound(format!("quote `{quote_id}`")))
    }

    pub async fn list_quotes(
        &self,
        company_id: CompanyId,
        limit: u32,
    ) -> Result<Vec<Quote>, ApplicationError> {
        self.require_company(company_id).await?;
        self.quotes.list_for_company(company_id, limit).await.map_err(persistence)
    }

    /// Drops the conversation only; the turn quota keeps counting so a client
    /// cannot reset it by clearing.
    pub fn clear_session(&self, session_id: &str, correlation_id: &str) -> bool {
        let removed = self.sessions.clear(session_id);
        info!(
            event_name = "intake.session.cleared",
            correlation_id,
            session_id,
            removed,
            "session cleared on request"
        );
        removed
    }

    async fn open_turn(
        &self,
        request: &ChatRequest,
        flow: FlowKind,
        correlation_id: &str,
    ) -> Result<(RateQuota, SessionLookup, AuditContext), ApplicationError> {
        validate(request)?;

        let quota =
            self.limiter.check(request.company_id, &request.session_id).map_err(|exceeded| {
                warn!(
                    event_name = "intake.turn.rate_limited",
                    correlation_id,
                    session_id = %request.session_id,
                    company_id = %request.company_id,
                    retry_after_secs = exceeded.retry_after_secs,
                    "turn rejected by rate limiter"
                );
                ApplicationError::RateLimited {
                    retry_after_secs: exceeded.retry_after_secs,
                    limit: exceeded.limit,
                }
            })?;

        self.require_company(request.company_id).await?;
        let lookup = self
            .sessions
            .get(&request.session_id, request.company_id, flow)
            .map_err(session_error)?;

        let context = AuditContext::new(correlation_id, ACTOR)
            .with_company(request.company_id)
            .with_session(request.session_id.clone());
        match lookup.origin {
            SessionOrigin::Restarted => {
                info!(
                    event_name = "intake.session.restarted",
                    correlation_id,
                    session_id = %request.session_id,
                    company_id = %request.company_id,
                    flow = flow.as_str(),
                    "idle or cross-flow session restarted"
                );
                self.audit.emit(context.event(
                    "session.restarted",
                    AuditCategory::Session,
                    AuditOutcome::Success,
                ));
            }
            SessionOrigin::Created => self.audit.emit(context.event(
                "session.created",
                AuditCategory::Session,
                AuditOutcome::Success,
            )),
            SessionOrigin::Resumed => {}
        }

        Ok((quota, lookup, context))
    }

    /// A blank message on a conversation that has not started yet gets the
    /// greeting and leaves the session untouched.
    fn opening(
        &self,
        request: &ChatRequest,
        lookup: &SessionLookup,
        flow: FlowKind,
    ) -> Option<String> {
        let fresh = lookup.session.step_pointer.is_none() && lookup.session.turn_count == 0;
        (fresh && request.message.trim().is_empty())
            .then(|| self.provider.opening_prompt(flow, &lookup.session.partial_state))
    }

    fn record_turn(
        &self,
        request: &ChatRequest,
        reply: &ProviderReply,
        correlation_id: &str,
    ) -> Result<ConversationSession, ApplicationError> {
        let session =
            self.sessions.put(&request.session_id, reply.update.clone()).map_err(session_error)?;
        info!(
            event_name = "intake.turn.processed",
            correlation_id,
            session_id = %request.session_id,
            company_id = %request.company_id,
            flow = session.flow.as_str(),
            next_step = reply.next_step,
            extracted = reply.extracted.len(),
            is_complete = reply.is_complete,
            turn = session.turn_count,
            "intake turn processed"
        );
        Ok(session)
    }

    fn close_session(&self, company_id: CompanyId, session_id: &str) -> bool {
        self.limiter.forget(company_id, session_id);
        self.sessions.clear(session_id)
    }

    async fn require_company(&self, company_id: CompanyId) -> Result<(), ApplicationError> {
        match self.companies.find_company(company_id).await.map_err(persistence)? {
            Some(_) => Ok(()),
            None => Err(ApplicationError::NotFound(format!("company {company_id}"))),
        }
    }

    async fn defaults_for(&self, company_id: CompanyId) -> Result<CompanyDefaults, ApplicationError> {
        Ok(self
            .companies
            .load_defaults(company_id)
            .await
            .map_err(persistence)?
            .unwrap_or_else(|| CompanyDefaults::unconfigured(company_id)))
    }
}

fn validate(request: &ChatRequest) -> Result<(), ApplicationError> {
    let mut details = Vec::new();
    if request.session_id.trim().is_empty() {
        details.push(FieldIssue::new("sessionId", "must not be empty"));
    }
    if request.message.chars().count() > MAX_MESSAGE_CHARS {
        details.push(FieldIssue::new(
            "message",
            format!("must be at most {MAX_MESSAGE_CHARS} characters"),
        ));
    }
    if details.is_empty() {
        Ok(())
    } else {
        Err(ApplicationError::InvalidInput { message: "chat request is invalid".to_owned(), details })
    }
}

fn missing_prompt(missing: &[String]) -> String {
    let needed: Vec<&str> = missing
        .iter()
        .map(|path| match path.as_str() {
            "customer.name" => "the customer's name",
            "measurements" => "the square footage of at least one surface",
            other => other,
        })
        .collect();
    format!("Before I can price this I still need {}.", needed.join(" and "))
}

/// A conversation answer the validator refused, with the step that asks for it.
struct RejectedMeasurement {
    path: &'static str,
    step: &'static str,
    label: &'static str,
}

static REJECTABLE: [(&str, RejectedMeasurement); 3] = [
    (
        "totalWallsSqft",
        RejectedMeasurement { path: "measurements.walls_sqft", step: "walls_sqft", label: "walls" },
    ),
    (
        "totalCeilingsSqft",
        RejectedMeasurement {
            path: "measurements.ceilings_sqft",
            step: "ceilings_sqft",
            label: "ceilings",
        },
    ),
    (
        "totalTrimSqft",
        RejectedMeasurement { path: "measurements.trim_sqft", step: "trim_sqft", label: "trim" },
    ),
];

fn rejected_measurement(field: &str) -> Option<&'static RejectedMeasurement> {
    REJECTABLE.iter().find(|(name, _)| *name == field).map(|(_, measurement)| measurement)
}

fn invalid_measurements_prompt(
    issues: &[FieldIssue],
    ask_again: Option<&RejectedMeasurement>,
) -> String {
    let problems: Vec<String> = issues
        .iter()
        .map(|issue| match rejected_measurement(&issue.field) {
            Some(measurement) => format!("{} area {}", measurement.label, issue.message),
            None => format!("{} {}", issue.field, issue.message),
        })
        .collect();
    let mut prompt = format!("I can't price that yet: {}.", problems.join("; "));
    if let Some(measurement) = ask_again {
        prompt.push_str(&format!(" What is the {} area in square feet?", measurement.label));
    }
    prompt
}

fn persistence(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::UnknownCompany(company_id) => {
            ApplicationError::NotFound(format!("company {company_id}"))
        }
        other => ApplicationError::Persistence(other.to_string()),
    }
}

fn session_error(error: SessionError) -> ApplicationError {
    match error {
        // Reported like an unknown session so ids from another company look absent.
        SessionError::CompanyMismatch { session_id, .. } | SessionError::NotFound(session_id) => {
            ApplicationError::NotFound(format!("session `{session_id}`"))
        }
    }
}
