use crate::intake::catalog::{render_prompt, StepCatalog, StepDefinition, COMPLETE};
use crate::intake::state::{FieldDelta, PartialState};
use crate::session::store::{ConversationSession, SessionUpdate};

/// Result of one user message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The session as it looks after this turn.
    pub session: ConversationSession,
    /// What a session store needs to persist the turn.
    pub update: SessionUpdate,
    pub assistant_prompt: String,
    pub is_complete: bool,
    /// Step now awaiting an answer, or [`COMPLETE`].
    pub next_step: &'static str,
    pub extracted: FieldDelta,
    /// The message did not answer the step it was aimed at.
    pub unparsed: bool,
}

/// Drives any [`StepCatalog`] one message at a time.
#[derive(Clone, Debug)]
pub struct IntakeMachine<C> {
    catalog: C,
}

impl<C: StepCatalog> IntakeMachine<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Prompt shown before the first message of a conversation.
    pub fn opening_prompt(&self, state: &PartialState) -> String {
        let graph = self.catalog.graph();
        match graph.step(graph.settle(graph.entry(), state)) {
            Some(step) => render_prompt(step.prompt, state),
            None => self.catalog.completion_message(state),
        }
    }

    pub fn advance(&self, session: &ConversationSession, message: &str) -> TurnOutcome {
        let graph = self.catalog.graph();
        let state = &session.partial_state;
        let current_id = graph.resume_point(session.step_pointer.as_deref(), state);

        let mut extracted = self.catalog.extract_slots(message, state);
        let Some(step) = graph.step(current_id) else {
            let merged = state.merged(&extracted);
            return self.finish(session, extracted, None, &merged, false);
        };

        if message.trim().is_empty() {
            let prompt = render_prompt(step.prompt, state);
            return self.stay(session, FieldDelta::default(), step, prompt, false);
        }

        let after_slots = state.merged(&extracted);
        if !step.is_answered(&after_slots) && !step.is_skipped(&after_slots) {
            extracted.absorb(self.catalog.parse_step(step, message, &after_slots));
        }
        let merged = state.merged(&extracted);

        if self.catalog.finalize_requested(message, &merged) {
            return self.finish(session, extracted, Some(step.id), &merged, false);
        }

        let satisfied = step.is_answered(&merged) || step.is_skipped(&merged);
        if !satisfied && !step.expected.is_compound() {
            let prompt = format!("{} {}", step.hint, render_prompt(step.prompt, &merged));
            return self.stay(session, extracted, step, prompt.trim().to_owned(), true);
        }

        let unparsed = !satisfied;
        match graph.resolve_next(step, &merged) {
            COMPLETE => self.finish(session, extracted, Some(step.id), &merged, unparsed),
            next_id => {
                let prompt = match graph.step(next_id) {
                    Some(next) if unparsed => {
                        format!("{} {}", step.hint, render_prompt(next.prompt, &merged))
                    }
                    Some(next) => render_prompt(next.prompt, &merged),
                    None => self.catalog.completion_message(&merged),
                };
                let update = SessionUpdate {
                    delta: extracted.clone(),
                    step_pointer: Some(next_id.to_owned()),
                    ..SessionUpdate::default()
                };
                TurnOutcome {
                    session: applied(session, &update),
                    update,
                    assistant_prompt: prompt,
                    is_complete: false,
                    next_step: next_id,
                    extracted,
                    unparsed,
                }
            }
        }
    }

    fn stay(
        &self,
        session: &ConversationSession,
        extracted: FieldDelta,
        step: &StepDefinition,
        prompt: String,
        unparsed: bool,
    ) -> TurnOutcome {
        let update = SessionUpdate {
            delta: extracted.clone(),
            step_pointer: Some(step.id.to_owned()),
            ..SessionUpdate::default()
        };
        TurnOutcome {
            session: applied(session, &update),
            update,
            assistant_prompt: prompt,
            is_complete: false,
            next_step: step.id,
            extracted,
            unparsed,
        }
    }

    /// The pointer stays on the last answered step.
    fn finish(
        &self,
        session: &ConversationSession,
        extracted: FieldDelta,
        pointer: Option<&'static str>,
        merged: &PartialState,
        unparsed: bool,
    ) -> TurnOutcome {
        let update = SessionUpdate {
            delta: extracted.clone(),
            step_pointer: pointer.map(str::to_owned),
            ..SessionUpdate::default()
        };
        TurnOutcome {
            session: applied(session, &update),
            update,
            assistant_prompt: self.catalog.completion_message(merged),
            is_complete: true,
            next_step: COMPLETE,
            extracted,
            unparsed,
        }
    }
}

fn applied(session: &ConversationSession, update: &SessionUpdate) -> ConversationSession {
    let mut next = session.clone();
    next.apply(update.clone(), session.last_activity_at);
    next
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::IntakeMachine;
    use crate::domain::company::CompanyId;
    use crate::intake::catalog::COMPLETE;
    use crate::intake::quote_chat::QuoteChatCatalog;
    use crate::intake::setup::{SetupCatalog, SetupOutcome};
    use crate::intake::state::FieldValue;
    use crate::session::store::{ConversationSession, FlowKind};

    fn session(flow: FlowKind) -> ConversationSession {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid time");
        ConversationSession::new("s-1", CompanyId(7), flow, now)
    }

    fn quote_machine() -> IntakeMachine<QuoteChatCatalog> {
        IntakeMachine::new(QuoteChatCatalog::new().expect("quote chat catalog"))
    }

    #[test]
    fn noisy_first_message_fills_name_and_scope_then_asks_for_walls() {
        let machine = quote_machine();
        let outcome = machine.advance(&session(FlowKind::QuoteChat), "123, walls only, John Smith");

        let state = &outcome.session.partial_state;
        assert_eq!(state.text("customer.name"), Some("John Smith"));
        assert_eq!(state.list("project.surfaces"), Some(&["walls".to_owned()][..]));
        assert!(!state.is_filled("measurements.walls_sqft"));
        assert_eq!(outcome.next_step, "walls_sqft");
        assert_eq!(outcome.assistant_prompt, "How many square feet of walls?");
        assert!(!outcome.is_complete);
    }

    #[test]
    fn unparseable_number_reprompts_same_step_with_hint() {
        let machine = quote_machine();
        let first = machine.advance(&session(FlowKind::QuoteChat), "John Smith, walls only");
        let second = machine.advance(&first.session, "not sure yet");

        assert!(second.unparsed);
        assert_eq!(second.next_step, "walls_sqft");
        assert_eq!(second.session.step_pointer.as_deref(), Some("walls_sqft"));
        assert!(second.assistant_prompt.starts_with("I need a number of square feet"));
        assert!(second.assistant_prompt.ends_with("How many square feet of walls?"));
        assert!(second.extracted.is_empty());
    }

    #[test]
    fn quote_chat_walks_to_completion() {
        let machine = quote_machine();
        let mut current = session(FlowKind::QuoteChat);
        let script = [
            ("maria lopez", "surfaces"),
            ("walls and ceilings", "walls_sqft"),
            ("1,200", "ceilings_sqft"),
            ("300 sq ft", "project_type"),
            ("inside", "paint_tier"),
        ];
        for (message, expected_next) in script {
            let outcome = machine.advance(&current, message);
            assert_eq!(outcome.next_step, expected_next, "after {message:?}");
            current = outcome.session;
        }

        let done = machine.advance(&current, "best");
        assert!(done.is_complete);
        assert_eq!(done.next_step, COMPLETE);
        assert_eq!(done.session.step_pointer.as_deref(), Some("paint_tier"));
        let state = &done.session.partial_state;
        assert_eq!(state.number("measurements.walls_sqft"), Some(Decimal::new(1200, 0)));
        assert_eq!(state.number("measurements.ceilings_sqft"), Some(Decimal::new(300, 0)));
        assert!(!state.is_filled("measurements.trim_sqft"));
        assert_eq!(state.text("products.tier"), Some("best"));
        assert!(done.assistant_prompt.contains("maria lopez"));
    }

    #[test]
    fn finalize_keyword_completes_once_minimum_is_known() {
        let machine = quote_machine();
        let first = machine.advance(&session(FlowKind::QuoteChat), "John Smith, walls 400 sq ft");
        assert!(!first.is_complete);

        let done = machine.advance(&first.session, "that's everything, generate the quote");
        assert!(done.is_complete);
        assert_eq!(done.next_step, COMPLETE);
    }

    #[test]
    fn one_message_can_answer_several_steps() {
        let machine = quote_machine();
        let outcome = machine.advance(
            &session(FlowKind::QuoteChat),
            "Dana Reyes, walls 800 sq ft, interior, premium paint",
        );
        assert_eq!(outcome.session.partial_state.text("project.type"), Some("interior"));
        assert_eq!(outcome.session.partial_state.text("products.tier"), Some("premium"));
        // Surfaces were never named, so the scope question comes next.
        assert_eq!(outcome.next_step, "surfaces");
    }

    #[test]
    fn setup_flow_walks_to_completion_and_converts() {
        let machine = IntakeMachine::new(SetupCatalog::new().expect("setup catalog"));
        let mut current = session(FlowKind::Setup);
        assert!(machine.opening_prompt(&current.partial_state).contains("company name"));

        let script = [
            ("Brightline Painting", "preferred_brand"),
            ("Sherwin-Williams", "project_focus"),
            ("interiors mostly", "walls_rate"),
            ("$3.00", "ceilings_rate"),
            ("2.50", "trim_rate"),
            ("$5", "markup"),
            ("45%", "tax_rate"),
            ("8.25", "tax_basis"),
            ("materials only", "primer_product"),
            ("ProBlock, $35, 300", "wall_product"),
            ("Duration Home, $65.99, 350", "ceiling_product"),
            ("Eminence, $52, 400", "trim_product"),
        ];
        for (message, expected_next) in script {
            let outcome = machine.advance(&current, message);
            assert_eq!(outcome.next_step, expected_next, "after {message:?}");
            current = outcome.session;
        }

        let done = machine.advance(&current, "Emerald Urethane, $78, 375");
        assert!(done.is_complete);
        assert!(done.assistant_prompt.contains("Brightline Painting"));

        let outcome = SetupOutcome::from_state(CompanyId(7), &done.session.partial_state);
        assert_eq!(outcome.products.len(), 4);
        assert_eq!(outcome.company_defaults.markup_percentage, Decimal::new(45, 0));
        assert!(outcome.company_defaults.tax_on_materials_only);
    }

    #[test]
    fn short_compound_answer_still_moves_forward() {
        let machine = IntakeMachine::new(SetupCatalog::new().expect("setup catalog"));
        let mut current = session(FlowKind::Setup);
        current.step_pointer = Some("primer_product".to_owned());

        let outcome = machine.advance(&current, "ProBlock, $35");
        assert!(outcome.unparsed);
        assert_eq!(outcome.next_step, "wall_product");
        assert!(!outcome.session.partial_state.is_filled("products.primer.name"));
        assert!(outcome.assistant_prompt.starts_with("I need all three parts"));
    }

    #[test]
    fn retired_pointer_resumes_within_its_section() {
        let machine = IntakeMachine::new(SetupCatalog::new().expect("setup catalog"));
        let mut current = session(FlowKind::Setup);
        current.step_pointer = Some("products.legacy_sheen".to_owned());

        let outcome = machine.advance(&current, "ProBlock, $35, 300");
        assert_eq!(
            outcome.session.partial_state.get("products.primer.spread_rate"),
            Some(&FieldValue::Number(Decimal::new(300, 0)))
        );
        assert_eq!(outcome.next_step, "wall_product");
    }

    #[test]
    fn blank_message_repeats_the_question() {
        let machine = quote_machine();
        let outcome = machine.advance(&session(FlowKind::QuoteChat), "   ");
        assert_eq!(outcome.next_step, "customer_name");
        assert!(!outcome.unparsed);
        assert!(outcome.extracted.is_empty());
    }
}
