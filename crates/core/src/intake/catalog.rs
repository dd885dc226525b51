use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::intake::parse::{extract_number, match_choice, match_choices, ChoiceOption, CompoundSchema};
use crate::intake::state::{FieldDelta, FieldValue, PartialState};

/// Terminal pseudo-step shared by every catalog.
pub const COMPLETE: &str = "complete";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expected {
    Text,
    Number,
    Percentage,
    Choice(&'static [ChoiceOption]),
    /// Several options at once; stored as a list.
    MultiChoice(&'static [ChoiceOption]),
    Compound(CompoundSchema),
}

impl Expected {
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    Filled(&'static str),
    /// Case-insensitive text match, or numeric equality for numbers.
    Equals(&'static str, &'static str),
    /// True only when the list is present and lacks the value.
    Excludes(&'static str, &'static str),
    Any(Vec<Condition>),
    All(Vec<Condition>),
}

impl Condition {
    pub fn holds(&self, state: &PartialState) -> bool {
        match self {
            Self::Filled(path) => state.is_filled(path),
            Self::Equals(path, expected) => match state.get(path) {
                Some(FieldValue::Text(text)) => text.trim().eq_ignore_ascii_case(expected),
                Some(FieldValue::Number(number)) => {
                    Decimal::from_str(expected).is_ok_and(|expected| *number == expected)
                }
                Some(FieldValue::List(items)) => {
                    items.len() == 1 && items[0].eq_ignore_ascii_case(expected)
                }
                None => false,
            },
            Self::Excludes(path, value) => state
                .list(path)
                .is_some_and(|items| !items.iter().any(|item| item.eq_ignore_ascii_case(value))),
            Self::Any(conditions) => conditions.iter().any(|condition| condition.holds(state)),
            Self::All(conditions) => conditions.iter().all(|condition| condition.holds(state)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NextRule {
    To(&'static str),
    Branch { when: Condition, then: &'static str, otherwise: &'static str },
}

impl NextRule {
    fn targets(&self) -> Vec<&'static str> {
        match self {
            Self::To(target) => vec![*target],
            Self::Branch { then, otherwise, .. } => vec![*then, *otherwise],
        }
    }

    fn resolve(&self, state: &PartialState) -> &'static str {
        match self {
            Self::To(target) => *target,
            Self::Branch { when, then, otherwise } => {
                if when.holds(state) {
                    *then
                } else {
                    *otherwise
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepDefinition {
    pub id: &'static str,
    pub section: &'static str,
    /// Supports `{path}` and `{path|fallback}` placeholders.
    pub prompt: &'static str,
    /// Prepended to the prompt when an answer could not be used.
    pub hint: &'static str,
    pub field: &'static str,
    pub expected: Expected,
    pub next: NextRule,
    pub skip_when: Option<Condition>,
}

impl StepDefinition {
    /// Path whose presence means the step has been answered.
    pub fn filled_path(&self) -> String {
        match &self.expected {
            Expected::Compound(schema) => {
                schema.path(self.field, 0).unwrap_or_else(|| self.field.to_owned())
            }
            _ => self.field.to_owned(),
        }
    }

    pub fn is_answered(&self, state: &PartialState) -> bool {
        state.is_filled(&self.filled_path())
    }

    pub fn is_skipped(&self, state: &PartialState) -> bool {
        self.skip_when.as_ref().is_some_and(|condition| condition.holds(state))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("step `{0}` is declared more than once")]
    DuplicateStep(&'static str),
    #[error("entry step `{0}` is not declared")]
    UnknownEntry(&'static str),
    #[error("step `{from}` points at undeclared step `{to}`")]
    UnknownTarget { from: &'static str, to: &'static str },
    #[error("step graph has a cycle through `{0}`")]
    Cycle(&'static str),
    #[error("step `{0}` cannot reach `complete`")]
    DeadEnd(&'static str),
}

/// Validated, acyclic set of steps ending in [`COMPLETE`].
#[derive(Clone, Debug)]
pub struct StepGraph {
    entry: &'static str,
    steps: Vec<StepDefinition>,
    index: BTreeMap<&'static str, usize>,
}

impl StepGraph {
    pub fn new(entry: &'static str, steps: Vec<StepDefinition>) -> Result<Self, CatalogError> {
        let mut index = BTreeMap::new();
        for (position, step) in steps.iter().enumerate() {
            if step.id == COMPLETE || index.insert(step.id, position).is_some() {
                return Err(CatalogError::DuplicateStep(step.id));
            }
        }
        if !index.contains_key(entry) {
            return Err(CatalogError::UnknownEntry(entry));
        }
        for step in &steps {
            for target in step.next.targets() {
                if target != COMPLETE && !index.contains_key(target) {
                    return Err(CatalogError::UnknownTarget { from: step.id, to: target });
                }
            }
        }

        let graph = Self { entry, steps, index };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<(), CatalogError> {
        let mut finished = BTreeSet::new();
        for step in &self.steps {
            let mut on_path = BTreeSet::new();
            self.visit(step.id, &mut on_path, &mut finished)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        id: &'static str,
        on_path: &mut BTreeSet<&'static str>,
        finished: &mut BTreeSet<&'static str>,
    ) -> Result<(), CatalogError> {
        if id == COMPLETE || finished.contains(id) {
            return Ok(());
        }
        if !on_path.insert(id) {
            return Err(CatalogError::Cycle(id));
        }
        let step = self.step(id).ok_or(CatalogError::DeadEnd(id))?;
        for target in step.next.targets() {
            self.visit(target, on_path, finished)?;
        }
        on_path.remove(id);
        finished.insert(id);
        Ok(())
    }

    pub fn entry(&self) -> &'static str {
        self.entry
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.index.get(id).map(|position| &self.steps[*position])
    }

    /// Follows skip conditions from `target` until a step that applies, or
    /// [`COMPLETE`].
    pub fn settle(&self, target: &'static str, state: &PartialState) -> &'static str {
        let mut current = target;
        // Acyclic, so each step is visited at most once.
        for _ in 0..=self.steps.len() {
            let Some(step) = self.step(current) else {
                return COMPLETE;
            };
            if !step.is_skipped(state) {
                return current;
            }
            current = step.next.resolve(state);
        }
        COMPLETE
    }

    pub fn resolve_next(&self, from: &StepDefinition, state: &PartialState) -> &'static str {
        self.settle(from.next.resolve(state), state)
    }

    /// Where a conversation continues: the stored pointer when known, otherwise
    /// the first step of the pointer's section, otherwise the first unanswered
    /// step. A fresh conversation starts at the entry.
    pub fn resume_point(&self, pointer: Option<&str>, state: &PartialState) -> &'static str {
        let Some(pointer) = pointer else {
            return self.settle(self.entry, state);
        };
        if let Some(step) = self.step(pointer) {
            return step.id;
        }

        let section = pointer.split(['.', ':', '/']).next().unwrap_or(pointer);
        if let Some(step) = self.steps.iter().find(|step| step.section == section) {
            return self.settle(step.id, state);
        }

        self.steps
            .iter()
            .find(|step| !step.is_answered(state) && !step.is_skipped(state))
            .map(|step| step.id)
            .unwrap_or_else(|| self.settle(self.entry, state))
    }

    /// Step ids visited from the entry for a fixed state, stopping at
    /// [`COMPLETE`].
    pub fn walk(&self, state: &PartialState) -> Vec<&'static str> {
        let mut visited = Vec::new();
        let mut current = self.settle(self.entry, state);
        while current != COMPLETE && visited.len() <= self.steps.len() {
            visited.push(current);
            match self.step(current) {
                Some(step) => current = self.resolve_next(step, state),
                None => break,
            }
        }
        visited
    }
}

/// Parses a message as the answer to one step.
pub fn parse_answer(step: &StepDefinition, message: &str) -> FieldDelta {
    let mut delta = FieldDelta::default();
    match &step.expected {
        Expected::Text => delta.set_text(step.field, message.trim()),
        Expected::Number | Expected::Percentage => {
            if let Some(number) = extract_number(message).filter(|number| *number >= Decimal::ZERO) {
                delta.set_number(step.field, number);
            }
        }
        Expected::Choice(options) => {
            if let Some(value) = match_choice(options, message) {
                delta.set_text(step.field, value);
            }
        }
        Expected::MultiChoice(options) => {
            delta.set(step.field, FieldValue::List(match_choices(options, message)));
        }
        Expected::Compound(schema) => return schema.parse(step.field, message),
    }
    delta
}

/// Fills `{path}` / `{path|fallback}` placeholders from the collected state.
pub fn render_prompt(template: &str, state: &PartialState) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            output.push_str(&rest[open..]);
            return output;
        };
        let placeholder = &after[..close];
        let (path, fallback) = match placeholder.split_once('|') {
            Some((path, fallback)) => (path.trim(), fallback),
            None => (placeholder.trim(), ""),
        };
        match state.get(path).filter(|value| value.is_filled()) {
            Some(value) => output.push_str(&value.display()),
            None => output.push_str(fallback),
        }
        rest = &after[close + 1..];
    }
    output.push_str(rest);
    output
}

/// A flow's steps plus the hooks the intake machine calls on every turn.
pub trait StepCatalog: Send + Sync {
    fn name(&self) -> &'static str;

    fn graph(&self) -> &StepGraph;

    /// Fields recognised anywhere in a message, regardless of the current step.
    fn extract_slots(&self, _message: &str, _state: &PartialState) -> FieldDelta {
        FieldDelta::default()
    }

    fn parse_step(&self, step: &StepDefinition, message: &str, _state: &PartialState) -> FieldDelta {
        parse_answer(step, message)
    }

    /// Whether the message asks to finish now and enough is known to do so.
    fn finalize_requested(&self, _message: &str, _state: &PartialState) -> bool {
        false
    }

    fn completion_message(&self, state: &PartialState) -> String;
}
