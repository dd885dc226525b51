use rust_decimal::Decimal;

use crate::intake::catalog::{
    parse_answer, render_prompt, CatalogError, Condition, Expected, NextRule, StepCatalog,
    StepDefinition, StepGraph, COMPLETE,
};
use crate::intake::slots::{self, PAINT_TIERS, PROJECT_TYPES, SURFACES};
use crate::intake::state::{FieldDelta, PartialState};

pub const MEASUREMENT_PATHS: [&str; 3] =
    ["measurements.walls_sqft", "measurements.ceilings_sqft", "measurements.trim_sqft"];

fn measurement_step(
    id: &'static str,
    surface: &'static str,
    field: &'static str,
    prompt: &'static str,
    next: &'static str,
) -> StepDefinition {
    StepDefinition {
        id,
        section: "measurements",
        prompt,
        hint: "I need a number of square feet, for example 850.",
        field,
        expected: Expected::Number,
        next: NextRule::To(next),
        skip_when: Some(Condition::Any(vec![
            Condition::Filled(field),
            Condition::Excludes("project.surfaces", surface),
        ])),
    }
}

fn quote_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition {
            id: "customer_name",
            section: "customer",
            prompt: "Let's put a quote together. Who is the customer? Feel free to include their email, phone, address, the surfaces to paint and square footage in one message.",
            hint: "I didn't catch the customer's name.",
            field: "customer.name",
            expected: Expected::Text,
            next: NextRule::To("surfaces"),
            skip_when: Some(Condition::Filled("customer.name")),
        },
        StepDefinition {
            id: "surfaces",
            section: "scope",
            prompt: "Which surfaces are we painting for {customer.name|this customer}: walls, ceilings, trim, or everything?",
            hint: "Please name the surfaces: walls, ceilings, trim, or everything.",
            field: "project.surfaces",
            expected: Expected::MultiChoice(SURFACES),
            next: NextRule::To("walls_sqft"),
            skip_when: Some(Condition::Filled("project.surfaces")),
        },
        measurement_step(
            "walls_sqft",
            "walls",
            "measurements.walls_sqft",
            "How many square feet of walls?",
            "ceilings_sqft",
        ),
        measurement_step(
            "ceilings_sqft",
            "ceilings",
            "measurements.ceilings_sqft",
            "How many square feet of ceilings?",
            "trim_sqft",
        ),
        measurement_step(
            "trim_sqft",
            "trim",
            "measurements.trim_sqft",
            "How many square feet of trim?",
            "project_type",
        ),
        StepDefinition {
            id: "project_type",
            section: "project",
            prompt: "Is this an interior job, exterior, or both?",
            hint: "Please answer interior, exterior, or both.",
            field: "project.type",
            expected: Expected::Choice(PROJECT_TYPES),
            next: NextRule::To("paint_tier"),
            skip_when: Some(Condition::Filled("project.type")),
        },
        StepDefinition {
            id: "paint_tier",
            section: "products",
            prompt: "Last question: which paint quality should I price, good, better, best, or premium?",
            hint: "Please pick good, better, best, or premium.",
            field: "products.tier",
            expected: Expected::Choice(PAINT_TIERS),
            next: NextRule::To(COMPLETE),
            skip_when: Some(Condition::Filled("products.tier")),
        },
    ]
}

/// True once the assembler has the minimum it needs: a customer name and at
/// least one non-zero area.
pub fn has_assembly_minimum(state: &PartialState) -> bool {
    state.is_filled("customer.name")
        && MEASUREMENT_PATHS
            .iter()
            .any(|path| state.number(path).is_some_and(|sqft| sqft > Decimal::ZERO))
}

#[derive(Clone, Debug)]
pub struct QuoteChatCatalog {
    graph: StepGraph,
}

impl QuoteChatCatalog {
    pub fn new() -> Result<Self, CatalogError> {
        Ok(Self { graph: StepGraph::new("customer_name", quote_steps())? })
    }
}

impl StepCatalog for QuoteChatCatalog {
    fn name(&self) -> &'static str {
        "quote_chat"
    }

    fn graph(&self) -> &StepGraph {
        &self.graph
    }

    fn extract_slots(&self, message: &str, _state: &PartialState) -> FieldDelta {
        slots::extract(message).delta
    }

    /// Only text the slot extractor left alone is read as the step's answer,
    /// so "ceilings 150" is never taken as the wall area.
    fn parse_step(&self, step: &StepDefinition, message: &str, _state: &PartialState) -> FieldDelta {
        let leftover = slots::extract(message).unclaimed.join(", ");
        if leftover.is_empty() {
            return FieldDelta::default();
        }
        match step.expected {
            Expected::Text => {
                let mut delta = FieldDelta::default();
                if let Some(name) = slots::plausible_name(&leftover) {
                    delta.set_text(step.field, name);
                }
                delta
            }
            _ => parse_answer(step, &leftover),
        }
    }

    fn finalize_requested(&self, message: &str, state: &PartialState) -> bool {
        slots::is_finalize_request(message) && has_assembly_minimum(state)
    }

    fn completion_message(&self, state: &PartialState) -> String {
        render_prompt(
            "Great, I have what I need for {customer.name|this customer}. Pricing the quote now.",
            state,
        )
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{has_assembly_minimum, QuoteChatCatalog};
    use crate::intake::catalog::{StepCatalog, COMPLETE};
    use crate::intake::state::{FieldDelta, FieldValue, PartialState};

    fn catalog() -> QuoteChatCatalog {
        QuoteChatCatalog::new().expect("quote chat catalog is valid")
    }

    #[test]
    fn scope_limits_which_measurements_are_asked() {
        let catalog = catalog();
        let mut delta = FieldDelta::default();
        delta.set_text("customer.name", "John Smith");
        delta.set("project.surfaces", FieldValue::List(vec!["walls".to_owned()]));
        let state = PartialState::default().merged(&delta);

        assert_eq!(catalog.graph().walk(&state), vec!["walls_sqft", "project_type", "paint_tier"]);
    }

    #[test]
    fn fully_answered_state_settles_on_complete() {
        let catalog = catalog();
        let mut delta = FieldDelta::default();
        delta.set_text("customer.name", "John Smith");
        delta.set("project.surfaces", FieldValue::List(vec!["walls".to_owned()]));
        delta.set_number("measurements.walls_sqft", Decimal::new(900, 0));
        delta.set_text("project.type", "interior");
        delta.set_text("products.tier", "best");
        let state = PartialState::default().merged(&delta);

        assert!(catalog.graph().walk(&state).is_empty());
        assert_eq!(catalog.graph().resume_point(None, &state), COMPLETE);
    }

    #[test]
    fn step_parser_ignores_numbers_claimed_by_other_surfaces() {
        let catalog = catalog();
        let walls = catalog.graph().step("walls_sqft").expect("walls step");
        let state = PartialState::default();

        assert!(catalog.parse_step(walls, "ceilings 150", &state).is_empty());
        assert_eq!(
            catalog.parse_step(walls, "about 400, ceilings 150", &state).get("measurements.walls_sqft"),
            Some(&FieldValue::Number(Decimal::new(400, 0)))
        );
    }

    #[test]
    fn finalize_needs_name_and_area() {
        let catalog = catalog();
        let mut delta = FieldDelta::default();
        delta.set_text("customer.name", "John Smith");
        let named = PartialState::default().merged(&delta);
        assert!(!catalog.finalize_requested("finalize", &named));

        delta.set_number("measurements.walls_sqft", Decimal::new(300, 0));
        let ready = PartialState::default().merged(&delta);
        assert!(has_assembly_minimum(&ready));
        assert!(catalog.finalize_requested("ok, generate the quote", &ready));
    }
}
