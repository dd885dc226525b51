use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Rules a model rewrite of an assistant prompt has to satisfy before it is shown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub llm_can_quote_prices: bool,
    /// Rewrite may be at most this many times longer than the original.
    pub max_length_ratio: usize,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { llm_can_quote_prices: false, max_length_ratio: 3 }
    }
}

const FALLBACK: &str = "deterministic_prompt";

impl GuardrailPolicy {
    pub fn evaluate(&self, original: &str, rewrite: &str) -> GuardrailDecision {
        let rewrite = rewrite.trim();
        if rewrite.is_empty() {
            return deny("empty_rewrite");
        }

        if !self.llm_can_quote_prices {
            if rewrite.contains('$') && !original.contains('$') {
                return deny("price_introduced");
            }
            let known = figures(original);
            if figures(rewrite).iter().any(|figure| !known.contains(figure)) {
                return deny("figure_introduced");
            }
        }

        if original.contains('?') && !rewrite.contains('?') {
            return deny("question_dropped");
        }

        let limit = original.chars().count().max(40) * self.max_length_ratio;
        if rewrite.chars().count() > limit {
            return deny("rewrite_too_long");
        }

        GuardrailDecision::Allow
    }
}

fn deny(reason_code: &'static str) -> GuardrailDecision {
    GuardrailDecision::Deny { reason_code, fallback_path: FALLBACK }
}

/// Digit runs, with thousands separators removed, e.g. `1,200` -> `1200`.
fn figures(text: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if ch == ',' && !current.is_empty() && chars.peek().is_some_and(char::is_ascii_digit)
        {
            continue;
        } else if !current.is_empty() {
            found.insert(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        found.insert(current);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::{GuardrailDecision, GuardrailPolicy};

    const ORIGINAL: &str = "How many square feet of walls are we painting?";

    fn reason(decision: GuardrailDecision) -> &'static str {
        match decision {
            GuardrailDecision::Deny { reason_code, .. } => reason_code,
            GuardrailDecision::Allow => "",
        }
    }

    #[test]
    fn friendly_rewrite_is_allowed() {
        let policy = GuardrailPolicy::default();
        let decision =
            policy.evaluate(ORIGINAL, "Great! Roughly how many square feet of wall should we cover?");
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn rewrite_that_quotes_a_price_is_denied() {
        let policy = GuardrailPolicy::default();
        assert_eq!(
            reason(policy.evaluate(ORIGINAL, "Walls usually run $3 a foot. How many square feet?")),
            "price_introduced"
        );
        assert_eq!(
            reason(policy.evaluate(ORIGINAL, "Most rooms are 400 square feet. How big is yours?")),
            "figure_introduced"
        );
    }

    #[test]
    fn figures_already_in_the_prompt_may_be_repeated() {
        let policy = GuardrailPolicy::default();
        let original = "Got 1,200 sq ft of walls. Anything for ceilings?";
        let decision = policy.evaluate(original, "Noted, 1200 sq ft of walls. Any ceilings too?");
        assert!(decision.is_allowed());
    }

    #[test]
    fn dropped_question_and_empty_rewrite_are_denied() {
        let policy = GuardrailPolicy::default();
        assert_eq!(reason(policy.evaluate(ORIGINAL, "Tell me about the walls.")), "question_dropped");
        assert_eq!(reason(policy.evaluate(ORIGINAL, "   ")), "empty_rewrite");
    }

    #[test]
    fn rambling_rewrite_is_denied() {
        let policy = GuardrailPolicy::default();
        let rambling = format!("{} How many square feet?", "So ".repeat(200));
        assert_eq!(reason(policy.evaluate(ORIGINAL, &rambling)), "rewrite_too_long");
    }
}
