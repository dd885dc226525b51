use crate::intake::parse::{
    extract_number, match_choices, mentions, mentions_any, normalize, segments, ChoiceOption,
};
use crate::intake::state::{FieldDelta, FieldValue};

pub const SURFACES: &[ChoiceOption] = &[
    ChoiceOption {
        value: "walls",
        keywords: &["wall", "walls", "everything", "all surfaces", "all three", "whole room"],
    },
    ChoiceOption {
        value: "ceilings",
        keywords: &["ceiling", "ceilings", "everything", "all surfaces", "all three", "whole room"],
    },
    ChoiceOption {
        value: "trim",
        keywords: &[
            "trim",
            "baseboard",
            "baseboards",
            "molding",
            "moulding",
            "door frames",
            "everything",
            "all surfaces",
            "all three",
            "whole room",
        ],
    },
];

pub const PROJECT_TYPES: &[ChoiceOption] = &[
    ChoiceOption { value: "both", keywords: &["both", "inside and out", "interior and exterior"] },
    ChoiceOption { value: "interior", keywords: &["interior", "inside", "indoor", "indoors"] },
    ChoiceOption { value: "exterior", keywords: &["exterior", "outside", "outdoor", "outdoors"] },
];

pub const PAINT_TIERS: &[ChoiceOption] = &[
    ChoiceOption { value: "premium", keywords: &["premium", "top of the line", "highest"] },
    ChoiceOption { value: "best", keywords: &["best"] },
    ChoiceOption { value: "better", keywords: &["better", "mid grade", "standard"] },
    ChoiceOption { value: "good", keywords: &["good", "basic", "economy", "budget", "cheapest"] },
];

const TIER_QUALIFIERS: &[&str] = &["paint", "tier", "quality", "grade", "line", "level"];

const FINALIZE_PHRASES: &[&str] = &[
    "finalize",
    "finalise",
    "generate the quote",
    "generate quote",
    "generate a quote",
    "create the quote",
    "create quote",
    "build the quote",
    "that's everything",
    "that's all",
    "wrap it up",
];

const STREET_SUFFIXES: &[&str] = &[
    "st", "street", "ave", "avenue", "rd", "road", "dr", "drive", "ln", "lane", "blvd",
    "boulevard", "way", "ct", "court", "pl", "place", "ter", "terrace", "pkwy", "hwy", "cir",
];

/// Words that mean a segment is about the job, not a person's name.
const NOT_A_NAME: &[&str] = &[
    "wall", "walls", "ceiling", "ceilings", "trim", "only", "and", "the", "interior", "exterior",
    "inside", "outside", "both", "paint", "tier", "quality", "good", "better", "best", "premium",
    "everything", "all", "quote", "finalize", "yes", "no", "hi", "hello", "hey", "thanks",
    "please", "sq", "ft", "square", "feet", "room", "rooms", "house", "job",
];

const NAME_LABELS: &[&str] =
    &["my name is", "name is", "customer is", "customer name is", "customer", "name", "client"];

/// Fields found in one message plus the segments no extractor claimed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotExtraction {
    pub delta: FieldDelta,
    pub unclaimed: Vec<String>,
}

/// Scans comma/semicolon separated segments for customer details, scope,
/// measurements, project type and paint tier.
pub fn extract(message: &str) -> SlotExtraction {
    let mut extraction = SlotExtraction::default();
    let mut surfaces: Vec<String> = Vec::new();

    for segment in segments(message) {
        let normalized = normalize(segment);
        if mentions_any(&normalized, FINALIZE_PHRASES) {
            continue;
        }
        let mut claimed = false;

        if let Some(email) = find_email(segment) {
            extraction.delta.set_text("customer.email", email);
            claimed = true;
        } else if let Some(phone) = find_phone(segment) {
            extraction.delta.set_text("customer.phone", phone);
            claimed = true;
        } else if let Some(address) = find_address(segment) {
            extraction.delta.set_text("customer.address", address);
            claimed = true;
        } else {
            for clause in split_clauses(segment) {
                let clause_normalized = normalize(clause);
                let mentioned = match_choices(SURFACES, clause);
                if mentioned.is_empty() {
                    continue;
                }
                match extract_number(clause).filter(|number| !number.is_sign_negative()) {
                    Some(sqft) if mentioned.len() == 1 && !mentions(&clause_normalized, "everything") => {
                        extraction.delta.set_number(format!("measurements.{}_sqft", mentioned[0]), sqft);
                    }
                    Some(_) => {}
                    None => {
                        for surface in mentioned {
                            if !surfaces.contains(&surface) {
                                surfaces.push(surface);
                            }
                        }
                    }
                }
                claimed = true;
            }
        }

        if let Some(project_type) = project_type(&normalized) {
            extraction.delta.set_text("project.type", project_type);
            claimed = true;
        }
        if let Some(tier) = paint_tier(&normalized) {
            extraction.delta.set_text("products.tier", tier);
            claimed = true;
        }

        if !claimed {
            if let Some(name) = labelled_name(segment).or_else(|| strict_name(segment)) {
                extraction.delta.set_text("customer.name", name);
                claimed = true;
            }
        }
        if !claimed {
            extraction.unclaimed.push(segment.to_owned());
        }
    }

    if !surfaces.is_empty() {
        let ordered: Vec<String> = SURFACES
            .iter()
            .map(|option| option.value.to_owned())
            .filter(|value| surfaces.contains(value))
            .collect();
        extraction.delta.set("project.surfaces", FieldValue::List(ordered));
    }
    extraction
}

pub fn is_finalize_request(message: &str) -> bool {
    mentions_any(&normalize(message), FINALIZE_PHRASES)
}

/// Lenient name check used when the conversation is asking for a name.
pub fn plausible_name(text: &str) -> Option<String> {
    let text = text.trim().trim_end_matches(['.', '!']);
    if let Some(name) = labelled_name(text) {
        return Some(name);
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let shaped = (1..=4).contains(&words.len()) && words.iter().all(|word| is_name_word(word));
    let normalized = normalize(text);
    let excluded = normalized.split(' ').any(|word| NOT_A_NAME.contains(&word));
    (shaped && !excluded).then(|| text.to_owned())
}

fn strict_name(segment: &str) -> Option<String> {
    let words: Vec<&str> = segment.split_whitespace().collect();
    if !(2..=4).contains(&words.len()) {
        return None;
    }
    let capitalized = words
        .iter()
        .all(|word| word.chars().next().is_some_and(char::is_uppercase) && is_name_word(word));
    if capitalized {
        plausible_name(segment)
    } else {
        None
    }
}

fn labelled_name(segment: &str) -> Option<String> {
    let lowered = segment.to_ascii_lowercase();
    NAME_LABELS.iter().find_map(|label| {
        let rest = lowered.strip_prefix(*label).filter(|rest| rest.starts_with([' ', ':', '-']))?;
        let offset = segment.len() - rest.len();
        let name = segment[offset..].trim_start_matches([':', ' ', '-']).trim();
        let words = name.split_whitespace().count();
        ((1..=4).contains(&words) && name.split_whitespace().all(is_name_word))
            .then(|| name.to_owned())
    })
}

fn is_name_word(word: &str) -> bool {
    word.chars().all(|ch| ch.is_alphabetic() || matches!(ch, '\'' | '-' | '.'))
        && word.chars().any(char::is_alphabetic)
}

fn find_email(segment: &str) -> Option<String> {
    segment.split_whitespace().find_map(|token| {
        let token = token.trim_matches(|ch: char| matches!(ch, '<' | '>' | '(' | ')' | '.' | ':'));
        let (local, domain) = token.split_once('@')?;
        let valid = !local.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.');
        valid.then(|| token.to_owned())
    })
}

fn find_phone(segment: &str) -> Option<String> {
    let lowered = segment.to_ascii_lowercase();
    let body = ["phone", "cell", "mobile", "tel"]
        .iter()
        .find_map(|label| lowered.strip_prefix(*label).map(|rest| &segment[segment.len() - rest.len()..]))
        .unwrap_or(segment)
        .trim_start_matches([':', ' ', '#'])
        .trim();
    let digits = body.chars().filter(char::is_ascii_digit).count();
    let shaped = body
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, ' ' | '(' | ')' | '-' | '+' | '.'));
    (shaped && (10..=11).contains(&digits)).then(|| body.to_owned())
}

fn find_address(segment: &str) -> Option<String> {
    let lowered = segment.to_ascii_lowercase();
    let body = ["address is", "address", "located at", "at"]
        .iter()
        .find_map(|label| {
            lowered
                .strip_prefix(*label)
                .filter(|rest| rest.starts_with([' ', ':']))
                .map(|rest| &segment[segment.len() - rest.len()..])
        })
        .unwrap_or(segment)
        .trim_start_matches([':', ' '])
        .trim();

    let mut words = body.split_whitespace();
    let starts_with_number = words.next().is_some_and(|word| word.chars().all(|ch| ch.is_ascii_digit()));
    let normalized = normalize(body);
    let has_suffix = normalized.split(' ').skip(1).any(|word| STREET_SUFFIXES.contains(&word));
    (starts_with_number && has_suffix).then(|| body.to_owned())
}

/// Splits on `;`, newlines, and commas that are not thousands separators.
fn split_clauses(segment: &str) -> Vec<&str> {
    segment.split(" and ").flat_map(|part| part.split(" & ")).map(str::trim).collect()
}

fn project_type(normalized: &str) -> Option<&'static str> {
    let interior = mentions_any(normalized, &["interior", "inside", "indoor", "indoors"]);
    let exterior = mentions_any(normalized, &["exterior", "outside", "outdoor", "outdoors"]);
    match (interior, exterior) {
        (true, true) => Some("both"),
        (true, false) => Some("interior"),
        (false, true) => Some("exterior"),
        (false, false) => None,
    }
}

fn paint_tier(normalized: &str) -> Option<&'static str> {
    let bare = PAINT_TIERS.iter().find(|option| option.keywords.contains(&normalized));
    if let Some(option) = bare {
        return Some(option.value);
    }
    PAINT_TIERS
        .iter()
        .find(|option| {
            option.keywords.iter().any(|keyword| {
                TIER_QUALIFIERS
                    .iter()
                    .any(|qualifier| mentions(normalized, &format!("{keyword} {qualifier}")))
            })
        })
        .map(|option| option.value)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{extract, is_finalize_request, plausible_name};
    use crate::intake::state::FieldValue;

    fn text(value: &str) -> Option<FieldValue> {
        Some(FieldValue::Text(value.to_owned()))
    }

    #[test]
    fn short_answer_with_noise_fills_name_and_scope() {
        let extraction = extract("123, walls only, John Smith");

        assert_eq!(extraction.delta.get("customer.name").cloned(), text("John Smith"));
        assert_eq!(
            extraction.delta.get("project.surfaces").cloned(),
            Some(FieldValue::List(vec!["walls".to_owned()]))
        );
        assert_eq!(extraction.unclaimed, vec!["123".to_owned()]);
        assert!(!extraction.delta.contains("measurements.walls_sqft"));
    }

    #[test]
    fn contact_details_are_recognised() {
        let extraction = extract(
            "Customer: Maria Lopez, maria@example.com, (555) 123-4567, 42 Elm Street Springfield",
        );
        assert_eq!(extraction.delta.get("customer.name").cloned(), text("Maria Lopez"));
        assert_eq!(extraction.delta.get("customer.email").cloned(), text("maria@example.com"));
        assert_eq!(extraction.delta.get("customer.phone").cloned(), text("(555) 123-4567"));
        assert_eq!(
            extraction.delta.get("customer.address").cloned(),
            text("42 Elm Street Springfield")
        );
    }

    #[test]
    fn surface_measurements_fill_separate_fields() {
        let extraction = extract("walls 1,200 sq ft and ceilings 300 sqft; trim 150 square feet");
        assert_eq!(
            extraction.delta.get("measurements.walls_sqft"),
            Some(&FieldValue::Number(Decimal::new(1200, 0)))
        );
        assert_eq!(
            extraction.delta.get("measurements.ceilings_sqft"),
            Some(&FieldValue::Number(Decimal::new(300, 0)))
        );
        assert_eq!(
            extraction.delta.get("measurements.trim_sqft"),
            Some(&FieldValue::Number(Decimal::new(150, 0)))
        );
    }

    #[test]
    fn everything_means_all_three_surfaces() {
        let extraction = extract("interior job, everything, premium paint");
        assert_eq!(
            extraction.delta.get("project.surfaces").cloned(),
            Some(FieldValue::List(vec!["walls".into(), "ceilings".into(), "trim".into()]))
        );
        assert_eq!(extraction.delta.get("project.type").cloned(), text("interior"));
        assert_eq!(extraction.delta.get("products.tier").cloned(), text("premium"));
    }

    #[test]
    fn tier_words_need_context_unless_alone() {
        assert!(!extract("best regards").delta.contains("products.tier"));
        assert_eq!(extract("better").delta.get("products.tier").cloned(), text("better"));
        assert_eq!(extract("go with the best quality").delta.get("products.tier").cloned(), text("best"));
    }

    #[test]
    fn finalize_phrases_are_detected_and_not_left_unclaimed() {
        assert!(is_finalize_request("OK, generate the quote"));
        assert!(!is_finalize_request("what would the quote look like?"));
        assert!(extract("finalize").unclaimed.is_empty());
        assert!(!extract("that's everything").delta.contains("project.surfaces"));
    }

    #[test]
    fn lenient_names_reject_job_descriptions() {
        assert_eq!(plausible_name("john smith"), Some("john smith".to_owned()));
        assert_eq!(plausible_name("name is Dana"), Some("Dana".to_owned()));
        assert_eq!(plausible_name("walls only"), None);
        assert_eq!(plausible_name("unit 5b"), None);
    }
}
