use std::str::FromStr;

use rust_decimal::Decimal;

use crate::intake::state::{FieldDelta, FieldValue};

/// First decimal-looking number in free text. Tolerates `$`, `%`, thousands
/// separators and a leading minus sign. Returns `None` rather than zero.
pub fn extract_number(text: &str) -> Option<Decimal> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.iter().enumerate().position(|(index, ch)| {
        ch.is_ascii_digit()
            || (*ch == '.' && chars.get(index + 1).is_some_and(char::is_ascii_digit))
    })?;

    let negative = start > 0
        && chars[start - 1] == '-'
        && (start < 2 || !chars[start - 2].is_alphanumeric());

    let mut literal = String::new();
    let mut seen_point = false;
    let mut index = start;
    while let Some(&ch) = chars.get(index) {
        let next_is_digit = chars.get(index + 1).is_some_and(char::is_ascii_digit);
        match ch {
            digit if digit.is_ascii_digit() => literal.push(digit),
            ',' if next_is_digit && !seen_point => {}
            '.' if next_is_digit && !seen_point => {
                seen_point = true;
                if literal.is_empty() {
                    literal.push('0');
                }
                literal.push('.');
            }
            _ => break,
        }
        index += 1;
    }

    let value = Decimal::from_str(&literal).ok()?;
    Some(if negative { -value } else { value })
}

/// Lowercased text with punctuation flattened to spaces, for keyword lookup.
pub fn normalize(text: &str) -> String {
    let flattened: String = text
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '\'' { ch.to_ascii_lowercase() } else { ' ' })
        .collect();
    flattened.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-word (or whole-phrase) match against normalized text.
pub fn mentions(normalized: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    if phrase.is_empty() {
        return false;
    }
    let padded = format!(" {normalized} ");
    padded.contains(&format!(" {phrase} "))
}

pub fn mentions_any(normalized: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| mentions(normalized, phrase))
}

/// A canonical value and the words that select it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChoiceOption {
    pub value: &'static str,
    pub keywords: &'static [&'static str],
}

pub fn match_choice(options: &[ChoiceOption], text: &str) -> Option<&'static str> {
    let normalized = normalize(text);
    options
        .iter()
        .find(|option| mentions_any(&normalized, option.keywords))
        .map(|option| option.value)
}

/// Every option mentioned, in option order.
pub fn match_choices(options: &[ChoiceOption], text: &str) -> Vec<String> {
    let normalized = normalize(text);
    options
        .iter()
        .filter(|option| mentions_any(&normalized, option.keywords))
        .map(|option| option.value.to_owned())
        .collect()
}

/// Splits on `;`, newlines and commas, except a comma between two digits
/// (a thousands separator).
pub fn segments(message: &str) -> Vec<&str> {
    let bytes = message.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    for (index, byte) in bytes.iter().enumerate() {
        let separator = match byte {
            b';' | b'\n' => true,
            b',' => {
                let digit_before = index > 0 && bytes[index - 1].is_ascii_digit();
                let digit_after = bytes.get(index + 1).is_some_and(u8::is_ascii_digit);
                !(digit_before && digit_after)
            }
            _ => false,
        };
        if separator {
            parts.push(&message[start..index]);
            start = index + 1;
        }
    }
    parts.push(&message[start..]);
    parts.into_iter().map(str::trim).filter(|part| !part.is_empty()).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubFieldKind {
    Text,
    Money,
    Number,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubField {
    pub name: &'static str,
    pub kind: SubFieldKind,
}

/// Ordered comma-separated sub-fields of one answer, e.g. `Product, $Cost, Spread`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompoundSchema {
    pub fields: &'static [SubField],
}

impl CompoundSchema {
    pub fn path(&self, base: &str, index: usize) -> Option<String> {
        self.fields.get(index).map(|field| format!("{base}.{}", field.name))
    }

    /// All-or-nothing: too few segments or an unreadable number yields an
    /// empty delta. Surplus leading segments fold into the first text field.
    pub fn parse(&self, base: &str, text: &str) -> FieldDelta {
        let mut delta = FieldDelta::default();
        let segments = segments(text);
        if self.fields.is_empty() || segments.len() < self.fields.len() {
            return delta;
        }

        let surplus = segments.len() - self.fields.len();
        let head = segments[..=surplus].join(", ");
        let values = std::iter::once(head.as_str()).chain(segments[surplus + 1..].iter().copied());

        for (field, raw) in self.fields.iter().zip(values) {
            let value = match field.kind {
                SubFieldKind::Text => FieldValue::Text(raw.to_owned()),
                SubFieldKind::Money | SubFieldKind::Number => match extract_number(raw) {
                    Some(number) if number >= Decimal::ZERO => FieldValue::Number(number),
                    _ => return FieldDelta::default(),
                },
            };
            delta.set(format!("{base}.{}", field.name), value);
        }
        delta
    }
}
