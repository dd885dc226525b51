use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::company::CompanyId;
use crate::domain::measurement::{Measurements, Surface};
use crate::domain::product::ProductSelection;
use crate::errors::DomainError;
use crate::pricing::calculator::PricingBreakdown;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub String);

impl QuoteId {
    /// `Q-<year>-<8 hex>`; the random suffix keeps ids unique across processes.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("Q-{}-{}", now.year(), suffix[..8].to_ascii_uppercase()))
    }
}

impl std::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Pending,
    Sent,
    Approved,
    Accepted,
    Rejected,
    Expired,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Approved => "approved",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "approved" => Some(Self::Approved),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedBy {
    Manual,
    Ai,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationMethod {
    Chat,
    Wizard,
    Quick,
    Import,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    #[default]
    Interior,
    Exterior,
    Both,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interior => "interior",
            Self::Exterior => "exterior",
            Self::Both => "both",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "interior" => Some(Self::Interior),
            "exterior" => Some(Self::Exterior),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    #[serde(default)]
    pub project_type: ProjectType,
    #[serde(default)]
    pub surfaces: Vec<Surface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteMetadata {
    pub quote_id: QuoteId,
    pub company_id: CompanyId,
    pub status: QuoteStatus,
    pub created_by: CreatedBy,
    pub creation_method: CreationMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub customer: CustomerInfo,
    pub project: ProjectInfo,
    pub measurements: Measurements,
    pub products: ProductSelection,
    pub pricing: PricingBreakdown,
    pub metadata: QuoteMetadata,
}

impl Quote {
    pub fn id(&self) -> &QuoteId {
        &self.metadata.quote_id
    }

    pub fn status(&self) -> QuoteStatus {
        self.metadata.status
    }

    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        use QuoteStatus::{Accepted, Approved, Draft, Expired, Pending, Rejected, Sent};

        matches!(
            (self.metadata.status, next),
            (Draft, Pending)
                | (Pending, Sent)
                | (Pending, Draft)
                | (Sent, Approved)
                | (Sent, Rejected)
                | (Approved, Accepted)
                | (Approved, Rejected)
                | (Rejected, Draft)
                | (Expired, Draft)
                | (Draft | Pending | Sent | Approved, Expired)
        )
    }

    pub fn transition_to(
        &mut self,
        next: QuoteStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.metadata.status = next;
            self.metadata.updated_at = now;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.metadata.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        CreatedBy, CreationMethod, CustomerInfo, ProjectInfo, Quote, QuoteId, QuoteMetadata,
        QuoteStatus,
    };
    use crate::domain::company::{CompanyDefaults, CompanyId};
    use crate::domain::measurement::Measurements;
    use crate::domain::product::ProductSelection;
    use crate::pricing::calculator::{DeterministicPricingEngine, PricingEngine, PricingInput};

    fn quote(status: QuoteStatus) -> Quote {
        let measurements = Measurements::from_totals(Decimal::new(500, 0), Decimal::ZERO, Decimal::ZERO);
        let products = ProductSelection::default();
        let defaults = CompanyDefaults::unconfigured(CompanyId(1));
        let pricing = DeterministicPricingEngine::default()
            .price(&PricingInput {
                measurements: &measurements,
                products: &products,
                company_defaults: &defaults,
                markup_override: None,
            })
            .expect("fixture prices");
        let created_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid date");

        Quote {
            customer: CustomerInfo { name: "Dana Reyes".to_string(), ..CustomerInfo::default() },
            project: ProjectInfo::default(),
            measurements,
            products,
            pricing,
            metadata: QuoteMetadata {
                quote_id: QuoteId("Q-2026-0000AAAA".to_string()),
                company_id: CompanyId(1),
                status,
                created_by: CreatedBy::Manual,
                creation_method: CreationMethod::Quick,
                created_at,
                updated_at: created_at,
            },
        }
    }

    #[test]
    fn generated_ids_carry_year_prefix_and_differ() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).single().expect("valid date");
        let first = QuoteId::generate(now);
        let second = QuoteId::generate(now);

        assert!(first.0.starts_with("Q-2026-"));
        assert_eq!(first.0.len(), "Q-2026-".len() + 8);
        assert_ne!(first, second);
    }

    #[test]
    fn allows_forward_lifecycle() {
        let mut quote = quote(QuoteStatus::Draft);
        let now = Utc::now();
        for next in [QuoteStatus::Pending, QuoteStatus::Sent, QuoteStatus::Approved, QuoteStatus::Accepted]
        {
            quote.transition_to(next, now).expect("forward transition");
        }
        assert_eq!(quote.status(), QuoteStatus::Accepted);
        assert_eq!(quote.metadata.updated_at, now);
    }

    #[test]
    fn blocks_skipping_delivery() {
        let mut quote = quote(QuoteStatus::Draft);
        let error = quote
            .transition_to(QuoteStatus::Accepted, Utc::now())
            .expect_err("draft->accepted should fail");
        assert!(matches!(error, crate::errors::DomainError::InvalidQuoteTransition { .. }));
        assert_eq!(quote.status(), QuoteStatus::Draft);
    }

    #[test]
    fn rejected_and_expired_quotes_can_be_revised() {
        let mut rejected = quote(QuoteStatus::Rejected);
        rejected.transition_to(QuoteStatus::Draft, Utc::now()).expect("rejected -> draft");

        let mut expired = quote(QuoteStatus::Expired);
        expired.transition_to(QuoteStatus::Draft, Utc::now()).expect("expired -> draft");

        let accepted = quote(QuoteStatus::Accepted);
        assert!(!accepted.can_transition_to(QuoteStatus::Expired));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            QuoteStatus::Draft,
            QuoteStatus::Pending,
            QuoteStatus::Sent,
            QuoteStatus::Approved,
            QuoteStatus::Accepted,
            QuoteStatus::Rejected,
            QuoteStatus::Expired,
        ] {
            assert_eq!(QuoteStatus::parse(status.as_str()), Some(status));
        }
    }
}
