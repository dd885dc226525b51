use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::company::{CompanyDefaults, CompanyId};
use crate::domain::measurement::{Measurements, Surface};
use crate::domain::product::{Exposure, PaintTier, ProductSelection};
use crate::domain::quote::{
    CreatedBy, CreationMethod, CustomerInfo, ProjectInfo, ProjectType, Quote, QuoteId,
    QuoteMetadata, QuoteStatus,
};
use crate::errors::{ApplicationError, DomainError, FieldIssue};
use crate::intake::state::PartialState;
use crate::pricing::calculator::{
    DeterministicPricingEngine, PricingEngine, PricingError, PricingInput,
};
use crate::pricing::validator::{MeasurementValidator, StructuralValidator};

/// Customer name used when a direct request carries none.
pub const UNSPECIFIED_CUSTOMER: &str = "Unspecified";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyContext {
    pub company_id: CompanyId,
    pub created_by: CreatedBy,
    pub creation_method: CreationMethod,
    pub now: DateTime<Utc>,
}

impl AssemblyContext {
    pub fn chat(company_id: CompanyId, now: DateTime<Utc>) -> Self {
        Self { company_id, created_by: CreatedBy::Ai, creation_method: CreationMethod::Chat, now }
    }

    pub fn quick(company_id: CompanyId, now: DateTime<Utc>) -> Self {
        Self {
            company_id,
            created_by: CreatedBy::Manual,
            creation_method: CreationMethod::Quick,
            now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblyOutcome {
    Assembled(Box<Quote>),
    /// Dotted paths the conversation still has to collect.
    MissingFields(Vec<String>),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("measurements failed validation")]
    InvalidMeasurements(Vec<FieldIssue>),
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

impl From<AssemblyError> for ApplicationError {
    fn from(value: AssemblyError) -> Self {
        match value {
            AssemblyError::InvalidMeasurements(details) => ApplicationError::InvalidInput {
                message: "measurements failed validation".to_owned(),
                details,
            },
            AssemblyError::Pricing(error) => ApplicationError::Domain(DomainError::from(error)),
        }
    }
}

/// Non-conversational quote request, as posted by the quick-quote form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectQuoteRequest {
    pub company_id: CompanyId,
    pub measurements: Measurements,
    #[serde(default)]
    pub products: ProductSelection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup_percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectInfo>,
}

pub struct QuoteAssembler<E = DeterministicPricingEngine, V = StructuralValidator> {
    engine: E,
    validator: V,
}

impl Default for QuoteAssembler {
    fn default() -> Self {
        Self::new(DeterministicPricingEngine::default(), StructuralValidator)
    }
}

impl<E: PricingEngine, V: MeasurementValidator> QuoteAssembler<E, V> {
    pub fn new(engine: E, validator: V) -> Self {
        Self { engine, validator }
    }

    /// Turns a finished (or finalized early) conversation into a priced quote.
    pub fn assemble(
        &self,
        state: &PartialState,
        defaults: &CompanyDefaults,
        context: &AssemblyContext,
    ) -> Result<AssemblyOutcome, AssemblyError> {
        let missing = missing_fields(state);
        if !missing.is_empty() {
            return Ok(AssemblyOutcome::MissingFields(missing));
        }

        let area = |path: &str| state.number(path).unwrap_or(Decimal::ZERO);
        let measurements = Measurements::from_totals(
            area("measurements.walls_sqft"),
            area("measurements.ceilings_sqft"),
            area("measurements.trim_sqft"),
        );

        let project_type =
            state.text("project.type").and_then(ProjectType::parse).unwrap_or_default();
        let mut surfaces: Vec<Surface> = state
            .list("project.surfaces")
            .unwrap_or_default()
            .iter()
            .filter_map(|surface| Surface::parse(surface))
            .collect();
        if surfaces.is_empty() {
            surfaces = measured_surfaces(&measurements);
        }

        let products = ProductSelection {
            tier: state.text("products.tier").and_then(PaintTier::parse).unwrap_or_default(),
            exposure: exposure_for(project_type),
            ..ProductSelection::default()
        };

        let customer = CustomerInfo {
            name: state.text("customer.name").unwrap_or(UNSPECIFIED_CUSTOMER).trim().to_owned(),
            email: state.text("customer.email").map(str::to_owned),
            phone: state.text("customer.phone").map(str::to_owned),
            address: state.text("customer.address").map(str::to_owned),
        };
        let project =
            ProjectInfo { project_type, surfaces, notes: state.text("project.notes").map(str::to_owned) };

        self.build(customer, project, measurements, products, None, defaults, context)
            .map(|quote| AssemblyOutcome::Assembled(Box::new(quote)))
    }

    pub fn assemble_direct(
        &self,
        request: DirectQuoteRequest,
        defaults: &CompanyDefaults,
        context: &AssemblyContext,
    ) -> Result<Quote, AssemblyError> {
        let customer = request
            .customer
            .filter(|customer| !customer.name.trim().is_empty())
            .unwrap_or_else(|| CustomerInfo {
                name: UNSPECIFIED_CUSTOMER.to_owned(),
                ..CustomerInfo::default()
            });
        let mut project = request.project.unwrap_or_default();
        if project.surfaces.is_empty() {
            project.surfaces = measured_surfaces(&request.measurements);
        }

        self.build(
            customer,
            project,
            request.measurements,
            request.products,
            request.markup_percentage,
            defaults,
            context,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        customer: CustomerInfo,
        project: ProjectInfo,
        measurements: Measurements,
        products: ProductSelection,
        markup_override: Option<Decimal>,
        defaults: &CompanyDefaults,
        context: &AssemblyContext,
    ) -> Result<Quote, AssemblyError> {
        let report = self.validator.validate(&measurements);
        if !report.is_valid {
            return Err(AssemblyError::InvalidMeasurements(report.errors));
        }

        let pricing = self.engine.price(&PricingInput {
            measurements: &measurements,
            products: &products,
            company_defaults: defaults,
            markup_override,
        })?;

        Ok(Quote {
            customer,
            project,
            measurements,
            products,
            pricing,
            metadata: QuoteMetadata {
                quote_id: QuoteId::generate(context.now),
                company_id: context.company_id,
                status: QuoteStatus::Draft,
                created_by: context.created_by,
                creation_method: context.creation_method,
                created_at: context.now,
                updated_at: context.now,
            },
        })
    }
}

/// Paths still needed before a conversation can be priced.
pub fn missing_fields(state: &PartialState) -> Vec<String> {
    let mut missing = Vec::new();
    if !state.is_filled("customer.name") {
        missing.push("customer.name".to_owned());
    }
    let measured = Surface::ALL.iter().any(|surface| {
        state
            .number(&format!("measurements.{}_sqft", surface.as_str()))
            .is_some_and(|sqft| sqft > Decimal::ZERO)
    });
    if !measured {
        missing.push("measurements".to_owned());
    }
    missing
}

fn measured_surfaces(measurements: &Measurements) -> Vec<Surface> {
    Surface::ALL
        .iter()
        .copied()
        .filter(|surface| measurements.area(*surface) > Decimal::ZERO)
        .collect()
}

/// Mixed jobs are priced with interior materials.
fn exposure_for(project_type: ProjectType) -> Exposure {
    match project_type {
        ProjectType::Exterior => Exposure::Exterior,
        ProjectType::Interior | ProjectType::Both => Exposure::Interior,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        AssemblyContext, AssemblyError, AssemblyOutcome, DirectQuoteRequest, QuoteAssembler,
        UNSPECIFIED_CUSTOMER,
    };
    use crate::domain::company::{CompanyDefaults, CompanyId};
    use crate::domain::measurement::{Measurements, Surface};
    use crate::domain::product::{Exposure, PaintTier, ProductSelection};
    use crate::domain::quote::{CreatedBy, CreationMethod, QuoteStatus};
    use crate::intake::state::{FieldDelta, FieldValue, PartialState};

    fn context() -> AssemblyContext {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid time");
        AssemblyContext::chat(CompanyId(7), now)
    }

    fn defaults() -> CompanyDefaults {
        let mut defaults = CompanyDefaults::unconfigured(CompanyId(7));
        defaults.walls_rate = Some(Decimal::new(300, 2));
        defaults.markup_percentage = Decimal::new(45, 0);
        defaults
    }

    #[test]
    fn reports_missing_name_and_measurements() {
        let outcome = QuoteAssembler::default()
            .assemble(&PartialState::default(), &defaults(), &context())
            .expect("assembly runs");
        assert_eq!(
            outcome,
            AssemblyOutcome::MissingFields(vec!["customer.name".to_owned(), "measurements".to_owned()])
        );
    }

    #[test]
    fn conversation_state_becomes_priced_draft_quote() {
        let mut delta = FieldDelta::default();
        delta.set_text("customer.name", "John Smith");
        delta.set_text("customer.email", "john@example.com");
        delta.set("project.surfaces", FieldValue::List(vec!["walls".to_owned()]));
        delta.set_number("measurements.walls_sqft", Decimal::new(1000, 0));
        delta.set_text("project.type", "exterior");
        delta.set_text("products.tier", "premium");
        let state = PartialState::default().merged(&delta);

        let AssemblyOutcome::Assembled(quote) = QuoteAssembler::default()
            .assemble(&state, &defaults(), &context())
            .expect("assembly runs")
        else {
            panic!("expected an assembled quote");
        };

        assert_eq!(quote.customer.name, "John Smith");
        assert_eq!(quote.customer.email.as_deref(), Some("john@example.com"));
        assert_eq!(quote.project.surfaces, vec![Surface::Walls]);
        assert_eq!(quote.products.tier, PaintTier::Premium);
        assert_eq!(quote.products.exposure, Exposure::Exterior);
        assert_eq!(quote.metadata.status, QuoteStatus::Draft);
        assert_eq!(quote.metadata.created_by, CreatedBy::Ai);
        assert_eq!(quote.metadata.creation_method, CreationMethod::Chat);
        assert!(quote.metadata.quote_id.0.starts_with("Q-2026-"));
        assert_eq!(quote.pricing.subtotal, Decimal::new(300_000, 2));
        assert_eq!(
            quote.pricing.final_price,
            quote.pricing.subtotal + quote.pricing.markup_amount + quote.pricing.tax_amount
        );
    }

    #[test]
    fn direct_request_defaults_customer_and_surfaces() {
        let request = DirectQuoteRequest {
            company_id: CompanyId(7),
            measurements: Measurements::from_totals(
                Decimal::new(1000, 0),
                Decimal::ZERO,
                Decimal::new(120, 0),
            ),
            products: ProductSelection::default(),
            markup_percentage: Some(Decimal::new(30, 0)),
            customer: None,
            project: None,
        };
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid time");

        let quote = QuoteAssembler::default()
            .assemble_direct(request, &defaults(), &AssemblyContext::quick(CompanyId(7), now))
            .expect("direct quote");

        assert_eq!(quote.customer.name, UNSPECIFIED_CUSTOMER);
        assert_eq!(quote.project.surfaces, vec![Surface::Walls, Surface::Trim]);
        assert_eq!(quote.pricing.markup_percentage, Decimal::new(30, 0));
        assert_eq!(quote.metadata.creation_method, CreationMethod::Quick);
    }

    #[test]
    fn invalid_measurements_are_rejected_before_pricing() {
        let request = DirectQuoteRequest {
            company_id: CompanyId(7),
            measurements: Measurements::from_totals(Decimal::new(-5, 0), Decimal::ZERO, Decimal::ZERO),
            products: ProductSelection::default(),
            markup_percentage: None,
            customer: None,
            project: None,
        };

        let error = QuoteAssembler::default()
            .assemble_direct(request, &defaults(), &context())
            .expect_err("negative area");
        let AssemblyError::InvalidMeasurements(issues) = error else {
            panic!("expected validation failure");
        };
        assert_eq!(issues[0].field, "totalWallsSqft");
    }
}
