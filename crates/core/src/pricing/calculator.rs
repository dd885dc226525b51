use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::company::{CompanyDefaults, MaterialCost, MaterialModel, PaintCategory};
use crate::domain::measurement::{Measurements, Surface};
use crate::domain::product::{Exposure, ProductSelection, SurfaceProduct};
use crate::errors::DomainError;

/// Customer-facing $/sqft used when neither the quote nor the company sets one.
pub const FALLBACK_WALLS_RATE: Decimal = Decimal::from_parts(300, 0, 0, false, 2);
pub const FALLBACK_CEILINGS_RATE: Decimal = Decimal::from_parts(200, 0, 0, false, 2);
pub const FALLBACK_TRIM_RATE: Decimal = Decimal::from_parts(500, 0, 0, false, 2);
/// Materials contingency, as a percentage of material cost.
pub const DEFAULT_SUNDRIES_PERCENTAGE: Decimal = Decimal::from_parts(12, 0, 0, false, 0);

/// Upper bounds on configured values; anything larger is treated as corrupt.
pub const MAX_RATE_PER_SQFT: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);
pub const MAX_COST_PER_GALLON: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
pub const MAX_PERCENTAGE: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);

/// Catalog material used when a company has no entry for a paint category.
pub fn fallback_material(category: PaintCategory, exposure: Exposure) -> MaterialCost {
    let (cost_per_gallon, spread_rate) = match (category, exposure) {
        (PaintCategory::Wall, Exposure::Interior) => (58, 350),
        (PaintCategory::Wall, Exposure::Exterior) => (68, 300),
        (PaintCategory::Ceiling, Exposure::Interior) => (42, 400),
        (PaintCategory::Ceiling, Exposure::Exterior) => (50, 350),
        (PaintCategory::Trim, Exposure::Interior) => (62, 350),
        (PaintCategory::Trim, Exposure::Exterior) => (70, 300),
        (PaintCategory::Primer, Exposure::Interior) => (35, 300),
        (PaintCategory::Primer, Exposure::Exterior) => (40, 275),
    };
    MaterialCost {
        cost_per_gallon: Decimal::from(cost_per_gallon),
        spread_rate: Decimal::from(spread_rate),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub fallback_walls_rate: Decimal,
    pub fallback_ceilings_rate: Decimal,
    pub fallback_trim_rate: Decimal,
    pub sundries_percentage: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            fallback_walls_rate: FALLBACK_WALLS_RATE,
            fallback_ceilings_rate: FALLBACK_CEILINGS_RATE,
            fallback_trim_rate: FALLBACK_TRIM_RATE,
            sundries_percentage: DEFAULT_SUNDRIES_PERCENTAGE,
        }
    }
}

impl PricingPolicy {
    fn fallback_rate(&self, surface: Surface) -> Decimal {
        match surface {
            Surface::Walls => self.fallback_walls_rate,
            Surface::Ceilings => self.fallback_ceilings_rate,
            Surface::Trim => self.fallback_trim_rate,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PricingInput<'a> {
    pub measurements: &'a Measurements,
    pub products: &'a ProductSelection,
    pub company_defaults: &'a CompanyDefaults,
    /// Per-request markup percentage; wins over the company value.
    pub markup_override: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub walls_cost: Decimal,
    pub ceilings_cost: Decimal,
    pub trim_cost: Decimal,
    pub sundries: Decimal,
    pub profit: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialLine {
    pub item: String,
    pub category: PaintCategory,
    pub gallons: Decimal,
    pub cost_per_gallon: Decimal,
    pub spread_rate: Decimal,
    pub cost: Decimal,
}

/// A documented fallback constant that stood in for a missing setting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackApplied {
    pub setting: String,
    pub value: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBreakdown {
    pub walls_rate: Decimal,
    pub ceilings_rate: Decimal,
    pub trim_rate: Decimal,
    pub total_material_cost: Decimal,
    pub total_labor_cost: Decimal,
    pub subtotal: Decimal,
    pub markup_percentage: Decimal,
    pub markup_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub final_price: Decimal,
    pub breakdown: CostBreakdown,
    #[serde(default)]
    pub material_lines: Vec<MaterialLine>,
    #[serde(default)]
    pub fallbacks: Vec<FallbackApplied>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("refusing to price: {field} is negative ({value})")]
    NegativeInput { field: String, value: Decimal },
    #[error("refusing to price: spread rate for {item} must be greater than zero")]
    NonPositiveSpreadRate { item: String },
    #[error("refusing to price: {field} {value} exceeds the limit of {limit}")]
    AboveLimit { field: String, value: Decimal, limit: Decimal },
    #[error("refusing to price: material fraction {0} must be within 0..=1")]
    MaterialFractionOutOfRange(Decimal),
    #[error("refusing to price: {0} overflowed")]
    Overflow(String),
}

impl From<PricingError> for DomainError {
    fn from(value: PricingError) -> Self {
        DomainError::InvariantViolation(value.to_string())
    }
}

pub trait PricingEngine: Send + Sync {
    fn price(&self, input: &PricingInput<'_>) -> Result<PricingBreakdown, PricingError>;
}

#[derive(Clone, Debug, Default)]
pub struct DeterministicPricingEngine {
    policy: PricingPolicy,
}

impl DeterministicPricingEngine {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }
}

impl PricingEngine for DeterministicPricingEngine {
    fn price(&self, input: &PricingInput<'_>) -> Result<PricingBreakdown, PricingError> {
        calculate_with_policy(input, &self.policy)
    }
}

pub fn calculate_quote(input: &PricingInput<'_>) -> Result<PricingBreakdown, PricingError> {
    calculate_with_policy(input, &PricingPolicy::default())
}

pub fn calculate_with_policy(
    input: &PricingInput<'_>,
    policy: &PricingPolicy,
) -> Result<PricingBreakdown, PricingError> {
    let defaults = input.company_defaults;
    let products = input.products;
    let mut fallbacks = Vec::new();

    let markup_percentage = input.markup_override.unwrap_or(defaults.markup_percentage);
    ensure_within("markupPercentage", markup_percentage, MAX_PERCENTAGE)?;
    ensure_within("taxRate", defaults.tax_rate, Decimal::ONE_HUNDRED)?;

    let mut rates = [Decimal::ZERO; 3];
    let mut category_costs = [Decimal::ZERO; 3];
    for (index, surface) in Surface::ALL.into_iter().enumerate() {
        let sqft = input.measurements.area(surface);
        ensure_non_negative(&format!("{}Sqft", surface.as_str()), sqft)?;
        let rate = resolve_rate(surface, products.surface(surface), defaults, policy, &mut fallbacks);
        ensure_within(&format!("{}Rate", surface.as_str()), rate, MAX_RATE_PER_SQFT)?;
        rates[index] = rate;
        category_costs[index] =
            round_money(checked(sqft.checked_mul(rate), &format!("{}Cost", surface.as_str()))?);
    }
    let category_total = checked_sum(category_costs, "category total")?;

    let (material_raw, material_lines): (Decimal, Vec<MaterialLine>) = match &defaults.material_model {
        MaterialModel::Gallons => {
            let lines = gallon_lines(input, &mut fallbacks)?;
            (checked_sum(lines.iter().map(|line| line.cost), "material cost")?, lines)
        }
        MaterialModel::FixedFraction(fraction) => {
            if *fraction < Decimal::ZERO || *fraction > Decimal::ONE {
                return Err(PricingError::MaterialFractionOutOfRange(*fraction));
            }
            (checked(category_total.checked_mul(*fraction), "material cost")?, Vec::new())
        }
    };

    // A job too small to cover its own paint bills the paint with no labor.
    let total_material_cost = round_money(material_raw);
    let total_labor_cost = (category_total - total_material_cost).max(Decimal::ZERO);

    let subtotal = checked(total_material_cost.checked_add(total_labor_cost), "subtotal")?;
    let markup_amount = round_money(percent_of(subtotal, markup_percentage, "markupAmount")?);
    let tax_base = if defaults.tax_on_materials_only {
        total_material_cost
    } else {
        checked(subtotal.checked_add(markup_amount), "tax base")?
    };
    let tax_amount = round_money(percent_of(tax_base, defaults.tax_rate, "taxAmount")?);
    let final_price = checked_sum([subtotal, markup_amount, tax_amount], "finalPrice")?;
    let sundries =
        round_money(percent_of(total_material_cost, policy.sundries_percentage, "sundries")?);

    Ok(PricingBreakdown {
        walls_rate: rates[0],
        ceilings_rate: rates[1],
        trim_rate: rates[2],
        total_material_cost,
        total_labor_cost,
        subtotal,
        markup_percentage,
        markup_amount,
        tax_rate: defaults.tax_rate,
        tax_amount,
        final_price,
        breakdown: CostBreakdown {
            walls_cost: category_costs[0],
            ceilings_cost: category_costs[1],
            trim_cost: category_costs[2],
            sundries,
            profit: final_price - subtotal,
        },
        material_lines,
        fallbacks,
    })
}

fn resolve_rate(
    surface: Surface,
    product: &SurfaceProduct,
    defaults: &CompanyDefaults,
    policy: &PricingPolicy,
    fallbacks: &mut Vec<FallbackApplied>,
) -> Decimal {
    let company_rate = match surface {
        Surface::Walls => defaults.walls_rate,
        Surface::Ceilings => defaults.ceilings_rate,
        Surface::Trim => defaults.trim_rate,
    };
    if let Some(rate) = product.rate_per_sqft.or(company_rate) {
        return rate;
    }

    let rate = policy.fallback_rate(surface);
    fallbacks.push(FallbackApplied { setting: format!("{}Rate", surface.as_str()), value: rate });
    rate
}

fn gallon_lines(
    input: &PricingInput<'_>,
    fallbacks: &mut Vec<FallbackApplied>,
) -> Result<Vec<MaterialLine>, PricingError> {
    let products = input.products;
    let mut lines = Vec::new();

    for surface in Surface::ALL {
        let sqft = input.measurements.area(surface);
        if sqft.is_zero() {
            continue;
        }
        let category = match surface {
            Surface::Walls => PaintCategory::Wall,
            Surface::Ceilings => PaintCategory::Ceiling,
            Surface::Trim => PaintCategory::Trim,
        };
        let cost = resolve_material(category, Some(products.surface(surface)), input, fallbacks);
        lines.push(material_line(surface.as_str(), category, sqft, &cost)?);
    }

    let primed_sqft = checked(
        input.measurements.total_walls_sqft.checked_add(input.measurements.total_ceilings_sqft),
        "primer area",
    )?;
    if products.include_primer && !primed_sqft.is_zero() {
        let cost = resolve_material(PaintCategory::Primer, None, input, fallbacks);
        lines.push(material_line("primer", PaintCategory::Primer, primed_sqft, &cost)?);
    }

    Ok(lines)
}

fn resolve_material(
    category: PaintCategory,
    product: Option<&SurfaceProduct>,
    input: &PricingInput<'_>,
    fallbacks: &mut Vec<FallbackApplied>,
) -> MaterialCost {
    let exposure = input.products.exposure;
    let company = input.company_defaults.material(category, exposure, input.products.tier);
    let fallback = fallback_material(category, exposure);
    let setting = |field: &str| format!("material.{}.{}.{field}", category.as_str(), exposure.as_str());

    let cost_per_gallon = product
        .and_then(|product| product.cost_per_gallon)
        .or_else(|| company.map(|cost| cost.cost_per_gallon))
        .unwrap_or_else(|| {
            fallbacks.push(FallbackApplied {
                setting: setting("costPerGallon"),
                value: fallback.cost_per_gallon,
            });
            fallback.cost_per_gallon
        });
    let spread_rate = product
        .and_then(|product| product.spread_rate)
        .or_else(|| company.map(|cost| cost.spread_rate))
        .unwrap_or_else(|| {
            fallbacks.push(FallbackApplied {
                setting: setting("spreadRate"),
                value: fallback.spread_rate,
            });
            fallback.spread_rate
        });

    MaterialCost { cost_per_gallon, spread_rate }
}

fn material_line(
    item: &str,
    category: PaintCategory,
    sqft: Decimal,
    cost: &MaterialCost,
) -> Result<MaterialLine, PricingError> {
    if cost.spread_rate <= Decimal::ZERO {
        return Err(PricingError::NonPositiveSpreadRate { item: item.to_string() });
    }
    ensure_within(&format!("{item}.costPerGallon"), cost.cost_per_gallon, MAX_COST_PER_GALLON)?;

    // Partial gallons cannot be bought.
    let gallons = checked(sqft.checked_div(cost.spread_rate), &format!("{item}.gallons"))?.ceil();
    Ok(MaterialLine {
        item: item.to_string(),
        category,
        gallons,
        cost_per_gallon: cost.cost_per_gallon,
        spread_rate: cost.spread_rate,
        cost: checked(gallons.checked_mul(cost.cost_per_gallon), &format!("{item}.cost"))?,
    })
}

fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), PricingError> {
    if value < Decimal::ZERO {
        return Err(PricingError::NegativeInput { field: field.to_string(), value });
    }
    Ok(())
}

fn ensure_within(field: &str, value: Decimal, limit: Decimal) -> Result<(), PricingError> {
    ensure_non_negative(field, value)?;
    if value > limit {
        return Err(PricingError::AboveLimit { field: field.to_string(), value, limit });
    }
    Ok(())
}

fn checked(value: Option<Decimal>, what: &str) -> Result<Decimal, PricingError> {
    value.ok_or_else(|| PricingError::Overflow(what.to_string()))
}

fn checked_sum(
    values: impl IntoIterator<Item = Decimal>,
    what: &str,
) -> Result<Decimal, PricingError> {
    values.into_iter().try_fold(Decimal::ZERO, |total, value| checked(total.checked_add(value), what))
}

fn percent_of(base: Decimal, percentage: Decimal, what: &str) -> Result<Decimal, PricingError> {
    let scaled = checked(base.checked_mul(percentage), what)?;
    checked(scaled.checked_div(Decimal::ONE_HUNDRED), what)
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
