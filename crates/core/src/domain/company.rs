use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::{Exposure, PaintTier};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub i64);

impl std::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaintCategory {
    Primer,
    Wall,
    Ceiling,
    Trim,
}

impl PaintCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primer => "primer",
            Self::Wall => "wall",
            Self::Ceiling => "ceiling",
            Self::Trim => "trim",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "primer" => Some(Self::Primer),
            "wall" | "walls" => Some(Self::Wall),
            "ceiling" | "ceilings" => Some(Self::Ceiling),
            "trim" => Some(Self::Trim),
            _ => None,
        }
    }
}

/// Cost and coverage of one paint product, as a contractor buys it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialCost {
    pub cost_per_gallon: Decimal,
    /// Square feet covered per gallon. Always > 0 for a usable entry.
    pub spread_rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRate {
    pub category: PaintCategory,
    pub exposure: Exposure,
    /// `None` applies to every tier without a more specific entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<PaintTier>,
    pub cost: MaterialCost,
}

/// A paint product the company stocks, as captured during setup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaintProduct {
    pub company_id: CompanyId,
    pub category: PaintCategory,
    pub exposure: Exposure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub name: String,
    pub cost: MaterialCost,
}

/// How the customer-facing category price splits into material and labor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "fraction")]
pub enum MaterialModel {
    /// Material is bought by the whole gallon; labor is the remainder.
    #[default]
    Gallons,
    /// Material is a fixed share of the category price; labor is the remainder.
    FixedFraction(Decimal),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDefaults {
    pub company_id: CompanyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walls_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceilings_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_rate: Option<Decimal>,
    #[serde(default)]
    pub markup_percentage: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub tax_on_materials_only: bool,
    #[serde(default)]
    pub material_model: MaterialModel,
    #[serde(default)]
    pub materials: Vec<MaterialRate>,
}

impl CompanyDefaults {
    /// Defaults for a company that never finished setup: every rate falls back.
    pub fn unconfigured(company_id: CompanyId) -> Self {
        Self {
            company_id,
            walls_rate: None,
            ceilings_rate: None,
            trim_rate: None,
            markup_percentage: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            tax_on_materials_only: false,
            material_model: MaterialModel::Gallons,
            materials: Vec::new(),
        }
    }

    /// Most specific material entry: exact tier first, then the tier-less entry.
    pub fn material(
        &self,
        category: PaintCategory,
        exposure: Exposure,
        tier: PaintTier,
    ) -> Option<&MaterialCost> {
        let matches = |rate: &&MaterialRate| rate.category == category && rate.exposure == exposure;
        self.materials
            .iter()
            .filter(matches)
            .find(|rate| rate.tier == Some(tier))
            .or_else(|| self.materials.iter().filter(matches).find(|rate| rate.tier.is_none()))
            .map(|rate| &rate.cost)
    }

    /// Inserts or replaces the entry for (category, exposure, tier).
    pub fn set_material(
        &mut self,
        category: PaintCategory,
        exposure: Exposure,
        tier: Option<PaintTier>,
        cost: MaterialCost,
    ) {
        match self.materials.iter_mut().find(|rate| {
            rate.category == category && rate.exposure == exposure && rate.tier == tier
        }) {
            Some(existing) => existing.cost = cost,
            None => self.materials.push(MaterialRate { category, exposure, tier, cost }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CompanyDefaults, CompanyId, MaterialCost, PaintCategory};
    use crate::domain::product::{Exposure, PaintTier};

    fn cost(per_gallon: i64, spread: i64) -> MaterialCost {
        MaterialCost {
            cost_per_gallon: Decimal::new(per_gallon, 0),
            spread_rate: Decimal::new(spread, 0),
        }
    }

    #[test]
    fn tier_specific_material_wins_over_generic_entry() {
        let mut defaults = CompanyDefaults::unconfigured(CompanyId(7));
        defaults.set_material(PaintCategory::Wall, Exposure::Interior, None, cost(45, 350));
        defaults.set_material(
            PaintCategory::Wall,
            Exposure::Interior,
            Some(PaintTier::Premium),
            cost(82, 375),
        );

        let premium = defaults.material(PaintCategory::Wall, Exposure::Interior, PaintTier::Premium);
        let good = defaults.material(PaintCategory::Wall, Exposure::Interior, PaintTier::Good);
        let exterior = defaults.material(PaintCategory::Wall, Exposure::Exterior, PaintTier::Good);

        assert_eq!(premium, Some(&cost(82, 375)));
        assert_eq!(good, Some(&cost(45, 350)));
        assert_eq!(exterior, None);
    }

    #[test]
    fn set_material_replaces_existing_entry() {
        let mut defaults = CompanyDefaults::unconfigured(CompanyId(7));
        defaults.set_material(PaintCategory::Trim, Exposure::Interior, None, cost(60, 300));
        defaults.set_material(PaintCategory::Trim, Exposure::Interior, None, cost(66, 320));

        assert_eq!(defaults.materials.len(), 1);
        assert_eq!(defaults.materials[0].cost, cost(66, 320));
    }
}
