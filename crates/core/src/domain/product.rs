use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::measurement::Surface;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaintTier {
    Good,
    #[default]
    Better,
    Best,
    Premium,
}

impl PaintTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Better => "better",
            Self::Best => "best",
            Self::Premium => "premium",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "good" => Some(Self::Good),
            "better" => Some(Self::Better),
            "best" => Some(Self::Best),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    #[default]
    Interior,
    Exterior,
}

impl Exposure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interior => "interior",
            Self::Exterior => "exterior",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "interior" => Some(Self::Interior),
            "exterior" => Some(Self::Exterior),
            _ => None,
        }
    }
}

/// Per-surface override of company defaults. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceProduct {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_gallon: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_per_sqft: Option<Decimal>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSelection {
    #[serde(default)]
    pub tier: PaintTier,
    #[serde(default)]
    pub exposure: Exposure,
    #[serde(default)]
    pub include_primer: bool,
    #[serde(default)]
    pub walls: SurfaceProduct,
    #[serde(default)]
    pub ceilings: SurfaceProduct,
    #[serde(default)]
    pub trim: SurfaceProduct,
}

impl ProductSelection {
    pub fn with_tier(tier: PaintTier) -> Self {
        Self { tier, ..Self::default() }
    }

    pub fn surface(&self, surface: Surface) -> &SurfaceProduct {
        match surface {
            Surface::Walls => &self.walls,
            Surface::Ceilings => &self.ceilings,
            Surface::Trim => &self.trim,
        }
    }
}
