use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::{
    CompanyDefaults, CompanyId, MaterialCost, PaintCategory, PaintProduct,
};
use crate::domain::product::Exposure;
use crate::intake::catalog::{
    render_prompt, CatalogError, Condition, Expected, NextRule, StepCatalog, StepDefinition,
    StepGraph, COMPLETE,
};
use crate::intake::parse::{ChoiceOption, CompoundSchema, SubField, SubFieldKind};
use crate::intake::state::PartialState;

const PROJECT_FOCUS: &[ChoiceOption] = &[
    ChoiceOption { value: "both", keywords: &["both", "mix", "mixed", "all", "everything"] },
    ChoiceOption {
        value: "interior",
        keywords: &["interior", "interiors", "inside", "indoor", "indoors"],
    },
    ChoiceOption {
        value: "exterior",
        keywords: &["exterior", "exteriors", "outside", "outdoor", "outdoors"],
    },
];

const TAX_BASIS: &[ChoiceOption] = &[
    ChoiceOption {
        value: "total",
        keywords: &["total", "everything", "whole", "full", "entire", "materials and labor"],
    },
    ChoiceOption { value: "materials", keywords: &["materials", "material", "supplies", "paint only"] },
    ChoiceOption { value: "none", keywords: &["none", "no tax", "not taxed", "exempt"] },
];

const PRODUCT: CompoundSchema = CompoundSchema {
    fields: &[
        SubField { name: "name", kind: SubFieldKind::Text },
        SubField { name: "cost_per_gallon", kind: SubFieldKind::Money },
        SubField { name: "spread_rate", kind: SubFieldKind::Number },
    ],
};

/// Product steps: (step id, state path, category, exposure).
const PRODUCT_STEPS: &[(&str, &str, PaintCategory, Exposure)] = &[
    ("primer_product", "products.primer", PaintCategory::Primer, Exposure::Interior),
    ("wall_product", "products.wall", PaintCategory::Wall, Exposure::Interior),
    ("ceiling_product", "products.ceiling", PaintCategory::Ceiling, Exposure::Interior),
    ("trim_product", "products.trim", PaintCategory::Trim, Exposure::Interior),
    ("exterior_product", "products.exterior", PaintCategory::Wall, Exposure::Exterior),
];

fn setup_steps() -> Vec<StepDefinition> {
    let text = |id: &'static str,
                section: &'static str,
                prompt: &'static str,
                hint: &'static str,
                field: &'static str,
                next: &'static str| StepDefinition {
        id,
        section,
        prompt,
        hint,
        field,
        expected: Expected::Text,
        next: NextRule::To(next),
        skip_when: None,
    };
    let product = |id: &'static str,
                   prompt: &'static str,
                   field: &'static str,
                   next: &'static str,
                   skip_when: Option<Condition>| StepDefinition {
        id,
        section: "products",
        prompt,
        hint: "I need all three parts, separated by commas.",
        field,
        expected: Expected::Compound(PRODUCT),
        next: NextRule::To(next),
        skip_when,
    };

    vec![
        text(
            "company_name",
            "company",
            "Welcome! Let's set up your pricing so quotes come out right. What's your company name?",
            "I didn't catch a company name.",
            "company.name",
            "preferred_brand",
        ),
        text(
            "preferred_brand",
            "company",
            "Nice to meet you, {company.name}. Which paint brand do you use most (e.g. Sherwin-Williams, Benjamin Moore)?",
            "Just the brand name is fine.",
            "preferences.preferred_brand",
            "project_focus",
        ),
        StepDefinition {
            id: "project_focus",
            section: "company",
            prompt: "Do you mostly paint interiors, exteriors, or both?",
            hint: "Please answer interior, exterior, or both.",
            field: "preferences.project_focus",
            expected: Expected::Choice(PROJECT_FOCUS),
            next: NextRule::To("walls_rate"),
            skip_when: None,
        },
        StepDefinition {
            id: "walls_rate",
            section: "rates",
            prompt: "What do you charge per square foot for walls (e.g. $3.00)?",
            hint: "I couldn't find a dollar amount in that.",
            field: "rates.walls_rate",
            expected: Expected::Number,
            next: NextRule::Branch {
                when: Condition::Equals("preferences.project_focus", "exterior"),
                then: "trim_rate",
                otherwise: "ceilings_rate",
            },
            skip_when: None,
        },
        StepDefinition {
            id: "ceilings_rate",
            section: "rates",
            prompt: "And per square foot for ceilings?",
            hint: "I couldn't find a dollar amount in that.",
            field: "rates.ceilings_rate",
            expected: Expected::Number,
            next: NextRule::To("trim_rate"),
            skip_when: None,
        },
        StepDefinition {
            id: "trim_rate",
            section: "rates",
            prompt: "What's your rate per square foot for trim?",
            hint: "I couldn't find a dollar amount in that.",
            field: "rates.trim_rate",
            expected: Expected::Number,
            next: NextRule::To("markup"),
            skip_when: None,
        },
        StepDefinition {
            id: "markup",
            section: "rates",
            prompt: "What markup percentage do you add on top of cost (e.g. 45%)?",
            hint: "I couldn't find a percentage in that.",
            field: "rates.markup_percentage",
            expected: Expected::Percentage,
            next: NextRule::To("tax_rate"),
            skip_when: None,
        },
        StepDefinition {
            id: "tax_rate",
            section: "rates",
            prompt: "What sales tax rate applies to your jobs? Say 0 if none.",
            hint: "I couldn't find a percentage in that.",
            field: "rates.tax_rate",
            expected: Expected::Percentage,
            next: NextRule::To("tax_basis"),
            skip_when: None,
        },
        StepDefinition {
            id: "tax_basis",
            section: "rates",
            prompt: "Is that tax charged on materials only, or on the total price?",
            hint: "Please answer materials or total.",
            field: "rates.tax_basis",
            expected: Expected::Choice(TAX_BASIS),
            next: NextRule::To("primer_product"),
            skip_when: Some(Condition::Equals("rates.tax_rate", "0")),
        },
        product(
            "primer_product",
            "What {preferences.preferred_brand|your} primer do you use? Reply as: Product Name, $Cost per gallon, Spread rate (sq ft per gallon).",
            "products.primer",
            "wall_product",
            None,
        ),
        product(
            "wall_product",
            "Which interior wall paint? Reply as: Product Name, $Cost per gallon, Spread rate (sq ft per gallon).",
            "products.wall",
            "ceiling_product",
            Some(Condition::Equals("preferences.project_focus", "exterior")),
        ),
        product(
            "ceiling_product",
            "Which ceiling paint? Reply as: Product Name, $Cost per gallon, Spread rate (sq ft per gallon).",
            "products.ceiling",
            "trim_product",
            Some(Condition::Equals("preferences.project_focus", "exterior")),
        ),
        product(
            "trim_product",
            "Which trim paint? Reply as: Product Name, $Cost per gallon, Spread rate (sq ft per gallon).",
            "products.trim",
            "exterior_product",
            None,
        ),
        product(
            "exterior_product",
            "Last one: which exterior paint? Reply as: Product Name, $Cost per gallon, Spread rate (sq ft per gallon).",
            "products.exterior",
            COMPLETE,
            Some(Condition::Equals("preferences.project_focus", "interior")),
        ),
    ]
}

#[derive(Clone, Debug)]
pub struct SetupCatalog {
    graph: StepGraph,
}

impl SetupCatalog {
    pub fn new() -> Result<Self, CatalogError> {
        Ok(Self { graph: StepGraph::new("company_name", setup_steps())? })
    }
}

impl StepCatalog for SetupCatalog {
    fn name(&self) -> &'static str {
        "setup"
    }

    fn graph(&self) -> &StepGraph {
        &self.graph
    }

    fn completion_message(&self, state: &PartialState) -> String {
        render_prompt(
            "You're all set, {company.name|there}! Your rates and products are saved, so new quotes will use them automatically.",
            state,
        )
    }
}

/// What a finished setup conversation persists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupOutcome {
    pub preferences: BTreeMap<String, String>,
    pub products: Vec<PaintProduct>,
    pub company_defaults: CompanyDefaults,
}

impl SetupOutcome {
    pub fn from_state(company_id: CompanyId, state: &PartialState) -> Self {
        let preferences = state
            .iter()
            .filter(|(path, value)| !path.starts_with("products.") && value.is_filled())
            .map(|(path, value)| (path.to_owned(), value.display()))
            .collect();

        let brand = state.text("preferences.preferred_brand").map(str::to_owned);
        let products: Vec<PaintProduct> = PRODUCT_STEPS
            .iter()
            .filter_map(|(_, path, category, exposure)| {
                let name = state.text(&format!("{path}.name"))?;
                let cost_per_gallon = state.number(&format!("{path}.cost_per_gallon"))?;
                let spread_rate = state.number(&format!("{path}.spread_rate"))?;
                Some(PaintProduct {
                    company_id,
                    category: *category,
                    exposure: *exposure,
                    brand: brand.clone(),
                    name: name.to_owned(),
                    cost: MaterialCost { cost_per_gallon, spread_rate },
                })
            })
            .collect();

        let tax_basis = state.text("rates.tax_basis").unwrap_or("total");
        let mut company_defaults = CompanyDefaults::unconfigured(company_id);
        company_defaults.walls_rate = state.number("rates.walls_rate");
        company_defaults.ceilings_rate = state.number("rates.ceilings_rate");
        company_defaults.trim_rate = state.number("rates.trim_rate");
        company_defaults.markup_percentage =
            state.number("rates.markup_percentage").unwrap_or(Decimal::ZERO);
        company_defaults.tax_rate = match tax_basis {
            "none" => Decimal::ZERO,
            _ => state.number("rates.tax_rate").unwrap_or(Decimal::ZERO),
        };
        company_defaults.tax_on_materials_only = tax_basis == "materials";
        for product in &products {
            // Zero spread would make gallons undefined; such rows stay as
            // preferences only.
            if product.cost.spread_rate > Decimal::ZERO {
                company_defaults.set_material(
                    product.category,
                    product.exposure,
                    None,
                    product.cost.clone(),
                );
            }
        }

        Self { preferences, products, company_defaults }
    }
}
