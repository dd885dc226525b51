pub mod calculator;
pub mod validator;

pub use calculator::{
    calculate_quote, DeterministicPricingEngine, PricingBreakdown, PricingEngine, PricingError,
    PricingInput, PricingPolicy,
};
pub use validator::{validate, MeasurementValidator, StructuralValidator, ValidationReport};
