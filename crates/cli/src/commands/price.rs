use std::fs;
use std::path::Path;

use chrono::Utc;
use paintquote_core::assembler::{
    AssemblyContext, AssemblyError, DirectQuoteRequest, QuoteAssembler,
};
use paintquote_core::domain::company::CompanyDefaults;
use paintquote_core::pricing::{DeterministicPricingEngine, StructuralValidator};
use paintquote_db::repositories::{
    CompanyRepository, QuoteRepository, SqlCompanyRepository, SqlQuoteRepository,
};

use crate::commands::{build_runtime, load_config, open_database, CommandResult, StepFailure};

/// Prices a quick-quote request read from a JSON file.
///
/// Company rates come from the database when the company is configured, the
/// pricing fallbacks otherwise. With `save` the quote is stored, which needs
/// the company to exist.
pub fn run(input: &Path, save: bool) -> CommandResult {
    let raw = match fs::read_to_string(input) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "price",
                "input_read",
                format!("failed to read {}: {error}", input.display()),
                2,
            );
        }
    };
    let request = match serde_json::from_str::<DirectQuoteRequest>(&raw) {
        Ok(request) => request,
        Err(error) => {
            return CommandResult::failure(
                "price",
                "input_parse",
                format!("{} is not a quote request: {error}", input.display()),
                2,
            );
        }
    };

    let config = match load_config("price") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("price") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let assembler = QuoteAssembler::new(
        DeterministicPricingEngine::new(config.pricing.policy()),
        StructuralValidator,
    );

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let companies = SqlCompanyRepository::new(pool.clone());
        let company_id = request.company_id;

        let company = companies
            .find_company(company_id)
            .await
            .map_err(|error| ("db_query", error.to_string(), 4u8))?;
        if save && company.is_none() {
            return Err(("unknown_company", format!("company {company_id} does not exist"), 6u8));
        }
        let defaults = companies
            .load_defaults(company_id)
            .await
            .map_err(|error| ("db_query", error.to_string(), 4u8))?
            .unwrap_or_else(|| CompanyDefaults::unconfigured(company_id));

        let quote = assembler
            .assemble_direct(request, &defaults, &AssemblyContext::quick(company_id, Utc::now()))
            .map_err(assembly_failure)?;

        if save {
            SqlQuoteRepository::new(pool.clone())
                .save(quote.clone())
                .await
                .map_err(|error| ("db_write", error.to_string(), 4u8))?;
        }
        pool.close().await;
        Ok::<_, StepFailure>(quote)
    });

    match result {
        Ok(quote) => {
            let verb = if save { "priced and saved" } else { "priced" };
            let message =
                format!("quote {} {verb}: final price {}", quote.id().0, quote.pricing.final_price);
            match serde_json::to_value(&quote) {
                Ok(data) => CommandResult::success_with_data("price", message, Some(data)),
                Err(error) => CommandResult::failure("price", "serialization", error.to_string(), 8),
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("price", error_class, message, exit_code)
        }
    }
}

fn assembly_failure(error: AssemblyError) -> StepFailure {
    match error {
        AssemblyError::InvalidMeasurements(issues) => {
            let details = issues
                .iter()
                .map(|issue| format!("{}: {}", issue.field, issue.message))
                .collect::<Vec<_>>();
            ("invalid_measurements", details.join("; "), 7u8)
        }
        AssemblyError::Pricing(error) => ("pricing", error.to_string(), 7u8),
    }
}
