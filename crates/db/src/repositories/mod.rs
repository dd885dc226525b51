use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use paintquote_core::domain::company::{Company, CompanyDefaults, CompanyId, PaintProduct};
use paintquote_core::domain::quote::{Quote, QuoteId};
use paintquote_core::intake::setup::SetupOutcome;

pub mod company;
pub mod memory;
pub mod quote;

pub use company::SqlCompanyRepository;
pub use memory::{InMemoryCompanyRepository, InMemoryQuoteRepository};
pub use quote::SqlQuoteRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("company {0} does not exist")]
    UnknownCompany(CompanyId),
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError>;
    async fn save(&self, quote: Quote) -> Result<(), RepositoryError>;
    /// Newest first.
    async fn list_for_company(
        &self,
        company_id: CompanyId,
        limit: u32,
    ) -> Result<Vec<Quote>, RepositoryError>;
}

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn find_company(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError>;
    async fn save_company(&self, company: Company) -> Result<(), RepositoryError>;
    async fn load_defaults(&self, id: CompanyId)
        -> Result<Option<CompanyDefaults>, RepositoryError>;
    async fn save_defaults(&self, defaults: &CompanyDefaults) -> Result<(), RepositoryError>;
    async fn list_preferences(
        &self,
        id: CompanyId,
    ) -> Result<BTreeMap<String, String>, RepositoryError>;
    async fn list_products(&self, id: CompanyId) -> Result<Vec<PaintProduct>, RepositoryError>;
    /// Writes preferences, products and defaults of a finished setup together.
    async fn save_setup(&self, outcome: &SetupOutcome) -> Result<(), RepositoryError>;
}
