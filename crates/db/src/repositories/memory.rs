use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use paintquote_core::domain::company::{Company, CompanyDefaults, CompanyId, PaintProduct};
use paintquote_core::domain::quote::{Quote, QuoteId};
use paintquote_core::intake::setup::SetupOutcome;

use super::{CompanyRepository, QuoteRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryQuoteRepository {
    quotes: RwLock<HashMap<String, Quote>>,
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        Ok(quotes.get(&id.0).cloned())
    }

    async fn save(&self, quote: Quote) -> Result<(), RepositoryError> {
        let mut quotes = self.quotes.write().await;
        quotes.insert(quote.id().0.clone(), quote);
        Ok(())
    }

    async fn list_for_company(
        &self,
        company_id: CompanyId,
        limit: u32,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        let mut listed: Vec<Quote> = quotes
            .values()
            .filter(|quote| quote.metadata.company_id == company_id)
            .cloned()
            .collect();
        listed.sort_by(|a, b| {
            b.metadata
                .created_at
                .cmp(&a.metadata.created_at)
                .then_with(|| b.id().0.cmp(&a.id().0))
        });
        listed.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(listed)
    }
}

#[derive(Default)]
struct CompanyEntry {
    company: Option<Company>,
    defaults: Option<CompanyDefaults>,
    preferences: BTreeMap<String, String>,
    products: Vec<PaintProduct>,
}

#[derive(Default)]
pub struct InMemoryCompanyRepository {
    companies: RwLock<HashMap<CompanyId, CompanyEntry>>,
}

impl InMemoryCompanyRepository {
    /// Repository pre-loaded with one company and its defaults.
    pub fn with_company(company: Company, defaults: Option<CompanyDefaults>) -> Self {
        let mut companies = HashMap::new();
        companies.insert(
            company.id,
            CompanyEntry { company: Some(company), defaults, ..CompanyEntry::default() },
        );
        Self { companies: RwLock::new(companies) }
    }
}

#[async_trait::async_trait]
impl CompanyRepository for InMemoryCompanyRepository {
    async fn find_company(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id).and_then(|entry| entry.company.clone()))
    }

    async fn save_company(&self, company: Company) -> Result<(), RepositoryError> {
        let id = company.id;
        let mut companies = self.companies.write().await;
        companies.entry(id).or_default().company = Some(company);
        Ok(())
    }

    async fn load_defaults(
        &self,
        id: CompanyId,
    ) -> Result<Option<CompanyDefaults>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id).and_then(|entry| entry.defaults.clone()))
    }

    async fn save_defaults(&self, defaults: &CompanyDefaults) -> Result<(), RepositoryError> {
        let mut companies = self.companies.write().await;
        let entry = companies
            .get_mut(&defaults.company_id)
            .filter(|entry| entry.company.is_some())
            .ok_or(RepositoryError::UnknownCompany(defaults.company_id))?;
        entry.defaults = Some(defaults.clone());
        Ok(())
    }

    async fn list_preferences(
        &self,
        id: CompanyId,
    ) -> Result<BTreeMap<String, String>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id).map(|entry| entry.preferences.clone()).unwrap_or_default())
    }

    async fn list_products(&self, id: CompanyId) -> Result<Vec<PaintProduct>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id).map(|entry| entry.products.clone()).unwrap_or_default())
    }

    async fn save_setup(&self, outcome: &SetupOutcome) -> Result<(), RepositoryError> {
        let company_id = outcome.company_defaults.company_id;
        let mut companies = self.companies.write().await;
        let entry = companies
            .get_mut(&company_id)
            .filter(|entry| entry.company.is_some())
            .ok_or(RepositoryError::UnknownCompany(company_id))?;

        entry.preferences.extend(outcome.preferences.clone());
        for product in &outcome.products {
            match entry.products.iter_mut().find(|existing| {
                existing.category == product.category && existing.exposure == product.exposure
            }) {
                Some(existing) => *existing = product.clone(),
                None => entry.products.push(product.clone()),
            }
        }
        entry.defaults = Some(outcome.company_defaults.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use paintquote_core::domain::company::{Company, CompanyDefaults, CompanyId};

    use super::InMemoryCompanyRepository;
    use crate::repositories::{CompanyRepository, RepositoryError};

    #[tokio::test]
    async fn defaults_need_an_existing_company() {
        let repo = InMemoryCompanyRepository::default();
        let error = repo
            .save_defaults(&CompanyDefaults::unconfigured(CompanyId(3)))
            .await
            .expect_err("unknown company");
        assert!(matches!(error, RepositoryError::UnknownCompany(CompanyId(3))));

        repo.save_company(Company { id: CompanyId(3), name: "Coat & Co".to_owned() })
            .await
            .expect("company");
        repo.save_defaults(&CompanyDefaults::unconfigured(CompanyId(3))).await.expect("defaults");
        assert!(repo.load_defaults(CompanyId(3)).await.expect("load").is_some());
    }

    #[tokio::test]
    async fn preloaded_company_is_found() {
        let repo = InMemoryCompanyRepository::with_company(
            Company { id: CompanyId(1), name: "Brightline Painting".to_owned() },
            None,
        );
        let company = repo.find_company(CompanyId(1)).await.expect("find").expect("present");
        assert_eq!(company.name, "Brightline Painting");
        assert!(repo.list_products(CompanyId(1)).await.expect("products").is_empty());
    }

    #[tokio::test]
    async fn saving_a_company_again_keeps_its_defaults() {
        let repo = InMemoryCompanyRepository::with_company(
            Company { id: CompanyId(5), name: "Old Name".to_owned() },
            Some(CompanyDefaults::unconfigured(CompanyId(5))),
        );
        repo.save_company(Company { id: CompanyId(5), name: "New Name".to_owned() })
            .await
            .expect("rename");

        let company = repo.find_company(CompanyId(5)).await.expect("find").expect("present");
        assert_eq!(company.name, "New Name");
        assert!(repo.load_defaults(CompanyId(5)).await.expect("load").is_some());
    }
}
