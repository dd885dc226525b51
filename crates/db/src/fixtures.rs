use sqlx::Executor;

use paintquote_core::domain::company::CompanyId;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Company id the demo seed writes.
pub const DEMO_COMPANY_ID: CompanyId = CompanyId(1);

const DEMO_PRODUCT_COUNT: i64 = 5;
const DEMO_PREFERENCE_COUNT: i64 = 2;

/// Demo painting company with configured rates, products and preferences.
///
/// Loading is idempotent: rows that already exist are left untouched.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_company.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            company_id: DEMO_COMPANY_ID,
            company_name: "Brightline Painting",
            products_seeded: DEMO_PRODUCT_COUNT as usize,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        let id = DEMO_COMPANY_ID.0;

        let company: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM company WHERE id = ?1)")
            .bind(id)
            .fetch_one(pool)
            .await?;
        checks.push(("company", company == 1));

        let defaults: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM company_defaults
                           WHERE company_id = ?1 AND walls_rate IS NOT NULL)",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        checks.push(("company-defaults", defaults == 1));

        let products: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM paint_product WHERE company_id = ?1")
                .bind(id)
                .fetch_one(pool)
                .await?;
        checks.push(("paint-products", products == DEMO_PRODUCT_COUNT));

        let preferences: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM company_preference WHERE company_id = ?1")
                .bind(id)
                .fetch_one(pool)
                .await?;
        checks.push(("company-preferences", preferences == DEMO_PREFERENCE_COUNT));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo company together with everything that cascades from it.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM quote WHERE company_id = ?1")
            .bind(DEMO_COMPANY_ID.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM company WHERE id = ?1")
            .bind(DEMO_COMPANY_ID.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub company_id: CompanyId,
    pub company_name: &'static str,
    pub products_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
