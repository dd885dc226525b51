use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use paintquote_core::domain::company::{
    Company, CompanyDefaults, CompanyId, MaterialCost, PaintCategory, PaintProduct,
};
use paintquote_core::domain::product::Exposure;
use paintquote_core::intake::setup::SetupOutcome;

use super::{CompanyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCompanyRepository {
    pool: DbPool,
}

impl SqlCompanyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("{column} `{raw}` is not a decimal: {e}")))
}

fn optional_decimal(column: &str, raw: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    raw.map(|raw| decimal(column, &raw)).transpose()
}

fn row_to_defaults(
    company_id: CompanyId,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<CompanyDefaults, RepositoryError> {
    let markup: String = decode(row, "markup_percentage")?;
    let tax_rate: String = decode(row, "tax_rate")?;
    let model_json: String = decode(row, "material_model_json")?;
    let materials_json: String = decode(row, "materials_json")?;

    Ok(CompanyDefaults {
        company_id,
        walls_rate: optional_decimal("walls_rate", decode(row, "walls_rate")?)?,
        ceilings_rate: optional_decimal("ceilings_rate", decode(row, "ceilings_rate")?)?,
        trim_rate: optional_decimal("trim_rate", decode(row, "trim_rate")?)?,
        markup_percentage: decimal("markup_percentage", &markup)?,
        tax_rate: decimal("tax_rate", &tax_rate)?,
        tax_on_materials_only: decode::<i64>(row, "tax_on_materials_only")? != 0,
        material_model: serde_json::from_str(&model_json)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        materials: serde_json::from_str(&materials_json)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
    })
}

fn row_to_product(
    company_id: CompanyId,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<PaintProduct, RepositoryError> {
    let category: String = decode(row, "category")?;
    let exposure: String = decode(row, "exposure")?;
    let cost_per_gallon: String = decode(row, "cost_per_gallon")?;
    let spread_rate: String = decode(row, "spread_rate")?;

    Ok(PaintProduct {
        company_id,
        category: PaintCategory::parse(&category)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown paint category `{category}`")))?,
        exposure: Exposure::parse(&exposure)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown exposure `{exposure}`")))?,
        brand: decode(row, "brand")?,
        name: decode(row, "name")?,
        cost: MaterialCost {
            cost_per_gallon: decimal("cost_per_gallon", &cost_per_gallon)?,
            spread_rate: decimal("spread_rate", &spread_rate)?,
        },
    })
}

const UPSERT_DEFAULTS: &str =
    "INSERT INTO company_defaults (company_id, walls_rate, ceilings_rate, trim_rate,
                                   markup_percentage, tax_rate, tax_on_materials_only,
                                   material_model_json, materials_json, updated_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(company_id) DO UPDATE SET
         walls_rate = excluded.walls_rate,
         ceilings_rate = excluded.ceilings_rate,
         trim_rate = excluded.trim_rate,
         markup_percentage = excluded.markup_percentage,
         tax_rate = excluded.tax_rate,
         tax_on_materials_only = excluded.tax_on_materials_only,
         material_model_json = excluded.material_model_json,
         materials_json = excluded.materials_json,
         updated_at = excluded.updated_at";

struct DefaultsRow {
    company_id: i64,
    walls_rate: Option<String>,
    ceilings_rate: Option<String>,
    trim_rate: Option<String>,
    markup_percentage: String,
    tax_rate: String,
    tax_on_materials_only: bool,
    material_model_json: String,
    materials_json: String,
}

impl DefaultsRow {
    fn encode(defaults: &CompanyDefaults) -> Result<Self, RepositoryError> {
        Ok(Self {
            company_id: defaults.company_id.0,
            walls_rate: defaults.walls_rate.map(|rate| rate.to_string()),
            ceilings_rate: defaults.ceilings_rate.map(|rate| rate.to_string()),
            trim_rate: defaults.trim_rate.map(|rate| rate.to_string()),
            markup_percentage: defaults.markup_percentage.to_string(),
            tax_rate: defaults.tax_rate.to_string(),
            tax_on_materials_only: defaults.tax_on_materials_only,
            material_model_json: serde_json::to_string(&defaults.material_model)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            materials_json: serde_json::to_string(&defaults.materials)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        })
    }
}

async fn ensure_company<'e, E>(executor: E, id: CompanyId) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query("SELECT id FROM company WHERE id = ?")
        .bind(id.0)
        .fetch_optional(executor)
        .await?;
    match row {
        Some(_) => Ok(()),
        None => Err(RepositoryError::UnknownCompany(id)),
    }
}

#[async_trait::async_trait]
impl CompanyRepository for SqlCompanyRepository {
    async fn find_company(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError> {
        let row = sqlx::query("SELECT id, name FROM company WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(Company { id, name: decode(r, "name")? })),
            None => Ok(None),
        }
    }

    async fn save_company(&self, company: Company) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO company (id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(company.id.0)
        .bind(&company.name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_defaults(
        &self,
        id: CompanyId,
    ) -> Result<Option<CompanyDefaults>, RepositoryError> {
        let row = sqlx::query(
            "SELECT walls_rate, ceilings_rate, trim_rate, markup_percentage, tax_rate,
                    tax_on_materials_only, material_model_json, materials_json
             FROM company_defaults WHERE company_id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_defaults(id, r)?)),
            None => Ok(None),
        }
    }

    async fn save_defaults(&self, defaults: &CompanyDefaults) -> Result<(), RepositoryError> {
        ensure_company(&self.pool, defaults.company_id).await?;
        let row = DefaultsRow::encode(defaults)?;
        sqlx::query(UPSERT_DEFAULTS)
            .bind(row.company_id)
            .bind(&row.walls_rate)
            .bind(&row.ceilings_rate)
            .bind(&row.trim_rate)
            .bind(&row.markup_percentage)
            .bind(&row.tax_rate)
            .bind(row.tax_on_materials_only)
            .bind(&row.material_model_json)
            .bind(&row.materials_json)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_preferences(
        &self,
        id: CompanyId,
    ) -> Result<BTreeMap<String, String>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT pref_key, pref_value FROM company_preference WHERE company_id = ?",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let key: String = decode(row, "pref_key")?;
                let value: String = decode(row, "pref_value")?;
                Ok::<_, RepositoryError>((key, value))
            })
            .collect()
    }

    async fn list_products(&self, id: CompanyId) -> Result<Vec<PaintProduct>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT category, exposure, brand, name, cost_per_gallon, spread_rate
             FROM paint_product WHERE company_id = ?
             ORDER BY id ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| row_to_product(id, row)).collect::<Result<Vec<_>, _>>()
    }

    async fn save_setup(&self, outcome: &SetupOutcome) -> Result<(), RepositoryError> {
        let company_id = outcome.company_defaults.company_id;
        let now = Utc::now().to_rfc3339();
        let defaults = DefaultsRow::encode(&outcome.company_defaults)?;

        let mut tx = self.pool.begin().await?;
        ensure_company(&mut *tx, company_id).await?;

        for (key, value) in &outcome.preferences {
            sqlx::query(
                "INSERT INTO company_preference (company_id, pref_key, pref_value, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(company_id, pref_key) DO UPDATE SET
                     pref_value = excluded.pref_value,
                     updated_at = excluded.updated_at",
            )
            .bind(company_id.0)
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        for product in &outcome.products {
            sqlx::query(
                "INSERT INTO paint_product (company_id, category, exposure, brand, name,
                                            cost_per_gallon, spread_rate, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(company_id, category, exposure) DO UPDATE SET
                     brand = excluded.brand,
                     name = excluded.name,
                     cost_per_gallon = excluded.cost_per_gallon,
                     spread_rate = excluded.spread_rate,
                     updated_at = excluded.updated_at",
            )
            .bind(company_id.0)
            .bind(product.category.as_str())
            .bind(product.exposure.as_str())
            .bind(&product.brand)
            .bind(&product.name)
            .bind(product.cost.cost_per_gallon.to_string())
            .bind(product.cost.spread_rate.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(UPSERT_DEFAULTS)
            .bind(defaults.company_id)
            .bind(&defaults.walls_rate)
            .bind(&defaults.ceilings_rate)
            .bind(&defaults.trim_rate)
            .bind(&defaults.markup_percentage)
            .bind(&defaults.tax_rate)
            .bind(defaults.tax_on_materials_only)
            .bind(&defaults.material_model_json)
            .bind(&defaults.materials_json)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use paintquote_core::domain::company::{
        Company, CompanyDefaults, CompanyId, MaterialCost, MaterialModel, PaintCategory,
    };
    use paintquote_core::domain::product::{Exposure, PaintTier};
    use paintquote_core::intake::setup::SetupOutcome;
    use paintquote_core::intake::state::{FieldDelta, PartialState};

    use super::SqlCompanyRepository;
    use crate::repositories::{CompanyRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlCompanyRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlCompanyRepository::new(pool);
        repo.save_company(Company { id: CompanyId(7), name: "Brightline Painting".to_owned() })
            .await
            .expect("company");
        repo
    }

    #[tokio::test]
    async fn unknown_company_has_no_defaults() {
        let repo = repo().await;
        assert!(repo.find_company(CompanyId(99)).await.expect("find").is_none());
        assert!(repo.load_defaults(CompanyId(7)).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn defaults_round_trip_with_materials() {
        let repo = repo().await;
        let mut defaults = CompanyDefaults::unconfigured(CompanyId(7));
        defaults.walls_rate = Some(Decimal::new(325, 2));
        defaults.markup_percentage = Decimal::new(45, 0);
        defaults.tax_on_materials_only = true;
        defaults.material_model = MaterialModel::FixedFraction(Decimal::new(15, 2));
        defaults.set_material(
            PaintCategory::Wall,
            Exposure::Interior,
            Some(PaintTier::Premium),
            MaterialCost {
                cost_per_gallon: Decimal::new(8200, 2),
                spread_rate: Decimal::new(375, 0),
            },
        );

        repo.save_defaults(&defaults).await.expect("save");
        let loaded = repo.load_defaults(CompanyId(7)).await.expect("load").expect("present");

        assert_eq!(loaded, defaults);
    }

    #[tokio::test]
    async fn defaults_for_missing_company_are_refused() {
        let repo = repo().await;
        let error = repo
            .save_defaults(&CompanyDefaults::unconfigured(CompanyId(99)))
            .await
            .expect_err("unknown company");
        assert!(matches!(error, RepositoryError::UnknownCompany(CompanyId(99))));
    }

    #[tokio::test]
    async fn setup_outcome_persists_preferences_products_and_defaults() {
        let repo = repo().await;
        let mut delta = FieldDelta::default();
        delta.set_text("company.name", "Brightline Painting");
        delta.set_text("preferences.preferred_brand", "Sherwin-Williams");
        delta.set_text("preferences.project_focus", "interior");
        delta.set_number("rates.walls_rate", Decimal::new(300, 2));
        delta.set_number("rates.markup_percentage", Decimal::new(45, 0));
        delta.set_text("products.wall.name", "Duration Home");
        delta.set_number("products.wall.cost_per_gallon", Decimal::new(6599, 2));
        delta.set_number("products.wall.spread_rate", Decimal::new(350, 0));
        let state = PartialState::default().merged(&delta);
        let outcome = SetupOutcome::from_state(CompanyId(7), &state);

        repo.save_setup(&outcome).await.expect("save setup");
        // Saving twice replaces rather than duplicates.
        repo.save_setup(&outcome).await.expect("save setup again");

        let preferences = repo.list_preferences(CompanyId(7)).await.expect("preferences");
        assert_eq!(preferences, outcome.preferences);

        let products = repo.list_products(CompanyId(7)).await.expect("products");
        assert_eq!(products, outcome.products);

        let defaults = repo.load_defaults(CompanyId(7)).await.expect("load").expect("present");
        assert_eq!(defaults, outcome.company_defaults);
    }
}
