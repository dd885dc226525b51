use sqlx::Row;

use paintquote_core::domain::company::CompanyId;
use paintquote_core::domain::quote::{Quote, QuoteId};

use super::{QuoteRepository, RepositoryError};
use crate::DbPool;

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn enum_str<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    match serde_json::to_value(value).map_err(|e| RepositoryError::Decode(e.to_string()))? {
        serde_json::Value::String(text) => Ok(text),
        other => Err(RepositoryError::Decode(format!("expected a string tag, got {other}"))),
    }
}

fn row_to_quote(row: &sqlx::sqlite::SqliteRow) -> Result<Quote, RepositoryError> {
    let payload: String =
        row.try_get("payload_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    serde_json::from_str(&payload).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM quote WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_quote(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, quote: Quote) -> Result<(), RepositoryError> {
        let payload =
            serde_json::to_string(&quote).map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let metadata = &quote.metadata;

        sqlx::query(
            "INSERT INTO quote (id, company_id, status, customer_name, created_by, creation_method,
                                final_price, payload_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 customer_name = excluded.customer_name,
                 final_price = excluded.final_price,
                 payload_json = excluded.payload_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&metadata.quote_id.0)
        .bind(metadata.company_id.0)
        .bind(metadata.status.as_str())
        .bind(&quote.customer.name)
        .bind(enum_str(&metadata.created_by)?)
        .bind(enum_str(&metadata.creation_method)?)
        .bind(quote.pricing.final_price.to_string())
        .bind(&payload)
        .bind(metadata.created_at.to_rfc3339())
        .bind(metadata.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_company(
        &self,
        company_id: CompanyId,
        limit: u32,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT payload_json FROM quote
             WHERE company_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(company_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_quote).collect::<Result<Vec<_>, _>>()
    }
}
