//! Database module

mod schema;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{Arguments, PgPool};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error;
use crate::query::ident::{Ident, TableNames};
use crate::query::params::{Query, SqlParams, SqlValue};
use crate::store::{
    BreakdownRow, BuilderTotalsRow, ProfitRow, SandwichRow, SandwichStore, SeriesRow, TotalsRow,
};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables the engine reads, if they do not exist yet.
    pub async fn run_migrations(&self, schema: &Ident, tables: &TableNames) -> Result<()> {
        for statement in schema::create_statements(schema, tables) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        info!("Schema {} ready", schema);
        Ok(())
    }
}

/// Bind every parameter, in order, for a Postgres statement.
fn arguments(params: &SqlParams) -> error::Result<PgArguments> {
    let mut args = PgArguments::default();
    for value in params.iter() {
        let added = match value {
            SqlValue::BigInt(v) => args.add(*v),
            SqlValue::Text(v) => args.add(v.clone()),
            SqlValue::TextArray(v) => args.add(v.clone()),
            SqlValue::Timestamp(v) => args.add(*v),
        };
        added.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

#[async_trait]
impl SandwichStore for Database {
    async fn fetch_totals(&self, query: &Query) -> error::Result<TotalsRow> {
        let row = sqlx::query_as_with::<_, TotalsRow, _>(query.sql(), arguments(query.params())?)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn fetch_builder_totals(&self, query: &Query) -> error::Result<BuilderTotalsRow> {
        let row = sqlx::query_as_with::<_, BuilderTotalsRow, _>(query.sql(), arguments(query.params())?)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn fetch_breakdown(&self, query: &Query) -> error::Result<Vec<BreakdownRow>> {
        let rows = sqlx::query_as_with::<_, BreakdownRow, _>(query.sql(), arguments(query.params())?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_profit(&self, query: &Query) -> error::Result<Vec<ProfitRow>> {
        let rows = sqlx::query_as_with::<_, ProfitRow, _>(query.sql(), arguments(query.params())?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_names(&self, query: &Query) -> error::Result<Vec<String>> {
        let rows = sqlx::query_scalar_with::<_, String, _>(query.sql(), arguments(query.params())?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_series(&self, query: &Query) -> error::Result<Vec<SeriesRow>> {
        let rows = sqlx::query_as_with::<_, SeriesRow, _>(query.sql(), arguments(query.params())?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_sandwiches(&self, query: &Query) -> error::Result<Vec<SandwichRow>> {
        let rows = sqlx::query_as_with::<_, SandwichRow, _>(query.sql(), arguments(query.params())?)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_count(&self, query: &Query) -> error::Result<i64> {
        let count = sqlx::query_scalar_with::<_, i64, _>(query.sql(), arguments(query.params())?)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
