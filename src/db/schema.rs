//! Database schema definitions
//!
//! The ingestion pipeline owns these tables. They are only created here when
//! `database.create_schema` is set, for local development and tests.

use crate::query::ident::{Ident, TableNames};

pub fn create_statements(schema: &Ident, tables: &TableNames) -> Vec<String> {
    let TableNames {
        overview,
        attack,
        backrun,
    } = tables;

    vec![
        format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {overview} (
    block_number BIGINT PRIMARY KEY,
    has_sandwich BOOLEAN NOT NULL DEFAULT FALSE,
    block_time TIMESTAMPTZ NOT NULL,
    label_kind TEXT,                 -- 'builder' | 'bribe' | NULL
    builder_name TEXT,
    bribe_name TEXT,
    validator_name TEXT,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#
        ),
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {attack} (
    id BIGINT PRIMARY KEY,
    block_number BIGINT NOT NULL REFERENCES {overview} (block_number),
    block_time TIMESTAMPTZ NOT NULL,
    front_tx_hash TEXT NOT NULL,
    front_to TEXT,
    victim_tx_hash TEXT NOT NULL,
    victim_to TEXT,
    profit_amount NUMERIC(78, 0) NOT NULL DEFAULT 0 CHECK (profit_amount >= 0),
    profit_token TEXT,
    is_bundle BOOLEAN NOT NULL DEFAULT FALSE,
    bundle_size INTEGER
)
"#
        ),
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {backrun} (
    attack_id BIGINT NOT NULL REFERENCES {attack} (id),
    tx_hash TEXT,
    seq INTEGER NOT NULL DEFAULT 0
)
"#
        ),
        // Range scans for totals, breakdown and series
        format!("CREATE INDEX IF NOT EXISTS idx_overview_time ON {overview} (block_time)"),
        format!("CREATE INDEX IF NOT EXISTS idx_overview_builder_time ON {overview} (builder_name, block_time)"),
        // Matched-block CTE and listings
        format!("CREATE INDEX IF NOT EXISTS idx_attack_time ON {attack} (block_time)"),
        format!("CREATE INDEX IF NOT EXISTS idx_attack_block ON {attack} (block_number)"),
        format!("CREATE INDEX IF NOT EXISTS idx_backrun_attack ON {backrun} (attack_id, seq)"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_use_qualified_names() {
        let tables = TableNames::with_schema("mev").unwrap();
        let statements = create_statements(&Ident::new("mev").unwrap(), &tables);
        assert_eq!(statements[0], "CREATE SCHEMA IF NOT EXISTS \"mev\"");
        assert!(statements[2].contains("REFERENCES \"mev\".\"block_overview\" (block_number)"));
        assert!(statements.iter().skip(1).all(|s| s.contains("\"mev\".")));
    }
}
