//! Table-level lineage for PGSpider.
//!
//! A multi-tenant table in PGSpider unions rows from child foreign tables.
//! For every (multi-tenant table, child table) pair this crate synthesizes
//! `INSERT INTO parent SELECT * FROM child;` and resolves it into
//! [`AddLineageRequest`]s, lazily, through injected catalog and resolver
//! capabilities.

pub mod catalog;
pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod queries;
pub mod resolver;
pub mod schema;
pub mod server;
pub mod source;

use anyhow::{Context, Result};

pub use catalog::{CatalogConnection, ConnectionProvider, PgConnectionProvider};
pub use models::{AddLineageRequest, MultiTenantTable};
pub use resolver::{Dialect, LineageQuery, LineageResolver, SqlLineageResolver};
pub use source::{
    drain, insert_select_statement, LineageRecords, LineageSource, LineageStrategy,
    MultiTenantLineageSource, QueryLogLineageSource,
};

/// Wire the configured strategy to a pooled PGSpider connection and the
/// sqlparser resolver.
pub fn build_source(
    config: &config::AppConfig,
) -> Result<LineageSource<PgConnectionProvider, SqlLineageResolver>> {
    let source = &config.source;
    let pool = catalog::create_pool(&config.source_url(), source.pool_size as u32)
        .context("Failed to create PGSpider connection pool")?;
    tracing::info!(
        "PGSpider pool created for service {} ({:?} strategy, {} dialect)",
        source.service_name,
        source.strategy,
        source.dialect
    );

    Ok(LineageSource::new(
        source.strategy,
        PgConnectionProvider::new(pool),
        SqlLineageResolver,
        &source.service_name,
        source.dialect,
        source.query_log_limit,
    ))
}
