use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, Pool, PooledConnection};
use diesel::sql_types::{BigInt, Text};

use crate::models::{ChildTable, LoggedQuery, MultiTenantTable};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

/// Create database connection pool with configurable size
pub fn create_pool(database_url: &str, max_size: u32) -> Result<DbPool, r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().max_size(max_size).build(manager)
}

/// A scoped connection to the PGSpider catalog. Dropping it releases it.
pub trait CatalogConnection {
    fn load_multi_tenant_tables(&mut self, sql: &str) -> Result<Vec<MultiTenantTable>>;

    /// `sql` takes the multi-tenant table name as its only bind parameter.
    fn load_child_tables(&mut self, sql: &str, multi_tenant_table: &str)
        -> Result<Vec<ChildTable>>;

    /// `sql` takes the row limit as its only bind parameter.
    fn load_logged_queries(&mut self, sql: &str, limit: i64) -> Result<Vec<LoggedQuery>>;
}

/// Hands out scoped catalog connections.
pub trait ConnectionProvider {
    type Connection: CatalogConnection;

    fn connect(&self) -> Result<Self::Connection>;
}

#[derive(Clone)]
pub struct PgConnectionProvider {
    pool: DbPool,
}

impl PgConnectionProvider {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl ConnectionProvider for PgConnectionProvider {
    type Connection = DbConn;

    fn connect(&self) -> Result<DbConn> {
        self.pool
            .get()
            .context("Failed to get catalog connection from pool")
    }
}

impl CatalogConnection for DbConn {
    fn load_multi_tenant_tables(&mut self, sql: &str) -> Result<Vec<MultiTenantTable>> {
        diesel::sql_query(sql)
            .load::<MultiTenantTable>(&mut **self)
            .context("Failed to list multi-tenant tables")
    }

    fn load_child_tables(
        &mut self,
        sql: &str,
        multi_tenant_table: &str,
    ) -> Result<Vec<ChildTable>> {
        diesel::sql_query(sql)
            .bind::<Text, _>(multi_tenant_table)
            .load::<ChildTable>(&mut **self)
            .with_context(|| format!("Failed to list child tables of {}", multi_tenant_table))
    }

    fn load_logged_queries(&mut self, sql: &str, limit: i64) -> Result<Vec<LoggedQuery>> {
        diesel::sql_query(sql)
            .bind::<BigInt, _>(limit)
            .load::<LoggedQuery>(&mut **self)
            .context("Failed to read query log")
    }
}
