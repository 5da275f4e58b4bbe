//! Lineage record producers for a PGSpider node.
//!
//! [`MultiTenantLineageSource`] pairs every multi-tenant table with its child
//! tables and resolves a synthesized `INSERT INTO parent SELECT * FROM child;`
//! per pair. [`QueryLogLineageSource`] resolves captured statements instead.
//! Both yield requests lazily: nothing touches the database until the first
//! item is pulled.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::vec;

use crate::catalog::{CatalogConnection, ConnectionProvider};
use crate::models::{AddLineageRequest, LoggedQuery, MultiTenantTable};
use crate::queries::{
    PGSPIDER_GET_CHILD_TABLES, PGSPIDER_GET_MULTI_TENANT_TABLES, PGSPIDER_GET_QUERY_LOG,
};
use crate::resolver::{Dialect, LineageQuery, LineageResolver};

/// Which producer a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageStrategy {
    #[default]
    MultiTenant,
    QueryLog,
}

/// Boxed stream of lineage results, whatever the strategy.
pub type LineageRecords<'a> = Box<dyn Iterator<Item = Result<AddLineageRequest>> + 'a>;

/// The statement handed to the resolver for one parent/child pair.
pub fn insert_select_statement(parent: &str, child: &str) -> String {
    format!("INSERT INTO {} SELECT * FROM {};", parent, child)
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

pub struct MultiTenantLineageSource<P, R> {
    provider: P,
    resolver: R,
    service_name: String,
    dialect: Dialect,
}

impl<P: ConnectionProvider, R: LineageResolver> MultiTenantLineageSource<P, R> {
    pub fn new(provider: P, resolver: R, service_name: impl Into<String>) -> Self {
        Self {
            provider,
            resolver,
            service_name: service_name.into(),
            dialect: Dialect::Postgres,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Multi-tenant tables on the node, over one scoped connection.
    pub fn list_multi_tenant_tables(&self) -> Result<Vec<MultiTenantTable>> {
        let mut conn = self.provider.connect()?;
        let tables = conn.load_multi_tenant_tables(PGSPIDER_GET_MULTI_TENANT_TABLES)?;
        tracing::info!("Found {} multi-tenant tables", tables.len());
        Ok(tables)
    }

    /// Child table names of `multi_tenant_table`, in catalog order.
    pub fn list_child_tables(&self, multi_tenant_table: &str) -> Result<Vec<String>> {
        let mut conn = self.provider.connect()?;
        let rows = conn.load_child_tables(PGSPIDER_GET_CHILD_TABLES, multi_tenant_table)?;

        let mut child_tables = Vec::with_capacity(rows.len());
        for row in rows {
            if row.relname.is_empty() {
                tracing::warn!(
                    "Skipping unnamed child table of {}",
                    multi_tenant_table
                );
                continue;
            }
            child_tables.push(row.relname);
        }
        tracing::info!("{}: {:?}", multi_tenant_table, child_tables);
        Ok(child_tables)
    }

    /// Lazily resolve every parent/child pair.
    pub fn lineage_requests(&self) -> MultiTenantRequests<'_, P, R> {
        MultiTenantRequests {
            source: self,
            parents: None,
            current: None,
            pending: Vec::new().into_iter(),
            done: false,
        }
    }

    fn resolve_pair(
        &self,
        parent: &MultiTenantTable,
        child: &str,
    ) -> Result<Vec<AddLineageRequest>> {
        if !is_plain_identifier(&parent.relname) || !is_plain_identifier(child) {
            tracing::warn!(
                "Table names {:?} / {:?} are not plain identifiers; synthesized SQL may not parse",
                parent.relname,
                child
            );
        }
        let sql = insert_select_statement(&parent.relname, child);
        tracing::info!("{}", sql);

        let lineages = self
            .resolver
            .resolve(&LineageQuery {
                sql: &sql,
                service_name: &self.service_name,
                database_name: &parent.database,
                schema_name: Some(&parent.nspname),
                dialect: self.dialect,
            })
            .with_context(|| format!("Failed to resolve lineage for: {}", sql))?;
        Ok(lineages.unwrap_or_default())
    }
}

/// Iterator returned by [`MultiTenantLineageSource::lineage_requests`].
///
/// An `Err` item covers one failed step: the parent listing (ends the
/// iteration), one parent's child listing (skips that parent) or one pair's
/// resolution (skips that pair).
pub struct MultiTenantRequests<'a, P, R> {
    source: &'a MultiTenantLineageSource<P, R>,
    parents: Option<vec::IntoIter<MultiTenantTable>>,
    current: Option<(MultiTenantTable, vec::IntoIter<String>)>,
    pending: vec::IntoIter<AddLineageRequest>,
    done: bool,
}

impl<P: ConnectionProvider, R: LineageResolver> Iterator for MultiTenantRequests<'_, P, R> {
    type Item = Result<AddLineageRequest>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(request) = self.pending.next() {
                return Some(Ok(request));
            }
            if self.done {
                return None;
            }

            if let Some((parent, children)) = self.current.as_mut() {
                if let Some(child) = children.next() {
                    match self.source.resolve_pair(parent, &child) {
                        Ok(requests) => {
                            self.pending = requests.into_iter();
                            continue;
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
                self.current = None;
            }

            if self.parents.is_none() {
                match self.source.list_multi_tenant_tables() {
                    Ok(tables) => self.parents = Some(tables.into_iter()),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }

            let Some(parent) = self.parents.as_mut().and_then(Iterator::next) else {
                self.done = true;
                return None;
            };
            match self.source.list_child_tables(&parent.relname) {
                Ok(children) => self.current = Some((parent, children.into_iter())),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Lineage from statements captured by `pg_stat_statements`.
pub struct QueryLogLineageSource<P, R> {
    provider: P,
    resolver: R,
    service_name: String,
    dialect: Dialect,
    limit: i64,
}

impl<P: ConnectionProvider, R: LineageResolver> QueryLogLineageSource<P, R> {
    pub fn new(provider: P, resolver: R, service_name: impl Into<String>, limit: i64) -> Self {
        Self {
            provider,
            resolver,
            service_name: service_name.into(),
            dialect: Dialect::Postgres,
            limit,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn list_logged_queries(&self) -> Result<Vec<LoggedQuery>> {
        let mut conn = self.provider.connect()?;
        let queries = conn.load_logged_queries(PGSPIDER_GET_QUERY_LOG, self.limit)?;
        tracing::info!("Read {} logged queries", queries.len());
        Ok(queries)
    }

    /// Lazily resolve every logged query. The log is read on the first pull.
    pub fn lineage_requests<'a>(&'a self) -> LineageRecords<'a> {
        Box::new(
            std::iter::once_with(move || self.list_logged_queries()).flat_map(
                move |listing| -> LineageRecords<'a> {
                    match listing {
                        Ok(queries) => Box::new(
                            queries
                                .into_iter()
                                .flat_map(move |logged| self.resolve_logged(&logged)),
                        ),
                        Err(e) => Box::new(std::iter::once(Err(e))),
                    }
                },
            ),
        )
    }

    fn resolve_logged(&self, logged: &LoggedQuery) -> Vec<Result<AddLineageRequest>> {
        // Schema filtering is not available from the statement log.
        let resolved = self
            .resolver
            .resolve(&LineageQuery {
                sql: &logged.query_text,
                service_name: &self.service_name,
                database_name: &logged.database_name,
                schema_name: None,
                dialect: self.dialect,
            })
            .with_context(|| format!("Failed to resolve lineage for: {}", logged.query_text));
        match resolved {
            Ok(requests) => requests.unwrap_or_default().into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        }
    }
}

/// Either producer behind one interface.
pub enum LineageSource<P, R> {
    MultiTenant(MultiTenantLineageSource<P, R>),
    QueryLog(QueryLogLineageSource<P, R>),
}

impl<P: ConnectionProvider, R: LineageResolver> LineageSource<P, R> {
    pub fn new(
        strategy: LineageStrategy,
        provider: P,
        resolver: R,
        service_name: &str,
        dialect: Dialect,
        query_log_limit: i64,
    ) -> Self {
        match strategy {
            LineageStrategy::MultiTenant => LineageSource::MultiTenant(
                MultiTenantLineageSource::new(provider, resolver, service_name)
                    .with_dialect(dialect),
            ),
            LineageStrategy::QueryLog => LineageSource::QueryLog(
                QueryLogLineageSource::new(provider, resolver, service_name, query_log_limit)
                    .with_dialect(dialect),
            ),
        }
    }

    pub fn records(&self) -> LineageRecords<'_> {
        match self {
            LineageSource::MultiTenant(source) => Box::new(source.lineage_requests()),
            LineageSource::QueryLog(source) => source.lineage_requests(),
        }
    }
}

/// Pull every record, handing successful ones to `sink`.
///
/// Failed items (and sink failures) are logged and counted; the pass goes on.
pub fn drain<F>(records: LineageRecords<'_>, mut sink: F) -> usize
where
    F: FnMut(AddLineageRequest) -> Result<()>,
{
    let mut failed = 0;
    for record in records {
        if let Err(e) = record.and_then(&mut sink) {
            tracing::error!("{:#}", e);
            failed += 1;
        }
    }
    failed
}
