//! Query-to-lineage resolution.
//!
//! A [`LineageResolver`] turns one SQL text plus its naming context into zero
//! or more table-level [`AddLineageRequest`]s. [`SqlLineageResolver`] does this
//! locally with `sqlparser`.

use anyhow::{anyhow, bail, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    Ident, ObjectName, ObjectNamePart, Query, SetExpr, Statement, TableFactor, TableObject,
    TableWithJoins,
};
use sqlparser::dialect::{GenericDialect, HiveDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::models::AddLineageRequest;

/// SQL flavor used to parse a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Hive,
    Generic,
}

impl Dialect {
    fn parser_dialect(self) -> Box<dyn sqlparser::dialect::Dialect> {
        match self {
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
            Dialect::Hive => Box::new(HiveDialect {}),
            Dialect::Generic => Box::new(GenericDialect {}),
        }
    }

    /// Schema assumed for unqualified names when the caller gives none.
    fn default_schema(self) -> Option<&'static str> {
        match self {
            Dialect::Postgres => Some("public"),
            Dialect::Hive | Dialect::Generic => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::Hive => "hive",
            Dialect::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// One SQL text to resolve, with the context used to qualify its table names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineageQuery<'a> {
    pub sql: &'a str,
    pub service_name: &'a str,
    pub database_name: &'a str,
    pub schema_name: Option<&'a str>,
    pub dialect: Dialect,
}

pub trait LineageResolver {
    /// `Ok(None)` and `Ok(Some(vec![]))` both mean the query carries no lineage.
    fn resolve(&self, query: &LineageQuery<'_>) -> Result<Option<Vec<AddLineageRequest>>>;
}

impl<R: LineageResolver + ?Sized> LineageResolver for &R {
    fn resolve(&self, query: &LineageQuery<'_>) -> Result<Option<Vec<AddLineageRequest>>> {
        (**self).resolve(query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
struct TableKey {
    database: String,
    schema: String,
    table: String,
}

impl TableKey {
    fn fqn(&self, service_name: &str) -> String {
        format!(
            "{}.{}.{}.{}",
            service_name, self.database, self.schema, self.table
        )
    }
}

struct Scope<'a> {
    database: &'a str,
    schema: Option<&'a str>,
}

impl Scope<'_> {
    // Catalog names are exact, so identifiers are taken verbatim.
    fn ident(&self, ident: &Ident) -> String {
        ident.value.clone()
    }

    fn name_parts(&self, name: &ObjectName) -> Result<Vec<String>> {
        let mut parts: Vec<String> = Vec::with_capacity(name.0.len());
        for part in &name.0 {
            match part {
                ObjectNamePart::Identifier(ident) => parts.push(self.ident(ident)),
                #[allow(unreachable_patterns)]
                _ => bail!("Unsupported object name part in: {}", name),
            }
        }
        Ok(parts)
    }

    fn qualify(&self, name: &ObjectName) -> Result<TableKey> {
        let parts = self.name_parts(name)?;
        match parts.as_slice() {
            [table] => {
                let schema = self.schema.ok_or_else(|| {
                    anyhow!("Unqualified table name '{}' without schema context", table)
                })?;
                Ok(TableKey {
                    database: self.database.to_string(),
                    schema: schema.to_string(),
                    table: table.clone(),
                })
            }
            [schema, table] => Ok(TableKey {
                database: self.database.to_string(),
                schema: schema.clone(),
                table: table.clone(),
            }),
            [database, schema, table] => Ok(TableKey {
                database: database.clone(),
                schema: schema.clone(),
                table: table.clone(),
            }),
            _ => bail!("Unsupported multipart object name: {}", name),
        }
    }
}

/// Table-level lineage for `INSERT ... SELECT`, CTAS and `CREATE VIEW`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlLineageResolver;

impl LineageResolver for SqlLineageResolver {
    fn resolve(&self, query: &LineageQuery<'_>) -> Result<Option<Vec<AddLineageRequest>>> {
        let dialect = query.dialect.parser_dialect();
        let statements =
            Parser::parse_sql(dialect.as_ref(), query.sql).map_err(|e| anyhow!(e.to_string()))?;
        let scope = Scope {
            database: query.database_name,
            schema: query
                .schema_name
                .or_else(|| query.dialect.default_schema()),
        };

        let mut requests = Vec::new();
        for stmt in &statements {
            let Some((target, sources)) = statement_lineage(&scope, stmt)? else {
                continue;
            };
            let to = target.fqn(query.service_name);
            for source in sources.iter().filter(|s| **s != target) {
                requests.push(AddLineageRequest::from_query(
                    &source.fqn(query.service_name),
                    &to,
                    query.sql,
                ));
            }
        }

        if requests.is_empty() {
            Ok(None)
        } else {
            Ok(Some(requests))
        }
    }
}

fn statement_lineage(
    scope: &Scope<'_>,
    stmt: &Statement,
) -> Result<Option<(TableKey, BTreeSet<TableKey>)>> {
    let (target, query) = match stmt {
        Statement::Insert(ins) => {
            let name = match &ins.table {
                TableObject::TableName(name) => name,
                TableObject::TableFunction(_) => return Ok(None),
            };
            match ins.source.as_ref() {
                Some(q) => (scope.qualify(name)?, q.as_ref()),
                None => return Ok(None),
            }
        }
        Statement::CreateTable(ct) => match ct.query.as_ref() {
            Some(q) => (scope.qualify(&ct.name)?, q.as_ref()),
            None => return Ok(None),
        },
        Statement::CreateView { name, query, .. } => (scope.qualify(name)?, query.as_ref()),
        _ => return Ok(None),
    };

    let mut sources = BTreeSet::new();
    collect_query_sources(scope, query, &HashSet::new(), &mut sources)?;
    if sources.is_empty() {
        return Ok(None);
    }
    tracing::debug!(
        "{} <- {}",
        target.table,
        sources.iter().map(|s| s.table.as_str()).join(", ")
    );
    Ok(Some((target, sources)))
}

// CTE names shadow physical tables inside the query that defines them; their
// bodies contribute sources instead.
fn collect_query_sources(
    scope: &Scope<'_>,
    query: &Query,
    ctes: &HashSet<String>,
    out: &mut BTreeSet<TableKey>,
) -> Result<()> {
    let mut ctes = ctes.clone();
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            collect_query_sources(scope, &cte.query, &ctes, out)?;
            ctes.insert(scope.ident(&cte.alias.name));
        }
    }
    collect_set_expr_sources(scope, &query.body, &ctes, out)
}

fn collect_set_expr_sources(
    scope: &Scope<'_>,
    body: &SetExpr,
    ctes: &HashSet<String>,
    out: &mut BTreeSet<TableKey>,
) -> Result<()> {
    match body {
        SetExpr::Select(select) => {
            for twj in &select.from {
                collect_joined_sources(scope, twj, ctes, out)?;
            }
        }
        SetExpr::Query(q) => collect_query_sources(scope, q, ctes, out)?,
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr_sources(scope, left, ctes, out)?;
            collect_set_expr_sources(scope, right, ctes, out)?;
        }
        _ => {}
    }
    Ok(())
}

fn collect_joined_sources(
    scope: &Scope<'_>,
    twj: &TableWithJoins,
    ctes: &HashSet<String>,
    out: &mut BTreeSet<TableKey>,
) -> Result<()> {
    collect_factor_sources(scope, &twj.relation, ctes, out)?;
    for j in &twj.joins {
        collect_factor_sources(scope, &j.relation, ctes, out)?;
    }
    Ok(())
}

fn collect_factor_sources(
    scope: &Scope<'_>,
    factor: &TableFactor,
    ctes: &HashSet<String>,
    out: &mut BTreeSet<TableKey>,
) -> Result<()> {
    match factor {
        TableFactor::Table { name, .. } => {
            let parts = scope.name_parts(name)?;
            if parts.len() == 1 && ctes.contains(&parts[0]) {
                return Ok(());
            }
            out.insert(scope.qualify(name)?);
        }
        TableFactor::Derived { subquery, .. } => {
            collect_query_sources(scope, subquery, ctes, out)?;
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            collect_joined_sources(scope, table_with_joins, ctes, out)?;
        }
        _ => {}
    }
    Ok(())
}
