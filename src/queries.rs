//! Catalog queries run against a PGSpider node.

/// Foreign tables served by `pgspider_core_fdw` are the multi-tenant tables.
pub const PGSPIDER_GET_MULTI_TENANT_TABLES: &str = r#"
SELECT
    c.relname::text AS relname,
    current_database()::text AS database,
    n.nspname::text AS nspname
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_foreign_table ft ON ft.ftrelid = c.oid
JOIN pg_catalog.pg_foreign_server fs ON fs.oid = ft.ftserver
JOIN pg_catalog.pg_foreign_data_wrapper fdw ON fdw.oid = fs.srvfdw
WHERE fdw.fdwname = 'pgspider_core_fdw'
ORDER BY n.nspname, c.relname
"#;

/// Child tables follow the `<parent>__<node>__<n>` naming convention.
/// `$1` is the multi-tenant table name.
pub const PGSPIDER_GET_CHILD_TABLES: &str = r#"
SELECT c.relname::text AS relname
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_foreign_table ft ON ft.ftrelid = c.oid
JOIN pg_catalog.pg_foreign_server fs ON fs.oid = ft.ftserver
JOIN pg_catalog.pg_foreign_data_wrapper fdw ON fdw.oid = fs.srvfdw
WHERE fdw.fdwname <> 'pgspider_core_fdw'
  AND left(c.relname, length($1) + 2) = $1 || '__'
ORDER BY c.relname
"#;

/// Captured statements that can carry lineage. `$1` is the row limit.
pub const PGSPIDER_GET_QUERY_LOG: &str = r#"
SELECT
    s.query::text AS query_text,
    d.datname::text AS database_name
FROM pg_stat_statements s
JOIN pg_catalog.pg_database d ON s.dbid = d.oid
WHERE s.query NOT LIKE '/* {"app": "OpenMetadata", %} */%'
  AND s.query NOT LIKE '/* {"app": "dbt", %} */%'
  AND (
      s.query ILIKE '%create table%as%select%'
      OR s.query ILIKE '%insert%'
  )
ORDER BY s.total_exec_time DESC
LIMIT $1
"#;
