use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};

/// A PGSpider multi-tenant table as reported by the catalog.
#[derive(QueryableByName, Debug, Clone, PartialEq, Eq)]
pub struct MultiTenantTable {
    #[diesel(sql_type = Text)]
    pub relname: String,
    #[diesel(sql_type = Text)]
    pub database: String,
    #[diesel(sql_type = Text)]
    pub nspname: String,
}

#[derive(QueryableByName, Debug, Clone, PartialEq, Eq)]
pub struct ChildTable {
    #[diesel(sql_type = Text)]
    pub relname: String,
}

/// A statement captured by `pg_stat_statements`.
#[derive(QueryableByName, Debug, Clone, PartialEq, Eq)]
pub struct LoggedQuery {
    #[diesel(sql_type = Text)]
    pub query_text: String,
    #[diesel(sql_type = Text)]
    pub database_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReference {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub fully_qualified_name: String,
}

impl EntityReference {
    pub fn table(fully_qualified_name: impl Into<String>) -> Self {
        Self {
            entity_type: "table".to_string(),
            fully_qualified_name: fully_qualified_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineageSourceKind {
    QueryLineage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageDetails {
    pub sql_query: String,
    pub source: LineageSourceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitiesEdge {
    pub from_entity: EntityReference,
    pub to_entity: EntityReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineage_details: Option<LineageDetails>,
}

/// One table-to-table lineage edge, ready for a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineageRequest {
    pub edge: EntitiesEdge,
}

impl AddLineageRequest {
    /// Edge derived from a parsed query, `from` feeding `to`.
    pub fn from_query(from: &str, to: &str, sql_query: &str) -> Self {
        Self {
            edge: EntitiesEdge {
                from_entity: EntityReference::table(from),
                to_entity: EntityReference::table(to),
                lineage_details: Some(LineageDetails {
                    sql_query: sql_query.to_string(),
                    source: LineageSourceKind::QueryLineage,
                }),
            },
        }
    }

    pub fn from_table(&self) -> &str {
        &self.edge.from_entity.fully_qualified_name
    }

    pub fn to_table(&self) -> &str {
        &self.edge.to_entity.fully_qualified_name
    }

    pub fn sql_query(&self) -> Option<&str> {
        self.edge
            .lineage_details
            .as_ref()
            .map(|d| d.sql_query.as_str())
    }
}

#[derive(Queryable, Selectable, Debug, Serialize)]
#[diesel(table_name = crate::schema::lineage_edge)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LineageEdge {
    pub id: i32,
    pub service_name: String,
    pub from_table: String,
    pub to_table: String,
    pub sql_query: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::lineage_edge)]
pub struct NewLineageEdge {
    pub service_name: String,
    pub from_table: String,
    pub to_table: String,
    pub sql_query: Option<String>,
}
