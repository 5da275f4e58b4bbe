use diesel::prelude::*;

use crate::models::{AddLineageRequest, LineageEdge, NewLineageEdge};
use crate::schema::lineage_edge;

pub use crate::catalog::{create_pool, DbConn, DbPool};

impl NewLineageEdge {
    pub fn from_request(service_name: &str, request: &AddLineageRequest) -> Self {
        Self {
            service_name: service_name.to_string(),
            from_table: request.from_table().to_string(),
            to_table: request.to_table().to_string(),
            sql_query: request.sql_query().map(str::to_string),
        }
    }
}

/// Insert lineage edge record (always creates new record)
pub fn insert_lineage_edge(
    conn: &mut PgConnection,
    service_name: &str,
    request: &AddLineageRequest,
) -> Result<usize, diesel::result::Error> {
    let new_edge = NewLineageEdge::from_request(service_name, request);

    diesel::insert_into(lineage_edge::table)
        .values(&new_edge)
        .execute(conn)
}

/// Stored edges feeding `to_table`, oldest first
pub fn lineage_edges_into(
    conn: &mut PgConnection,
    to_table: &str,
) -> Result<Vec<LineageEdge>, diesel::result::Error> {
    lineage_edge::table
        .filter(lineage_edge::to_table.eq(to_table))
        .order(lineage_edge::id.asc())
        .select(LineageEdge::as_select())
        .load(conn)
}
