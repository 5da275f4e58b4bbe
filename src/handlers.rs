use actix_web::{web, HttpResponse, Responder};
use anyhow::{Context, Result};
use serde::Serialize;

use crate::catalog::{DbPool, PgConnectionProvider};
use crate::models::{AddLineageRequest, LineageEdge};
use crate::resolver::SqlLineageResolver;
use crate::source::{drain, LineageSource};

/// Shared state behind every handler
pub struct AppState {
    pub source: LineageSource<PgConnectionProvider, SqlLineageResolver>,
    pub service_name: String,
    pub store: Option<DbPool>,
}

/// Response model for one lineage pass
#[derive(Debug, Serialize)]
pub struct LineageRunResponse {
    pub requests: Vec<AddLineageRequest>,
    pub failed: usize,
}

/// Response model for stored edges
#[derive(Debug, Serialize)]
pub struct LineageEdgesResponse {
    pub edges: Vec<LineageEdge>,
}

/// Error response model
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn run_pass(state: &AppState) -> Result<LineageRunResponse> {
    let mut conn = match &state.store {
        Some(pool) => Some(pool.get().context("Failed to get lineage store connection")?),
        None => None,
    };

    let mut requests = Vec::new();
    let failed = drain(state.source.records(), |request| {
        if let Some(conn) = conn.as_mut() {
            crate::db::insert_lineage_edge(conn, &state.service_name, &request)
                .context("Failed to save lineage edge")?;
        }
        requests.push(request);
        Ok(())
    });

    Ok(LineageRunResponse { requests, failed })
}

/// Handler that runs one lineage pass over the PGSpider node
pub async fn run_lineage(state: web::Data<AppState>) -> impl Responder {
    tracing::info!("Running lineage pass for service {}", state.service_name);

    match web::block(move || run_pass(&state)).await {
        Ok(Ok(response)) => {
            tracing::info!(
                "Lineage pass produced {} requests, {} failed",
                response.requests.len(),
                response.failed
            );
            HttpResponse::Ok().json(response)
        }
        Ok(Err(e)) => {
            tracing::error!("Lineage pass failed: {:#}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Lineage pass failed: {}", e),
            })
        }
        Err(e) => {
            tracing::error!("Lineage pass aborted: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Lineage pass aborted".to_string(),
            })
        }
    }
}

/// Handler listing stored edges into one table
pub async fn list_lineage(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let Some(pool) = state.store.clone() else {
        return HttpResponse::NotFound().json(ErrorResponse {
            error: "No lineage store configured".to_string(),
        });
    };
    let to_table = path.into_inner();

    let result = web::block(move || -> Result<Vec<LineageEdge>> {
        let mut conn = pool.get().context("Failed to get lineage store connection")?;
        crate::db::lineage_edges_into(&mut conn, &to_table).context("Failed to read lineage edges")
    })
    .await;

    match result {
        Ok(Ok(edges)) => HttpResponse::Ok().json(LineageEdgesResponse { edges }),
        Ok(Err(e)) => {
            tracing::error!("{:#}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: e.to_string(),
            })
        }
        Err(e) => {
            tracing::error!("Lineage lookup aborted: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Lineage lookup aborted".to_string(),
            })
        }
    }
}

/// Health check handler
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("OK")
}
