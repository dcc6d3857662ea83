//! HTTP surface for the generated tables, consumed by the dashboard
//! layer: a JSON index, JSON table bodies, and the raw CSV wire format.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use axum::Json;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::output::Table;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    tables: Arc<Vec<Table>>,
}

impl AppState {
    fn find(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

pub async fn run_http_server(port: u16, tables: Vec<Table>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let state = AppState {
        tables: Arc::new(tables),
    };
    let app = Router::new()
        .route("/api/tables", get(list_tables_handler))
        .route("/api/tables/:name", get(table_json_handler))
        .route("/data/:file", get(table_csv_handler))
        .fallback(not_found_handler)
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!("table API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn list_tables_handler(State(state): State<AppState>) -> Response {
    let names: Vec<&str> = state.tables.iter().map(|t| t.name.as_str()).collect();
    json_response(StatusCode::OK, names)
}

async fn table_json_handler(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.find(&name) {
        Some(table) => json_response(StatusCode::OK, table),
        None => error_response(StatusCode::NOT_FOUND, &format!("no table named '{name}'")),
    }
}

async fn table_csv_handler(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    let name = file.strip_suffix(".csv").unwrap_or(&file);
    match state.find(name) {
        Some(table) => (
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            table.to_csv(),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, &format!("no table named '{name}'")),
    }
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> AppState {
        AppState {
            tables: Arc::new(vec![Table::new(
                "scenarios",
                &["name", "revenue_bn"],
                vec![vec!["Absorb cost".to_string(), "2.10".to_string()]],
            )]),
        }
    }

    #[test]
    fn state_lookup_finds_tables_by_name() {
        let state = sample_state();
        assert!(state.find("scenarios").is_some());
        assert!(state.find("missing").is_none());
    }
}
