// src/balance_handlers.rs - Balance report and its CSV export.
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{require_action, Action};
use crate::balance::{self, SumStrategy};
use crate::error::ApiResult;
use crate::export::{self, CsvLocale};
use crate::handlers::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub code: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn get_balance(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<BalanceQuery>,
) -> ApiResult<HttpResponse> {
    let strategy = SumStrategy::for_database_url(&app_state.config.database.url);
    let report = balance::compute_balance(
        &app_state.db_pool,
        &query.code,
        query.from,
        query.to,
        strategy,
    )
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}

#[derive(Debug, Deserialize)]
pub struct BalanceExportQuery {
    pub code: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub locale: Option<String>,
}

/// Detail CSV of the matching records, spreadsheet-friendly for the lab's
/// locale (semicolon separated, BOM, comma decimals unless asked otherwise).
pub async fn export_balance_csv(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<BalanceExportQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_action(&http_request, Action::ExportReports)?;

    let (code, from, to) = balance::normalize_query(&query.code, query.from, query.to)?;
    let rows = balance::matching_rows(&app_state.db_pool, &code, from, to).await?;

    let locale = CsvLocale::from_tag(query.locale.as_deref().unwrap_or("es"));
    let bytes = export::balance_to_csv(&rows, locale)?;

    log::info!(
        "User {} exported balance CSV for code '{}' ({} rows)",
        claims.username,
        code,
        rows.len()
    );

    let filename = format!("balance_{}_{}.csv", code, Local::now().format("%Y%m%d%H%M"));

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(bytes))
}
