// src/solution_handlers.rs - Listing, CRUD and PDF export of prepared solutions.
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{require_action, Action};
use crate::error::ApiResult;
use crate::export;
use crate::handlers::ApiResponse;
use crate::models::{CreateSolutionRequest, UpdateSolutionRequest};
use crate::pagination::{PageRequest, PaginatedResponse};
use crate::store::{self, DateFilter};
use crate::AppState;

// ==================== LISTING ====================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

pub async fn list_solutions(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let page = PageRequest::normalize(query.page, query.page_size);
    let filter = DateFilter { from: query.from, to: query.to };

    let total = store::count_filtered(&app_state.db_pool, &filter).await?;
    let solutions =
        store::query_filtered(&app_state.db_pool, &filter, page.offset, page.per_page).await?;

    let response = PaginatedResponse::new(solutions, total, &page);
    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

pub async fn get_solution(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let solution = store::find_by_id(&app_state.db_pool, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(solution)))
}

// ==================== CRUD ====================

pub async fn create_solution(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateSolutionRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_action(&http_request, Action::CreateRecord)?;
    let request = request.into_inner();
    request.validate_all()?;

    let id = store::insert(&app_state.db_pool, &request).await?;
    let solution = store::find_by_id(&app_state.db_pool, id).await?;

    log::info!(
        "User {} registered prepared solution {} (code {})",
        claims.username,
        id,
        solution.internal_code
    );

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        solution,
        "Prepared solution registered".to_string(),
    )))
}

pub async fn update_solution(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    request: web::Json<UpdateSolutionRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_action(&http_request, Action::EditRecord)?;
    let id = path.into_inner();
    let request = request.into_inner();
    request.validate_all()?;

    let solution = store::update(&app_state.db_pool, id, &request).await?;

    log::info!("User {} updated prepared solution {}", claims.username, id);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        solution,
        "Prepared solution updated".to_string(),
    )))
}

pub async fn delete_solution(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_action(&http_request, Action::DeleteRecord)?;
    let id = path.into_inner();

    store::delete(&app_state.db_pool, id).await?;

    log::info!("User {} deleted prepared solution {}", claims.username, id);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Prepared solution deleted".to_string(),
    )))
}

// ==================== PDF EXPORT ====================

#[derive(Debug, Deserialize)]
pub struct PdfExportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Renders the full filtered set (no pagination) through the report layer.
pub async fn export_solutions_pdf(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PdfExportQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_action(&http_request, Action::ExportReports)?;

    let filter = DateFilter { from: query.from, to: query.to };
    let solutions = store::query_all_filtered(&app_state.db_pool, &filter).await?;
    let bytes = export::solutions_to_pdf(&solutions, query.from, query.to)?;

    log::info!(
        "User {} exported {} prepared solutions to PDF",
        claims.username,
        solutions.len()
    );

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            "Content-Disposition",
            "attachment; filename=\"soluciones_preparadas.pdf\"",
        ))
        .body(bytes))
}
