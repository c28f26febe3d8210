// src/store.rs - Durable access to the prepared-solutions table.
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    day_end_exclusive, day_start, quantize, CreateSolutionRequest, Solution, SolutionRow,
    UpdateSolutionRequest,
};

/// Day-granular date window. Bounds are normalized to start-of-day
/// inclusive / start-of-next-day exclusive so records carrying a
/// time-of-day component stay inside their calendar day.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateFilter {
    pub fn bounds(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        (self.from.map(day_start), self.to.map(day_end_exclusive))
    }

    /// WHERE fragment shared by the page query, the count query and the
    /// balance queries, so all of them see the same window.
    fn clause(&self) -> (String, Vec<NaiveDateTime>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds = Vec::new();

        let (lower, upper) = self.bounds();
        if let Some(lower) = lower {
            conditions.push("preparation_date >= ?");
            binds.push(lower);
        }
        if let Some(upper) = upper {
            conditions.push("preparation_date < ?");
            binds.push(upper);
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        (where_clause, binds)
    }
}

const SOLUTION_COLUMNS: &str = "id, preparation_date, internal_code, brand, name, \
     base_quantity, final_volume, lot, concentration_obtained, reagent_id, \
     expiry_date, row_version";

pub async fn insert(pool: &SqlitePool, request: &CreateSolutionRequest) -> ApiResult<i64> {
    let base_quantity = request.base_quantity.map(|q| quantize(q).to_string());
    let final_volume = quantize(request.final_volume).to_string();

    let result = sqlx::query(
        r#"INSERT INTO solutions
           (preparation_date, internal_code, brand, name, base_quantity, final_volume,
            lot, concentration_obtained, reagent_id, expiry_date, row_version)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)"#,
    )
    .bind(request.effective_preparation_date())
    .bind(&request.internal_code)
    .bind(&request.brand)
    .bind(&request.name)
    .bind(&base_quantity)
    .bind(&final_volume)
    .bind(&request.lot)
    .bind(&request.concentration_obtained)
    .bind(&request.reagent_id)
    .bind(request.expiry_date)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> ApiResult<Solution> {
    let sql = format!("SELECT {} FROM solutions WHERE id = ?", SOLUTION_COLUMNS);
    let row: SolutionRow = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::solution_not_found(id))?;

    row.into_solution()
}

/// Full-record replace guarded by `row_version`. A version mismatch means
/// another writer edited the record between the caller's read and this
/// write; the caller must re-fetch and retry or surface the conflict. An
/// absent row is a plain not-found. No retry happens here.
pub async fn update(pool: &SqlitePool, id: i64, request: &UpdateSolutionRequest) -> ApiResult<Solution> {
    let base_quantity = request.base_quantity.map(|q| quantize(q).to_string());
    let final_volume = quantize(request.final_volume).to_string();

    let result = sqlx::query(
        r#"UPDATE solutions
           SET preparation_date = ?, internal_code = ?, brand = ?, name = ?,
               base_quantity = ?, final_volume = ?, lot = ?, concentration_obtained = ?,
               reagent_id = ?, expiry_date = ?, row_version = row_version + 1
           WHERE id = ? AND row_version = ?"#,
    )
    .bind(day_start(request.preparation_date))
    .bind(&request.internal_code)
    .bind(&request.brand)
    .bind(&request.name)
    .bind(&base_quantity)
    .bind(&final_volume)
    .bind(&request.lot)
    .bind(&request.concentration_obtained)
    .bind(&request.reagent_id)
    .bind(request.expiry_date)
    .bind(id)
    .bind(request.row_version)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM solutions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        return Err(match exists {
            Some(_) => ApiError::concurrent_modification(id),
            None => ApiError::solution_not_found(id),
        });
    }

    find_by_id(pool, id).await
}

pub async fn delete(pool: &SqlitePool, id: i64) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM solutions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::solution_not_found(id));
    }

    Ok(())
}

/// One page of the filtered set, ordered `preparation_date DESC, id DESC`.
/// The id tie-break keeps the order stable across pages once deletes and
/// edits have scrambled insertion order.
pub async fn query_filtered(
    pool: &SqlitePool,
    filter: &DateFilter,
    offset: i64,
    limit: i64,
) -> ApiResult<Vec<Solution>> {
    let (where_clause, binds) = filter.clause();
    let sql = format!(
        "SELECT {} FROM solutions{} ORDER BY preparation_date DESC, id DESC LIMIT ? OFFSET ?",
        SOLUTION_COLUMNS, where_clause
    );

    let mut query = sqlx::query_as::<_, SolutionRow>(&sql);
    for bind in &binds {
        query = query.bind(*bind);
    }

    let rows = query.bind(limit).bind(offset).fetch_all(pool).await?;
    rows.into_iter().map(SolutionRow::into_solution).collect()
}

/// The complete filtered set in listing order, for exports.
pub async fn query_all_filtered(pool: &SqlitePool, filter: &DateFilter) -> ApiResult<Vec<Solution>> {
    let (where_clause, binds) = filter.clause();
    let sql = format!(
        "SELECT {} FROM solutions{} ORDER BY preparation_date DESC, id DESC",
        SOLUTION_COLUMNS, where_clause
    );

    let mut query = sqlx::query_as::<_, SolutionRow>(&sql);
    for bind in &binds {
        query = query.bind(*bind);
    }

    let rows = query.fetch_all(pool).await?;
    rows.into_iter().map(SolutionRow::into_solution).collect()
}

/// Separate count of the filtered set; the page slice never stands in for
/// it. Runs as its own statement, so a concurrent insert between count and
/// page can shift page boundaries - accepted, not locked against.
pub async fn count_filtered(pool: &SqlitePool, filter: &DateFilter) -> ApiResult<i64> {
    let (where_clause, binds) = filter.clause();
    let sql = format!("SELECT COUNT(*) FROM solutions{}", where_clause);

    let mut query = sqlx::query_as::<_, (i64,)>(&sql);
    for bind in &binds {
        query = query.bind(*bind);
    }

    let count = query.fetch_one(pool).await?;
    Ok(count.0)
}
