//! Farmer expense tracker: projects, expenses and spending stats

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router, http::StatusCode};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    ExpenseCategory, ExpenseCreate, ExpenseUpdate, ProjectCreate, ProjectUpdate, UserRole,
};
use shared::util::{now_millis, snowflake_id};

use crate::auth::CurrentUser;
use crate::db;
use crate::db::expenses::{ExpenseFilter, NewExpense};
use crate::error::ServiceResult;
use crate::orders::money::round_money;
use crate::state::AppState;

use super::message_with;

const MAX_PROJECT_NAME: usize = 120;
const MAX_DESCRIPTION: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/expenses/projects", get(list_projects).post(create_project))
        .route(
            "/api/expenses/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/api/expenses/stats", get(stats))
        .route("/api/expenses", get(list_expenses).post(create_expense))
        .route(
            "/api/expenses/{id}",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
}

fn too_long(field: &str, max: usize) -> AppError {
    AppError::with_message(
        ErrorCode::ValueOutOfRange,
        format!("{field} must be at most {max} characters"),
    )
    .with_detail("field", field)
}

fn check_description(description: Option<&str>) -> Result<(), AppError> {
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION) {
        return Err(too_long("description", MAX_DESCRIPTION));
    }
    Ok(())
}

fn check_project_name(name: &str) -> Result<(), AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::required("name"));
    }
    if name.chars().count() > MAX_PROJECT_NAME {
        return Err(too_long("name", MAX_PROJECT_NAME));
    }
    Ok(())
}

fn check_amount(amount: f64) -> Result<(), AppError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            "Amount cannot be negative",
        ))
    }
}

/// Expense title, falling back to the description when absent
pub fn resolve_title<'a>(
    title: Option<&'a str>,
    description: Option<&'a str>,
) -> Result<&'a str, AppError> {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| description.map(str::trim).filter(|d| !d.is_empty()))
        .ok_or_else(|| AppError::required("title"))
}

/// `[start, end)` in Unix ms for an optional month/year selection (UTC)
pub fn stats_range(
    month: Option<u32>,
    year: Option<i32>,
    today: NaiveDate,
) -> Result<(Option<i64>, Option<i64>), AppError> {
    let to_ms = |d: NaiveDate| d.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp_millis());
    let invalid = || AppError::with_message(ErrorCode::ValueOutOfRange, "Invalid month or year");

    match (month, year) {
        (None, None) => Ok((None, None)),
        (Some(month), year) => {
            let year = year.unwrap_or(today.year());
            let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
            let (next_year, next_month) = if month == 12 {
                (year + 1, 1)
            } else {
                (year, month + 1)
            };
            let end = NaiveDate::from_ymd_opt(next_year, next_month, 1).ok_or_else(invalid)?;
            Ok((to_ms(start), to_ms(end)))
        }
        (None, Some(year)) => {
            let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
            let end = NaiveDate::from_ymd_opt(year + 1, 1, 1).ok_or_else(invalid)?;
            Ok((to_ms(start), to_ms(end)))
        }
    }
}

fn require_farmer(user: &CurrentUser) -> Result<(), AppError> {
    user.require_role(&[UserRole::Farmer])
}

async fn ensure_project(state: &AppState, farmer_id: i64, project_id: i64) -> ServiceResult<()> {
    db::expenses::find_project(&state.pool, farmer_id, project_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ExpenseProjectNotFound))?;
    Ok(())
}

// ========== Projects ==========

/// POST /api/expenses/projects
pub async fn create_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<ProjectCreate>,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    require_farmer(&user)?;
    check_project_name(&req.name)?;
    check_description(req.description.as_deref())?;

    let project = db::expenses::create_project(
        &state.pool,
        snowflake_id(),
        user.id,
        req.name.trim(),
        req.description.as_deref().map(str::trim),
        now_millis(),
    )
    .await?;
    Ok((StatusCode::CREATED, message_with("Project created", "project", project)?))
}

/// GET /api/expenses/projects
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ServiceResult<Json<Value>> {
    require_farmer(&user)?;
    let projects = db::expenses::list_projects(&state.pool, user.id).await?;
    Ok(Json(json!({ "projects": projects })))
}

/// GET /api/expenses/projects/{id}
pub async fn get_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    require_farmer(&user)?;
    let project = db::expenses::find_project(&state.pool, user.id, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ExpenseProjectNotFound))?;
    Ok(Json(json!({ "project": project })))
}

/// PUT /api/expenses/projects/{id}
pub async fn update_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<ProjectUpdate>,
) -> ServiceResult<Json<Value>> {
    require_farmer(&user)?;
    if let Some(name) = req.name.as_deref() {
        check_project_name(name)?;
    }
    check_description(req.description.as_deref())?;

    let project = db::expenses::update_project(&state.pool, user.id, id, &req, now_millis())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ExpenseProjectNotFound))?;
    Ok(message_with("Project updated", "project", project)?)
}

/// DELETE /api/expenses/projects/{id}
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    require_farmer(&user)?;
    if !db::expenses::delete_project(&state.pool, user.id, id).await? {
        return Err(AppError::new(ErrorCode::ExpenseProjectNotFound).into());
    }
    tracing::info!(project_id = id, farmer_id = user.id, "Expense project deleted");
    Ok(Json(json!({ "message": "Project and its expenses deleted" })))
}

// ========== Expenses ==========

/// POST /api/expenses
pub async fn create_expense(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<ExpenseCreate>,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    require_farmer(&user)?;
    let project_id = req.project_id.ok_or_else(|| AppError::required("projectId"))?;
    let title = resolve_title(req.title.as_deref(), req.description.as_deref())?;
    check_description(req.description.as_deref())?;
    check_amount(req.amount)?;
    ensure_project(&state, user.id, project_id).await?;

    let now = now_millis();
    let expense = db::expenses::create_expense(
        &state.pool,
        &NewExpense {
            id: snowflake_id(),
            farmer_id: user.id,
            project_id,
            title,
            description: req.description.as_deref(),
            category: req.category,
            amount: req.amount,
            quantity: req.quantity,
            unit: req.unit.as_deref(),
            date: req.date.unwrap_or(now),
            related_product_id: req.related_product_id,
            notes: req.notes.as_deref(),
        },
        now,
    )
    .await?;
    Ok((StatusCode::CREATED, message_with("Expense added", "expense", expense)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpensesQuery {
    pub project_id: Option<i64>,
    pub category: Option<ExpenseCategory>,
    /// Inclusive, Unix ms
    pub start_date: Option<i64>,
    /// Inclusive, Unix ms
    pub end_date: Option<i64>,
}

/// GET /api/expenses
pub async fn list_expenses(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ExpensesQuery>,
) -> ServiceResult<Json<Value>> {
    require_farmer(&user)?;
    let filter = ExpenseFilter {
        project_id: query.project_id,
        category: query.category,
        start: query.start_date,
        end: query.end_date.map(|end| end + 1),
    };
    let expenses = db::expenses::list_expenses(&state.pool, user.id, &filter).await?;
    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    Ok(Json(json!({
        "expenses": expenses,
        "totalAmount": round_money(total),
        "count": expenses.len(),
    })))
}

/// GET /api/expenses/{id}
pub async fn get_expense(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    require_farmer(&user)?;
    let expense = db::expenses::find_expense(&state.pool, user.id, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ExpenseNotFound))?;
    Ok(Json(json!({ "expense": expense })))
}

/// PUT /api/expenses/{id}
pub async fn update_expense(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<ExpenseUpdate>,
) -> ServiceResult<Json<Value>> {
    require_farmer(&user)?;
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::validation("title cannot be empty").into());
    }
    check_description(req.description.as_deref())?;
    if let Some(amount) = req.amount {
        check_amount(amount)?;
    }
    if let Some(project_id) = req.project_id {
        ensure_project(&state, user.id, project_id).await?;
    }

    let expense = db::expenses::update_expense(&state.pool, user.id, id, &req, now_millis())
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ExpenseNotFound))?;
    Ok(message_with("Expense updated", "expense", expense)?)
}

/// DELETE /api/expenses/{id}
pub async fn delete_expense(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Value>> {
    require_farmer(&user)?;
    if !db::expenses::delete_expense(&state.pool, user.id, id).await? {
        return Err(AppError::new(ErrorCode::ExpenseNotFound).into());
    }
    Ok(Json(json!({ "message": "Expense deleted" })))
}

// ========== Stats ==========

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub project_id: Option<i64>,
}

/// GET /api/expenses/stats
pub async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<StatsQuery>,
) -> ServiceResult<Json<Value>> {
    require_farmer(&user)?;
    let (start, end) = stats_range(query.month, query.year, Utc::now().date_naive())?;
    let filter = ExpenseFilter {
        project_id: query.project_id,
        category: None,
        start,
        end,
    };

    let by_category = db::expenses::category_stats(&state.pool, user.id, &filter).await?;
    let daily = db::expenses::daily_stats(&state.pool, user.id, &filter).await?;
    let total: f64 = by_category.iter().map(|c| c.total).sum();

    Ok(Json(json!({
        "byCategory": by_category,
        "daily": daily,
        "totalExpense": round_money(total),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_title_falls_back_to_description() {
        assert_eq!(resolve_title(Some("Urea"), Some("50kg bag")).unwrap(), "Urea");
        assert_eq!(resolve_title(Some("  "), Some("50kg bag")).unwrap(), "50kg bag");
        assert_eq!(resolve_title(None, Some(" seeds ")).unwrap(), "seeds");
        assert_eq!(
            resolve_title(None, None).unwrap_err().code,
            ErrorCode::RequiredField
        );
    }

    #[test]
    fn test_stats_range_month() {
        let (start, end) = stats_range(Some(2), Some(2024), date(2026, 1, 1)).unwrap();
        assert_eq!(start, Some(1_706_745_600_000));
        assert_eq!(end, Some(1_709_251_200_000));
    }

    #[test]
    fn test_stats_range_december_rolls_over() {
        let (start, end) = stats_range(Some(12), Some(2025), date(2026, 1, 1)).unwrap();
        assert_eq!(start, Some(1_764_547_200_000));
        assert_eq!(end, Some(1_767_225_600_000));
    }

    #[test]
    fn test_stats_range_defaults() {
        assert_eq!(stats_range(None, None, date(2026, 5, 1)).unwrap(), (None, None));

        let (start, _) = stats_range(Some(1), None, date(2026, 5, 1)).unwrap();
        assert_eq!(start, Some(1_767_225_600_000));

        let (start, end) = stats_range(None, Some(2025), date(2026, 5, 1)).unwrap();
        assert_eq!(start, Some(1_735_689_600_000));
        assert_eq!(end, Some(1_767_225_600_000));
    }

    #[test]
    fn test_stats_range_rejects_bad_month() {
        assert!(stats_range(Some(13), Some(2025), date(2026, 1, 1)).is_err());
        assert!(stats_range(Some(0), None, date(2026, 1, 1)).is_err());
    }

    #[test]
    fn test_project_name_rules() {
        assert!(check_project_name("Rice 2025").is_ok());
        assert!(check_project_name("  ").is_err());
        assert!(check_project_name(&"x".repeat(MAX_PROJECT_NAME + 1)).is_err());
    }
}
