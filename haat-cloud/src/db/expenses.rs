//! Farmer expense projects and expenses

use serde::Serialize;
use shared::models::{
    Expense, ExpenseCategory, ExpenseProject, ExpenseProjectSummary, ExpenseUpdate,
    ProjectUpdate,
};
use sqlx::PgPool;

use super::decode_enum;

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(sqlx::FromRow)]
struct ExpenseRow {
    id: i64,
    farmer_id: i64,
    project_id: i64,
    title: String,
    description: Option<String>,
    category: String,
    amount: f64,
    quantity: Option<f64>,
    unit: Option<String>,
    date: i64,
    related_product_id: Option<i64>,
    notes: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ExpenseRow> for Expense {
    type Error = sqlx::Error;

    fn try_from(row: ExpenseRow) -> Result<Self, Self::Error> {
        Ok(Expense {
            id: row.id,
            farmer_id: row.farmer_id,
            project_id: row.project_id,
            title: row.title,
            description: row.description,
            category: decode_enum("category", &row.category, ExpenseCategory::from_db)?,
            amount: row.amount,
            quantity: row.quantity,
            unit: row.unit,
            date: row.date,
            related_product_id: row.related_product_id,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ========== Projects ==========

pub async fn create_project(
    pool: &PgPool,
    id: i64,
    farmer_id: i64,
    name: &str,
    description: Option<&str>,
    now: i64,
) -> Result<ExpenseProject, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO expense_projects (id, farmer_id, name, description, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $5)
         RETURNING *",
    )
    .bind(id)
    .bind(farmer_id)
    .bind(name)
    .bind(description)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn find_project(
    pool: &PgPool,
    farmer_id: i64,
    id: i64,
) -> Result<Option<ExpenseProject>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM expense_projects WHERE id = $1 AND farmer_id = $2")
        .bind(id)
        .bind(farmer_id)
        .fetch_optional(pool)
        .await
}

/// Projects with aggregated totals, most recently updated first
pub async fn list_projects(
    pool: &PgPool,
    farmer_id: i64,
) -> Result<Vec<ExpenseProjectSummary>, sqlx::Error> {
    sqlx::query_as(
        "SELECT p.*,
                COALESCE(SUM(e.amount), 0)::DOUBLE PRECISION AS total_amount,
                COUNT(e.id) AS expense_count,
                MAX(e.date) AS last_expense_date
         FROM expense_projects p
         LEFT JOIN expenses e ON e.project_id = p.id
         WHERE p.farmer_id = $1
         GROUP BY p.id
         ORDER BY p.updated_at DESC",
    )
    .bind(farmer_id)
    .fetch_all(pool)
    .await
}

pub async fn update_project(
    pool: &PgPool,
    farmer_id: i64,
    id: i64,
    update: &ProjectUpdate,
    now: i64,
) -> Result<Option<ExpenseProject>, sqlx::Error> {
    sqlx::query_as(
        "UPDATE expense_projects SET
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            updated_at = $5
         WHERE id = $1 AND farmer_id = $2
         RETURNING *",
    )
    .bind(id)
    .bind(farmer_id)
    .bind(update.name.as_deref())
    .bind(update.description.as_deref())
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Delete a project; its expenses go with it (ON DELETE CASCADE)
pub async fn delete_project(pool: &PgPool, farmer_id: i64, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM expense_projects WHERE id = $1 AND farmer_id = $2")
        .bind(id)
        .bind(farmer_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ========== Expenses ==========

pub struct NewExpense<'a> {
    pub id: i64,
    pub farmer_id: i64,
    pub project_id: i64,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub category: ExpenseCategory,
    pub amount: f64,
    pub quantity: Option<f64>,
    pub unit: Option<&'a str>,
    pub date: i64,
    pub related_product_id: Option<i64>,
    pub notes: Option<&'a str>,
}

pub async fn create_expense(
    pool: &PgPool,
    e: &NewExpense<'_>,
    now: i64,
) -> Result<Expense, sqlx::Error> {
    let row: ExpenseRow = sqlx::query_as(
        "INSERT INTO expenses (id, farmer_id, project_id, title, description, category, amount,
                               quantity, unit, date, related_product_id, notes,
                               created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
         RETURNING *",
    )
    .bind(e.id)
    .bind(e.farmer_id)
    .bind(e.project_id)
    .bind(e.title)
    .bind(e.description)
    .bind(e.category.as_db())
    .bind(e.amount)
    .bind(e.quantity)
    .bind(e.unit)
    .bind(e.date)
    .bind(e.related_product_id)
    .bind(e.notes)
    .bind(now)
    .fetch_one(pool)
    .await?;
    row.try_into()
}

pub async fn find_expense(
    pool: &PgPool,
    farmer_id: i64,
    id: i64,
) -> Result<Option<Expense>, sqlx::Error> {
    sqlx::query_as::<_, ExpenseRow>("SELECT * FROM expenses WHERE id = $1 AND farmer_id = $2")
        .bind(id)
        .bind(farmer_id)
        .fetch_optional(pool)
        .await?
        .map(Expense::try_from)
        .transpose()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExpenseFilter {
    pub project_id: Option<i64>,
    pub category: Option<ExpenseCategory>,
    /// Inclusive lower bound (ms)
    pub start: Option<i64>,
    /// Exclusive upper bound (ms)
    pub end: Option<i64>,
}

const FILTER: &str = "farmer_id = $1
           AND ($2::BIGINT IS NULL OR project_id = $2)
           AND ($3::TEXT IS NULL OR category = $3)
           AND ($4::BIGINT IS NULL OR date >= $4)
           AND ($5::BIGINT IS NULL OR date < $5)";

pub async fn list_expenses(
    pool: &PgPool,
    farmer_id: i64,
    filter: &ExpenseFilter,
) -> Result<Vec<Expense>, sqlx::Error> {
    let rows: Vec<ExpenseRow> = sqlx::query_as(&format!(
        "SELECT * FROM expenses WHERE {FILTER} ORDER BY date DESC, created_at DESC"
    ))
    .bind(farmer_id)
    .bind(filter.project_id)
    .bind(filter.category.map(|c| c.as_db()))
    .bind(filter.start)
    .bind(filter.end)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Expense::try_from).collect()
}

pub async fn update_expense(
    pool: &PgPool,
    farmer_id: i64,
    id: i64,
    update: &ExpenseUpdate,
    now: i64,
) -> Result<Option<Expense>, sqlx::Error> {
    sqlx::query_as::<_, ExpenseRow>(
        "UPDATE expenses SET
            project_id = COALESCE($3, project_id),
            title = COALESCE($4, title),
            description = COALESCE($5, description),
            category = COALESCE($6, category),
            amount = COALESCE($7, amount),
            quantity = COALESCE($8, quantity),
            unit = COALESCE($9, unit),
            date = COALESCE($10, date),
            notes = COALESCE($11, notes),
            updated_at = $12
         WHERE id = $1 AND farmer_id = $2
         RETURNING *",
    )
    .bind(id)
    .bind(farmer_id)
    .bind(update.project_id)
    .bind(update.title.as_deref())
    .bind(update.description.as_deref())
    .bind(update.category.map(|c| c.as_db()))
    .bind(update.amount)
    .bind(update.quantity)
    .bind(update.unit.as_deref())
    .bind(update.date)
    .bind(update.notes.as_deref())
    .bind(now)
    .fetch_optional(pool)
    .await?
    .map(Expense::try_from)
    .transpose()
}

pub async fn delete_expense(pool: &PgPool, farmer_id: i64, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM expenses WHERE id = $1 AND farmer_id = $2")
        .bind(id)
        .bind(farmer_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ========== Stats ==========

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub category: String,
    pub total: f64,
    pub count: i64,
    pub avg_amount: f64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    /// Start of the UTC day (ms)
    pub day: i64,
    pub total: f64,
    pub count: i64,
}

pub async fn category_stats(
    pool: &PgPool,
    farmer_id: i64,
    filter: &ExpenseFilter,
) -> Result<Vec<CategoryStat>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT category,
                SUM(amount)::DOUBLE PRECISION AS total,
                COUNT(*) AS count,
                AVG(amount)::DOUBLE PRECISION AS avg_amount
         FROM expenses WHERE {FILTER}
         GROUP BY category
         ORDER BY total DESC"
    ))
    .bind(farmer_id)
    .bind(filter.project_id)
    .bind(filter.category.map(|c| c.as_db()))
    .bind(filter.start)
    .bind(filter.end)
    .fetch_all(pool)
    .await
}

pub async fn daily_stats(
    pool: &PgPool,
    farmer_id: i64,
    filter: &ExpenseFilter,
) -> Result<Vec<DailyStat>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT (date / {MILLIS_PER_DAY}) * {MILLIS_PER_DAY} AS day,
                SUM(amount)::DOUBLE PRECISION AS total,
                COUNT(*) AS count
         FROM expenses WHERE {FILTER}
         GROUP BY day
         ORDER BY day"
    ))
    .bind(farmer_id)
    .bind(filter.project_id)
    .bind(filter.category.map(|c| c.as_db()))
    .bind(filter.start)
    .bind(filter.end)
    .fetch_all(pool)
    .await
}
