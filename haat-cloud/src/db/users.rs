//! User accounts

use shared::models::{User, UserRole, UserUpdate};
use sqlx::PgPool;

use super::decode_enum;

#[derive(sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub hashed_password: String,
    pub role: String,
    pub address: Option<String>,
    pub profile_pic: Option<String>,
    pub approved: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub expo_push_token: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            phone: row.phone,
            role: decode_enum("role", &row.role, UserRole::from_db)?,
            address: row.address,
            profile_pic: row.profile_pic,
            approved: row.approved,
            latitude: row.latitude,
            longitude: row.longitude,
            created_at: row.created_at,
        })
    }
}

fn into_users(rows: Vec<UserRow>) -> Result<Vec<User>, sqlx::Error> {
    rows.into_iter().map(User::try_from).collect()
}

pub struct NewUser<'a> {
    pub id: i64,
    pub name: &'a str,
    pub phone: &'a str,
    pub hashed_password: &'a str,
    pub role: UserRole,
    pub address: Option<&'a str>,
    pub profile_pic: Option<&'a str>,
    pub approved: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub async fn create(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    user: &NewUser<'_>,
    now: i64,
) -> Result<User, sqlx::Error> {
    let row: UserRow = sqlx::query_as(
        "INSERT INTO users (id, name, phone, hashed_password, role, address, profile_pic,
                            approved, latitude, longitude, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
         RETURNING *",
    )
    .bind(user.id)
    .bind(user.name)
    .bind(user.phone)
    .bind(user.hashed_password)
    .bind(user.role.as_db())
    .bind(user.address)
    .bind(user.profile_pic)
    .bind(user.approved)
    .bind(user.latitude)
    .bind(user.longitude)
    .bind(now)
    .fetch_one(conn)
    .await?;
    row.try_into()
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(User::try_from)
        .transpose()
}

/// Full row including the password hash, for login
pub async fn find_row_by_phone(pool: &PgPool, phone: &str) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE phone = $1")
        .bind(phone)
        .fetch_optional(pool)
        .await
}

pub async fn phone_exists(pool: &PgPool, phone: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE phone = $1)")
        .bind(phone)
        .fetch_one(pool)
        .await
}

pub async fn update_profile(
    pool: &PgPool,
    id: i64,
    update: &UserUpdate,
    now: i64,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        "UPDATE users SET
            name = COALESCE($2, name),
            address = COALESCE($3, address),
            profile_pic = COALESCE($4, profile_pic),
            updated_at = $5
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(update.name.as_deref())
    .bind(update.address.as_deref())
    .bind(update.profile_pic.as_deref())
    .bind(now)
    .fetch_optional(pool)
    .await?
    .map(User::try_from)
    .transpose()
}

pub async fn set_coordinates(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
    id: i64,
    latitude: f64,
    longitude: f64,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET latitude = $2, longitude = $3, updated_at = $4 WHERE id = $1")
        .bind(id)
        .bind(latitude)
        .bind(longitude)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_push_token(
    pool: &PgPool,
    id: i64,
    token: Option<&str>,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET expo_push_token = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(token)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn admin_ids(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin'")
        .fetch_all(conn)
        .await
}

pub async fn approved_farmer_ids(
    conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM users WHERE role = 'farmer' AND approved")
        .fetch_all(conn)
        .await
}

/// Approved farmers that have stored coordinates
pub async fn located_farmers(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "SELECT * FROM users
         WHERE role = 'farmer' AND approved
           AND latitude IS NOT NULL AND longitude IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;
    into_users(rows)
}

pub async fn list(
    pool: &PgPool,
    role: Option<UserRole>,
    approved: Option<bool>,
) -> Result<Vec<User>, sqlx::Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "SELECT * FROM users
         WHERE ($1::TEXT IS NULL OR role = $1)
           AND ($2::BOOLEAN IS NULL OR approved = $2)
         ORDER BY created_at DESC",
    )
    .bind(role.map(|r| r.as_db()))
    .bind(approved)
    .fetch_all(pool)
    .await?;
    into_users(rows)
}

pub async fn pending_farmers(pool: &PgPool) -> Result<Vec<User>, sqlx::Error> {
    list(pool, Some(UserRole::Farmer), Some(false)).await
}

/// Approve a pending farmer. `None` when no such pending farmer exists.
pub async fn approve_farmer(pool: &PgPool, id: i64, now: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        "UPDATE users SET approved = TRUE, updated_at = $2
         WHERE id = $1 AND role = 'farmer' AND NOT approved
         RETURNING *",
    )
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await?
    .map(User::try_from)
    .transpose()
}

/// Delete a farmer account that was never approved
pub async fn delete_pending_farmer(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM users WHERE id = $1 AND role = 'farmer' AND NOT approved")
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Approved farmers whose name or phone contains `fragment`
pub async fn search_farmers(
    pool: &PgPool,
    fragment: &str,
    limit: i64,
) -> Result<Vec<User>, sqlx::Error> {
    let pattern = format!("%{}%", escape_like(fragment));
    let rows: Vec<UserRow> = sqlx::query_as(
        "SELECT * FROM users
         WHERE role = 'farmer' AND approved
           AND (name ILIKE $1 OR phone ILIKE $1)
         ORDER BY name
         LIMIT $2",
    )
    .bind(pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    into_users(rows)
}

/// Escape `%`, `_` and `\` for use inside a LIKE pattern
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
