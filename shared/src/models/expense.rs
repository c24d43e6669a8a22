//! Expense Tracker Models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Seeds,
    Fertilizer,
    #[serde(alias = "pesticides")]
    Pesticide,
    Irrigation,
    Labor,
    Equipment,
    Transportation,
    Water,
    LandRent,
    Other,
}

impl ExpenseCategory {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "seeds" => Some(Self::Seeds),
            "fertilizer" => Some(Self::Fertilizer),
            "pesticide" | "pesticides" => Some(Self::Pesticide),
            "irrigation" => Some(Self::Irrigation),
            "labor" => Some(Self::Labor),
            "equipment" => Some(Self::Equipment),
            "transportation" => Some(Self::Transportation),
            "water" => Some(Self::Water),
            "land_rent" => Some(Self::LandRent),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Seeds => "seeds",
            Self::Fertilizer => "fertilizer",
            Self::Pesticide => "pesticide",
            Self::Irrigation => "irrigation",
            Self::Labor => "labor",
            Self::Equipment => "equipment",
            Self::Transportation => "transportation",
            Self::Water => "water",
            Self::LandRent => "land_rent",
            Self::Other => "other",
        }
    }
}

/// A farmer's crop/season project grouping expenses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ExpenseProject {
    pub id: i64,
    pub farmer_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Project with aggregated expense figures (list view)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ExpenseProjectSummary {
    pub id: i64,
    pub farmer_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub total_amount: f64,
    pub expense_count: i64,
    pub last_expense_date: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: i64,
    pub farmer_id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: ExpenseCategory,
    pub amount: f64,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub date: i64,
    pub related_product_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreate {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseCreate {
    pub project_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: ExpenseCategory,
    pub amount: f64,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub date: Option<i64>,
    pub related_product_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseUpdate {
    pub project_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub amount: Option<f64>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub date: Option<i64>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pesticides_alias() {
        let c: ExpenseCategory = serde_json::from_str("\"pesticides\"").unwrap();
        assert_eq!(c, ExpenseCategory::Pesticide);
        assert_eq!(
            ExpenseCategory::from_db("pesticides"),
            Some(ExpenseCategory::Pesticide)
        );
    }

    #[test]
    fn test_land_rent_snake_case() {
        let json = serde_json::to_string(&ExpenseCategory::LandRent).unwrap();
        assert_eq!(json, "\"land_rent\"");
    }
}
