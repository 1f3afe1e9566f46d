//! Request, response and entity types exchanged with the TurnOver backend.
//!
//! Every backend response is wrapped in [`ApiResponse`]; the entities are
//! plain value records that the client stores and hands back unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// ============================================================================
// Envelope
// ============================================================================

/// Standard `{ data, success, message? }` wrapper used by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

// ============================================================================
// Shoes
// ============================================================================

/// Shoe category as understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShoeCategory {
    Daily,
    Workout,
    Race,
}

impl ShoeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ShoeCategory::Daily => "daily",
            ShoeCategory::Workout => "workout",
            ShoeCategory::Race => "race",
        }
    }
}

impl fmt::Display for ShoeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog shoe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shoe {
    pub id: String,
    pub brand: String,
    pub name: String,
    /// Stored as free text by the backend; see [`ShoeCategory`] for the known values.
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Grams.
    pub weight: f64,
    /// Millimetres.
    pub drop: f64,
    pub stack_height_heel: f64,
    pub stack_height_forefoot: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A shoe currently in the runner's rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationShoe {
    #[serde(flatten)]
    pub shoe: Shoe,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    pub user_id: String,
}

/// A retired shoe with the runner's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetiredShoe {
    #[serde(flatten)]
    pub shoe: Shoe,
    /// Identifies the graveyard entry; the same shoe may be retired more than once.
    pub graveyard_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub retired_at: OffsetDateTime,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miles_run: Option<f64>,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub shoe: Shoe,
    pub score: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub based_on_shoes: Vec<String>,
}

// ============================================================================
// Filters
// ============================================================================

/// Catalog filters. `None` fields are omitted from both the query string and
/// the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoeFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl ShoeFilters {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        push_text(&mut pairs, "category", self.category.as_deref());
        push_text(&mut pairs, "brand", self.brand.as_deref());
        push_text(&mut pairs, "search", self.search.as_deref());
        push_positive(&mut pairs, "page", self.page);
        push_positive(&mut pairs, "page_size", self.page_size);
        pairs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraveyardSortBy {
    RetiredAt,
    Rating,
    Name,
    Brand,
}

impl GraveyardSortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            GraveyardSortBy::RetiredAt => "retired_at",
            GraveyardSortBy::Rating => "rating",
            GraveyardSortBy::Name => "name",
            GraveyardSortBy::Brand => "brand",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraveyardFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<GraveyardSortBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

impl GraveyardFilters {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        push_text(&mut pairs, "category", self.category.as_deref());
        push_positive(&mut pairs, "min_rating", self.min_rating.map(u32::from));
        if let Some(sort_by) = self.sort_by {
            pairs.push(("sort_by", sort_by.as_str().to_string()));
        }
        if let Some(order) = self.sort_order {
            pairs.push(("sort_order", order.as_str().to_string()));
        }
        pairs
    }
}

fn push_text(pairs: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        pairs.push((name, value.to_string()));
    }
}

fn push_positive(pairs: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<u32>) {
    if let Some(value) = value.filter(|v| *v > 0) {
        pairs.push((name, value.to_string()));
    }
}

// ============================================================================
// Rotation & graveyard requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddToRotationRequest {
    pub shoe_id: String,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetireShoeRequest {
    pub shoe_id: String,
    /// 1 to 5.
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miles_run: Option<f64>,
}

/// Partial update of a graveyard entry. Sent as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetiredShoeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miles_run: Option<f64>,
}

impl RetiredShoeUpdate {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        push_positive(&mut pairs, "rating", self.rating.map(u32::from));
        push_text(&mut pairs, "review", self.review.as_deref());
        if let Some(miles) = self.miles_run.filter(|m| *m > 0.0) {
            pairs.push(("miles_run", miles.to_string()));
        }
        pairs
    }
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub avg_miles_per_week: f64,
    #[serde(default)]
    pub preferred_categories: Vec<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_miles_per_week: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub active_shoes: u32,
    pub retired_shoes: u32,
    pub total_shoes: u32,
    #[serde(default)]
    pub avg_rating: f64,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub refresh_token: String,
}

/// Sign-up either yields tokens immediately or asks the user to confirm
/// their email first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl SignUpResponse {
    /// Tokens carried by the response, if it carries a complete set.
    pub fn tokens(&self) -> Option<AuthTokenResponse> {
        if self.requires_confirmation {
            return None;
        }
        Some(AuthTokenResponse {
            access_token: self.access_token.clone()?,
            token_type: self.token_type.clone(),
            expires_in: self.expires_in?,
            refresh_token: self.refresh_token.clone()?,
        })
    }
}

fn default_token_type() -> String {
    "bearer".to_string()
}
