//! Payloads tipados de cada step.
//!
//! El core trata los payloads como JSON opaco; aquí se fija su forma. Los
//! campos con `#[serde(default)]` permiten leer artifacts producidos por
//! versiones más viejas de un handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use flow_core::{HandlerContext, HandlerError};

pub const DEFAULT_BRANDS: [&str; 3] = ["Zara", "H&M", "Mango"];
pub const DEFAULT_CATEGORIES: [&str; 3] = ["dress", "top", "bottom"];
pub const DEFAULT_BUDGET_MAX: f64 = 150.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleBrief {
    pub source: String,
    pub analysis_method: String,
    #[serde(default)]
    pub requires_drive_connection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub recommended_brands: Vec<String>,
    #[serde(default)]
    pub recommended_categories: Vec<String>,
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub brand: String,
    pub discount_pct: u32,
    pub sale_end_in_days: u32,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deals {
    pub brands_scanned: Vec<String>,
    #[serde(default)]
    pub deals: Vec<Deal>,
    pub data_mode: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCandidate {
    pub sku: String,
    pub title: String,
    pub brand: String,
    pub category: String,
    pub color: String,
    pub price: f64,
    pub sale_price: f64,
    pub discount_pct: f64,
    pub source: String,
    pub data_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandSearch {
    #[serde(default)]
    pub product_candidates: Vec<ProductCandidate>,
    pub data_mode: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    #[serde(flatten)]
    pub candidate: ProductCandidate,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    #[serde(default)]
    pub ranked_items: Vec<RankedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryonResult {
    pub sku: String,
    pub brand: String,
    pub status: String,
    pub preview_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tryon {
    pub tryon_results: Vec<TryonResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub sku: String,
    pub title: String,
    pub brand: String,
    pub sale_price: f64,
    pub source: String,
    pub checkout_url: String,
    pub qty: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutDraftBody {
    pub approval_required: bool,
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutDraft {
    pub checkout_draft: CheckoutDraftBody,
}

/// Lee y deserializa el artifact `kind` del run; su ausencia es un error.
pub fn load<T: for<'de> Deserialize<'de>>(ctx: &HandlerContext<'_>, kind: &str) -> Result<T, HandlerError> {
    let raw = ctx.require_artifact(kind)?;
    serde_json::from_value(raw).map_err(|e| HandlerError::InvalidInput(format!("artifact '{kind}': {e}")))
}

pub fn to_payload<T: Serialize>(payload: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(payload).map_err(|e| HandlerError::InvalidInput(format!("payload: {e}")))
}

/// `values` o, si está vacío, `defaults`.
pub fn or_defaults(values: &[String], defaults: &[&str]) -> Vec<String> {
    if values.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        values.to_vec()
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
