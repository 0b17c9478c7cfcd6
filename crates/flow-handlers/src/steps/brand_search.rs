//! BRAND_SEARCH sintético: candidatos por marca × categoría.

use std::collections::HashMap;

use serde_json::Value;

use flow_core::{HandlerContext, HandlerError, StepHandler};

use crate::artifacts::{load, or_defaults, round_to, to_payload, BrandSearch, Deals, ProductCandidate, StyleBrief,
                       DEFAULT_BRANDS, DEFAULT_CATEGORIES};

const MAX_BRANDS: usize = 5;
const MAX_CATEGORIES: usize = 2;
const MAX_CANDIDATES: usize = 12;
const SEARCH_PALETTE: [&str; 3] = ["black", "navy", "white"];
const FALLBACK_DISCOUNT: f64 = 10.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct BrandSearchHandler;

impl BrandSearchHandler {
    pub const HANDLER_KEY: &'static str = "a1";
}

pub fn synthetic_candidates(brands: &[String], categories: &[String], palette: &[String],
                            discounts: &HashMap<String, f64>)
                            -> Vec<ProductCandidate> {
    let mut candidates = Vec::new();
    for (i, brand) in brands.iter().take(MAX_BRANDS).enumerate() {
        let discount = discounts.get(brand).copied().unwrap_or(FALLBACK_DISCOUNT);
        for (j, category) in categories.iter().take(MAX_CATEGORIES).enumerate() {
            let color = palette[(i + j) % palette.len()].clone();
            let base_price = (55 + i * 18 + j * 12) as f64;
            let prefix: String = category.chars().take(3).collect();
            candidates.push(ProductCandidate { sku: format!("{}-{prefix}-{}{}",
                                                            brand.to_lowercase().replace(' ', ""),
                                                            i + 1,
                                                            j + 1),
                                               title: format!("{brand} {category}"),
                                               brand: brand.clone(),
                                               category: category.clone(),
                                               color,
                                               price: base_price,
                                               sale_price: round_to(base_price * (1.0 - discount / 100.0), 2),
                                               discount_pct: discount,
                                               source: "synthetic".into(),
                                               data_source: "mock".into(),
                                               product_url: None });
        }
    }
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

impl StepHandler for BrandSearchHandler {
    fn produce(&self, ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
        let brief: StyleBrief = load(ctx, "style_brief")?;
        let deals: Deals = load(ctx, "deals")?;

        let categories = or_defaults(&brief.recommended_categories, &DEFAULT_CATEGORIES);
        let palette = or_defaults(&brief.palette, &SEARCH_PALETTE);
        // Marcas en el orden de los deals; sin deals, las del brief.
        let mut brands: Vec<String> = Vec::new();
        let mut discounts = HashMap::new();
        for deal in &deals.deals {
            if !discounts.contains_key(&deal.brand) {
                brands.push(deal.brand.clone());
            }
            discounts.insert(deal.brand.clone(), f64::from(deal.discount_pct));
        }
        if brands.is_empty() {
            brands = or_defaults(&brief.recommended_brands, &DEFAULT_BRANDS);
        }

        to_payload(&BrandSearch { product_candidates: synthetic_candidates(&brands, &categories, &palette, &discounts),
                                  data_mode: "mock".into(),
                                  provider: "synthetic".into() })
    }
}
