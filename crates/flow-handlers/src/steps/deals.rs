//! DEALS sintéticos: un descuento estable por marca.

use log::debug;
use serde_json::Value;

use flow_core::{HandlerContext, HandlerError, StepHandler};

use crate::artifacts::{load, or_defaults, to_payload, Deal, Deals, StyleBrief, DEFAULT_BRANDS};

const MAX_BRANDS: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct DealsHandler;

impl DealsHandler {
    pub const HANDLER_KEY: &'static str = "a2";
}

/// `10 + (suma de bytes de la marca en minúsculas mod 31)`.
pub fn discount_pct(brand: &str) -> u32 {
    let sum: u32 = brand.to_lowercase().chars().map(|c| c as u32).sum();
    10 + sum % 31
}

pub fn synthetic_deals(brands: &[String]) -> Deals {
    let scanned: Vec<String> = brands.iter().take(MAX_BRANDS).cloned().collect();
    let deals = scanned.iter()
                       .map(|brand| Deal { brand: brand.clone(),
                                           discount_pct: discount_pct(brand),
                                           sale_end_in_days: 2 + (brand.chars().count() % 5) as u32,
                                           source: "synthetic".into() })
                       .collect();
    Deals { brands_scanned: scanned,
            deals,
            data_mode: "mock".into(),
            provider: "synthetic".into() }
}

impl StepHandler for DealsHandler {
    fn produce(&self, ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
        let brief: StyleBrief = load(ctx, "style_brief")?;
        let brands = or_defaults(&brief.recommended_brands, &DEFAULT_BRANDS);
        let deals = synthetic_deals(&brands);
        debug!("deals:run_id={} brands={}", ctx.run_id(), deals.deals.len());
        to_payload(&deals)
    }
}
