//! RANK: presupuesto + descuento + bonus de paleta.

use std::collections::HashSet;

use serde_json::Value;

use flow_core::{HandlerContext, HandlerError, StepHandler};

use crate::artifacts::{load, round_to, to_payload, BrandSearch, ProductCandidate, RankedItem, Ranking, StyleBrief,
                       DEFAULT_BUDGET_MAX};

const TOP_N: usize = 10;
const PALETTE_BONUS: f64 = 0.1;

#[derive(Debug, Default, Clone, Copy)]
pub struct RankHandler;

impl RankHandler {
    pub const HANDLER_KEY: &'static str = "ranker";
}

/// `0.45·max(0, 1 − sale/budget) + 0.45·min(desc/50, 1) + bonus`, a 4
/// decimales.
pub fn score(candidate: &ProductCandidate, budget_max: f64, palette: &HashSet<String>) -> f64 {
    let budget_score = (1.0 - candidate.sale_price / budget_max.max(1.0)).max(0.0);
    let deal_score = (candidate.discount_pct / 50.0).min(1.0);
    let bonus = if palette.contains(&candidate.color.to_lowercase()) {
        PALETTE_BONUS
    } else {
        0.0
    };
    round_to(budget_score * 0.45 + deal_score * 0.45 + bonus, 4)
}

pub fn rank(candidates: Vec<ProductCandidate>, budget_max: f64, palette: &HashSet<String>) -> Vec<RankedItem> {
    let mut ranked: Vec<RankedItem> = candidates.into_iter()
                                                .map(|c| RankedItem { score: score(&c, budget_max, palette),
                                                                      candidate: c })
                                                .collect();
    // Estable: empates conservan el orden de búsqueda.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(TOP_N);
    ranked
}

impl StepHandler for RankHandler {
    fn produce(&self, ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
        let brief: StyleBrief = load(ctx, "style_brief")?;
        let search: BrandSearch = load(ctx, "brand_search")?;
        let palette: HashSet<String> = brief.palette.iter().map(|c| c.to_lowercase()).collect();
        let budget_max = brief.budget_max.filter(|b| *b > 0.0).unwrap_or(DEFAULT_BUDGET_MAX);
        to_payload(&Ranking { ranked_items: rank(search.product_candidates, budget_max, &palette) })
    }
}
