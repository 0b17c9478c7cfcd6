use serde_json::Value;

use flow_core::{HandlerContext, HandlerError, StepHandler};

use crate::artifacts::{load, to_payload, Ranking, Tryon, TryonResult};

const MAX_PREVIEWS: usize = 4;

/// TRYON: prompts de preview en borrador para los primeros ítems rankeados.
#[derive(Debug, Default, Clone, Copy)]
pub struct TryonHandler;

impl TryonHandler {
    pub const HANDLER_KEY: &'static str = "tryon";
}

impl StepHandler for TryonHandler {
    fn produce(&self, ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
        let ranking: Ranking = load(ctx, "rank")?;
        let tryon_results = ranking.ranked_items
                                   .iter()
                                   .take(MAX_PREVIEWS)
                                   .map(|item| {
                                       let c = &item.candidate;
                                       TryonResult { sku: c.sku.clone(),
                                                     brand: c.brand.clone(),
                                                     status: "draft".into(),
                                                     preview_prompt: format!("Overlay a {} {} from {} on the user's portrait \
                                                                              preserving pose and lighting.",
                                                                             c.color, c.category, c.brand) }
                                   })
                                   .collect();
        to_payload(&Tryon { tryon_results })
    }
}
