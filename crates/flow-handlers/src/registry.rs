use flow_core::{HandlerRegistry, Pipeline};

use crate::steps::{BrandSearchHandler, CheckoutDraftHandler, DealsHandler, RankHandler, StyleBriefHandler,
                   TryonHandler};

/// Registro offline para el pipeline bloqueado, en el mismo orden.
pub fn offline_registry() -> HandlerRegistry {
    HandlerRegistry::new().with("STYLE_BRIEF", StyleBriefHandler)
                          .with("DEALS", DealsHandler)
                          .with("BRAND_SEARCH", BrandSearchHandler)
                          .with("RANK", RankHandler)
                          .with("TRYON", TryonHandler)
                          .with("CHECKOUT_DRAFT", CheckoutDraftHandler)
}

/// Handler key declarado por cada handler offline, por step key.
pub fn offline_handler_key(step_key: &str) -> Option<&'static str> {
    match step_key {
        "STYLE_BRIEF" => Some(StyleBriefHandler::HANDLER_KEY),
        "DEALS" => Some(DealsHandler::HANDLER_KEY),
        "BRAND_SEARCH" => Some(BrandSearchHandler::HANDLER_KEY),
        "RANK" => Some(RankHandler::HANDLER_KEY),
        "TRYON" => Some(TryonHandler::HANDLER_KEY),
        "CHECKOUT_DRAFT" => Some(CheckoutDraftHandler::HANDLER_KEY),
        _ => None,
    }
}

/// Step keys del pipeline cuyo handler key no coincide con el del registro
/// offline (o que no tienen handler).
pub fn mismatched_handlers(pipeline: &Pipeline) -> Vec<&'static str> {
    pipeline.entries()
            .iter()
            .filter(|e| offline_handler_key(e.step_key) != Some(e.handler_key))
            .map(|e| e.step_key)
            .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_matches_locked_pipeline_in_order() {
        let pipeline = Pipeline::locked();
        let registry = offline_registry();
        assert_eq!(registry.keys(), pipeline.step_keys().as_slice());
        assert!(registry.missing_for(&pipeline).is_empty());
        assert!(mismatched_handlers(&pipeline).is_empty());
    }

    #[test]
    fn foreign_pipeline_is_reported() {
        let pipeline = Pipeline::from_pairs(&[("STYLE_BRIEF", "stylist"), ("DEALS", "a1"), ("EXTRA", "x")]);
        assert_eq!(mismatched_handlers(&pipeline), vec!["DEALS", "EXTRA"]);
    }
}
