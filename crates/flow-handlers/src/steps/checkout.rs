//! CHECKOUT_DRAFT: borrador de compra que siempre requiere aprobación.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

use flow_core::{HandlerContext, HandlerError, StepHandler};

use crate::artifacts::{load, to_payload, CheckoutDraft, CheckoutDraftBody, CheckoutItem, Ranking};

const MAX_ITEMS: usize = 3;
const SEARCH_BASE: &str = "https://www.google.com/search?q=";

// Caracteres que quedan sin codificar en un query string (form encoding).
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

#[derive(Debug, Default, Clone, Copy)]
pub struct CheckoutDraftHandler;

impl CheckoutDraftHandler {
    pub const HANDLER_KEY: &'static str = "checkout";
}

/// Codifica `text` para un query string, con `+` en lugar de espacios.
pub fn encode_query(text: &str) -> String {
    utf8_percent_encode(text, QUERY_ENCODE_SET).to_string().replace("%20", "+")
}

pub fn checkout_url(product_url: Option<&str>, brand: &str, sku: &str) -> String {
    match product_url {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => format!("{SEARCH_BASE}{}", encode_query(&format!("{brand} {sku} buy"))),
    }
}

impl StepHandler for CheckoutDraftHandler {
    fn produce(&self, ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
        let ranking: Ranking = load(ctx, "rank")?;
        let items = ranking.ranked_items
                           .iter()
                           .take(MAX_ITEMS)
                           .map(|item| {
                               let c = &item.candidate;
                               CheckoutItem { sku: c.sku.clone(),
                                              title: c.title.clone(),
                                              brand: c.brand.clone(),
                                              sale_price: c.sale_price,
                                              source: c.source.clone(),
                                              checkout_url: checkout_url(c.product_url.as_deref(), &c.brand, &c.sku),
                                              qty: 1 }
                           })
                           .collect();
        to_payload(&CheckoutDraft { checkout_draft: CheckoutDraftBody { approval_required: true,
                                                                        items } })
    }
}
