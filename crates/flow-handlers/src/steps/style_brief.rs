//! STYLE_BRIEF sin fuente de fotos conectada: brief de onboarding.

use serde_json::Value;

use flow_core::{HandlerContext, HandlerError, StepHandler};

use crate::artifacts::{to_payload, StyleBrief, DEFAULT_BRANDS, DEFAULT_CATEGORIES};

pub const ONBOARDING_PALETTE: [&str; 3] = ["navy", "cream", "olive"];
pub const ONBOARDING_BUDGET_MAX: f64 = 120.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct StyleBriefHandler;

impl StyleBriefHandler {
    pub const HANDLER_KEY: &'static str = "stylist";
}

pub fn onboarding_brief() -> StyleBrief {
    StyleBrief { source: "onboarding".into(),
                 analysis_method: "none".into(),
                 requires_drive_connection: true,
                 message: Some("Connect a photo folder to generate personalized style briefs.".into()),
                 recommended_brands: DEFAULT_BRANDS.iter().map(|s| s.to_string()).collect(),
                 recommended_categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
                 palette: ONBOARDING_PALETTE.iter().map(|s| s.to_string()).collect(),
                 budget_max: Some(ONBOARDING_BUDGET_MAX) }
}

impl StepHandler for StyleBriefHandler {
    fn produce(&self, _ctx: &HandlerContext<'_>) -> Result<Value, HandlerError> {
        to_payload(&onboarding_brief())
    }
}
