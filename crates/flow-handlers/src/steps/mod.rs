//! Un handler por step del pipeline bloqueado.

pub mod brand_search;
pub mod checkout;
pub mod deals;
pub mod rank;
pub mod style_brief;
pub mod tryon;

pub use brand_search::BrandSearchHandler;
pub use checkout::CheckoutDraftHandler;
pub use deals::DealsHandler;
pub use rank::RankHandler;
pub use style_brief::StyleBriefHandler;
pub use tryon::TryonHandler;
