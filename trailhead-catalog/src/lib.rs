pub mod addons;
pub mod pricing;

pub use addons::{sanitize_addons, AddonSelection};
pub use pricing::{PricingEngine, Quote};
