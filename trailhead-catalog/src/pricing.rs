use serde::Serialize;
use trailhead_core::Specialty;

/// Breakdown of a reservation total, all in minor units.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Quote {
    pub base_cents: i64,
    pub addons_cents: i64,
    pub total_cents: i64,
}

/// Server-side pricing. The base price always comes from the tour store,
/// never from the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingEngine;

impl PricingEngine {
    pub fn new() -> Self {
        Self
    }

    /// `total = base + Σ(addon.price × guests)`.
    ///
    /// Add-ons are expected to be sanitized already; negative prices are
    /// ignored here as well so the invariant holds for any caller.
    pub fn quote(&self, base_price_cents: i64, addons: &[Specialty], guests: u32) -> Quote {
        let guests = i64::from(guests);
        let addons_cents: i64 = addons
            .iter()
            .filter(|a| a.price_cents >= 0)
            .map(|a| a.price_cents.saturating_mul(guests))
            .fold(0i64, i64::saturating_add);

        Quote {
            base_cents: base_price_cents,
            addons_cents,
            total_cents: base_price_cents.saturating_add(addons_cents),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addon(name: &str, price_cents: i64) -> Specialty {
        Specialty {
            name: name.to_string(),
            price_cents,
            description: None,
        }
    }

    #[test]
    fn test_addons_are_priced_per_guest() {
        let engine = PricingEngine::new();
        let quote = engine.quote(10_000, &[addon("Lobster Roll", 1_800)], 2);
        assert_eq!(quote.addons_cents, 3_600);
        assert_eq!(quote.total_cents, 13_600);
    }

    #[test]
    fn test_no_addons_is_base_price() {
        let engine = PricingEngine::new();
        assert_eq!(engine.quote(10_000, &[], 5).total_cents, 10_000);
    }

    #[test]
    fn test_multiple_addons_sum() {
        let engine = PricingEngine::new();
        let quote = engine.quote(
            25_000,
            &[addon("Kayak", 4_000), addon("Lunch", 1_550), addon("Refund hack", -9_000)],
            3,
        );
        assert_eq!(quote.total_cents, 25_000 + 3 * (4_000 + 1_550));
    }
}
