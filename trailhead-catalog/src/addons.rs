use serde::{Deserialize, Deserializer};
use serde_json::Value;
use trailhead_core::Specialty;

/// An add-on as submitted by the client. Nothing here is trusted: the shape
/// is loose on purpose so malformed entries can be dropped instead of
/// failing the whole request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddonSelection {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    /// Price in major units (e.g. `18` or `18.5`).
    #[serde(default)]
    pub price: Value,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
}

/// Any non-string value reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Deserializes an add-on list without ever failing the enclosing request.
/// Entries that are not objects become empty selections, which
/// [`sanitize_addons`] drops; a value that is not a list reads as no add-ons.
pub fn lenient_selections<'de, D>(deserializer: D) -> Result<Vec<AddonSelection>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries,
        _ => Vec::new(),
    };
    Ok(entries
        .into_iter()
        .map(|entry| serde_json::from_value(entry).unwrap_or_default())
        .collect())
}

impl AddonSelection {
    /// Converts to a priced specialty, or `None` if the entry is malformed:
    /// blank name, non-numeric price, or negative price.
    pub fn to_specialty(&self) -> Option<Specialty> {
        let name = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
        let price = self.price.as_f64().filter(|p| p.is_finite() && *p >= 0.0)?;

        Some(Specialty {
            name: name.to_string(),
            price_cents: (price * 100.0).round() as i64,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
    }
}

/// Keeps the well-formed add-ons, in order, silently dropping the rest.
pub fn sanitize_addons(selections: &[AddonSelection]) -> Vec<Specialty> {
    let kept: Vec<Specialty> = selections.iter().filter_map(AddonSelection::to_specialty).collect();
    if kept.len() != selections.len() {
        tracing::debug!(
            "Dropped {} malformed add-on selection(s)",
            selections.len() - kept.len()
        );
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Vec<AddonSelection> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_addon_is_converted_to_cents() {
        let addons = sanitize_addons(&parse(json!([
            { "name": "Lobster Roll", "price": 18, "description": "Fresh" },
            { "name": "Chowder", "price": 7.25 }
        ])));
        assert_eq!(addons.len(), 2);
        assert_eq!(addons[0].price_cents, 1_800);
        assert_eq!(addons[0].description.as_deref(), Some("Fresh"));
        assert_eq!(addons[1].price_cents, 725);
    }

    #[test]
    fn test_malformed_addons_are_dropped() {
        let addons = sanitize_addons(&parse(json!([
            { "name": "", "price": 10 },
            { "name": "Soup", "price": -5 },
            { "name": "   ", "price": 3 },
            { "name": "Bread", "price": "4" },
            { "price": 2 },
            { "name": "Free Map", "price": 0 }
        ])));
        assert_eq!(addons.len(), 1);
        assert_eq!(addons[0].name, "Free Map");
        assert_eq!(addons[0].price_cents, 0);
    }

    #[test]
    fn test_wrongly_typed_fields_drop_only_their_entry() {
        let addons = sanitize_addons(&parse(json!([
            { "name": "Lobster Roll", "price": 18 },
            { "name": 5, "price": 10 },
            { "name": "Soup", "price": 3, "description": 7 },
            { "name": ["Bread"], "price": 1 }
        ])));
        assert_eq!(addons.len(), 2);
        assert_eq!(addons[0].name, "Lobster Roll");
        assert_eq!(addons[1].name, "Soup");
        assert_eq!(addons[1].price_cents, 300);
        assert_eq!(addons[1].description, None);
    }

    #[derive(Deserialize)]
    struct Envelope {
        #[serde(default, deserialize_with = "lenient_selections")]
        addons: Vec<AddonSelection>,
    }

    #[test]
    fn test_lenient_list_tolerates_non_objects_and_non_lists() {
        let env: Envelope = serde_json::from_value(json!({
            "addons": ["Lobster Roll", 4, null, { "name": "Chowder", "price": 7 }]
        }))
        .unwrap();
        let addons = sanitize_addons(&env.addons);
        assert_eq!(addons.len(), 1);
        assert_eq!(addons[0].name, "Chowder");

        for odd in [json!("Lobster Roll"), json!(12), json!({ "name": "x" }), Value::Null] {
            let env: Envelope = serde_json::from_value(json!({ "addons": odd })).unwrap();
            assert!(env.addons.is_empty());
        }

        let env: Envelope = serde_json::from_value(json!({})).unwrap();
        assert!(env.addons.is_empty());
    }
}
