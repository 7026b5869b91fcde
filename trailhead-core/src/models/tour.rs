use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How hard a tour is. Unknown stored values read back as `Unspecified`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Moderate,
    Challenging,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Moderate => "moderate",
            Difficulty::Challenging => "challenging",
            Difficulty::Unspecified => "unspecified",
        }
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "easy" => Difficulty::Easy,
            "moderate" => Difficulty::Moderate,
            "challenging" => Difficulty::Challenging,
            _ => Difficulty::Unspecified,
        }
    }
}

/// One line of a tour's itinerary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItineraryEntry {
    pub day: String,
    pub activity: String,
}

/// A priced add-on. Used both for a tour's catalog and for the add-ons
/// captured on a reservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Specialty {
    pub name: String,
    pub price_cents: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tour {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Authoritative price in minor units. The booking flow only ever reads it.
    pub base_price_cents: i64,
    pub duration: Option<String>,
    pub difficulty: Difficulty,
    pub itinerary: Vec<ItineraryEntry>,
    pub specialties: Vec<Specialty>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tour {
    pub fn new(title: impl Into<String>, base_price_cents: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            base_price_cents,
            duration: None,
            difficulty: Difficulty::Unspecified,
            itinerary: Vec::new(),
            specialties: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
