use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// A whole-day shift is exclusive for its date; hourly shifts only exclude
/// themselves (and are excluded by any whole-day booking).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShiftType {
    WholeDay,
    Hourly,
}

impl ShiftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftType::WholeDay => "whole_day",
            ShiftType::Hourly => "hourly",
        }
    }
}

impl fmt::Display for ShiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShiftType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whole_day" => Ok(ShiftType::WholeDay),
            "hourly" => Ok(ShiftType::Hourly),
            other => Err(CoreError::UnknownValue {
                kind: "shift type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shift {
    pub id: Uuid,
    pub name: String,
    pub shift_type: ShiftType,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: bool,
}

impl Shift {
    pub fn new(name: impl Into<String>, shift_type: ShiftType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            shift_type,
            start_time: None,
            end_time: None,
            is_active: true,
        }
    }

    /// "09:00 - 12:00" style label, when both ends are known.
    pub fn time_label(&self) -> Option<String> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(format!(
                "{} - {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )),
            _ => None,
        }
    }
}
