//! Recommendation records and the tolerant decoder for backend items.
//!
//! Backend items may be a bare string, an object with a `title`, or something
//! malformed. None of these are errors: every item becomes a [`Recommendation`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_ICON: &str = "Lightbulb";
pub const UNKNOWN_TITLE: &str = "Unknown Recommendation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Case-insensitive; anything unrecognised falls back to `Medium`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Priority::Low,
            "high" | "critical" => Priority::High,
            _ => Priority::Medium,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub icon: String,
    pub priority: Priority,
    pub details: Vec<String>,
}

impl Recommendation {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            icon: DEFAULT_ICON.to_string(),
            priority: Priority::Medium,
            details: Vec::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::titled(UNKNOWN_TITLE)
    }

    /// Normalize one backend item.
    pub fn from_value(v: &Value) -> Self {
        match v {
            Value::String(s) => Self::titled(s.clone()),
            Value::Object(map) => {
                let title = match map.get("title") {
                    Some(t) if is_truthy(t) => value_text(t),
                    _ => return Self::unknown(),
                };

                let description = map
                    .get("description")
                    .filter(|d| is_truthy(d))
                    .map(value_text)
                    .unwrap_or_default();

                let icon = map
                    .get("icon")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(DEFAULT_ICON)
                    .to_string();

                let priority = map
                    .get("priority")
                    .and_then(Value::as_str)
                    .map(Priority::parse)
                    .unwrap_or_default();

                let details = match map.get("details") {
                    Some(Value::Array(items)) => items.iter().map(value_text).collect(),
                    _ => Vec::new(),
                };

                Self {
                    title,
                    description,
                    icon,
                    priority,
                    details,
                }
            }
            _ => Self::unknown(),
        }
    }
}

/// Normalize a whole `recommendations` array.
pub fn normalize_recommendations(items: &[Value]) -> Vec<Recommendation> {
    items.iter().map(Recommendation::from_value).collect()
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
