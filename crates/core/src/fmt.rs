//! Display helpers shared by every front end.
//!
//! Scores render with four decimals; anything absent or non-numeric renders as
//! `N/A`.

use serde_json::Value;

use crate::model::TdaValue;

pub const SCORE_DECIMALS: usize = 4;
pub const MISSING: &str = "N/A";

pub fn fixed(v: f64, decimals: usize) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v.is_sign_positive() { "Inf" } else { "-Inf" }.to_string();
    }
    let decimals = decimals.min(9);
    let s = format!("{v:.decimals$}");
    // "-0.0000" reads as noise in a table.
    if s.starts_with('-') && s[1..].chars().all(|c| c == '0' || c == '.') {
        s[1..].to_string()
    } else {
        s
    }
}

pub fn score(v: Option<f64>) -> String {
    v.map(|v| fixed(v, SCORE_DECIMALS))
        .unwrap_or_else(|| MISSING.to_string())
}

pub fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| MISSING.to_string())
}

/// Strings without quotes, numbers with score formatting when fractional.
pub fn value(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => MISSING.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => score(n.as_f64()),
        },
        Some(other) => other.to_string(),
    }
}

/// `persistence_entropy` → `Persistence Entropy`.
pub fn title_case_key(key: &str) -> String {
    key.split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn tda_value(v: &TdaValue) -> String {
    match v {
        TdaValue::Number(n) => fixed(*n, SCORE_DECIMALS),
        TdaValue::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) => score(n.as_f64()),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        TdaValue::Text(s) => s.clone(),
        TdaValue::Other(v) => v.to_string(),
    }
}
