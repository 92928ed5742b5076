//! Attribute value rendering

use crate::constants::{MAX_VALUE_CHARS, TRUNCATION_MARKER};
use crate::store::AttrValue;

/// Render an attribute value for output
pub fn format_value<H>(value: &AttrValue<H>) -> String {
    match value {
        AttrValue::Text(s) => truncate(s),
        AttrValue::Number(n) => format_number(*n),
        AttrValue::Bool(b) => b.to_string(),
        AttrValue::Point(p) => format!("({}, {})", format_number(p.x), format_number(p.y)),
        AttrValue::Size(s) => format!("{}x{}", format_number(s.width), format_number(s.height)),
        AttrValue::Rect(r) => format!(
            "({}, {}) {}x{}",
            format_number(r.x),
            format_number(r.y),
            format_number(r.width),
            format_number(r.height)
        ),
        AttrValue::Element(_) => "<element>".to_string(),
        AttrValue::Elements(list) => format!("<{} elements>", list.len()),
        AttrValue::Other(description) => truncate(description),
    }
}

/// Whole numbers print without a fractional part
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_VALUE_CHARS) {
        Some((cut, _)) => format!("{}{}", &s[..cut], TRUNCATION_MARKER),
        None => s.to_string(),
    }
}
