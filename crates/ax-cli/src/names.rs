//! Display vocabulary for role, subrole and action names
//!
//! Platform names look like `AXShowMenu`; output uses `show_menu`.

const PLATFORM_PREFIX: &str = "AX";

/// `AXShowMenu` → `show_menu`, `AXURLField` → `url_field`
///
/// Names with characters outside `[A-Za-z0-9]` are left untouched.
pub fn display_name(name: &str) -> String {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return name.to_string();
    }
    let stripped = name.strip_prefix(PLATFORM_PREFIX).filter(|s| !s.is_empty()).unwrap_or(name);

    let chars: Vec<char> = stripped.chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// `show_menu` → `AXShowMenu`; names already carrying `AX` pass through
pub fn platform_name(name: &str) -> String {
    if name.starts_with(PLATFORM_PREFIX) {
        return name.to_string();
    }
    let mut out = String::from(PLATFORM_PREFIX);
    for word in name.split(['_', '-', ' ']).filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("AXButton"), "button");
        assert_eq!(display_name("AXShowMenu"), "show_menu");
        assert_eq!(display_name("AXURLField"), "url_field");
        assert_eq!(display_name("AXSearchField"), "search_field");
        assert_eq!(display_name("AXRaise"), "raise");
        assert_eq!(display_name("Heading1Text"), "heading1_text");
    }

    #[test]
    fn test_display_name_passes_through_custom_names() {
        let custom = "Name:Copy Link\nTarget:0x0";
        assert_eq!(display_name(custom), custom);
        assert_eq!(display_name(""), "");
        assert_eq!(display_name("AX"), "ax");
    }

    #[test]
    fn test_platform_name() {
        assert_eq!(platform_name("press"), "AXPress");
        assert_eq!(platform_name("show_menu"), "AXShowMenu");
        assert_eq!(platform_name("AXShowMenu"), "AXShowMenu");
        // 事後条件: 略語の大文字は復元されない
        assert_eq!(platform_name(&display_name("AXURLField")), "AXUrlField");
    }
}
