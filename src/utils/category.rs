//! Known report categories and keyword-based suggestions for free text.

pub const DEFAULT_CATEGORY: &str = "Other";

pub const CATEGORIES: [&str; 9] = [
    "Road",
    "Garbage",
    "Streetlight",
    "Trees",
    "Pollution",
    "Vandalism",
    "Water Leak",
    "Graffiti",
    "Other",
];

const KEYWORDS: &[(&str, &[&str])] = &[
    ("Road", &["pothole", "road", "asphalt"]),
    ("Garbage", &["garbage", "trash", "waste", "bin"]),
    ("Streetlight", &["streetlight", "light out", "lamp"]),
    ("Trees", &["tree", "branch", "fallen"]),
    ("Pollution", &["smog", "smoke", "pollution"]),
    ("Vandalism", &["vandal", "broken", "damage"]),
    ("Water Leak", &["leak", "water", "pipe"]),
    ("Graffiti", &["graffiti", "paint", "spray"]),
];

/// Categories whose keywords appear in `text`, in catalogue order.
pub fn suggest_categories(text: &str) -> Vec<&'static str> {
    let text = text.to_lowercase();
    if text.trim().is_empty() {
        return Vec::new();
    }
    KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(category, _)| *category)
        .collect()
}

/// Matches a known category case-insensitively, keeping free text otherwise.
pub fn normalize_category(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return DEFAULT_CATEGORY.to_string();
    }
    CATEGORIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(trimmed))
        .map(|c| c.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_from_keywords() {
        assert_eq!(
            suggest_categories("Huge POTHOLE next to an overflowing trash bin"),
            vec!["Road", "Garbage"]
        );
        assert_eq!(suggest_categories("Lamp flickering all night"), vec!["Streetlight"]);
        assert!(suggest_categories("   ").is_empty());
        assert!(suggest_categories("nothing relevant").is_empty());
    }

    #[test]
    fn normalizes_known_and_free_text() {
        assert_eq!(normalize_category(Some("water leak")), "Water Leak");
        assert_eq!(normalize_category(Some("  Noise  ")), "Noise");
        assert_eq!(normalize_category(None), "Other");
        assert_eq!(normalize_category(Some("")), "Other");
    }
}
