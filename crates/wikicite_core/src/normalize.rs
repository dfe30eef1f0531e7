use chrono::NaiveDate;

/// Country/region aliases mapped to World Bank standard names.
const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("UK", "United Kingdom"),
    ("United Kingdom", "United Kingdom"),
    ("United States", "United States"),
    ("US", "United States"),
    ("USA", "United States"),
    ("Canada", "Canada"),
    ("Australia", "Australia"),
    ("New Zealand", "New Zealand"),
    ("Germany", "Germany"),
    ("France", "France"),
    ("Netherlands", "Netherlands"),
    ("Belgium", "Belgium"),
    ("Switzerland", "Switzerland"),
    ("Austria", "Austria"),
    ("Denmark", "Denmark"),
    ("Sweden", "Sweden"),
    ("Norway", "Norway"),
    ("Finland", "Finland"),
    ("Japan", "Japan"),
    ("South Korea", "Korea, Rep."),
    ("Korea, Rep.", "Korea, Rep."),
    ("Brazil", "Brazil"),
    ("Argentina", "Argentina"),
    ("Chile", "Chile"),
    ("Mexico", "Mexico"),
    ("Spain", "Spain"),
    ("Italy", "Italy"),
    ("Portugal", "Portugal"),
    ("Ireland", "Ireland"),
    ("Scotland", "United Kingdom"),
    ("Wales", "United Kingdom"),
    ("England", "United Kingdom"),
    ("Northern Ireland", "United Kingdom"),
];

/// Canonicalize a free-text jurisdiction name: exact match first, then a
/// case-insensitive pass. `None` means no canonical mapping exists; the
/// caller decides whether to pass the original through.
pub fn normalize_country(name: &str) -> Option<&'static str> {
    let name = name.trim();
    if let Some((_, canonical)) = COUNTRY_ALIASES.iter().find(|(alias, _)| *alias == name) {
        return Some(canonical);
    }
    COUNTRY_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map(|(_, canonical)| *canonical)
}

/// Parse a free-text start date against the accepted formats, most specific
/// naming first: full month name + year, numeric month/year, ISO date, bare
/// year. Month and day default to the first when a pattern omits them.
pub fn parse_start_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{raw} 1"), "%B %Y %d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("1/{raw}"), "%d/%m/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
        .or_else(|| {
            raw.parse::<i32>()
                .ok()
                .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
        })
}
