use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("static selector"));
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("static selector"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th, td").expect("static selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// Value of one property cell. `TextWithLinks` is produced only when the
/// source cell contained at least one hyperlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    TextWithLinks { text: String, links: Vec<String> },
}

impl FieldValue {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::TextWithLinks { text, .. } => text,
        }
    }

    pub fn links(&self) -> &[String] {
        match self {
            Self::Text(_) => &[],
            Self::TextWithLinks { links, .. } => links,
        }
    }
}

/// Insertion-ordered label -> value mapping extracted from a property table.
/// Re-inserting an existing label overwrites its value in place, keeping the
/// original position.
#[derive(Debug, Clone, Default)]
pub struct PropertyTable {
    entries: Vec<(String, FieldValue)>,
}

impl PropertyTable {
    pub fn insert(&mut self, label: String, value: FieldValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(key, _)| *key == label) {
            entry.1 = value;
        } else {
            self.entries.push((label, value));
        }
    }

    pub fn get(&self, label: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == label)
            .map(|(_, value)| value)
    }

    /// Text component of the labelled value, whichever variant it is.
    pub fn text(&self, label: &str) -> Option<&str> {
        self.get(label).map(FieldValue::text)
    }

    pub fn links(&self, label: &str) -> Option<&[String]> {
        self.get(label).map(FieldValue::links)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries
            .iter()
            .map(|(label, value)| (label.as_str(), value))
    }
}

/// Extract the first property table from a rendered page body.
///
/// Each row with at least two cells contributes one entry: the first cell's
/// trimmed text as the label, the second cell as the value. Rows with fewer
/// cells are skipped. Fragments without any table produce an empty mapping.
pub fn extract_properties(html: &str) -> PropertyTable {
    let document = Html::parse_document(html);
    let mut properties = PropertyTable::default();

    let Some(table) = document.select(&TABLE_SELECTOR).next() else {
        return properties;
    };

    for row in table.select(&ROW_SELECTOR) {
        let cells = row.select(&CELL_SELECTOR).collect::<Vec<_>>();
        if cells.len() < 2 {
            continue;
        }
        let label = cells[0].text().collect::<String>().trim().to_string();
        properties.insert(label, cell_value(&cells[1]));
    }

    properties
}

/// Cell text keeps line separators between sub-elements; hyperlink targets
/// are collected in document order.
fn cell_value(cell: &ElementRef<'_>) -> FieldValue {
    let text = cell
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let links = cell
        .select(&LINK_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    if links.is_empty() {
        FieldValue::Text(text)
    } else {
        FieldValue::TextWithLinks { text, links }
    }
}
