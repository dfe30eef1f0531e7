use chrono::{Datelike, NaiveDate};

use crate::normalize::{normalize_country, parse_start_date};
use crate::table::PropertyTable;

/// Identity of the source page: the id builds the canonical page URL, the
/// title is the fallback when no "Initiative Name" property exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageIdentity {
    pub id: String,
    pub title: String,
}

/// One citation record: ordered tag/value pairs. Duplicate tags (keywords,
/// URLs) are permitted and keep their emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RisRecord {
    fields: Vec<(&'static str, String)>,
}

impl RisRecord {
    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    /// First value emitted for `tag`, if any.
    pub fn first(&self, tag: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field_tag, _)| *field_tag == tag)
            .map(|(_, value)| value.as_str())
    }

    /// Render as RIS lines: `TAG  - value` per field, terminated by the
    /// fixed `ER  - ` marker.
    pub fn to_ris_string(&self) -> String {
        let mut lines = Vec::with_capacity(self.fields.len() + 1);
        for (tag, value) in &self.fields {
            lines.push(format!("{tag}  - {value}"));
        }
        lines.push("ER  - ".to_string());
        lines.join("\n")
    }

    fn push(&mut self, tag: &'static str, value: impl Into<String>) {
        self.fields.push((tag, value.into()));
    }
}

/// Build a citation record from extracted page properties.
///
/// Missing fields simply omit their tags; nothing in here fails. Pure given
/// `accessed`, which stamps the Y2 access-date line.
pub fn build_citation(
    identity: &PageIdentity,
    table: &PropertyTable,
    extra_tags: &[String],
    base_url: &str,
    accessed: NaiveDate,
) -> RisRecord {
    let mut record = RisRecord { fields: Vec::new() };

    // STD: standards item type, understood by Zotero.
    record.push("TY", "STD");

    let title = table
        .text("Initiative Name")
        .filter(|text| !text.is_empty())
        .unwrap_or(&identity.title);
    record.push("TI", title);

    if let Some(org) = table.text("Governing Organization") {
        record.push("AU", org);
    }

    if let Some(raw) = table.text("Initiative Start") {
        match parse_start_date(raw) {
            Some(date) => {
                record.push("PY", date.year().to_string());
                record.push("DA", date.format("%Y/%m/%d").to_string());
            }
            // Unparseable dates fall back to the raw text, year-only.
            None => record.push("PY", raw),
        }
    }

    if let Some(org) = table.text("Governing Organization") {
        record.push("PB", org);
    }

    let abstract_parts = ["Method of Development", "Adoption Status", "Development Status"]
        .into_iter()
        .filter_map(|label| table.text(label).map(|value| format!("{label}: {value}")))
        .collect::<Vec<_>>();
    if !abstract_parts.is_empty() {
        record.push("AB", abstract_parts.join("; "));
    }

    for keyword in collect_keywords(table, extra_tags) {
        record.push("KW", keyword);
    }

    if let Some(links) = table.links("External Links") {
        for link in links {
            record.push("UR", link.as_str());
        }
    }
    record.push(
        "UR",
        format!(
            "{}/pages/viewpage.action?pageId={}",
            base_url.trim_end_matches('/'),
            identity.id
        ),
    );

    record.push("Y2", accessed.format("%Y/%m/%d").to_string());

    record
}

/// Keywords in fixed field order: type labels, topic labels, jurisdiction,
/// region, then caller-supplied tags. Label fields are comma-split; the
/// jurisdiction fields go through country normalization, passing the
/// original text through when no canonical mapping exists.
fn collect_keywords(table: &PropertyTable, extra_tags: &[String]) -> Vec<String> {
    let mut keywords = Vec::new();

    for label in ["Type Labels", "Topic Labels"] {
        if let Some(text) = table.text(label) {
            keywords.extend(
                text.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(ToString::to_string),
            );
        }
    }

    for label in ["Jurisdiction", "Region"] {
        if let Some(text) = table.text(label) {
            let trimmed = text.trim();
            let keyword = normalize_country(trimmed).unwrap_or(trimmed);
            if !keyword.is_empty() {
                keywords.push(keyword.to_string());
            }
        }
    }

    keywords.extend(
        extra_tags
            .iter()
            .filter(|tag| !tag.is_empty())
            .cloned(),
    );

    keywords
}

#[cfg(test)]
mod tests {
    use super::{PageIdentity, build_citation};
    use crate::table::{FieldValue, PropertyTable, extract_properties};
    use chrono::NaiveDate;

    const BASE_URL: &str = "https://confluence.example.org";

    fn accessed() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).expect("valid date")
    }

    fn identity() -> PageIdentity {
        PageIdentity {
            id: "123".to_string(),
            title: "Test IG".to_string(),
        }
    }

    fn text_table(entries: &[(&str, &str)]) -> PropertyTable {
        let mut table = PropertyTable::default();
        for (label, value) in entries {
            table.insert(label.to_string(), FieldValue::Text(value.to_string()));
        }
        table
    }

    #[test]
    fn full_record_layout() {
        let table = text_table(&[
            ("Initiative Name", "Test IG"),
            ("Governing Organization", "HL7"),
            ("Initiative Start", "January 2021"),
            ("Jurisdiction", "UK"),
        ]);
        let record = build_citation(&identity(), &table, &[], BASE_URL, accessed());
        assert_eq!(
            record.to_ris_string(),
            "TY  - STD\n\
             TI  - Test IG\n\
             AU  - HL7\n\
             PY  - 2021\n\
             DA  - 2021/01/01\n\
             PB  - HL7\n\
             KW  - United Kingdom\n\
             UR  - https://confluence.example.org/pages/viewpage.action?pageId=123\n\
             Y2  - 2026/08/07\n\
             ER  - "
        );
    }

    #[test]
    fn build_is_deterministic() {
        let table = text_table(&[
            ("Initiative Name", "Test IG"),
            ("Governing Organization", "HL7"),
        ]);
        let first = build_citation(&identity(), &table, &[], BASE_URL, accessed());
        let second = build_citation(&identity(), &table, &[], BASE_URL, accessed());
        assert_eq!(first.to_ris_string(), second.to_ris_string());
    }

    #[test]
    fn page_title_is_the_fallback_title() {
        let record = build_citation(
            &identity(),
            &text_table(&[]),
            &[],
            BASE_URL,
            accessed(),
        );
        assert_eq!(record.first("TI"), Some("Test IG"));

        let record = build_citation(
            &identity(),
            &text_table(&[("Initiative Name", "")]),
            &[],
            BASE_URL,
            accessed(),
        );
        assert_eq!(record.first("TI"), Some("Test IG"));
    }

    #[test]
    fn unparseable_start_date_keeps_raw_text() {
        let table = text_table(&[("Initiative Start", "early pilot phase")]);
        let record = build_citation(&identity(), &table, &[], BASE_URL, accessed());
        assert_eq!(record.first("PY"), Some("early pilot phase"));
        assert_eq!(record.first("DA"), None);
    }

    #[test]
    fn abstract_joins_present_fields_in_fixed_order() {
        let table = text_table(&[
            ("Development Status", "Active"),
            ("Method of Development", "Consensus"),
        ]);
        let record = build_citation(&identity(), &table, &[], BASE_URL, accessed());
        assert_eq!(
            record.first("AB"),
            Some("Method of Development: Consensus; Development Status: Active")
        );
    }

    #[test]
    fn keywords_cover_labels_jurisdiction_region_and_extra_tags() {
        let table = text_table(&[
            ("Type Labels", "standard, , guide"),
            ("Topic Labels", "terminology"),
            ("Jurisdiction", "US"),
            ("Region", "North America"),
        ]);
        let extra = vec!["FHIR".to_string(), "Healthcare".to_string()];
        let record = build_citation(&identity(), &table, &extra, BASE_URL, accessed());
        let keywords = record
            .fields()
            .iter()
            .filter(|(tag, _)| *tag == "KW")
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            keywords,
            vec![
                "standard",
                "guide",
                "terminology",
                "United States",
                // No canonical mapping: passes through instead of dropping.
                "North America",
                "FHIR",
                "Healthcare",
            ]
        );
    }

    #[test]
    fn external_links_precede_the_page_url() {
        let mut table = text_table(&[]);
        table.insert(
            "External Links".to_string(),
            FieldValue::TextWithLinks {
                text: "Spec".to_string(),
                links: vec![
                    "https://a.example/spec".to_string(),
                    "https://b.example/guide".to_string(),
                ],
            },
        );
        let record = build_citation(&identity(), &table, &[], BASE_URL, accessed());
        let urls = record
            .fields()
            .iter()
            .filter(|(tag, _)| *tag == "UR")
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            urls,
            vec![
                "https://a.example/spec",
                "https://b.example/guide",
                "https://confluence.example.org/pages/viewpage.action?pageId=123",
            ]
        );
    }

    #[test]
    fn builds_from_extracted_html() {
        let html = r#"
            <table>
              <tr><th>Initiative Name</th><td>Patient Access IG</td></tr>
              <tr><th>Governing Organization</th><td>HL7 UK</td></tr>
              <tr><th>Initiative Start</th><td>2020-03-15</td></tr>
            </table>
        "#;
        let table = extract_properties(html);
        let record = build_citation(&identity(), &table, &[], BASE_URL, accessed());
        assert_eq!(record.first("TI"), Some("Patient Access IG"));
        assert_eq!(record.first("PY"), Some("2020"));
        assert_eq!(record.first("DA"), Some("2020/03/15"));
    }
}
