use std::path::Path;

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::citation::{PageIdentity, build_citation};
use crate::config::ConverterConfig;
use crate::confluence::{ConfluenceApi, ConfluenceClient, ConfluenceClientConfig};
use crate::output::{CitationSink, DirSink, combined_filename, record_filename};
use crate::table::extract_properties;

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub cql: String,
    pub extra_tags: Vec<String>,
}

/// Outcome of one page in the batch.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub id: String,
    pub title: String,
    pub action: String,
    pub detail: Option<String>,
}

/// One produced citation, kept in memory for caller-side reporting and the
/// combined file.
#[derive(Debug, Clone, Serialize)]
pub struct CitationOutput {
    pub page_id: String,
    pub title: String,
    pub filename: String,
    pub ris: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ConvertReport {
    pub success: bool,
    pub requested_pages: usize,
    pub converted: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub pages: Vec<PageResult>,
    pub citations: Vec<CitationOutput>,
    pub combined_filename: Option<String>,
    pub request_count: usize,
}

/// Run the full pipeline against the live API, writing `.ris` files when an
/// output directory is given.
pub fn convert_pages(
    config: &ConverterConfig,
    options: &ConvertOptions,
    output_dir: Option<&Path>,
) -> Result<ConvertReport> {
    let client_config = ConfluenceClientConfig::from_config(config);
    let base_url = client_config.base_url.trim_end_matches('/').to_string();
    let mut client = ConfluenceClient::new(client_config)?;
    let now = Local::now().naive_local();

    match output_dir {
        Some(dir) => {
            let mut sink = DirSink::new(dir);
            convert_pages_with_api(options, &mut client, Some(&mut sink), &base_url, now)
        }
        None => convert_pages_with_api(options, &mut client, None, &base_url, now),
    }
}

/// Batch conversion against any provider/sink pair.
///
/// One page's failure never aborts the batch: fetch errors, missing bodies
/// and missing property tables each record a page result and move on. With
/// a sink, every record is written as it is produced; the combined payload
/// goes out once at the end.
pub fn convert_pages_with_api(
    options: &ConvertOptions,
    api: &mut dyn ConfluenceApi,
    mut sink: Option<&mut dyn CitationSink>,
    base_url: &str,
    now: NaiveDateTime,
) -> Result<ConvertReport> {
    let mut report = ConvertReport::default();

    let handles = match api.search(&options.cql) {
        Ok(handles) => handles,
        Err(error) => {
            report.errors.push(format!("search failed: {error:#}"));
            report.request_count = api.request_count();
            return Ok(report);
        }
    };
    report.requested_pages = handles.len();

    let mut combined = Vec::new();
    for handle in handles {
        let page = match api.get_page(&handle.id) {
            Ok(page) => page,
            Err(error) => {
                report
                    .errors
                    .push(format!("{} ({}): {error:#}", handle.title, handle.id));
                record_page(&mut report, &handle.id, &handle.title, "error", Some(format!("{error:#}")));
                continue;
            }
        };
        let Some(page) = page else {
            record_page(&mut report, &handle.id, &handle.title, "skipped_missing", None);
            continue;
        };
        let Some(body) = page.body_html else {
            record_page(&mut report, &page.id, &page.title, "skipped_no_body", None);
            continue;
        };

        let properties = extract_properties(&body);
        if properties.is_empty() {
            record_page(&mut report, &page.id, &page.title, "skipped_no_properties", None);
            continue;
        }

        let identity = PageIdentity {
            id: page.id.clone(),
            title: page.title.clone(),
        };
        let record = build_citation(&identity, &properties, &options.extra_tags, base_url, now.date());
        let ris = record.to_ris_string();
        let filename = record_filename(&page.title);

        if let Some(sink) = sink.as_deref_mut()
            && let Err(error) = sink.write_record(&filename, &ris)
        {
            report
                .errors
                .push(format!("{} ({}): {error:#}", page.title, page.id));
            record_page(&mut report, &page.id, &page.title, "error", Some(format!("{error:#}")));
            continue;
        }

        combined.push(ris.clone());
        record_page(&mut report, &page.id, &page.title, "converted", None);
        report.converted += 1;
        report.citations.push(CitationOutput {
            page_id: page.id,
            title: page.title,
            filename,
            ris,
        });
    }

    if let Some(sink) = sink.as_deref_mut()
        && !combined.is_empty()
    {
        let filename = combined_filename(now);
        let mut payload = String::new();
        for ris in &combined {
            payload.push_str(ris);
            payload.push_str("\n\n");
        }
        match sink.write_record(&filename, &payload) {
            Ok(()) => report.combined_filename = Some(filename),
            Err(error) => report.errors.push(format!("combined file: {error:#}")),
        }
    }

    report.request_count = api.request_count();
    report.success = report.errors.is_empty();
    Ok(report)
}

fn record_page(
    report: &mut ConvertReport,
    id: &str,
    title: &str,
    action: &str,
    detail: Option<String>,
) {
    if action != "converted" {
        report.skipped += 1;
    }
    report.pages.push(PageResult {
        id: id.to_string(),
        title: title.to_string(),
        action: action.to_string(),
        detail,
    });
}
