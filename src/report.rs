use log::{debug, info};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::error::{EtlError, Result};

const REPORT_MARKER: &str = "output-";
const REPORT_SUFFIX: &str = ".xml";
const ROBOT_ROOT: &str = "robot";

/// Pass/fail/skip counts of one `<stat>` entry in a report's total section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub pass: u64,
    pub fail: u64,
    pub skip: u64,
    pub name: String,
}

// Only the path robot > statistics > total > stat is modelled; everything
// else in output.xml (suites, keywords, messages) is skipped by serde.
#[derive(Debug, Deserialize)]
struct RobotXml {
    statistics: Option<StatisticsXml>,
}

#[derive(Debug, Deserialize)]
struct StatisticsXml {
    total: Option<TotalXml>,
}

#[derive(Debug, Deserialize)]
struct TotalXml {
    #[serde(default)]
    stat: Vec<StatXml>,
}

#[derive(Debug, Deserialize)]
struct StatXml {
    #[serde(rename = "@pass")]
    pass: Option<String>,
    #[serde(rename = "@fail")]
    fail: Option<String>,
    #[serde(rename = "@skip")]
    skip: Option<String>,
    #[serde(rename = "$text", default)]
    name: String,
}

// Matched against the whole entry path, so `output-20240603/output.xml` counts.
fn is_report_file(path: &str) -> bool {
    path.contains(REPORT_MARKER) && path.ends_with(REPORT_SUFFIX)
}

/// Local name of the document's first element.
fn root_element(text: &str) -> std::result::Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(Some(
                    String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Names of the `output-*.xml` reports in the archive, in sorted order.
pub fn select_report_files(archive: &Archive) -> Result<Vec<String>> {
    let reports: Vec<String> = archive
        .file_names()
        .iter()
        .filter(|name| is_report_file(name))
        .cloned()
        .collect();

    if reports.is_empty() {
        return Err(EtlError::NoReportFiles {
            key: archive.key().to_string(),
        });
    }

    Ok(reports)
}

fn parse_count(file: &str, stat: &str, attribute: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| EtlError::MalformedReport {
            file: file.to_string(),
            reason: format!("<stat> '{stat}' has non-numeric {attribute}=\"{value}\""),
        })
}

/// Parses one Robot Framework `output.xml` into its total-statistics entries.
///
/// A missing `skip` attribute (Robot Framework 3.x) counts as zero; missing
/// `pass` or `fail` is an error.
pub fn parse_report(file: &str, xml: &[u8]) -> Result<Vec<StatRecord>> {
    let malformed = |reason: String| EtlError::MalformedReport {
        file: file.to_string(),
        reason,
    };

    let text = std::str::from_utf8(xml).map_err(|e| malformed(format!("not UTF-8: {e}")))?;
    match root_element(text).map_err(|e| malformed(format!("invalid XML: {e}")))? {
        Some(root) if root == ROBOT_ROOT => {}
        Some(root) => return Err(malformed(format!("root element is <{root}>, not <robot>"))),
        None => return Err(malformed("document has no root element".to_string())),
    }
    let robot: RobotXml =
        quick_xml::de::from_str(text).map_err(|e| malformed(format!("invalid XML: {e}")))?;

    let total = robot
        .statistics
        .ok_or_else(|| malformed("missing <statistics> section".to_string()))?
        .total
        .ok_or_else(|| malformed("missing <total> statistics".to_string()))?;

    if total.stat.is_empty() {
        return Err(malformed("<total> contains no <stat> entries".to_string()));
    }

    total
        .stat
        .into_iter()
        .map(|stat| -> Result<StatRecord> {
            let name = stat.name.trim().to_string();
            let required = |value: Option<String>, attribute: &str| {
                value.ok_or_else(|| {
                    malformed(format!("<stat> '{name}' is missing the {attribute} attribute"))
                })
            };

            let pass = required(stat.pass, "pass")?;
            let fail = required(stat.fail, "fail")?;
            let skip = stat.skip.unwrap_or_else(|| "0".to_string());

            Ok(StatRecord {
                pass: parse_count(file, &name, "pass", &pass)?,
                fail: parse_count(file, &name, "fail", &fail)?,
                skip: parse_count(file, &name, "skip", &skip)?,
                name,
            })
        })
        .collect()
}

/// Parses every report file in the archive, keeping file and entry order.
pub fn extract_stats(archive: &mut Archive) -> Result<Vec<StatRecord>> {
    let reports = select_report_files(archive)?;
    info!(
        "Found {} report file(s) in {}: {}",
        reports.len(),
        archive.key(),
        reports.join(", ")
    );

    let mut records = Vec::new();
    for report in &reports {
        let xml = archive.read(report)?;
        let parsed = parse_report(report, &xml)?;
        debug!("{report}: {parsed:?}");
        records.extend(parsed);
    }

    Ok(records)
}
