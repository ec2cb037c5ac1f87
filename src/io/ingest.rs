//! CSV event ingest.
//!
//! One row per reconstructed object:
//!
//! ```text
//! event,object,pt,eta,phi,label,truth,truth_pt
//! 1,jet,50.0,0.1,0.2,5,1,48.3
//! 1,jet,40.0,0.5,-1.0,0,,
//! 1,lepton,45.0,0.0,0.5,,,
//! 1,met,30.0,,-0.5,,,
//! ```
//!
//! - `object` is `jet`, `lepton` or `met`
//! - `label == 5` marks a tagged jet; `truth == 1` a jet from the leptonic branch
//! - for `met`, `pt` is the magnitude and `eta` is ignored
//!
//! Rows of one event must be contiguous. Bad rows are skipped and reported;
//! cardinality is checked later, per event, by the fitter.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{EventRecord, JetRecord, LeptonCandidate, MissingMomentum};
use crate::error::{AppError, EXIT_NO_DATA, EXIT_USAGE};

const REQUIRED_COLUMNS: [&str; 5] = ["event", "object", "pt", "eta", "phi"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub event: Option<u64>,
    pub message: String,
}

/// Ingest output: events in first-seen order plus row errors.
#[derive(Debug, Clone)]
pub struct IngestedEvents {
    pub events: Vec<EventRecord>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ObjectRow {
    Jet(JetRecord),
    Lepton(LeptonCandidate),
    Met(MissingMomentum),
}

/// Load events from a CSV file.
pub fn load_events(path: &Path) -> Result<IngestedEvents, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_events(file)
}

/// Read events from any CSV source.
pub fn read_events<R: Read>(source: R) -> Result<IngestedEvents, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for name in REQUIRED_COLUMNS {
        if !header_map.contains_key(name) {
            return Err(AppError::new(EXIT_USAGE, format!("Missing required column: `{name}`")));
        }
    }

    let mut events: Vec<EventRecord> = Vec::new();
    let mut closed: HashSet<u64> = HashSet::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header; CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    event: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let (id, row) = match parse_row(&record, &header_map) {
            Ok(parsed) => parsed,
            Err(message) => {
                row_errors.push(RowError {
                    line,
                    event: None,
                    message,
                });
                continue;
            }
        };

        let current = events.last().map(|e| e.id);
        if current != Some(id) {
            if closed.contains(&id) {
                row_errors.push(RowError {
                    line,
                    event: Some(id),
                    message: format!("Rows of event {id} are not contiguous."),
                });
                continue;
            }
            if let Some(prev) = current {
                closed.insert(prev);
            }
            events.push(EventRecord {
                id,
                ..EventRecord::default()
            });
        }

        // Just pushed or matched above, so there is a last event.
        if let Some(event) = events.last_mut() {
            match row {
                ObjectRow::Jet(jet) => event.jets.push(jet),
                ObjectRow::Lepton(lepton) => event.leptons.push(lepton),
                ObjectRow::Met(met) => event.met.push(met),
            }
        }
    }

    if events.is_empty() {
        return Err(AppError::new(EXIT_NO_DATA, "No events found in input."));
    }

    Ok(IngestedEvents {
        events,
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<(u64, ObjectRow), String> {
    let id_raw = get_required(record, header_map, "event")?;
    let id = id_raw
        .parse::<u64>()
        .map_err(|_| format!("Invalid event id: `{id_raw}`"))?;

    let object = get_required(record, header_map, "object")?.to_ascii_lowercase();
    let pt = parse_f64(get_required(record, header_map, "pt")?, "pt")?;
    let phi = parse_f64(get_required(record, header_map, "phi")?, "phi")?;

    let row = match object.as_str() {
        "jet" => {
            let eta = parse_f64(get_required(record, header_map, "eta")?, "eta")?;
            let label = match get_optional(record, header_map, "label") {
                Some(s) => s.parse::<i32>().map_err(|_| format!("Invalid label: `{s}`"))?,
                None => 0,
            };
            let truth_leptonic = match get_optional(record, header_map, "truth") {
                Some("1") => Some(true),
                Some("0") => Some(false),
                Some(other) => return Err(format!("Invalid truth flag: `{other}`")),
                None => None,
            };
            let truth_pt = match get_optional(record, header_map, "truth_pt") {
                Some(s) => Some(parse_f64(s, "truth_pt")?),
                None => None,
            };
            ObjectRow::Jet(JetRecord {
                pt,
                eta,
                phi,
                label,
                truth_leptonic,
                truth_pt,
            })
        }
        "lepton" => {
            let eta = parse_f64(get_required(record, header_map, "eta")?, "eta")?;
            ObjectRow::Lepton(LeptonCandidate::new(pt, eta, phi))
        }
        "met" => ObjectRow::Met(MissingMomentum::new(pt, phi)),
        other => return Err(format!("Unknown object kind: `{other}`")),
    };

    Ok((id, row))
}

fn get_required<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

/// Non-finite values parse fine here; the fitter rejects them per event.
fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    s.parse::<f64>().map_err(|_| format!("Invalid `{name}` value: `{s}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "\
event,object,pt,eta,phi,label,truth,truth_pt
1,jet,50.0,0.1,0.2,5,0,52.0
1,jet,60.0,-0.3,1.0,5,1,
1,jet,40.0,0.5,-1.0,0,,
1,jet,35.0,0.2,2.0,0,,
1,lepton,45.0,0.0,0.5,,,
1,met,30.0,,-0.5,,,
2,jet,70.0,1.1,0.4,5,,
2,met,12.0,,3.0,,,
";

    #[test]
    fn reads_events_in_first_seen_order() {
        let data = read_events(WELL_FORMED.as_bytes()).unwrap();
        assert_eq!(data.rows_read, 8);
        assert!(data.row_errors.is_empty());
        assert_eq!(data.events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);

        let first = &data.events[0];
        assert_eq!(first.jets.len(), 4);
        assert_eq!(first.leptons, vec![LeptonCandidate::new(45.0, 0.0, 0.5)]);
        assert_eq!(first.met, vec![MissingMomentum::new(30.0, -0.5)]);
        assert!(first.jets[0].is_tagged());
        assert_eq!(first.jets[0].truth_leptonic, Some(false));
        assert_eq!(first.jets[0].truth_pt, Some(52.0));
        assert_eq!(first.jets[1].truth_leptonic, Some(true));
        assert_eq!(first.jets[1].truth_pt, None);
        assert!(!first.jets[2].is_tagged());
        assert_eq!(first.jets[2].truth_leptonic, None);

        // Incomplete events are still returned; the fitter decides.
        assert_eq!(data.events[1].jets.len(), 1);
    }

    #[test]
    fn bad_rows_are_skipped_and_reported() {
        let csv = "\
event,object,pt,eta,phi,label
1,jet,abc,0.1,0.2,5
1,photon,10,0,0,
1,lepton,45.0,,0.5,
1,met,30.0,,-0.5,
";
        let data = read_events(csv.as_bytes()).unwrap();
        assert_eq!(data.row_errors.len(), 3);
        assert_eq!(data.row_errors[0].line, 2);
        assert!(data.row_errors[1].message.contains("photon"));
        assert!(data.row_errors[2].message.contains("eta"));
        assert_eq!(data.events.len(), 1);
        assert_eq!(data.events[0].met.len(), 1);
    }

    #[test]
    fn non_contiguous_rows_are_rejected() {
        let csv = "\
event,object,pt,eta,phi
1,met,30.0,,-0.5
2,met,20.0,,0.5
1,met,10.0,,1.0
";
        let data = read_events(csv.as_bytes()).unwrap();
        assert_eq!(data.events.len(), 2);
        assert_eq!(data.events[0].met.len(), 1);
        assert_eq!(data.row_errors.len(), 1);
        assert_eq!(data.row_errors[0].event, Some(1));
    }

    #[test]
    fn headers_are_case_insensitive_and_bom_tolerant() {
        let csv = "\u{feff}Event,OBJECT,Pt,Eta,Phi\n5,met,30,,0\n";
        let data = read_events(csv.as_bytes()).unwrap();
        assert_eq!(data.events[0].id, 5);
    }

    #[test]
    fn missing_column_is_a_usage_error() {
        let err = read_events("event,object,pt,phi\n1,met,30,0\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn empty_input_is_a_no_data_error() {
        let err = read_events("event,object,pt,eta,phi\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NO_DATA);
    }
}
