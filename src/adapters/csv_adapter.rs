//! CSV file event adapter.
//!
//! One file holds recorded two-venue quotes with the header
//! `timestamp,symbol,primary_price,secondary_price,volume`. Volume may be
//! empty. Prices are parsed but not validated here; the engine discards
//! non-positive quotes itself.

use crate::domain::error::EngineError;
use crate::domain::market::PriceEvent;
use crate::ports::event_port::EventPort;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvEventAdapter {
    path: PathBuf,
}

impl CsvEventAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Result<Vec<PriceEvent>, EngineError> {
        let content = fs::read_to_string(&self.path).map_err(|e| EngineError::EventData {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut events = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| EngineError::EventData {
                reason: format!("CSV parse error: {}", e),
            })?;
            let row = line + 2;

            let field = |idx: usize, name: &str| {
                record.get(idx).ok_or_else(|| EngineError::EventData {
                    reason: format!("row {}: missing {} column", row, name),
                })
            };

            let ts_str = field(0, "timestamp")?.trim();
            let timestamp = TIMESTAMP_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(ts_str, fmt).ok())
                .ok_or_else(|| EngineError::EventData {
                    reason: format!("row {}: invalid timestamp {:?}", row, ts_str),
                })?;

            let symbol = field(1, "symbol")?.trim().to_string();

            let primary_price: f64 = field(2, "primary_price")?.trim().parse().map_err(|e| {
                EngineError::EventData {
                    reason: format!("row {}: invalid primary_price: {}", row, e),
                }
            })?;

            let secondary_price: f64 =
                field(3, "secondary_price")?.trim().parse().map_err(|e| {
                    EngineError::EventData {
                        reason: format!("row {}: invalid secondary_price: {}", row, e),
                    }
                })?;

            let volume = match record.get(4).map(str::trim) {
                None | Some("") => None,
                Some(v) => Some(v.parse::<u64>().map_err(|e| EngineError::EventData {
                    reason: format!("row {}: invalid volume: {}", row, e),
                })?),
            };

            events.push(PriceEvent {
                symbol,
                timestamp,
                primary_price,
                secondary_price,
                volume,
            });
        }

        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

impl EventPort for CsvEventAdapter {
    fn fetch_events(&self, symbol: Option<&str>) -> Result<Vec<PriceEvent>, EngineError> {
        let mut events = self.read_all()?;
        if let Some(symbol) = symbol {
            events.retain(|e| e.symbol == symbol);
        }
        tracing::info!(
            path = %self.path.display(),
            events = events.len(),
            "loaded recorded events"
        );
        Ok(events)
    }

    fn list_symbols(&self) -> Result<Vec<String>, EngineError> {
        let symbols: BTreeSet<String> = self.read_all()?.into_iter().map(|e| e.symbol).collect();
        Ok(symbols.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn write_events(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.csv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    const HEADER: &str = "timestamp,symbol,primary_price,secondary_price,volume\n";

    #[test]
    fn fetch_events_parses_and_sorts() {
        let (_dir, path) = write_events(&format!(
            "{HEADER}\
             2024-03-04 10:00:02,TCS,3500.0,3501.5,200\n\
             2024-03-04T10:00:01,INFY,1500.0,1499.0,\n\
             2024-03-04 10:00:00,TCS,3500.0,3500.5,100\n"
        ));
        let adapter = CsvEventAdapter::new(path);
        let events = adapter.fetch_events(None).unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap()
        );
        assert_eq!(events[0].symbol, "TCS");
        assert_eq!(events[0].volume, Some(100));
        assert_eq!(events[1].symbol, "INFY");
        assert_eq!(events[1].volume, None);
        assert_eq!(events[2].secondary_price, 3501.5);
    }

    #[test]
    fn fetch_events_filters_by_symbol() {
        let (_dir, path) = write_events(&format!(
            "{HEADER}\
             2024-03-04 10:00:00,TCS,3500.0,3500.5,100\n\
             2024-03-04 10:00:01,INFY,1500.0,1499.0,50\n"
        ));
        let adapter = CsvEventAdapter::new(path);
        let events = adapter.fetch_events(Some("INFY")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].symbol, "INFY");
    }

    #[test]
    fn list_symbols_is_sorted_and_unique() {
        let (_dir, path) = write_events(&format!(
            "{HEADER}\
             2024-03-04 10:00:00,TCS,3500.0,3500.5,100\n\
             2024-03-04 10:00:01,INFY,1500.0,1499.0,50\n\
             2024-03-04 10:00:02,TCS,3500.0,3500.5,100\n"
        ));
        let adapter = CsvEventAdapter::new(path);
        assert_eq!(adapter.list_symbols().unwrap(), vec!["INFY", "TCS"]);
    }

    #[test]
    fn invalid_price_is_an_error() {
        let (_dir, path) =
            write_events(&format!("{HEADER}2024-03-04 10:00:00,TCS,abc,3500.5,100\n"));
        let adapter = CsvEventAdapter::new(path);
        let err = adapter.fetch_events(None).unwrap_err();
        assert!(matches!(err, EngineError::EventData { reason } if reason.contains("primary_price")));
    }

    #[test]
    fn invalid_timestamp_is_an_error() {
        let (_dir, path) = write_events(&format!("{HEADER}04/03/2024,TCS,1.0,2.0,1\n"));
        let adapter = CsvEventAdapter::new(path);
        assert!(matches!(
            adapter.fetch_events(None),
            Err(EngineError::EventData { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        let adapter = CsvEventAdapter::new(PathBuf::from("/nonexistent/events.csv"));
        assert!(adapter.fetch_events(None).is_err());
    }

    #[test]
    fn non_positive_price_is_passed_through() {
        let (_dir, path) = write_events(&format!("{HEADER}2024-03-04 10:00:00,TCS,0,3500.5,\n"));
        let adapter = CsvEventAdapter::new(path);
        let events = adapter.fetch_events(None).unwrap();
        assert_eq!(events[0].primary_price, 0.0);
    }
}
