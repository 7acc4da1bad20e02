use polars::prelude::*;
use std::io::Cursor;

use crate::domain::ScrubError;

/// Relational data source collaborator. The engine assumes it yields a
/// well-formed frame or a `Source` error; authentication and wire details
/// live behind the implementation.
pub trait SourceConnector {
    fn list_catalogs(&self) -> Result<Vec<String>, ScrubError>;
    /// (schema, table) pairs of the catalog.
    fn list_tables(&self, catalog: &str) -> Result<Vec<(String, String)>, ScrubError>;
    fn fetch(&self, schema: &str, table: &str) -> Result<DataFrame, ScrubError>;
}

/// Upload decoding collaborator: raw bytes to a frame.
pub trait FileDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DataFrame, ScrubError>;
}

/// CSV decoder over in-memory bytes, the upload path of the engine.
pub struct CsvDecoder;

impl FileDecoder for CsvDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DataFrame, ScrubError> {
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()
            .map_err(|e| ScrubError::Format(e.to_string()))?;
        if frame.width() == 0 {
            return Err(ScrubError::Format("no columns decoded".to_string()));
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_decode_round() {
        let bytes = b"id,cat,val\n1,a,10\n2,a,20\n3,b,\n";
        let frame = CsvDecoder.decode(bytes).unwrap();
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.column("val").unwrap().null_count(), 1);
    }

    #[test]
    fn csv_decode_malformed_is_format_error() {
        let bytes = b"";
        assert!(matches!(
            CsvDecoder.decode(bytes),
            Err(ScrubError::Format(_))
        ));
    }

    struct FixtureConnector;

    impl SourceConnector for FixtureConnector {
        fn list_catalogs(&self) -> Result<Vec<String>, ScrubError> {
            Ok(vec!["warehouse".to_string()])
        }

        fn list_tables(&self, catalog: &str) -> Result<Vec<(String, String)>, ScrubError> {
            if catalog != "warehouse" {
                return Err(ScrubError::Source(format!("unknown catalog {catalog}")));
            }
            Ok(vec![("dbo".to_string(), "orders".to_string())])
        }

        fn fetch(&self, schema: &str, table: &str) -> Result<DataFrame, ScrubError> {
            if schema != "dbo" || table != "orders" {
                return Err(ScrubError::Source(format!("unknown table {schema}.{table}")));
            }
            Ok(df!("id" => &[1i64, 2], "total" => &[9.5, 3.25]).unwrap())
        }
    }

    #[test]
    fn connector_contract() {
        let connector = FixtureConnector;
        assert_eq!(connector.list_catalogs().unwrap(), vec!["warehouse"]);
        let tables = connector.list_tables("warehouse").unwrap();
        assert_eq!(tables[0].1, "orders");
        let frame = connector.fetch("dbo", "orders").unwrap();
        assert_eq!(frame.height(), 2);
        assert!(matches!(
            connector.fetch("dbo", "missing"),
            Err(ScrubError::Source(_))
        ));
    }
}
