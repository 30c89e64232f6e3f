use std::{
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use crate::error::SourceError;

/// Cell values that tabular tools write for "no value". A cell matching one
/// of these (after trimming) is absent, never an identifier.
pub const MISSING_VALUE_SENTINELS: [&str; 19] = [
    "",
    "#N/A",
    "#N/A N/A",
    "#NA",
    "-1.#IND",
    "-1.#QNAN",
    "-NaN",
    "-nan",
    "1.#IND",
    "1.#QNAN",
    "<NA>",
    "N/A",
    "NA",
    "NULL",
    "NaN",
    "None",
    "n/a",
    "nan",
    "null",
];

pub fn is_missing_value<T: AsRef<str>>(cell: T) -> bool {
    let trimmed = cell.as_ref().trim();
    MISSING_VALUE_SENTINELS.contains(&trimmed)
}

/// An external identifier taken verbatim (modulo surrounding whitespace)
/// from a source cell. It is never validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Returns `None` if the cell holds a missing-value sentinel.
    pub fn from_cell<T: AsRef<str>>(cell: T) -> Option<Self> {
        if is_missing_value(&cell) {
            None
        } else {
            Some(Identifier(cell.as_ref().trim().to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reads one column of a delimited file as a sequence of identifiers, with
/// `None` standing for an absent cell.
#[derive(Debug, Clone)]
pub struct IdentifierSource {
    delimiter: u8,
    separator: Option<char>,
}

impl Default for IdentifierSource {
    fn default() -> Self {
        Self {
            delimiter: b',',
            separator: None,
        }
    }
}

impl IdentifierSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// When set, a cell holding several identifiers (e.g. `123|456` or
    /// `['123', '456']` with `,`) fans out into one identifier per piece.
    pub fn with_separator(mut self, separator: Option<char>) -> Self {
        self.separator = separator;
        self
    }

    pub fn extract_path<P: AsRef<Path>>(
        &self,
        path: P,
        column: &str,
    ) -> Result<Vec<Option<Identifier>>, SourceError> {
        let file = File::open(path).map_err(csv::Error::from)?;
        self.extract(BufReader::new(file), column)
    }

    pub fn extract<R: Read>(
        &self,
        mut reader: R,
        column: &str,
    ) -> Result<Vec<Option<Identifier>>, SourceError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(csv::Error::from)?;
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(data.as_slice());
        let headers = rdr.headers()?.clone();
        let Some(index) = headers
            .iter()
            .position(|header| header.trim_start_matches('\u{feff}').trim() == column)
        else {
            return Err(SourceError::Schema {
                column: column.to_owned(),
                available: headers.iter().map(|header| header.to_owned()).collect(),
            });
        };
        let mut cells = Vec::new();
        let mut record = csv::StringRecord::new();
        loop {
            let start = rdr.position().byte() as usize;
            if !rdr.read_record(&mut record)? {
                break;
            }
            let end = rdr.position().byte() as usize;
            // The csv reader skips blank lines, but in a one-column file a
            // blank line is an empty cell.
            for _ in 0..count_skipped_blank_lines(&data, start, end) {
                cells.push(None);
            }
            // Ragged rows are allowed; a short row just has nothing in our column.
            self.push_cell(record.get(index).unwrap_or_default(), &mut cells);
        }
        Ok(cells)
    }

    fn push_cell(&self, cell: &str, cells: &mut Vec<Option<Identifier>>) {
        let Some(separator) = self.separator else {
            cells.push(Identifier::from_cell(cell));
            return;
        };
        let trimmed = cell.trim().trim_start_matches('[').trim_end_matches(']');
        if is_missing_value(trimmed) {
            cells.push(None);
            return;
        }
        for piece in trimmed.split(separator) {
            let piece = piece.trim().trim_matches(|c| c == '\'' || c == '"');
            cells.push(Identifier::from_cell(piece));
        }
    }
}

/// Counts the blank lines the csv reader discarded at the start of the
/// record occupying `data[start..end]`.
fn count_skipped_blank_lines(data: &[u8], start: usize, end: usize) -> usize {
    let Some(slice) = data.get(start..end) else {
        return 0;
    };
    let run_len = slice
        .iter()
        .take_while(|&&b| b == b'\r' || b == b'\n')
        .count();
    let mut run = &slice[..run_len];
    // The tail of a CRLF terminator that belongs to the previous record.
    if start > 0 && data[start - 1] == b'\r' && run.first() == Some(&b'\n') {
        run = &run[1..];
    }
    let mut lines = 0;
    let mut i = 0;
    while i < run.len() {
        if run[i] == b'\r' && run.get(i + 1) == Some(&b'\n') {
            i += 1;
        }
        lines += 1;
        i += 1;
    }
    lines
}

/// Drops absent cells, so that a sentinel can never be sent as a query literal.
pub fn present<I: IntoIterator<Item = Option<Identifier>>>(
    cells: I,
) -> impl Iterator<Item = Identifier> {
    cells.into_iter().flatten()
}

#[cfg(test)]
mod tests {
    use super::{
        count_skipped_blank_lines, is_missing_value, present, Identifier, IdentifierSource,
    };
    use crate::error::SourceError;

    const AUTHORS_CSV: &str = "name,viaf\n\
        Barack Obama,52010985\n\
        Nobody,NaN\n\
        Somebody,\n\
        Duplicate,52010985\n\
        Padded,  76323201  \n";

    fn values(cells: &[Option<Identifier>]) -> Vec<Option<&str>> {
        cells.iter().map(|cell| cell.as_ref().map(|id| id.as_str())).collect()
    }

    #[test]
    fn test_is_missing_value_works() {
        assert!(is_missing_value(""));
        assert!(is_missing_value("  "));
        assert!(is_missing_value("NaN"));
        assert!(is_missing_value("nan"));
        assert!(is_missing_value(" <NA> "));
        assert!(!is_missing_value("52010985"));
        assert!(!is_missing_value("banana"));
    }

    #[test]
    fn test_extract_works() {
        let cells = IdentifierSource::new()
            .extract(AUTHORS_CSV.as_bytes(), "viaf")
            .unwrap();
        assert_eq!(
            values(&cells),
            vec![
                Some("52010985"),
                None,
                None,
                Some("52010985"),
                Some("76323201")
            ]
        );
    }

    #[test]
    fn test_present_excludes_sentinels() {
        let cells = IdentifierSource::new()
            .extract(AUTHORS_CSV.as_bytes(), "viaf")
            .unwrap();
        let identifiers: Vec<Identifier> = present(cells).collect();
        assert_eq!(identifiers.len(), 3);
        assert!(identifiers
            .iter()
            .all(|id| !id.as_str().eq_ignore_ascii_case("nan") && !id.as_str().is_empty()));
    }

    #[test]
    fn test_extract_missing_column_is_schema_error() {
        let err = IdentifierSource::new()
            .extract(AUTHORS_CSV.as_bytes(), "wikidata")
            .unwrap_err();
        match err {
            SourceError::Schema { column, available } => {
                assert_eq!(column, "wikidata");
                assert_eq!(available, vec!["name", "viaf"]);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_with_delimiter_and_ragged_rows_works() {
        let tsv = "viaf\tname\n52010985\tBarack Obama\n34562701\n";
        let cells = IdentifierSource::new()
            .with_delimiter(b'\t')
            .extract(tsv.as_bytes(), "name")
            .unwrap();
        assert_eq!(values(&cells), vec![Some("Barack Obama"), None]);
    }

    #[test]
    fn test_extract_with_separator_fans_out() {
        let csv = "viaf\n\"['52010985', '34562701']\"\n76323201\nnan\n\"1|2\"\n";
        let cells = IdentifierSource::new()
            .with_separator(Some(','))
            .extract(csv.as_bytes(), "viaf")
            .unwrap();
        assert_eq!(
            values(&cells),
            vec![
                Some("52010985"),
                Some("34562701"),
                Some("76323201"),
                None,
                Some("1|2")
            ]
        );
    }

    #[test]
    fn test_extract_keeps_blank_lines_as_absent_cells() {
        let csv = "viaf\n52010985\nNaN\n\nnan\n<NA>\n";
        let cells = IdentifierSource::new().extract(csv.as_bytes(), "viaf").unwrap();
        assert_eq!(values(&cells), vec![Some("52010985"), None, None, None, None]);

        let csv = "viaf\r\n1\r\n\r\n\r\n2\r\n";
        let cells = IdentifierSource::new().extract(csv.as_bytes(), "viaf").unwrap();
        assert_eq!(values(&cells), vec![Some("1"), None, None, Some("2")]);

        let csv = "viaf\n\n1\n\"multi\nline\"\n\n2";
        let cells = IdentifierSource::new().extract(csv.as_bytes(), "viaf").unwrap();
        assert_eq!(
            values(&cells),
            vec![None, Some("1"), Some("multi\nline"), None, Some("2")]
        );
    }

    #[test]
    fn test_count_skipped_blank_lines_works() {
        assert_eq!(count_skipped_blank_lines(b"a\nb\n", 2, 4), 0);
        assert_eq!(count_skipped_blank_lines(b"a\n\n\nb\n", 2, 6), 2);
        assert_eq!(count_skipped_blank_lines(b"a\r\n\r\nb", 2, 6), 1);
        assert_eq!(count_skipped_blank_lines(b"a\r\r\rb", 2, 5), 2);
        assert_eq!(count_skipped_blank_lines(b"a", 5, 9), 0);
    }

    #[test]
    fn test_extract_strips_bom_from_header() {
        let csv = "\u{feff}viaf\n52010985\n";
        let cells = IdentifierSource::new().extract(csv.as_bytes(), "viaf").unwrap();
        assert_eq!(values(&cells), vec![Some("52010985")]);
    }
}
