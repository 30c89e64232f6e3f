use anyhow::Result;

use crate::{identifier_csv::Identifier, reconciliation_client::MatchResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub identifier: String,
    pub result: MatchResult,
}

/// The finished, read-only output of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn entity_uris(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.result.entity_uri.as_str())
    }

    /// Writes `identifier,entityURI,label,secondaryLink` rows, with unbound
    /// fields left blank.
    pub fn write_csv<W: std::io::Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);
        writer.write_record(["identifier", "entityURI", "label", "secondaryLink"])?;
        for row in self.rows.iter() {
            writer.write_record([
                row.identifier.as_str(),
                row.result.entity_uri.as_str(),
                row.result.label.as_deref().unwrap_or_default(),
                row.result.secondary_link.as_deref().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Builds a [`ResultTable`] one identifier at a time. Rows from a single
/// `append` are kept together, in the order the endpoint returned them.
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    rows: Vec<ResultRow>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, id: &Identifier, results: Vec<MatchResult>) {
        self.rows.extend(results.into_iter().map(|result| ResultRow {
            identifier: id.as_str().to_owned(),
            result,
        }));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_table(self) -> ResultTable {
        ResultTable { rows: self.rows }
    }
}

#[cfg(test)]
mod tests {
    use super::ResultAccumulator;
    use crate::{identifier_csv::Identifier, reconciliation_client::MatchResult};

    fn id(value: &str) -> Identifier {
        Identifier::from_cell(value).unwrap()
    }

    fn result(qid: &str, label: Option<&str>, link: Option<&str>) -> MatchResult {
        MatchResult {
            entity_uri: format!("http://www.wikidata.org/entity/{qid}"),
            label: label.map(|label| label.to_owned()),
            secondary_link: link.map(|link| link.to_owned()),
        }
    }

    #[test]
    fn test_append_works() {
        let mut accumulator = ResultAccumulator::new();
        accumulator.append(&id("1"), vec![result("Q1", None, None)]);
        accumulator.append(&id("2"), vec![]);
        accumulator.append(
            &id("3"),
            vec![result("Q3", None, None), result("Q33", None, None)],
        );
        accumulator.append(&id("1"), vec![result("Q1", None, None)]);
        assert_eq!(accumulator.len(), 4);

        let table = accumulator.into_table();
        let identifiers: Vec<_> = table.rows().iter().map(|row| row.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["1", "3", "3", "1"]);
        assert!(table.entity_uris().nth(2).unwrap().ends_with("Q33"));
    }

    #[test]
    fn test_write_csv_works() {
        let mut accumulator = ResultAccumulator::new();
        accumulator.append(
            &id("52010985"),
            vec![result(
                "Q76",
                Some("Barack Obama"),
                Some("https://en.wikipedia.org/wiki/Barack_Obama"),
            )],
        );
        accumulator.append(&id("76323201"), vec![result("Q4829518", None, None)]);
        let mut output = Vec::new();
        accumulator.into_table().write_csv(&mut output, b',').unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "identifier,entityURI,label,secondaryLink\n\
             52010985,http://www.wikidata.org/entity/Q76,Barack Obama,https://en.wikipedia.org/wiki/Barack_Obama\n\
             76323201,http://www.wikidata.org/entity/Q4829518,,\n"
        );
    }

    #[test]
    fn test_write_empty_csv_has_header() {
        let mut output = Vec::new();
        ResultAccumulator::new()
            .into_table()
            .write_csv(&mut output, b'\t')
            .unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "identifier\tentityURI\tlabel\tsecondaryLink\n"
        );
    }
}
