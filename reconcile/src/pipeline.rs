use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use tracing::warn;

use crate::{
    error::{LookupError, LookupErrorKind},
    identifier_csv::Identifier,
    reconciliation_client::{MatchResult, ReconciliationClient},
    result_table::{ResultAccumulator, ResultTable},
    sparql_endpoint::SparqlEndpoint,
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// How many queries may be in flight at once. 1 means strictly sequential.
    pub jobs: usize,

    /// Stop after this many identifiers have been looked up.
    pub max: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { jobs: 1, max: None }
    }
}

#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub table: ResultTable,

    /// Identifiers whose lookup failed, in input order.
    pub failures: Vec<LookupError>,

    /// Identifiers that were looked up but matched nothing.
    pub unmatched: Vec<Identifier>,

    /// Cells skipped because they held no identifier.
    pub absent: usize,

    pub looked_up: usize,
}

#[derive(Debug, Serialize)]
struct FailureRecord<'a> {
    identifier: &'a str,
    kind: LookupErrorKind,
    reason: &'a str,
}

impl ReconciliationReport {
    pub fn write_failures_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for failure in self.failures.iter() {
            writer.serialize(FailureRecord {
                identifier: failure.identifier(),
                kind: failure.kind(),
                reason: failure.reason(),
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    fn record(
        &mut self,
        accumulator: &mut ResultAccumulator,
        id: Identifier,
        outcome: LookupOutcome,
    ) {
        self.looked_up += 1;
        match outcome {
            Ok(results) if results.is_empty() => self.unmatched.push(id),
            Ok(results) => accumulator.append(&id, results),
            Err(err) => {
                warn!("{err}");
                self.failures.push(err);
            }
        }
    }
}

type LookupOutcome = Result<Vec<MatchResult>, LookupError>;

/// Looks up every present identifier in `cells` and assembles the results.
///
/// Rows always come out in input order, with each identifier's rows kept
/// together, regardless of `options.jobs`. A failed lookup is recorded in
/// the report and never stops the run.
pub fn reconcile<E, I, F>(
    client: &ReconciliationClient<E>,
    cells: I,
    options: &PipelineOptions,
    on_progress: F,
) -> Result<ReconciliationReport>
where
    E: SparqlEndpoint + Sync,
    I: IntoIterator<Item = Option<Identifier>>,
    F: Fn(&Identifier) + Sync,
{
    let mut report = ReconciliationReport::default();
    let mut identifiers = Vec::new();
    for cell in cells {
        match cell {
            Some(id) => identifiers.push(id),
            None => report.absent += 1,
        }
    }
    if let Some(max) = options.max {
        identifiers.truncate(max);
    }

    let mut accumulator = ResultAccumulator::new();
    if options.jobs <= 1 {
        for id in identifiers {
            let outcome = client.lookup(&id);
            on_progress(&id);
            report.record(&mut accumulator, id, outcome);
        }
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .build()?;
        // An indexed parallel collect keeps input order, not completion order.
        let outcomes: Vec<LookupOutcome> = pool.install(|| {
            identifiers
                .par_iter()
                .map(|id| {
                    let outcome = client.lookup(id);
                    on_progress(id);
                    outcome
                })
                .collect()
        });
        for (id, outcome) in identifiers.into_iter().zip(outcomes) {
            report.record(&mut accumulator, id, outcome);
        }
    }
    report.table = accumulator.into_table();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{reconcile, PipelineOptions};
    use crate::{
        config::ReconcileConfig,
        error::FetchError,
        identifier_csv::{Identifier, IdentifierSource},
        reconciliation_client::ReconciliationClient,
        sparql_endpoint::fixtures::viaf_fixture,
    };

    fn cells(values: &[&str]) -> Vec<Option<Identifier>> {
        values.iter().map(Identifier::from_cell).collect()
    }

    fn qids(report: &super::ReconciliationReport) -> Vec<u64> {
        report
            .table
            .rows()
            .iter()
            .filter_map(|row| row.result.qid())
            .collect()
    }

    #[test]
    fn test_reconcile_keeps_input_order() {
        let config = ReconcileConfig::default();
        let client = ReconciliationClient::new(&config, viaf_fixture());
        let report = reconcile(
            &client,
            cells(&["52010985", "34562701", "108815043", "76323201"]),
            &PipelineOptions::default(),
            |_| {},
        )
        .unwrap();
        assert_eq!(qids(&report), vec![76, 1609351, 4829518]);
        assert_eq!(report.looked_up, 4);
        assert_eq!(
            report.unmatched,
            cells(&["108815043"]).into_iter().flatten().collect::<Vec<_>>()
        );
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_reconcile_in_parallel_keeps_input_order() {
        let config = ReconcileConfig::default();
        let client = ReconciliationClient::new(&config, viaf_fixture());
        let input = cells(&[
            "52010985", "ambiguous", "34562701", "108815043", "76323201", "52010985",
        ]);
        let sequential = reconcile(&client, input.clone(), &PipelineOptions::default(), |_| {})
            .unwrap();
        let parallel = reconcile(
            &client,
            input,
            &PipelineOptions { jobs: 4, max: None },
            |_| {},
        )
        .unwrap();
        assert_eq!(qids(&parallel), vec![76, 1, 2, 1609351, 4829518, 76]);
        assert_eq!(sequential.table, parallel.table);
    }

    #[test]
    fn test_reconcile_never_queries_missing_values() {
        let config = ReconcileConfig::default();
        let endpoint = viaf_fixture();
        let client = ReconciliationClient::new(&config, &endpoint);
        let csv = "viaf\n52010985\nNaN\n\nnan\n<NA>\n";
        let cells = IdentifierSource::new().extract(csv.as_bytes(), "viaf").unwrap();
        let report = reconcile(&client, cells, &PipelineOptions::default(), |_| {}).unwrap();
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(report.absent, 4);
        assert!(endpoint
            .queries()
            .iter()
            .all(|query| !query.to_lowercase().contains("\"nan\"")));
    }

    #[test]
    fn test_reconcile_collects_failures_and_continues() {
        let config = ReconcileConfig::default();
        let endpoint = viaf_fixture()
            .with_error("503", FetchError::Transport("Got HTTP 503".into()))
            .with_response("garbled", "{");
        let client = ReconciliationClient::new(&config, &endpoint);
        let report = reconcile(
            &client,
            cells(&["503", "52010985", "garbled", "76323201"]),
            &PipelineOptions::default(),
            |_| {},
        )
        .unwrap();
        assert_eq!(qids(&report), vec![76, 4829518]);
        let failed: Vec<_> = report.failures.iter().map(|err| err.identifier()).collect();
        assert_eq!(failed, vec!["503", "garbled"]);

        let mut output = Vec::new();
        report.write_failures_csv(&mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("identifier,kind,reason\n503,transport,Got HTTP 503\n"));
        assert!(output.contains("garbled,protocol,"));
    }

    #[test]
    fn test_reconcile_respects_max_and_reports_progress() {
        let config = ReconcileConfig::default();
        let client = ReconciliationClient::new(&config, viaf_fixture());
        let progress = AtomicUsize::new(0);
        let report = reconcile(
            &client,
            cells(&["52010985", "nan", "34562701", "76323201"]),
            &PipelineOptions { jobs: 1, max: Some(2) },
            |_| {
                progress.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        assert_eq!(progress.load(Ordering::SeqCst), 2);
        assert_eq!(report.looked_up, 2);
        assert_eq!(qids(&report), vec![76, 1609351]);
    }
}
