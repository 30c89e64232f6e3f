use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Result;
use indicatif::ProgressBar;
use reconcile::{
    identifier_csv::IdentifierSource,
    pipeline::{reconcile, PipelineOptions},
    reconciliation_client::ReconciliationClient,
    sparql_endpoint::SparqlEndpoint,
};

pub struct ReconcileCsvArgs {
    pub input: PathBuf,
    pub column: String,
    /// `-` means stdout.
    pub output: PathBuf,
    pub failures: Option<PathBuf>,
    pub split_on: Option<char>,
    pub delimiter: u8,
    pub options: PipelineOptions,
    pub verbose: bool,
}

fn is_stdout(path: &Path) -> bool {
    path.as_os_str() == "-"
}

pub fn execute_reconcile_csv<E: SparqlEndpoint + Sync>(
    client: &ReconciliationClient<E>,
    args: ReconcileCsvArgs,
) -> Result<()> {
    let to_stdout = is_stdout(&args.output);
    // Status lines must not end up in the table when it goes to stdout.
    let status = |message: String| {
        if to_stdout {
            eprintln!("{message}");
        } else {
            println!("{message}");
        }
    };

    let source = IdentifierSource::new()
        .with_delimiter(args.delimiter)
        .with_separator(args.split_on);
    // A missing column fails here, before anything is sent to the endpoint.
    let cells = source.extract_path(&args.input, &args.column)?;
    let present = cells.iter().filter(|cell| cell.is_some()).count();
    let expected_total = args.options.max.map_or(present, |max| max.min(present));
    status(format!(
        "Reconciling {expected_total} identifiers from column {:?} of {} against {}.",
        args.column,
        args.input.display(),
        client.config().endpoint
    ));

    let bar = if args.verbose {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(expected_total as u64)
    };
    let report = reconcile(client, cells, &args.options, |_| bar.inc(1))?;
    bar.finish();

    status(format!(
        "Done processing {} identifiers: {} rows, {} without a match, {} failed, \
         {} empty cells skipped.",
        report.looked_up,
        report.table.len(),
        report.unmatched.len(),
        report.failures.len(),
        report.absent
    ));

    let writer: Box<dyn Write> = if to_stdout {
        Box::new(io::stdout().lock())
    } else {
        status(format!("Writing {}.", args.output.display()));
        Box::new(BufWriter::new(File::create(&args.output)?))
    };
    report.table.write_csv(writer, args.delimiter)?;

    match args.failures {
        Some(failures) if !report.failures.is_empty() => {
            status(format!("Writing {}.", failures.display()));
            let writer = BufWriter::new(File::create(&failures)?);
            report.write_failures_csv(writer)?;
        }
        None if !report.failures.is_empty() => {
            status("Rerun with --failures <FILE> to save the failed identifiers.".to_owned());
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::is_stdout;

    #[test]
    fn test_is_stdout_works() {
        assert!(is_stdout(Path::new("-")));
        assert!(!is_stdout(Path::new("reconciled.csv")));
        assert!(!is_stdout(Path::new("./-")));
    }
}
