//! Sequential per-instrument fetch and merge.

use crate::config::Instrument;
use crate::fetch::BackoffFetcher;
use crate::history::HistoryProvider;
use crate::report::{InstrumentOutcome, RunReport, RunReportBuilder};
use crate::series::{self, DateAxis};
use crate::store::{Column, WideTable};
use crate::ui;
use console::style;
use tracing::debug;

/// Walks the configured instruments in order, one at a time, combining each
/// fetch with the persisted history. One instrument failing never stops the
/// rest; its column falls back to whatever was persisted.
pub struct Assembler<P> {
    fetcher: BackoffFetcher<P>,
    instruments: Vec<Instrument>,
}

impl<P: HistoryProvider> Assembler<P> {
    pub fn new(fetcher: BackoffFetcher<P>, instruments: Vec<Instrument>) -> Self {
        Assembler {
            fetcher,
            instruments,
        }
    }

    pub async fn assemble(
        &self,
        axis: &DateAxis,
        prior: Option<&WideTable>,
        generated_at: &str,
    ) -> (WideTable, RunReport) {
        let mut table = WideTable::new(axis);
        let mut report = RunReportBuilder::new();

        let pb = ui::new_progress_bar(self.instruments.len() as u64);
        for instrument in &self.instruments {
            pb.set_message(format!(
                "Downloading {} ({})",
                instrument.column, instrument.symbol
            ));

            let fetched = self
                .fetcher
                .fetch(&instrument.symbol, axis.start(), axis.end())
                .await;
            let success = fetched.is_success();

            let mark = if success {
                style("✅").green().to_string()
            } else {
                style("⚠️ (skipped/empty)").yellow().to_string()
            };
            pb.println(format!(
                "{} ({}) {}",
                instrument.column,
                style(&instrument.symbol).dim(),
                mark
            ));

            let fresh = fetched.series.rounded(instrument.decimals);
            let persisted = prior.and_then(|table| table.series(&instrument.column));
            let values = series::merge(&fresh, persisted.as_ref(), axis);

            let records = values.iter().flatten().count();
            let missing = values.len() - records;
            debug!(
                column = %instrument.column,
                success, records, missing, "instrument assembled"
            );

            report.record(InstrumentOutcome {
                name: instrument.column.clone(),
                symbol: instrument.symbol.clone(),
                success,
                records,
                missing,
                error: fetched.error,
            });
            table.push_column(Column::new(
                instrument.column.clone(),
                instrument.decimals,
                values,
            ));
            pb.inc(1);
        }
        pb.finish_and_clear();

        (table, report.finish(generated_at, axis.start(), axis.end()))
    }
}
