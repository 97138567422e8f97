//! Dual-guide classified read, count, and statistics reports.

use std::io::Write;
use std::io::{self};

use super::CountSummary;
use crate::count::dual::Classification;
use crate::count::dual::LOW_COUNT_THRESHOLD;
use crate::count::dual::PairCounts;
use crate::count::dual::Stats;
use crate::fastq::Record;
use crate::io::report_writer;

/// The placeholder written for the combined key of unmatched read pairs.
pub const MISSING_KEY: &str = "NA";

/// The column names of the statistics report.
pub const STATS_COLUMNS: [&str; 13] = [
    "sample",
    "total_reads",
    "miss",
    "mismatch",
    "gRNA1_hits",
    "gRNA2_hits",
    "safe_safe",
    "gRNA1_safe",
    "safe_gRNA2",
    "gRNA1_gRNA2",
    "total_guides",
    "zero_guides",
    "less_30_guides",
];

/// Writes a single classified read pair line: status, category, sample,
/// read id, mate 1, mate 2, and the combined key (or `NA`).
///
/// The writer is expected to come from
/// [`report_writer()`](crate::io::report_writer).
pub fn write_classified_read<W>(
    writer: &mut csv::Writer<W>,
    sample: &str,
    record: &Record,
    classification: &Classification,
) -> csv::Result<()>
where
    W: Write,
{
    let status = classification.status().to_string();
    let category = classification.category().to_string();

    writer.write_record([
        status.as_str(),
        category.as_str(),
        sample,
        record.id(),
        record.mate1(),
        record.mate2(),
        classification.key().unwrap_or(MISSING_KEY),
    ])
}

/// Writes the count report: one row per library row, in library file order.
/// Returns the row level summary of the written counts.
pub fn write_counts<W>(
    writer: W,
    counts: &PairCounts<'_>,
    sample: &str,
) -> io::Result<CountSummary>
where
    W: Write,
{
    let mut writer = report_writer(writer);
    writer.write_record(["unique_id", "target_id", "gene_pair_id", sample])?;

    let mut summary = CountSummary::default();

    for row in counts.library().rows() {
        let count = counts.count(row);
        summary.observe(count, LOW_COUNT_THRESHOLD);

        let count = count.to_string();
        writer.write_record([
            row.unique_id(),
            row.target_id(),
            row.gene_pair_id(),
            count.as_str(),
        ])?;
    }

    writer.flush()?;

    Ok(summary)
}

/// Writes the statistics report: a header line and a single value line.
pub fn write_stats<W>(
    writer: W,
    sample: &str,
    stats: &Stats,
    summary: &CountSummary,
) -> io::Result<()>
where
    W: Write,
{
    let mut writer = report_writer(writer);
    writer.write_record(STATS_COLUMNS)?;

    let values = [
        stats.total_reads,
        stats.miss,
        stats.mismatch,
        stats.grna1_hits,
        stats.grna2_hits,
        stats.safe_safe,
        stats.grna1_safe,
        stats.safe_grna2,
        stats.grna1_grna2,
        summary.total,
        summary.zero,
        summary.low,
    ];

    writer.write_record(
        std::iter::once(sample.to_string()).chain(values.iter().map(u64::to_string)),
    )?;

    writer.flush()
}
