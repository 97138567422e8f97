//! Single-guide count and statistics reports.

use std::io::Write;
use std::io::{self};

use serde::Serialize;

use super::CountSummary;
use crate::count::single::GuideCounts;
use crate::count::single::LOW_COUNT_THRESHOLD;
use crate::count::single::Stats;
use crate::io::report_writer;
use crate::plasmid::PlasmidCounts;

/// The suffix appended to the sample name in the count report header.
pub const SAMPLE_SUFFIX: &str = ".sample";

/// The statistics written after a single-guide run, in output order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Statistics {
    /// Records that are neither secondary nor supplementary.
    pub total_reads: u64,

    /// Records failing vendor quality checks.
    pub vendor_failed_reads: u64,

    /// Records that matched a guide.
    pub mapped_to_guide_reads: u64,

    /// Guides with no reads.
    pub zero_count_guides: u64,

    /// Guides with fewer than [`LOW_COUNT_THRESHOLD`] reads.
    pub low_count_guides: u64,
}

impl Statistics {
    /// Combines the read level statistics with the guide level summary.
    pub fn new(stats: Stats, summary: CountSummary) -> Self {
        Self {
            total_reads: stats.total_reads(),
            vendor_failed_reads: stats.vendor_failed_reads(),
            mapped_to_guide_reads: stats.mapped_to_guide_reads(),
            zero_count_guides: summary.zero,
            low_count_guides: summary.low,
        }
    }
}

/// A JSON formatter that separates entries with `", "` and keys from values
/// with `": "` on a single line.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        match first {
            true => Ok(()),
            false => writer.write_all(b", "),
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        match first {
            true => Ok(()),
            false => writer.write_all(b", "),
        }
    }
}

/// Writes the count report.
///
/// Guides are written in ascending sequence order, with guides sharing a
/// sequence in library file order. When plasmid counts are given, they are
/// written in a fourth column (guides missing from the plasmid counts report
/// zero). Returns the guide level summary of the written counts.
///
/// # Examples
///
/// ```
/// use crispr_read_counts::count::single::Config;
/// use crispr_read_counts::count::single::Matcher;
/// use crispr_read_counts::count::single::count_records;
/// use crispr_read_counts::library::Delimiter;
/// use crispr_read_counts::library::GuideLibrary;
/// use crispr_read_counts::report::single::write_counts;
///
/// let library = GuideLibrary::read_from(&b"ID1,GeneA,ACGTACGTAC\n"[..], Delimiter::Comma)?;
/// let matcher = Matcher::new(&library, Config::default());
/// let counts = count_records(&matcher, Vec::new())?;
///
/// let mut report = Vec::new();
/// let summary = write_counts(&mut report, &counts, "sample1", None)?;
///
/// assert_eq!(String::from_utf8(report)?, "sgRNA\tgene\tsample1.sample\nID1\tGeneA\t0\n");
/// assert_eq!(summary.zero, 1);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn write_counts<W>(
    writer: W,
    counts: &GuideCounts<'_>,
    sample: &str,
    plasmid: Option<&PlasmidCounts>,
) -> io::Result<CountSummary>
where
    W: Write,
{
    let mut writer = report_writer(writer);

    let sample_column = format!("{sample}{SAMPLE_SUFFIX}");
    let mut header = vec!["sgRNA", "gene", sample_column.as_str()];

    if let Some(plasmid) = plasmid {
        header.push(plasmid.name());
    }

    writer.write_record(header)?;

    let mut summary = CountSummary::default();

    for (index, guide) in counts.library().guides_by_sequence() {
        let count = counts.count_at(index);
        summary.observe(count, LOW_COUNT_THRESHOLD);

        let count = count.to_string();
        let mut row = vec![guide.id(), guide.gene(), count.as_str()];

        let plasmid_count = plasmid.map(|plasmid| plasmid.count(guide.id()).to_string());
        if let Some(plasmid_count) = &plasmid_count {
            row.push(plasmid_count);
        }

        writer.write_record(row)?;
    }

    writer.flush()?;

    Ok(summary)
}

/// Writes the statistics as a single line JSON object.
///
/// # Examples
///
/// ```
/// use crispr_read_counts::report::single::Statistics;
/// use crispr_read_counts::report::single::write_stats;
///
/// let statistics = Statistics {
///     total_reads: 10,
///     vendor_failed_reads: 1,
///     mapped_to_guide_reads: 8,
///     zero_count_guides: 2,
///     low_count_guides: 3,
/// };
///
/// let mut report = Vec::new();
/// write_stats(&mut report, &statistics)?;
///
/// assert_eq!(
///     String::from_utf8(report)?,
///     "{\"total_reads\": 10, \"vendor_failed_reads\": 1, \"mapped_to_guide_reads\": 8, \
///      \"zero_count_guides\": 2, \"low_count_guides\": 3}\n"
/// );
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn write_stats<W>(mut writer: W, statistics: &Statistics) -> io::Result<()>
where
    W: Write,
{
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, SpacedFormatter);
    statistics.serialize(&mut serializer)?;

    writeln!(writer)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use noodles::sam::alignment::record::Flags;

    use super::*;
    use crate::alignment::Record;
    use crate::count::single::Config;
    use crate::count::single::Matcher;
    use crate::count::single::count_records;
    use crate::library::Delimiter;
    use crate::library::GuideLibrary;

    fn records(reads: &[&str]) -> Vec<io::Result<Record>> {
        reads
            .iter()
            .map(|read| Ok(Record::new(Flags::empty(), read.as_bytes())))
            .collect()
    }

    #[test]
    fn test_write_counts_in_sequence_order() -> Result<(), Box<dyn std::error::Error>> {
        let library = GuideLibrary::read_from(
            &b"ID1,GeneA,TTTT\nID2,GeneB,AAAA\nID3,GeneC,TTTT\n"[..],
            Delimiter::Comma,
        )?;
        let matcher = Matcher::new(&library, Config::default());
        let counts = count_records(&matcher, records(&["TTTTAC", "TTTTGG", "CCCCCC"]))?;

        let mut report = Vec::new();
        let summary = write_counts(&mut report, &counts, "s", None)?;

        assert_eq!(
            String::from_utf8(report)?,
            "sgRNA\tgene\ts.sample\nID2\tGeneB\t0\nID1\tGeneA\t2\nID3\tGeneC\t2\n"
        );
        assert_eq!(
            summary,
            CountSummary {
                total: 3,
                zero: 1,
                low: 3
            }
        );

        let statistics = Statistics::new(counts.stats(), summary);
        assert_eq!(statistics.total_reads, 3);
        assert_eq!(statistics.mapped_to_guide_reads, 2);
        assert_eq!(statistics.low_count_guides, 3);

        Ok(())
    }

    #[test]
    fn test_write_counts_with_plasmid() -> Result<(), Box<dyn std::error::Error>> {
        let library =
            GuideLibrary::read_from(&b"ID1\tGeneA\tACGT\nID2\tGeneB\tCCCC\n"[..], Delimiter::Tab)?;
        let plasmid = PlasmidCounts::read_from(&b"sgRNA\tgene\tplasmid\nID1\tGeneA\t7\n"[..])?;

        let matcher = Matcher::new(&library, Config::default());
        let counts = count_records(&matcher, records(&["ACGT"]))?;

        let mut report = Vec::new();
        write_counts(&mut report, &counts, "s", Some(&plasmid))?;

        assert_eq!(
            String::from_utf8(report)?,
            "sgRNA\tgene\ts.sample\tplasmid\nID1\tGeneA\t1\t7\nID2\tGeneB\t0\t0\n"
        );

        Ok(())
    }
}
