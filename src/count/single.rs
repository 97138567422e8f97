//! Counting aligned reads against a single-guide library.

use std::collections::HashMap;
use std::io::{self};

use nonempty::NonEmpty;
use noodles::sam::alignment::record::Flags;
use tracing::debug;
use tracing::info;

use crate::alignment::Record;
use crate::library::GuideLibrary;
use crate::sequence::reverse_complement_bytes;

/// Guides with fewer reads than this are reported as low count guides.
pub const LOW_COUNT_THRESHOLD: u64 = 15;

/// Records with any of these flags are skipped without being counted.
pub const SKIPPED_FLAGS: Flags = Flags::SECONDARY.union(Flags::SUPPLEMENTARY);

/// Records are logged at `debug` level every this many records.
const PROGRESS_INTERVAL: u64 = 1_000_000;

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to counting aligned reads.
#[derive(Debug)]
pub enum Error {
    /// An I/O error while reading a record.
    Io(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error while reading records: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Configuration
////////////////////////////////////////////////////////////////////////////////////////

/// How guide sequences are located within reads.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Config {
    /// The number of bases to skip at the start (or, when reverse
    /// complementing, the end) of each read.
    trim: usize,

    /// Whether reads are compared against reverse complemented guides from
    /// the end of the read.
    reverse_complement: bool,
}

impl Config {
    /// Creates a new [`Config`].
    pub fn new(trim: usize, reverse_complement: bool) -> Self {
        Self {
            trim,
            reverse_complement,
        }
    }

    /// Gets the number of trimmed bases.
    pub fn trim(&self) -> usize {
        self.trim
    }

    /// Gets whether reverse complementing is enabled.
    pub fn reverse_complement(&self) -> bool {
        self.reverse_complement
    }
}

/// Gets the window of a read that is compared with the guide sequences.
///
/// Without reverse complementing this is `[trim, trim + length)`; with it,
/// `[len - trim - length, len - trim)`. Windows that do not fit in the read
/// return [`None`].
///
/// # Examples
///
/// ```
/// use crispr_read_counts::count::single::slice;
///
/// let read = b"AACCGGTT";
///
/// assert_eq!(slice(read, 1, 4, false), Some(&b"ACCG"[..]));
/// assert_eq!(slice(read, 0, 4, true), Some(&b"GGTT"[..]));
/// assert_eq!(slice(read, 1, 4, true), Some(&b"CGGT"[..]));
/// assert_eq!(slice(read, 5, 4, false), None);
/// ```
pub fn slice(read: &[u8], trim: usize, length: usize, reverse_complement: bool) -> Option<&[u8]> {
    match reverse_complement {
        false => read.get(trim..trim.checked_add(length)?),
        true => {
            let end = read.len().checked_sub(trim)?;
            let start = end.checked_sub(length)?;
            read.get(start..end)
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Matcher
////////////////////////////////////////////////////////////////////////////////////////

/// A lookup table from read windows to the guides they match.
///
/// When reverse complementing is enabled, the library sequences are reverse
/// complemented once here rather than reverse complementing every read.
#[derive(Debug)]
pub struct Matcher<'a> {
    /// The library.
    library: &'a GuideLibrary,

    /// The configuration.
    config: Config,

    /// The guide indices for each (possibly reverse complemented) sequence.
    table: HashMap<Vec<u8>, &'a NonEmpty<usize>>,
}

impl<'a> Matcher<'a> {
    /// Builds a [`Matcher`] for a library.
    pub fn new(library: &'a GuideLibrary, config: Config) -> Self {
        let table = library
            .sequences()
            .map(|(sequence, indices)| {
                let key = match config.reverse_complement() {
                    true => reverse_complement_bytes(sequence.as_bytes()),
                    false => sequence.as_bytes().to_vec(),
                };

                (key, indices)
            })
            .collect();

        Self {
            library,
            config,
            table,
        }
    }

    /// Gets the library.
    pub fn library(&self) -> &'a GuideLibrary {
        self.library
    }

    /// Gets the configuration.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Finds the guides (as indices into the library) matching a read given
    /// in its sequenced orientation.
    pub fn find(&self, read: &[u8]) -> Option<&'a NonEmpty<usize>> {
        let window = slice(
            read,
            self.config.trim(),
            self.library.guide_length(),
            self.config.reverse_complement(),
        )?;

        self.table.get(window).copied()
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Tally
////////////////////////////////////////////////////////////////////////////////////////

/// Read level statistics gathered while counting.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Records that are neither secondary nor supplementary.
    total_reads: u64,

    /// Records failing vendor quality checks.
    vendor_failed_reads: u64,

    /// Records whose window matched a guide.
    mapped_to_guide_reads: u64,
}

impl Stats {
    /// Gets the number of counted records.
    pub fn total_reads(&self) -> u64 {
        self.total_reads
    }

    /// Gets the number of records failing vendor quality checks.
    pub fn vendor_failed_reads(&self) -> u64 {
        self.vendor_failed_reads
    }

    /// Gets the number of records that matched a guide.
    pub fn mapped_to_guide_reads(&self) -> u64 {
        self.mapped_to_guide_reads
    }
}

/// What happened to a single record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// A secondary or supplementary record; not counted at all.
    Skipped,

    /// A record failing vendor quality checks; counted but not matched.
    VendorFailed,

    /// A record that matched no guide.
    Unmatched,

    /// A record that matched one or more guides sharing a sequence.
    Matched,
}

/// The mutable counting state threaded through a run.
#[derive(Clone, Debug)]
pub struct Tally<'a, 'm> {
    /// The matcher.
    matcher: &'m Matcher<'a>,

    /// The count for each guide, indexed as in the library.
    counts: Vec<u64>,

    /// The read level statistics.
    stats: Stats,
}

impl<'a, 'm> Tally<'a, 'm> {
    /// Creates an empty [`Tally`].
    pub fn new(matcher: &'m Matcher<'a>) -> Self {
        Self {
            matcher,
            counts: vec![0; matcher.library().len()],
            stats: Stats::default(),
        }
    }

    /// Observes a single record.
    pub fn observe(&mut self, record: &Record) -> Outcome {
        let flags = record.flags();

        if flags.intersects(SKIPPED_FLAGS) {
            return Outcome::Skipped;
        }

        self.stats.total_reads += 1;

        if flags.is_qc_fail() {
            self.stats.vendor_failed_reads += 1;
            return Outcome::VendorFailed;
        }

        match self.matcher.find(&record.forward_sequence()) {
            Some(indices) => {
                for &index in indices.iter() {
                    self.counts[index] += 1;
                }

                self.stats.mapped_to_guide_reads += 1;
                Outcome::Matched
            }
            None => Outcome::Unmatched,
        }
    }

    /// Finalizes the tally.
    pub fn finish(self) -> GuideCounts<'a> {
        GuideCounts {
            library: self.matcher.library(),
            counts: self.counts,
            stats: self.stats,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Guide counts
////////////////////////////////////////////////////////////////////////////////////////

/// The finalized counts of a run.
#[derive(Clone, Debug)]
pub struct GuideCounts<'a> {
    /// The library.
    library: &'a GuideLibrary,

    /// The count for each guide, indexed as in the library.
    counts: Vec<u64>,

    /// The read level statistics.
    stats: Stats,
}

impl<'a> GuideCounts<'a> {
    /// Gets the library.
    pub fn library(&self) -> &'a GuideLibrary {
        self.library
    }

    /// Gets the count of a guide id. Unknown ids have a count of zero.
    pub fn count(&self, id: &str) -> u64 {
        self.library
            .index_of(id)
            .map(|index| self.counts[index])
            .unwrap_or_default()
    }

    /// Gets the count of a guide by its index in the library.
    pub fn count_at(&self, index: usize) -> u64 {
        self.counts.get(index).copied().unwrap_or_default()
    }

    /// Gets the read level statistics.
    pub fn stats(&self) -> Stats {
        self.stats
    }
}

/// Counts a stream of records.
///
/// # Examples
///
/// ```
/// use crispr_read_counts::alignment::Record;
/// use crispr_read_counts::count::single::Config;
/// use crispr_read_counts::count::single::Matcher;
/// use crispr_read_counts::count::single::count_records;
/// use crispr_read_counts::library::Delimiter;
/// use crispr_read_counts::library::GuideLibrary;
/// use noodles::sam::alignment::record::Flags;
///
/// let library = GuideLibrary::read_from(&b"ID1,GeneA,ACGTACGTAC\n"[..], Delimiter::Comma)?;
/// let matcher = Matcher::new(&library, Config::default());
///
/// let records = vec![Ok(Record::new(Flags::empty(), b"ACGTACGTAC".to_vec()))];
/// let counts = count_records(&matcher, records)?;
///
/// assert_eq!(counts.count("ID1"), 1);
/// assert_eq!(counts.stats().mapped_to_guide_reads(), 1);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn count_records<'a, I>(matcher: &Matcher<'a>, records: I) -> Result<GuideCounts<'a>>
where
    I: IntoIterator<Item = io::Result<Record>>,
{
    let mut tally = Tally::new(matcher);
    let mut seen = 0u64;

    for result in records {
        let record = result.map_err(Error::Io)?;
        tally.observe(&record);

        seen += 1;
        if seen % PROGRESS_INTERVAL == 0 {
            debug!("processed {seen} records");
        }
    }

    let counts = tally.finish();
    let stats = counts.stats();

    info!(
        "counted {} reads ({} vendor failed, {} mapped to a guide)",
        stats.total_reads(),
        stats.vendor_failed_reads(),
        stats.mapped_to_guide_reads()
    );

    Ok(counts)
}
