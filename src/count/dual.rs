//! Classifying paired reads against a library of guide pairs.
//!
//! Each read pair is assigned exactly one [`Classification`]. The pair key of
//! a read pair is `mate2 + mate1`, which for a correctly constructed pair is
//! the reverse complement of the left guide followed by the right guide (the
//! same form the pair table is keyed by). The rules, in order of precedence:
//!
//! 1. The pair key is a known pair: [`Classification::Found`].
//! 2. Mate 2 is a reverse complemented left guide and mate 1 a right guide, or
//!    mate 1 is a left guide and mate 2 a reverse complemented right guide, but
//!    the two do not form a known pair: [`Classification::Mismatch`].
//! 3. Only a left guide (either orientation) is present:
//!    [`Classification::Guide1`].
//! 4. Only a right guide (either orientation) is present:
//!    [`Classification::Guide2`].
//! 5. Otherwise: [`Classification::Nothing`].

use std::io::BufRead;
use std::io::Write;
use std::io::{self};

use tracing::info;
use tracing::warn;

use crate::fastq;
use crate::fastq::PairedReader;
use crate::io::report_writer;
use crate::library::PairLibrary;
use crate::library::pair::Row;
use crate::report::dual::write_classified_read;
use crate::sequence::reverse_complement;

/// Library rows with fewer reads than this are reported as low count pairs.
pub const LOW_COUNT_THRESHOLD: u64 = 30;

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to counting read pairs.
#[derive(Debug)]
pub enum Error {
    /// An error reading the mate files.
    Fastq(fastq::Error),

    /// An I/O error writing classified reads.
    Io(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Fastq(err) => write!(f, "fastq error: {err}"),
            Error::Io(err) => write!(f, "i/o error while writing classified reads: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Classification
////////////////////////////////////////////////////////////////////////////////////////

/// Whether a read pair matched a known guide pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// The read pair matched a known guide pair.
    Found,

    /// The read pair did not match a known guide pair.
    Miss,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Found => write!(f, "FOUND"),
            Status::Miss => write!(f, "MISS"),
        }
    }
}

/// The guides seen on each side of a read pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Category {
    /// Safe control guides on both sides.
    SafeSafe,

    /// A targeting left guide and a safe right guide.
    Guide1Safe,

    /// A safe left guide and a targeting right guide.
    SafeGuide2,

    /// Guides on both sides.
    Guide1Guide2,

    /// A left guide only.
    Guide1Nothing,

    /// A right guide only.
    NothingGuide2,

    /// No guide on either side.
    NothingNothing,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::SafeSafe => write!(f, "safe_safe"),
            Category::Guide1Safe => write!(f, "gRNA1_safe"),
            Category::SafeGuide2 => write!(f, "safe_gRNA2"),
            Category::Guide1Guide2 => write!(f, "gRNA1_gRNA2"),
            Category::Guide1Nothing => write!(f, "gRNA1_nothing"),
            Category::NothingGuide2 => write!(f, "nothing_gRNA2"),
            Category::NothingNothing => write!(f, "nothing_nothing"),
        }
    }
}

/// The outcome of classifying a single read pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Classification {
    /// The read pair is a known guide pair.
    Found {
        /// The pair table slot.
        slot: usize,

        /// Whether the left guide is a safe control guide.
        left_safe: bool,

        /// Whether the right guide is a safe control guide.
        right_safe: bool,

        /// `reverse_complement(mate2) + mate1`.
        key: String,
    },

    /// Both guides are present but do not form a known pair.
    Mismatch,

    /// Only the left guide is present.
    Guide1,

    /// Only the right guide is present.
    Guide2,

    /// Neither guide is present.
    Nothing,
}

impl Classification {
    /// Gets the status.
    pub fn status(&self) -> Status {
        match self {
            Classification::Found { .. } => Status::Found,
            _ => Status::Miss,
        }
    }

    /// Gets the category.
    pub fn category(&self) -> Category {
        match self {
            Classification::Found {
                left_safe,
                right_safe,
                ..
            } => match (left_safe, right_safe) {
                (true, true) => Category::SafeSafe,
                (false, true) => Category::Guide1Safe,
                (true, false) => Category::SafeGuide2,
                (false, false) => Category::Guide1Guide2,
            },
            Classification::Mismatch => Category::Guide1Guide2,
            Classification::Guide1 => Category::Guide1Nothing,
            Classification::Guide2 => Category::NothingGuide2,
            Classification::Nothing => Category::NothingNothing,
        }
    }

    /// Gets the combined key of a found pair.
    pub fn key(&self) -> Option<&str> {
        match self {
            Classification::Found { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Classifies a read pair.
///
/// # Examples
///
/// ```
/// use crispr_read_counts::count::dual::Category;
/// use crispr_read_counts::count::dual::Status;
/// use crispr_read_counts::count::dual::classify;
/// use crispr_read_counts::library::PairLibrary;
///
/// let data = b"sgrna_left_id\tsgrna_left_seq\tsgrna_right_id\tsgrna_right_seq\tunique_id\tgene_pair_id\ttarget_id\n\
///              L1\tAAAC\tR1\tGGGA\tU1\tG1\tT1\n";
/// let library = PairLibrary::read_from(&data[..])?;
///
/// // mate 2 is the reverse complement of the left guide, mate 1 the right guide.
/// let classification = classify(&library, "GGGA", "GTTT");
/// assert_eq!(classification.status(), Status::Found);
/// assert_eq!(classification.category(), Category::Guide1Guide2);
/// assert_eq!(classification.key(), Some("AAACGGGA"));
///
/// let classification = classify(&library, "CCCC", "CCCC");
/// assert_eq!(classification.status(), Status::Miss);
/// assert_eq!(classification.category(), Category::NothingNothing);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn classify(library: &PairLibrary, mate1: &str, mate2: &str) -> Classification {
    if let Some(slot) = library.slot(&format!("{mate2}{mate1}")) {
        let left = reverse_complement(mate2);

        return Classification::Found {
            slot,
            left_safe: library.is_safe(&left),
            right_safe: library.is_safe(mate1),
            key: format!("{left}{mate1}"),
        };
    }

    let left_rc = library.is_left_rc(mate2);
    let left = library.is_left(mate1);
    let right = library.is_right(mate1);
    let right_rc = library.is_right_rc(mate2);

    if (left_rc && right) || (left && right_rc) {
        Classification::Mismatch
    } else if left_rc || left {
        Classification::Guide1
    } else if right || right_rc {
        Classification::Guide2
    } else {
        Classification::Nothing
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Tally
////////////////////////////////////////////////////////////////////////////////////////

/// Read pair level statistics gathered while counting.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// The number of classified read pairs.
    pub total_reads: u64,

    /// Read pairs with no guide.
    pub miss: u64,

    /// Read pairs with two guides that do not form a known pair.
    pub mismatch: u64,

    /// Read pairs with only a left guide.
    pub grna1_hits: u64,

    /// Read pairs with only a right guide.
    pub grna2_hits: u64,

    /// Known pairs of two safe guides.
    pub safe_safe: u64,

    /// Known pairs of a targeting left guide and a safe right guide.
    pub grna1_safe: u64,

    /// Known pairs of a safe left guide and a targeting right guide.
    pub safe_grna2: u64,

    /// Known pairs of two targeting guides.
    pub grna1_grna2: u64,
}

/// The mutable counting state threaded through a run.
#[derive(Clone, Debug)]
pub struct Tally<'a> {
    /// The library.
    library: &'a PairLibrary,

    /// The count for each pair table slot.
    counts: Vec<u64>,

    /// The read pair level statistics.
    stats: Stats,
}

impl<'a> Tally<'a> {
    /// Creates an empty [`Tally`].
    pub fn new(library: &'a PairLibrary) -> Self {
        Self {
            library,
            counts: vec![0; library.num_pairs()],
            stats: Stats::default(),
        }
    }

    /// Records a classified read pair.
    pub fn observe(&mut self, classification: &Classification) {
        self.stats.total_reads += 1;

        if let Classification::Found { slot, .. } = classification {
            self.counts[*slot] += 1;
        }

        let stats = &mut self.stats;
        let counter = match (classification.status(), classification.category()) {
            (Status::Found, Category::SafeSafe) => &mut stats.safe_safe,
            (Status::Found, Category::Guide1Safe) => &mut stats.grna1_safe,
            (Status::Found, Category::SafeGuide2) => &mut stats.safe_grna2,
            (Status::Found, _) => &mut stats.grna1_grna2,
            (Status::Miss, Category::Guide1Guide2) => &mut stats.mismatch,
            (Status::Miss, Category::Guide1Nothing) => &mut stats.grna1_hits,
            (Status::Miss, Category::NothingGuide2) => &mut stats.grna2_hits,
            (Status::Miss, _) => &mut stats.miss,
        };

        *counter += 1;
    }

    /// Finalizes the tally.
    pub fn finish(self) -> PairCounts<'a> {
        PairCounts {
            library: self.library,
            counts: self.counts,
            stats: self.stats,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Pair counts
////////////////////////////////////////////////////////////////////////////////////////

/// The finalized counts of a run.
#[derive(Clone, Debug)]
pub struct PairCounts<'a> {
    /// The library.
    library: &'a PairLibrary,

    /// The count for each pair table slot.
    counts: Vec<u64>,

    /// The read pair level statistics.
    stats: Stats,
}

impl<'a> PairCounts<'a> {
    /// Gets the library.
    pub fn library(&self) -> &'a PairLibrary {
        self.library
    }

    /// Gets the count of a library row's guide pair.
    pub fn count(&self, row: &Row) -> u64 {
        self.counts.get(row.slot()).copied().unwrap_or_default()
    }

    /// Gets the count of a combined key. Unknown keys have a count of zero.
    pub fn count_key(&self, key: &str) -> u64 {
        self.library
            .slot(key)
            .and_then(|slot| self.counts.get(slot).copied())
            .unwrap_or_default()
    }

    /// Gets the read pair level statistics.
    pub fn stats(&self) -> Stats {
        self.stats
    }
}

/// Classifies every read pair from a paired reader, writing one classified
/// read line per pair to `classified`.
///
/// Only complete records are classified and counted. A trailing record cut
/// short in both mate files is dropped with a warning.
pub fn count_pairs<'a, R1, R2, W>(
    library: &'a PairLibrary,
    mut reader: PairedReader<R1, R2>,
    sample: &str,
    classified: W,
) -> Result<PairCounts<'a>>
where
    R1: BufRead,
    R2: BufRead,
    W: Write,
{
    let mut tally = Tally::new(library);
    let mut classified = report_writer(classified);

    while let Some(record) = reader.read_record().map_err(Error::Fastq)? {
        let classification = classify(library, record.mate1(), record.mate2());
        write_classified_read(&mut classified, sample, &record, &classification)
            .map_err(|err| Error::Io(err.into()))?;
        tally.observe(&classification);
    }

    classified.flush().map_err(Error::Io)?;

    if reader.lines_read() % fastq::LINES_PER_RECORD != 0 {
        warn!(
            "number of lines in the FASTQ files ({}) is not a multiple of {}, truncated file?",
            reader.lines_read(),
            fastq::LINES_PER_RECORD
        );
    }

    let counts = tally.finish();
    let stats = counts.stats();
    info!(
        "classified {} read pairs ({} found, {} mismatched, {} missed)",
        stats.total_reads,
        stats.safe_safe + stats.grna1_safe + stats.safe_grna2 + stats.grna1_grna2,
        stats.mismatch,
        stats.miss
    );

    Ok(counts)
}
