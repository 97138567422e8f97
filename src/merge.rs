//! Merging single-guide count reports.
//!
//! Count reports of the same sample (for example, produced from several lanes)
//! are merged by summing the sample counts of each guide. Plasmid counts, when
//! present, are a property of the library rather than the sample, so they must
//! agree across every merged report.

use std::collections::HashMap;
use std::io::BufRead;
use std::io::Write;
use std::io::{self};
use std::num::ParseIntError;
use std::path::Path;

use tracing::info;

use crate::io::TAB;
use crate::io::delimited_reader;
use crate::io::line_number;
use crate::io::report_writer;
use crate::plasmid::NUM_COUNT_FIELDS;
use crate::plasmid::is_count_header;

/// The number of fields on every line of a count report with plasmid counts.
pub const NUM_PLASMID_COUNT_FIELDS: usize = NUM_COUNT_FIELDS + 1;

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to merging count reports.
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(io::Error),

    /// An error reading or writing a delimited table.
    Csv(csv::Error),

    /// No count report was merged.
    Empty,

    /// A count report does not start with an `sgRNA`, `gene`, sample header.
    UnexpectedHeader(String),

    /// Plasmid counts were requested but a count report has no plasmid
    /// column.
    MissingPlasmidColumn(String),

    /// A count report names a different plasmid sample than the first one.
    PlasmidNameMismatch {
        /// The count report.
        source: String,

        /// The plasmid sample name of the first count report.
        expected: String,

        /// The plasmid sample name of this count report.
        found: String,
    },

    /// A guide has different plasmid counts in two count reports.
    InconsistentPlasmidCount(String),

    /// A line (1-based) of a count report has too few fields.
    MalformedRow {
        /// The count report.
        source: String,

        /// The line number.
        row: usize,
    },

    /// A line (1-based) of a count report has a count that is not a
    /// non-negative integer.
    InvalidCount {
        /// The count report.
        source: String,

        /// The line number.
        row: usize,

        /// The parse error.
        error: ParseIntError,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::Csv(err) => write!(f, "csv error: {err}"),
            Error::Empty => write!(f, "no count files to merge"),
            Error::UnexpectedHeader(source) => {
                write!(f, "unexpected header in count file: {source}")
            }
            Error::MissingPlasmidColumn(source) => write!(
                f,
                "cannot find a plasmid count column in count file {source} (were plasmid counts \
                 requested by mistake?)"
            ),
            Error::PlasmidNameMismatch {
                source,
                expected,
                found,
            } => write!(
                f,
                "plasmid sample name \"{found}\" in count file {source} differs from \
                 \"{expected}\""
            ),
            Error::InconsistentPlasmidCount(id) => write!(
                f,
                "plasmid count of sgRNA {id} is not consistent across count files"
            ),
            Error::MalformedRow { source, row } => write!(
                f,
                "line {row} of count file {source} does not have enough columns"
            ),
            Error::InvalidCount { source, row, error } => {
                write!(f, "invalid count on line {row} of count file {source}: {error}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Merger
////////////////////////////////////////////////////////////////////////////////////////

/// The merged counts of a single guide.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Entry {
    /// The guide id.
    id: String,

    /// The gene name (from the last count report that had the guide).
    gene: String,

    /// The summed sample count.
    count: u64,

    /// The plasmid count.
    plasmid: Option<u64>,
}

/// Merges single-guide count reports.
#[derive(Clone, Debug, Default)]
pub struct Merger {
    /// Whether the count reports carry plasmid counts.
    with_plasmid: bool,

    /// The sample name (from the last merged count report).
    sample: Option<String>,

    /// The plasmid sample name (from the first merged count report).
    plasmid: Option<String>,

    /// The merged guides in first-seen order.
    entries: Vec<Entry>,

    /// The index (into `entries`) of every guide id.
    index: HashMap<String, usize>,
}

impl Merger {
    /// Creates a new [`Merger`].
    pub fn new(with_plasmid: bool) -> Self {
        Self {
            with_plasmid,
            ..Default::default()
        }
    }

    /// Gets the sample name, if a count report has been merged.
    pub fn sample(&self) -> Option<&str> {
        self.sample.as_deref()
    }

    /// Gets the plasmid sample name, if plasmid counts are being merged.
    pub fn plasmid(&self) -> Option<&str> {
        self.plasmid.as_deref()
    }

    /// Gets the merged sample count of a guide id.
    pub fn count(&self, id: &str) -> Option<u64> {
        self.index.get(id).map(|&i| self.entries[i].count)
    }

    /// Gets the plasmid count of a guide id.
    pub fn plasmid_count(&self, id: &str) -> Option<u64> {
        self.index.get(id).and_then(|&i| self.entries[i].plasmid)
    }

    /// Gets the number of merged guides.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no guides have been merged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Opens a (plain or gzipped) count report and merges it.
    pub fn add_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("reading from {}", path.display());

        let reader = crate::io::open(path).map_err(Error::Io)?;
        self.add(&path.display().to_string(), reader)
    }

    /// Merges a count report. `source` names the report in errors.
    ///
    /// # Examples
    ///
    /// ```
    /// use crispr_read_counts::merge::Merger;
    ///
    /// let mut merger = Merger::new(false);
    /// merger.add("a", &b"sgRNA\tgene\tlane1.sample\nID1\tGeneA\t5\n"[..])?;
    /// merger.add("b", &b"sgRNA\tgene\tlane2.sample\nID1\tGeneA\t2\nID2\tGeneB\t1\n"[..])?;
    ///
    /// assert_eq!(merger.sample(), Some("lane2.sample"));
    /// assert_eq!(merger.count("ID1"), Some(7));
    /// assert_eq!(merger.count("ID2"), Some(1));
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn add<T>(&mut self, source: &str, reader: T) -> Result<()>
    where
        T: BufRead,
    {
        let mut records = delimited_reader(reader, TAB).into_records();
        let header = records
            .next()
            .transpose()
            .map_err(Error::Csv)?
            .unwrap_or_default();

        if !is_count_header(&header) || header.len() < NUM_COUNT_FIELDS {
            return Err(Error::UnexpectedHeader(source.to_string()));
        }

        self.sample = Some(header[2].to_string());

        if self.with_plasmid {
            let name = header
                .get(3)
                .ok_or_else(|| Error::MissingPlasmidColumn(source.to_string()))?;

            let expected = self.plasmid.get_or_insert_with(|| name.to_string());

            if expected.as_str() != name {
                return Err(Error::PlasmidNameMismatch {
                    source: source.to_string(),
                    expected: expected.clone(),
                    found: name.to_string(),
                });
            }
        }

        let num_fields = match self.with_plasmid {
            true => NUM_PLASMID_COUNT_FIELDS,
            false => NUM_COUNT_FIELDS,
        };

        let parse = |row: usize, value: &str| {
            value.parse::<u64>().map_err(|error| Error::InvalidCount {
                source: source.to_string(),
                row,
                error,
            })
        };

        for result in records {
            let record = result.map_err(Error::Csv)?;
            let row = line_number(&record);

            if record.len() < num_fields {
                return Err(Error::MalformedRow {
                    source: source.to_string(),
                    row,
                });
            }

            let count = parse(row, &record[2])?;
            let plasmid = match self.with_plasmid {
                true => Some(parse(row, &record[3])?),
                false => None,
            };

            self.merge(&record[0], &record[1], count, plasmid)?;
        }

        Ok(())
    }

    /// Merges the counts of a single guide.
    fn merge(&mut self, id: &str, gene: &str, count: u64, plasmid: Option<u64>) -> Result<()> {
        match self.index.get(id) {
            Some(&i) => {
                let entry = &mut self.entries[i];

                if entry.plasmid != plasmid {
                    return Err(Error::InconsistentPlasmidCount(id.to_string()));
                }

                entry.gene = gene.to_string();
                entry.count += count;
            }
            None => {
                self.index.insert(id.to_string(), self.entries.len());
                self.entries.push(Entry {
                    id: id.to_string(),
                    gene: gene.to_string(),
                    count,
                    plasmid,
                });
            }
        }

        Ok(())
    }

    /// Writes the merged count report, with guides in first-seen order.
    pub fn write_to<W>(&self, writer: W) -> Result<()>
    where
        W: Write,
    {
        let sample = self.sample.as_deref().ok_or(Error::Empty)?;
        let mut writer = report_writer(writer);

        let mut header = vec!["sgRNA", "gene", sample];
        if let Some(plasmid) = &self.plasmid {
            header.push(plasmid);
        }

        writer.write_record(header).map_err(Error::Csv)?;

        for entry in &self.entries {
            let count = entry.count.to_string();
            let mut row = vec![entry.id.as_str(), entry.gene.as_str(), count.as_str()];

            let plasmid = entry.plasmid.map(|plasmid| plasmid.to_string());
            if let Some(plasmid) = &plasmid {
                row.push(plasmid);
            }

            writer.write_record(row).map_err(Error::Csv)?;
        }

        writer.flush().map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempdir::TempDir;

    use super::*;

    const WITH_PLASMID: &[u8] = b"sgRNA\tgene\ts.sample\tplasmid\nX\tGeneX\t5\t9\nY\tGeneY\t1\t4\n";

    #[test]
    fn test_merge_with_itself_doubles() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut merger = Merger::new(true);
        merger.add("a", WITH_PLASMID)?;
        merger.add("b", WITH_PLASMID)?;

        assert_eq!(merger.count("X"), Some(10));
        assert_eq!(merger.plasmid_count("X"), Some(9));
        assert_eq!(merger.count("Y"), Some(2));

        let mut report = Vec::new();
        merger.write_to(&mut report)?;

        assert_eq!(
            String::from_utf8(report)?,
            "sgRNA\tgene\ts.sample\tplasmid\nX\tGeneX\t10\t9\nY\tGeneY\t2\t4\n"
        );

        Ok(())
    }

    #[test]
    fn test_merge_is_commutative() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let a = b"sgRNA\tgene\tsample\nX\tGeneX\t5\nY\tGeneY\t2\n";
        let b = b"sgRNA\tgene\tsample\nY\tGeneY\t3\nZ\tGeneZ\t7\n";

        let mut ab = Merger::new(false);
        ab.add("a", &a[..])?;
        ab.add("b", &b[..])?;

        let mut ba = Merger::new(false);
        ba.add("b", &b[..])?;
        ba.add("a", &a[..])?;

        for id in ["X", "Y", "Z"] {
            assert_eq!(ab.count(id), ba.count(id));
        }

        assert_eq!(ab.count("Y"), Some(5));
        assert_eq!(ab.len(), 3);

        Ok(())
    }

    #[test]
    fn test_inconsistent_plasmid_count() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut merger = Merger::new(true);
        merger.add("a", WITH_PLASMID)?;

        let other = b"sgRNA\tgene\ts.sample\tplasmid\nX\tGeneX\t5\t8\n";
        let err = merger.add("b", &other[..]).unwrap_err();
        assert!(matches!(err, Error::InconsistentPlasmidCount(id) if id == "X"));

        Ok(())
    }

    #[test]
    fn test_plasmid_header_checks() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut merger = Merger::new(true);
        let err = merger
            .add("a", &b"sgRNA\tgene\ts.sample\nX\tGeneX\t5\n"[..])
            .unwrap_err();
        assert!(matches!(err, Error::MissingPlasmidColumn(_)));

        let mut merger = Merger::new(true);
        merger.add("a", WITH_PLASMID)?;
        let err = merger
            .add("b", &b"sgRNA\tgene\ts.sample\tother\n"[..])
            .unwrap_err();
        assert!(matches!(err, Error::PlasmidNameMismatch { .. }));

        Ok(())
    }

    #[test]
    fn test_unexpected_header() {
        let mut merger = Merger::new(false);
        let err = merger.add("a", &b"X\tGeneX\t5\n"[..]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedHeader(source) if source == "a"));

        let err = Merger::new(false).write_to(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Empty));
    }

    #[test]
    fn test_malformed_row() {
        let data = b"sgRNA\tgene\ts.sample\nX\tGeneX\t5\nY\tGeneY\n";
        let err = Merger::new(false).add("a", &data[..]).unwrap_err();
        assert!(matches!(err, Error::MalformedRow { row: 3, .. }));

        let data = b"sgRNA\tgene\ts.sample\nX\tGeneX\tfive\n";
        let err = Merger::new(false).add("a", &data[..]).unwrap_err();
        assert!(matches!(err, Error::InvalidCount { row: 2, .. }));
    }

    #[test]
    fn test_add_gzipped_path() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new("merge")?;
        let path = dir.path().join("counts.tsv.gz");

        let mut encoder = GzEncoder::new(std::fs::File::create(&path)?, Compression::default());
        encoder.write_all(b"sgRNA\tgene\ts.sample\nX\tGeneX\t5\n")?;
        encoder.finish()?;

        let mut merger = Merger::new(false);
        merger.add_path(&path)?;
        merger.add_path(&path)?;

        assert_eq!(merger.count("X"), Some(10));
        Ok(())
    }
}
