//! Plasmid (input library) reference counts.
//!
//! Plasmid counts are read from a previously produced single-guide count
//! report and are only ever reported next to sample counts.

use std::collections::HashMap;
use std::io::BufRead;
use std::num::ParseIntError;

use csv::StringRecord;

use crate::io::TAB;
use crate::io::delimited_reader;
use crate::io::line_number;

/// The minimum number of fields on every line of a count file.
pub const NUM_COUNT_FIELDS: usize = 3;

/// The first two fields of a count file header (compared case-insensitively).
pub const HEADER_PREFIX: [&str; 2] = ["sgRNA", "gene"];

/// Returns whether a row is a count file header, i.e., whether its first two
/// fields are `sgRNA` and `gene` (case-insensitive).
pub fn is_count_header(record: &StringRecord) -> bool {
    let mut fields = record.iter();

    HEADER_PREFIX.iter().all(|expected| {
        fields
            .next()
            .is_some_and(|field| field.eq_ignore_ascii_case(expected))
    })
}

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error associated with parsing plasmid counts.
#[derive(Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The first line does not start with `sgRNA` and `gene`.
    HeaderMismatch(String),

    /// A line (1-based) has fewer than [`NUM_COUNT_FIELDS`] fields.
    MalformedRow(usize),

    /// A line (1-based) has a count that is not a non-negative integer.
    InvalidCount(usize, ParseIntError),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::HeaderMismatch(line) => write!(
                f,
                "expected header starting with \"sgRNA\" and \"gene\", found \"{line}\""
            ),
            ParseError::MalformedRow(row) => write!(
                f,
                "line {row} does not have {NUM_COUNT_FIELDS} columns, or the file uses an \
                 unexpected delimiter"
            ),
            ParseError::InvalidCount(row, err) => write!(f, "invalid count on line {row}: {err}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// An error related to [`PlasmidCounts`].
#[derive(Debug)]
pub enum Error {
    /// An error reading the delimited table.
    Csv(csv::Error),

    /// A parse error.
    Parse(ParseError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Csv(err) => write!(f, "csv error: {err}"),
            Error::Parse(err) => write!(f, "parse error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Plasmid counts
////////////////////////////////////////////////////////////////////////////////////////

/// Baseline counts for each guide from a plasmid sample.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlasmidCounts {
    /// The display name of the plasmid sample.
    name: String,

    /// The count for each guide id.
    counts: HashMap<String, u64>,
}

impl PlasmidCounts {
    /// Reads plasmid counts from a tab-delimited count file.
    ///
    /// # Examples
    ///
    /// ```
    /// use crispr_read_counts::plasmid::PlasmidCounts;
    ///
    /// let data = b"sgRNA\tgene\tplasmid\nID1\tGeneA\t12\n";
    /// let plasmid = PlasmidCounts::read_from(&data[..])?;
    ///
    /// assert_eq!(plasmid.name(), "plasmid");
    /// assert_eq!(plasmid.count("ID1"), 12);
    /// assert_eq!(plasmid.count("ID2"), 0);
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn read_from<T>(reader: T) -> Result<Self>
    where
        T: BufRead,
    {
        let mut records = delimited_reader(reader, TAB).into_records();
        let header = records
            .next()
            .transpose()
            .map_err(Error::Csv)?
            .unwrap_or_default();

        if !is_count_header(&header) {
            let line = header.iter().collect::<Vec<_>>().join("\t");
            return Err(Error::Parse(ParseError::HeaderMismatch(line)));
        }

        if header.len() < NUM_COUNT_FIELDS {
            return Err(Error::Parse(ParseError::MalformedRow(line_number(&header))));
        }

        let name = header[2].to_string();
        let mut counts = HashMap::new();

        for result in records {
            let record = result.map_err(Error::Csv)?;
            let row = line_number(&record);

            if record.len() < NUM_COUNT_FIELDS {
                return Err(Error::Parse(ParseError::MalformedRow(row)));
            }

            let count = record[2]
                .parse::<u64>()
                .map_err(|err| Error::Parse(ParseError::InvalidCount(row, err)))?;

            counts.insert(record[0].to_string(), count);
        }

        Ok(Self { name, counts })
    }

    /// Gets the display name of the plasmid sample.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the plasmid count of a guide id (zero for guides that are not
    /// present).
    pub fn count(&self, id: &str) -> u64 {
        self.counts.get(id).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_header() {
        let is_header = |fields: &[&str]| is_count_header(&StringRecord::from(fields.to_vec()));

        assert!(is_header(&["sgRNA", "gene", "sample"]));
        assert!(is_header(&["SGRNA", "Gene", "sample"]));
        assert!(!is_header(&["guide", "gene", "sample"]));
        assert!(!is_header(&["sgRNA,gene,sample"]));
        assert!(!is_header(&["sgRNA", "genes", "sample"]));
        assert!(!is_header(&["sgRNA"]));
    }

    #[test]
    fn test_read_plasmid_counts() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let data = b"sgRNA\tgene\tplasmid.sample\nID1\tGeneA\t5\n\nID2\tGeneB\t0\n";
        let plasmid = PlasmidCounts::read_from(&data[..])?;

        assert_eq!(plasmid.name(), "plasmid.sample");
        assert_eq!(plasmid.count("ID1"), 5);
        assert_eq!(plasmid.count("ID2"), 0);
        assert_eq!(plasmid.count("ID3"), 0);

        Ok(())
    }

    #[test]
    fn test_header_mismatch() {
        let data = b"ID1\tGeneA\t5\n";
        let err = PlasmidCounts::read_from(&data[..]).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::HeaderMismatch(_))));
    }

    #[test]
    fn test_empty_input() {
        let err = PlasmidCounts::read_from(&b""[..]).unwrap_err();
        assert!(matches!(
            err,
            Error::Parse(ParseError::HeaderMismatch(ref header)) if header.is_empty()
        ));
    }

    #[test]
    fn test_malformed_row() {
        let data = b"sgRNA\tgene\tplasmid\nID1\tGeneA\n";
        let err = PlasmidCounts::read_from(&data[..]).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MalformedRow(2))));
    }

    #[test]
    fn test_invalid_count() {
        let data = b"sgRNA\tgene\tplasmid\nID1\tGeneA\tmany\n";
        let err = PlasmidCounts::read_from(&data[..]).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::InvalidCount(2, _))));
    }
}
