//! Dual-guide (paired) libraries.

use std::collections::HashMap;
use std::collections::HashSet;
use std::io::BufRead;
use std::sync::LazyLock;

use csv::StringRecord;
use regex::Regex;
use tracing::debug;

use crate::io::TAB;
use crate::io::delimited_reader;
use crate::io::line_number;
use crate::sequence::reverse_complement;

/// The names of the columns that must be present in a paired library header.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "sgrna_left_id",
    "sgrna_left_seq",
    "sgrna_right_id",
    "sgrna_right_seq",
    "unique_id",
    "gene_pair_id",
    "target_id",
];

/// Guide ids of safe (non-targeting control) guides: `F` followed by digits.
static SAFE_GUIDE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^F\d+$").unwrap());

/// Returns whether a guide id names a safe control guide.
pub fn is_safe_guide_id(id: &str) -> bool {
    SAFE_GUIDE_ID.is_match(id)
}

/// Builds the pair table key for a left and right guide sequence.
///
/// This is the key a correctly paired read pair reconstructs as `read 2 +
/// read 1`, since read 2 covers the left guide on the opposite strand.
pub fn pair_key(left: &str, right: &str) -> String {
    let mut key = reverse_complement(left);
    key.push_str(right);
    key
}

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error associated with parsing a paired library.
#[derive(Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The library has no header line.
    MissingHeader,

    /// A required column is absent from the header.
    MissingColumn(String),

    /// A data row (1-based line number, counting the header) does not have
    /// enough fields to hold every required column.
    MalformedRow(usize),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingHeader => write!(f, "the library file has no header line"),
            ParseError::MissingColumn(name) => write!(
                f,
                "could not find named column \"{name}\" in the library header"
            ),
            ParseError::MalformedRow(row) => write!(
                f,
                "line {row} does not have enough tab-separated fields for the header's columns"
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// An error related to a [`PairLibrary`].
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
// Columns
////////////////////////////////////////////////////////////////////////////////////////

/// The (0-based) positions of the required columns within a library header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Columns {
    /// The left guide id column.
    pub left_id: usize,

    /// The left guide sequence column.
    pub left_sequence: usize,

    /// The right guide id column.
    pub right_id: usize,

    /// The right guide sequence column.
    pub right_sequence: usize,

    /// The unique pair id column.
    pub unique_id: usize,

    /// The gene pair id column.
    pub gene_pair_id: usize,

    /// The target id column.
    pub target_id: usize,
}

impl Columns {
    /// Locates the required columns within a header row.
    ///
    /// Header cells are compared case-insensitively. If a column name appears
    /// more than once, the last occurrence is used.
    pub fn locate(header: &StringRecord) -> std::result::Result<Self, ParseError> {
        let mut found = HashMap::new();

        for (index, cell) in header.iter().enumerate() {
            let cell = cell.to_lowercase();

            if let Some(name) = REQUIRED_COLUMNS.iter().find(|name| **name == cell) {
                found.insert(*name, index);
            }
        }

        let get = |name: &str| {
            found
                .get(name)
                .copied()
                .ok_or_else(|| ParseError::MissingColumn(name.to_string()))
        };

        // NOTE: the lookups below are performed in the order of
        // `REQUIRED_COLUMNS` so the first missing column is the one reported.
        Ok(Self {
            left_id: get(REQUIRED_COLUMNS[0])?,
            left_sequence: get(REQUIRED_COLUMNS[1])?,
            right_id: get(REQUIRED_COLUMNS[2])?,
            right_sequence: get(REQUIRED_COLUMNS[3])?,
            unique_id: get(REQUIRED_COLUMNS[4])?,
            gene_pair_id: get(REQUIRED_COLUMNS[5])?,
            target_id: get(REQUIRED_COLUMNS[6])?,
        })
    }

    /// Gets the largest column position.
    fn max(&self) -> usize {
        [
            self.left_id,
            self.left_sequence,
            self.right_id,
            self.right_sequence,
            self.unique_id,
            self.gene_pair_id,
            self.target_id,
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Rows
////////////////////////////////////////////////////////////////////////////////////////

/// A single row of a paired library.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Row {
    /// The unique pair id.
    unique_id: String,

    /// The target id.
    target_id: String,

    /// The gene pair id.
    gene_pair_id: String,

    /// The left guide sequence.
    left_sequence: String,

    /// The right guide sequence.
    right_sequence: String,

    /// The index of this row's pair within the pair table.
    slot: usize,
}

impl Row {
    /// Gets the unique pair id.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Gets the target id.
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Gets the gene pair id.
    pub fn gene_pair_id(&self) -> &str {
        &self.gene_pair_id
    }

    /// Gets the left guide sequence.
    pub fn left_sequence(&self) -> &str {
        &self.left_sequence
    }

    /// Gets the right guide sequence.
    pub fn right_sequence(&self) -> &str {
        &self.right_sequence
    }

    /// Gets the pair table key of this row.
    pub fn key(&self) -> String {
        pair_key(&self.left_sequence, &self.right_sequence)
    }

    /// Gets the index of this row's pair within the pair table.
    ///
    /// Rows describing the same left/right combination share a slot.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Library
////////////////////////////////////////////////////////////////////////////////////////

/// A library of guide pairs with the lookup tables needed to classify read
/// pairs.
#[derive(Clone, Debug)]
pub struct PairLibrary {
    /// The rows in file order.
    rows: Vec<Row>,

    /// The pair table: `reverse_complement(left) + right` to a slot index.
    pairs: HashMap<String, usize>,

    /// Every left guide sequence.
    left: HashSet<String>,

    /// Every right guide sequence.
    right: HashSet<String>,

    /// The reverse complement of every left guide sequence.
    left_rc: HashSet<String>,

    /// The reverse complement of every right guide sequence.
    right_rc: HashSet<String>,

    /// The sequences of safe control guides.
    safe: HashSet<String>,

    /// The positions of the required columns.
    columns: Columns,
}

impl PairLibrary {
    /// Reads a paired library from a tab-delimited table with a header line.
    ///
    /// # Examples
    ///
    /// ```
    /// use crispr_read_counts::library::PairLibrary;
    ///
    /// let data = b"sgRNA_left_id\tsgRNA_left_seq\tsgRNA_right_id\tsgRNA_right_seq\tunique_id\tgene_pair_id\ttarget_id\n\
    ///              L1\tAAAC\tR1\tGGGA\tU1\tG1\tT1\n\
    ///              F1\tCCCA\tR1\tGGGA\tU2\tG2\tT2\n";
    /// let library = PairLibrary::read_from(&data[..])?;
    ///
    /// assert_eq!(library.len(), 2);
    /// assert!(library.is_left_rc("GTTT"));
    /// assert!(library.is_safe("CCCA"));
    /// assert!(library.slot("GTTTGGGA").is_some());
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
            .ok_or(Error::Parse(ParseError::MissingHeader))?
            .map_err(Error::Csv)?;

        let columns = Columns::locate(&header).map_err(Error::Parse)?;
        let max_column = columns.max();

        let mut library = Self {
            rows: Vec::new(),
            pairs: HashMap::new(),
            left: HashSet::new(),
            right: HashSet::new(),
            left_rc: HashSet::new(),
            right_rc: HashSet::new(),
            safe: HashSet::new(),
            columns,
        };

        for result in records {
            let record = result.map_err(Error::Csv)?;
            let row = line_number(&record);

            if record.iter().all(str::is_empty) {
                debug!("skipping blank library line {row}");
                continue;
            }

            if record.len() <= max_column {
                return Err(Error::Parse(ParseError::MalformedRow(row)));
            }

            library.register(&record);
        }

        debug!(
            "read {} library rows ({} distinct guide pairs, {} safe sequences)",
            library.rows.len(),
            library.pairs.len(),
            library.safe.len()
        );

        Ok(library)
    }

    /// Registers a single row's sequences in the lookup tables.
    fn register(&mut self, fields: &StringRecord) {
        let columns = self.columns;
        let left = &fields[columns.left_sequence];
        let right = &fields[columns.right_sequence];

        self.left.insert(left.to_string());
        self.right.insert(right.to_string());
        self.left_rc.insert(reverse_complement(left));
        self.right_rc.insert(reverse_complement(right));

        if is_safe_guide_id(&fields[columns.left_id]) {
            self.safe.insert(left.to_string());
        }

        if is_safe_guide_id(&fields[columns.right_id]) {
            self.safe.insert(right.to_string());
        }

        let next = self.pairs.len();
        let slot = *self.pairs.entry(pair_key(left, right)).or_insert(next);

        self.rows.push(Row {
            unique_id: fields[columns.unique_id].to_string(),
            target_id: fields[columns.target_id].to_string(),
            gene_pair_id: fields[columns.gene_pair_id].to_string(),
            left_sequence: left.to_string(),
            right_sequence: right.to_string(),
            slot,
        });
    }

    /// Gets the rows in library file order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Gets the number of library rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether the library has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Gets the number of distinct guide pairs (slots in the pair table).
    pub fn num_pairs(&self) -> usize {
        self.pairs.len()
    }

    /// Gets the pair table slot for a combined key, if the key is a known
    /// pair.
    pub fn slot(&self, key: &str) -> Option<usize> {
        self.pairs.get(key).copied()
    }

    /// Returns whether a sequence is a left guide sequence.
    pub fn is_left(&self, sequence: &str) -> bool {
        self.left.contains(sequence)
    }

    /// Returns whether a sequence is a right guide sequence.
    pub fn is_right(&self, sequence: &str) -> bool {
        self.right.contains(sequence)
    }

    /// Returns whether a sequence is the reverse complement of a left guide
    /// sequence.
    pub fn is_left_rc(&self, sequence: &str) -> bool {
        self.left_rc.contains(sequence)
    }

    /// Returns whether a sequence is the reverse complement of a right guide
    /// sequence.
    pub fn is_right_rc(&self, sequence: &str) -> bool {
        self.right_rc.contains(sequence)
    }

    /// Returns whether a sequence belongs to a safe control guide.
    pub fn is_safe(&self, sequence: &str) -> bool {
        self.safe.contains(sequence)
    }

    /// Gets the positions of the required columns in the library header.
    pub fn columns(&self) -> &Columns {
        &self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A header with the required columns in a shuffled order and mixed case.
    const HEADER: &str = "unique_id\tTARGET_ID\tgene_pair_id\tsgrna_left_id\tsgrna_left_seq\t\
                          sgrna_right_id\tsgrna_right_seq\textra";

    /// Reads the first row of a tab-delimited line.
    fn header(line: &str) -> StringRecord {
        delimited_reader(line.as_bytes(), TAB)
            .into_records()
            .next()
            .unwrap()
            .unwrap()
    }

    fn library(rows: &[&str]) -> Result<PairLibrary> {
        let mut data = String::from(HEADER);
        data.push('\n');

        for row in rows {
            data.push_str(row);
            data.push('\n');
        }

        PairLibrary::read_from(data.as_bytes())
    }

    #[test]
    fn test_safe_guide_id() {
        assert!(is_safe_guide_id("F1"));
        assert!(is_safe_guide_id("F1234"));
        assert!(!is_safe_guide_id("F"));
        assert!(!is_safe_guide_id("f1"));
        assert!(!is_safe_guide_id("F1a"));
        assert!(!is_safe_guide_id("AF1"));
    }

    #[test]
    fn test_pair_key() {
        assert_eq!(pair_key("AAAC", "GGGA"), "GTTTGGGA");
    }

    #[test]
    fn test_locate_columns() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let columns = Columns::locate(&header(HEADER))?;
        assert_eq!(columns.unique_id, 0);
        assert_eq!(columns.target_id, 1);
        assert_eq!(columns.gene_pair_id, 2);
        assert_eq!(columns.left_id, 3);
        assert_eq!(columns.left_sequence, 4);
        assert_eq!(columns.right_id, 5);
        assert_eq!(columns.right_sequence, 6);
        Ok(())
    }

    #[test]
    fn test_missing_column() {
        let header = header("sgrna_left_id\tsgrna_left_seq\tunique_id");
        let err = Columns::locate(&header).unwrap_err();
        assert_eq!(err, ParseError::MissingColumn(String::from("sgrna_right_id")));
        assert_eq!(
            err.to_string(),
            "could not find named column \"sgrna_right_id\" in the library header"
        );
    }

    #[test]
    fn test_read_library() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let library = library(&[
            "U1\tT1\tG1\tL1\tAAAC\tR1\tGGGA\tx",
            "U2\tT2\tG2\tF7\tCCCA\tF8\tTTTG\tx",
            "U3\tT3\tG3\tL1\tAAAC\tR1\tGGGA\tx",
        ])?;

        assert_eq!(library.len(), 3);
        assert_eq!(library.num_pairs(), 2);

        assert!(library.is_left("AAAC"));
        assert!(library.is_right("GGGA"));
        assert!(library.is_left_rc("GTTT"));
        assert!(library.is_right_rc("TCCC"));
        assert!(!library.is_left("GGGA"));

        assert!(library.is_safe("CCCA"));
        assert!(library.is_safe("TTTG"));
        assert!(!library.is_safe("AAAC"));

        // Re-registering an existing pair reuses the original slot.
        let rows = library.rows();
        assert_eq!(rows[0].slot(), rows[2].slot());
        assert_ne!(rows[0].slot(), rows[1].slot());
        assert_eq!(library.slot("GTTTGGGA"), Some(rows[0].slot()));
        assert_eq!(rows[1].key(), "TGGGTTTG");
        assert_eq!(rows[1].unique_id(), "U2");
        assert_eq!(rows[1].target_id(), "T2");
        assert_eq!(rows[1].gene_pair_id(), "G2");

        Ok(())
    }

    #[test]
    fn test_malformed_row() {
        let err = library(&["U1\tT1\tG1\tL1\tAAAC"]).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MalformedRow(2))));
    }

    #[test]
    fn test_quoted_and_padded_cells() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let library = library(&["", "U1\tT1\tG1\tL1\t AAAC \tR1\tGGGA\t\"x"])?;

        assert_eq!(library.len(), 1);
        assert!(library.is_left("AAAC"));
        assert_eq!(library.rows()[0].unique_id(), "U1");

        Ok(())
    }

    #[test]
    fn test_missing_header() {
        let err = PairLibrary::read_from(&b""[..]).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MissingHeader)));
    }
}
