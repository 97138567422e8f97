//! Single-guide libraries.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io::BufRead;

use nonempty::NonEmpty;
use tracing::debug;

use crate::io::delimited_reader;
use crate::io::line_number;
use crate::library::Delimiter;
use crate::sequence::is_valid_dna;

/// The minimum number of fields in a library row.
pub const NUM_LIBRARY_FIELDS: usize = 3;

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error associated with parsing a single-guide library.
///
/// All row numbers are 1-based line numbers within the library file.
#[derive(Debug, Eq, PartialEq)]
pub enum ParseError {
    /// A row has fewer than [`NUM_LIBRARY_FIELDS`] fields (or uses an
    /// unexpected delimiter).
    MalformedRow(usize),

    /// A row's sequence column contains non-DNA characters.
    InvalidSequence(usize, String),

    /// A row's sequence length differs from the length of the first sequence
    /// in the library.
    MixedSequenceLengths {
        /// The offending row.
        row: usize,

        /// The length of the first sequence in the library.
        expected: usize,

        /// The length of the sequence on the offending row.
        found: usize,
    },

    /// A guide id appears on more than one row.
    DuplicateGuideId(usize, String),

    /// The library contains no guides.
    Empty,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MalformedRow(row) => write!(
                f,
                "line {row} does not have {NUM_LIBRARY_FIELDS} columns, or the file uses an \
                 unexpected delimiter"
            ),
            ParseError::InvalidSequence(row, sequence) => write!(
                f,
                "sequence column contains non-DNA characters on line {row}: \"{sequence}\""
            ),
            ParseError::MixedSequenceLengths {
                row,
                expected,
                found,
            } => write!(
                f,
                "sequence on line {row} has length {found}, but the library's guides have \
                 length {expected}"
            ),
            ParseError::DuplicateGuideId(row, id) => {
                write!(f, "guide id \"{id}\" on line {row} was already defined")
            }
            ParseError::Empty => write!(f, "the library contains no guides"),
        }
    }
}

impl std::error::Error for ParseError {}

/// An error related to a [`GuideLibrary`].
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
// Guides
////////////////////////////////////////////////////////////////////////////////////////

/// A single guide within a [`GuideLibrary`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Guide {
    /// The guide id.
    id: String,

    /// The gene targeted by the guide.
    gene: String,

    /// The guide sequence.
    sequence: String,
}

impl Guide {
    /// Gets the guide id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gets the name of the targeted gene.
    pub fn gene(&self) -> &str {
        &self.gene
    }

    /// Gets the guide sequence.
    pub fn sequence(&self) -> &str {
        &self.sequence
    }
}

/// A library of single guides.
///
/// A library is immutable once read. Several guide ids may share a sequence;
/// those ids are kept in the order they appear in the library file.
#[derive(Clone, Debug)]
pub struct GuideLibrary {
    /// The guides in file order.
    guides: Vec<Guide>,

    /// The indices (into `guides`) of every guide, grouped by sequence.
    sequences: BTreeMap<String, NonEmpty<usize>>,

    /// The index (into `guides`) of every guide id.
    ids: HashMap<String, usize>,

    /// The length shared by every sequence in the library.
    guide_length: usize,
}

impl GuideLibrary {
    /// Reads a library from a delimited table with one `id, gene, sequence`
    /// row per guide and no header.
    ///
    /// # Examples
    ///
    /// ```
    /// use crispr_read_counts::library::Delimiter;
    /// use crispr_read_counts::library::GuideLibrary;
    ///
    /// let data = b"ID1,GeneA,ACGTACGTAC\nID2,GeneB,TTTTACGTAC\nID3,GeneB,ACGTACGTAC\n";
    /// let library = GuideLibrary::read_from(&data[..], Delimiter::Comma)?;
    ///
    /// assert_eq!(library.len(), 3);
    /// assert_eq!(library.guide_length(), 10);
    /// assert_eq!(library.ids_for("ACGTACGTAC").unwrap(), vec!["ID1", "ID3"]);
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn read_from<T>(reader: T, delimiter: Delimiter) -> Result<Self>
    where
        T: BufRead,
    {
        let mut guides = Vec::new();
        let mut sequences = BTreeMap::<String, NonEmpty<usize>>::new();
        let mut ids = HashMap::new();
        let mut guide_length = None;

        let mut reader = delimited_reader(reader, delimiter.as_byte());

        for result in reader.records() {
            let record = result.map_err(Error::Csv)?;
            let row = line_number(&record);

            if record.iter().all(str::is_empty) {
                debug!("skipping blank library line {row}");
                continue;
            }

            if record.len() < NUM_LIBRARY_FIELDS {
                return Err(Error::Parse(ParseError::MalformedRow(row)));
            }

            let (id, gene, sequence) = (&record[0], &record[1], &record[2]);

            if !is_valid_dna(sequence) {
                return Err(Error::Parse(ParseError::InvalidSequence(
                    row,
                    sequence.to_string(),
                )));
            }

            match guide_length {
                None => guide_length = Some(sequence.len()),
                Some(expected) if expected != sequence.len() => {
                    return Err(Error::Parse(ParseError::MixedSequenceLengths {
                        row,
                        expected,
                        found: sequence.len(),
                    }));
                }
                Some(_) => {}
            }

            if ids.contains_key(id) {
                return Err(Error::Parse(ParseError::DuplicateGuideId(
                    row,
                    id.to_string(),
                )));
            }

            let index = guides.len();
            ids.insert(id.to_string(), index);

            match sequences.get_mut(sequence) {
                Some(indices) => indices.push(index),
                None => {
                    sequences.insert(sequence.to_string(), NonEmpty::new(index));
                }
            }

            guides.push(Guide {
                id: id.to_string(),
                gene: gene.to_string(),
                sequence: sequence.to_string(),
            });
        }

        let guide_length = guide_length.ok_or(Error::Parse(ParseError::Empty))?;
        debug!(
            "read {} guides ({} distinct sequences) of length {guide_length}",
            guides.len(),
            sequences.len()
        );

        Ok(Self {
            guides,
            sequences,
            ids,
            guide_length,
        })
    }

    /// Gets the guides in library file order.
    pub fn guides(&self) -> &[Guide] {
        &self.guides
    }

    /// Gets a guide by its index in the library file order.
    pub fn guide(&self, index: usize) -> Option<&Guide> {
        self.guides.get(index)
    }

    /// Gets the index of a guide id in the library file order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.get(id).copied()
    }

    /// Gets the name of the gene targeted by a guide id.
    pub fn gene(&self, id: &str) -> Option<&str> {
        self.index_of(id).map(|index| self.guides[index].gene())
    }

    /// Gets the ids of the guides sharing a sequence, in library file order.
    pub fn ids_for(&self, sequence: &str) -> Option<Vec<&str>> {
        self.sequences
            .get(sequence)
            .map(|indices| indices.iter().map(|&index| self.guides[index].id()).collect())
    }

    /// Iterates over every distinct sequence (in ascending order) along with
    /// the indices of the guides that share it (in library file order).
    pub fn sequences(&self) -> impl Iterator<Item = (&str, &NonEmpty<usize>)> {
        self.sequences
            .iter()
            .map(|(sequence, indices)| (sequence.as_str(), indices))
    }

    /// Iterates over the guides in report order: ascending sequence, then
    /// library file order for guides sharing a sequence.
    pub fn guides_by_sequence(&self) -> impl Iterator<Item = (usize, &Guide)> {
        let guides = &self.guides;

        self.sequences
            .values()
            .flat_map(move |indices| indices.iter().map(move |&index| (index, &guides[index])))
    }

    /// Gets the length shared by every sequence in the library.
    pub fn guide_length(&self) -> usize {
        self.guide_length
    }

    /// Gets the number of guides in the library.
    pub fn len(&self) -> usize {
        self.guides.len()
    }

    /// Returns whether the library has no guides.
    ///
    /// A successfully read library always has at least one guide.
    pub fn is_empty(&self) -> bool {
        self.guides.is_empty()
    }
}
