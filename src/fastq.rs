//! Paired FASTQ input.
//!
//! Mates are parsed with [`noodles::fastq`] and read in lockstep. Only the
//! name of mate 1 and the sequences of both mates are retained.

use std::io::BufRead;
use std::io::{self};

use noodles::fastq;

/// The number of lines in a FASTQ record.
pub const LINES_PER_RECORD: usize = 4;

/// The prefix of a FASTQ header line.
const HEADER_PREFIX: char = '@';

/// Mate suffixes stripped from read names.
const MATE_SUFFIXES: [&str; 2] = ["/1", "/2"];

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to reading paired FASTQ records.
#[derive(Debug)]
pub enum Error {
    /// An I/O error.
    Io(io::Error),

    /// One mate file ended before the other. The line number (1-based) is the
    /// first line present in only one of the files.
    MateLengthMismatch(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "i/o error: {err}"),
            Error::MateLengthMismatch(line) => write!(
                f,
                "mate files have different lengths: line {line} is only present in one of them"
            ),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////
// Records
////////////////////////////////////////////////////////////////////////////////////////

/// A read pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// The read id, taken from the mate 1 header.
    id: String,

    /// The mate 1 sequence.
    mate1: String,

    /// The mate 2 sequence.
    mate2: String,
}

impl Record {
    /// Creates a new [`Record`].
    pub fn new(id: impl Into<String>, mate1: impl Into<String>, mate2: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mate1: mate1.into(),
            mate2: mate2.into(),
        }
    }

    /// Gets the read id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gets the mate 1 sequence.
    pub fn mate1(&self) -> &str {
        &self.mate1
    }

    /// Gets the mate 2 sequence.
    pub fn mate2(&self) -> &str {
        &self.mate2
    }
}

/// Derives a read id from a FASTQ header line.
///
/// The leading `@` is removed, the name is cut at the first whitespace and a
/// trailing `/1` or `/2` mate suffix is removed.
///
/// # Examples
///
/// ```
/// use crispr_read_counts::fastq::read_id;
///
/// assert_eq!(read_id("@read1/1"), "read1");
/// assert_eq!(read_id("@read1 1:N:0:ATCACG"), "read1");
/// assert_eq!(read_id("read1"), "read1");
/// ```
pub fn read_id(header: &str) -> &str {
    let header = header.strip_prefix(HEADER_PREFIX).unwrap_or(header);
    let name = header.split_whitespace().next().unwrap_or_default();

    MATE_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

////////////////////////////////////////////////////////////////////////////////////////
// Paired reader
////////////////////////////////////////////////////////////////////////////////////////

/// The outcome of reading one mate.
enum MateRead {
    /// The mate file is exhausted.
    Eof,

    /// A complete record was read.
    Complete,

    /// A record was cut short by the end of the file. The number of lines of
    /// the record that were present is retained.
    Partial(usize),
}

/// Reads the next record from a single mate file.
fn read_mate<R>(
    reader: &mut fastq::io::Reader<R>,
    record: &mut fastq::Record,
) -> Result<MateRead>
where
    R: BufRead,
{
    match reader.read_record(record) {
        Ok(0) => Ok(MateRead::Eof),
        // A missing quality line is not an error for the underlying parser.
        Ok(_) if record.quality_scores().is_empty() && !record.sequence().is_empty() => {
            Ok(MateRead::Partial(LINES_PER_RECORD - 1))
        }
        Ok(_) => Ok(MateRead::Complete),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            let lines = if record.sequence().is_empty() { 1 } else { 2 };
            Ok(MateRead::Partial(lines))
        }
        Err(err) => Err(Error::Io(err)),
    }
}

/// Decodes a FASTQ field as UTF-8.
fn as_str(field: &[u8]) -> Result<&str> {
    std::str::from_utf8(field)
        .map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
}

/// A reader over two mate files read in lockstep.
pub struct PairedReader<R1, R2> {
    /// The mate 1 reader.
    mate1: fastq::io::Reader<R1>,

    /// The mate 2 reader.
    mate2: fastq::io::Reader<R2>,

    /// The record buffer for mate 1.
    record1: fastq::Record,

    /// The record buffer for mate 2.
    record2: fastq::Record,

    /// The number of lines read from each mate file.
    lines_read: usize,

    /// Whether the end of both mate files has been reached.
    done: bool,
}

impl<R1, R2> std::fmt::Debug for PairedReader<R1, R2> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairedReader")
            .field("lines_read", &self.lines_read)
            .field("done", &self.done)
            .finish()
    }
}

impl<R1, R2> PairedReader<R1, R2>
where
    R1: BufRead,
    R2: BufRead,
{
    /// Creates a new [`PairedReader`].
    pub fn new(mate1: R1, mate2: R2) -> Self {
        Self {
            mate1: fastq::io::Reader::new(mate1),
            mate2: fastq::io::Reader::new(mate2),
            record1: fastq::Record::default(),
            record2: fastq::Record::default(),
            lines_read: 0,
            done: false,
        }
    }

    /// Gets the number of lines read from each mate file so far.
    ///
    /// This is four lines per complete record plus the lines of a trailing
    /// record that was cut short, if any.
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// Reads the next read pair.
    ///
    /// Only complete records are returned. A trailing record that is cut short
    /// in both mate files ends the stream without being returned, and its
    /// lines are added to [`lines_read()`](Self::lines_read) so that the
    /// truncation can be detected. A record present in only one of the mate
    /// files is an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use crispr_read_counts::fastq::PairedReader;
    ///
    /// let mate1 = b"@r1/1\nACGT\n+\nIIII\n";
    /// let mate2 = b"@r1/2\nTTGG\n+\nIIII\n";
    ///
    /// let mut reader = PairedReader::new(&mate1[..], &mate2[..]);
    /// let record = reader.read_record()?.unwrap();
    ///
    /// assert_eq!(record.id(), "r1");
    /// assert_eq!(record.mate1(), "ACGT");
    /// assert_eq!(record.mate2(), "TTGG");
    /// assert!(reader.read_record()?.is_none());
    ///
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        if self.done {
            return Ok(None);
        }

        let read1 = read_mate(&mut self.mate1, &mut self.record1)?;
        let read2 = read_mate(&mut self.mate2, &mut self.record2)?;

        match (read1, read2) {
            (MateRead::Complete, MateRead::Complete) => {
                self.lines_read += LINES_PER_RECORD;

                let name: &[u8] = self.record1.name();
                let id = read_id(as_str(name)?);
                let mate1 = as_str(self.record1.sequence())?;
                let mate2 = as_str(self.record2.sequence())?;

                Ok(Some(Record::new(id, mate1, mate2)))
            }
            (MateRead::Eof, MateRead::Eof) => {
                self.done = true;
                Ok(None)
            }
            (MateRead::Partial(lines1), MateRead::Partial(lines2)) if lines1 == lines2 => {
                self.done = true;
                self.lines_read += lines1;
                Ok(None)
            }
            _ => Err(Error::MateLengthMismatch(self.lines_read + 1)),
        }
    }
}

impl<R1, R2> Iterator for PairedReader<R1, R2>
where
    R1: BufRead,
    R2: BufRead,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_id() {
        assert_eq!(read_id("@SRR1.1/2"), "SRR1.1");
        assert_eq!(read_id("@SRR1.1\textra"), "SRR1.1");
        assert_eq!(read_id("@"), "");
        assert_eq!(read_id("@a/3"), "a/3");
    }

    #[test]
    fn test_read_pairs() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mate1 = b"@a/1\nAAAA\n+\nIIII\n@b/1\nCCCC\n+\nIIII\n";
        let mate2 = b"@a/2\nTTTT\n+\nIIII\n@b/2\nGGGG\n+\nIIII\n";

        let reader = PairedReader::new(&mate1[..], &mate2[..]);
        let records = reader.collect::<Result<Vec<_>>>()?;

        assert_eq!(
            records,
            vec![
                Record::new("a", "AAAA", "TTTT"),
                Record::new("b", "CCCC", "GGGG"),
            ]
        );

        Ok(())
    }

    #[test]
    fn test_truncated_final_record() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mate1 = b"@a/1\nAAAA\n+\nIIII\n@b/1\nCCCC\n";
        let mate2 = b"@a/2\nTTTT\n+\nIIII\n@b/2\nGGGG\n";

        let mut reader = PairedReader::new(&mate1[..], &mate2[..]);
        assert_eq!(reader.read_record()?, Some(Record::new("a", "AAAA", "TTTT")));
        assert!(reader.read_record()?.is_none());
        assert_eq!(reader.lines_read(), 6);
        assert!(reader.read_record()?.is_none());

        Ok(())
    }

    #[test]
    fn test_trailing_header_is_discarded() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let mate1 = b"@a/1\nAAAA\n+\nIIII\n@b/1\n";
        let mate2 = b"@a/2\nTTTT\n+\nIIII\n@b/2\n";

        let mut reader = PairedReader::new(&mate1[..], &mate2[..]);
        assert!(reader.read_record()?.is_some());
        assert!(reader.read_record()?.is_none());
        assert_eq!(reader.lines_read(), 5);

        Ok(())
    }

    #[test]
    fn test_missing_quality_line() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mate1 = b"@a/1\nAAAA\n+\nIIII\n@b/1\nCCCC\n+\n";
        let mate2 = b"@a/2\nTTTT\n+\nIIII\n@b/2\nGGGG\n+\n";

        let mut reader = PairedReader::new(&mate1[..], &mate2[..]);
        let mut records = Vec::new();

        while let Some(record) = reader.read_record()? {
            records.push(record);
        }

        assert_eq!(records, vec![Record::new("a", "AAAA", "TTTT")]);
        assert_eq!(reader.lines_read(), 7);

        Ok(())
    }

    #[test]
    fn test_crlf_line_endings() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mate1 = b"@a/1 1:N:0\r\nAAAA\r\n+\r\nIIII\r\n";
        let mate2 = b"@a/2 2:N:0\r\nTTTT\r\n+\r\nIIII\r\n";

        let reader = PairedReader::new(&mate1[..], &mate2[..]);
        let records = reader.collect::<Result<Vec<_>>>()?;
        assert_eq!(records, vec![Record::new("a", "AAAA", "TTTT")]);

        Ok(())
    }

    #[test]
    fn test_mate_length_mismatch() {
        let mate1 = b"@a/1\nAAAA\n+\nIIII\n@b/1\nCCCC\n+\nIIII\n";
        let mate2 = b"@a/2\nTTTT\n+\nIIII\n";

        let mut reader = PairedReader::new(&mate1[..], &mate2[..]);
        assert!(reader.read_record().is_ok());
        assert!(matches!(
            reader.read_record(),
            Err(Error::MateLengthMismatch(5))
        ));
    }
}
