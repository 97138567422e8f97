//! Aligned read (SAM/BAM/CRAM) input.
//!
//! Only two things are needed from an aligned read to count guides: its flags
//! and its sequence in the orientation it was originally sequenced. This
//! module reduces SAM, BAM, and CRAM records to exactly that ([`Record`]) and
//! extracts the sample name from the read groups of the file header.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self};
use std::path::Path;
use std::path::PathBuf;

use noodles::bam;
use noodles::bgzf;
use noodles::cram;
use noodles::fasta;
use noodles::sam;
use noodles::sam::alignment::record::Flags;
use noodles::sam::header::record::value::map::read_group::tag::SAMPLE;
use tracing::debug;

use crate::sequence::reverse_complement_bytes;

////////////////////////////////////////////////////////////////////////////////////////
// Errors
////////////////////////////////////////////////////////////////////////////////////////

/// An error related to reading aligned reads.
#[derive(Debug)]
pub enum Error {
    /// An I/O error while opening or reading an alignment file.
    Io(PathBuf, io::Error),

    /// The file extension is not one of `.sam`, `.bam`, or `.cram`.
    UnsupportedFormat(PathBuf),

    /// A CRAM file was provided without a reference sequence file.
    MissingReference(PathBuf),

    /// No read group in the header carries a sample (`SM`) field.
    MissingSampleTag(PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(path, err) => write!(f, "i/o error for {}: {err}", path.display()),
            Error::UnsupportedFormat(path) => write!(
                f,
                "unsupported alignment format (expected .sam, .bam, or .cram): {}",
                path.display()
            ),
            Error::MissingReference(path) => write!(
                f,
                "a reference file must be provided for reading a CRAM file: {}",
                path.display()
            ),
            Error::MissingSampleTag(path) => write!(
                f,
                "could not find an \"SM\" tag in the header of {}",
                path.display()
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

/// The minimal view of an aligned read needed for counting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// The SAM flags.
    flags: Flags,

    /// The sequence as stored in the alignment file.
    sequence: Vec<u8>,
}

impl Record {
    /// Creates a new [`Record`].
    pub fn new(flags: Flags, sequence: impl Into<Vec<u8>>) -> Self {
        Self {
            flags,
            sequence: sequence.into(),
        }
    }

    /// Gets the SAM flags.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Gets the sequence as stored in the alignment file.
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Gets the sequence in its originally sequenced orientation.
    ///
    /// Aligners store reads mapped to the reverse strand reverse complemented;
    /// this undoes that.
    ///
    /// # Examples
    ///
    /// ```
    /// use crispr_read_counts::alignment::Record;
    /// use noodles::sam::alignment::record::Flags;
    ///
    /// let record = Record::new(Flags::REVERSE_COMPLEMENTED, b"AACG".to_vec());
    /// assert_eq!(record.forward_sequence().as_ref(), b"CGTT");
    ///
    /// let record = Record::new(Flags::empty(), b"AACG".to_vec());
    /// assert_eq!(record.forward_sequence().as_ref(), b"AACG");
    /// ```
    pub fn forward_sequence(&self) -> Cow<'_, [u8]> {
        match self.flags.is_reverse_complemented() {
            true => Cow::Owned(reverse_complement_bytes(&self.sequence)),
            false => Cow::Borrowed(&self.sequence),
        }
    }
}

impl From<&sam::alignment::RecordBuf> for Record {
    fn from(record: &sam::alignment::RecordBuf) -> Self {
        Self::new(record.flags(), record.sequence().as_ref())
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Formats
////////////////////////////////////////////////////////////////////////////////////////

/// A supported alignment file format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    /// SAM (optionally gzipped).
    Sam,

    /// BAM.
    Bam,

    /// CRAM.
    Cram,
}

impl Format {
    /// Detects the format of an alignment file from its extension.
    ///
    /// # Examples
    ///
    /// ```
    /// use crispr_read_counts::alignment::Format;
    ///
    /// assert_eq!(Format::from_path("sample.cram"), Some(Format::Cram));
    /// assert_eq!(Format::from_path("sample.BAM"), Some(Format::Bam));
    /// assert_eq!(Format::from_path("sample.sam.gz"), Some(Format::Sam));
    /// assert_eq!(Format::from_path("sample.fq"), None);
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_str()?.to_lowercase();

        if name.ends_with(".sam") || name.ends_with(".sam.gz") {
            Some(Self::Sam)
        } else if name.ends_with(".bam") {
            Some(Self::Bam)
        } else if name.ends_with(".cram") {
            Some(Self::Cram)
        } else {
            None
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////
// Reader
////////////////////////////////////////////////////////////////////////////////////////

/// The format-specific inner reader.
enum Inner {
    /// A SAM reader.
    Sam(sam::io::Reader<Box<dyn io::BufRead>>),

    /// A BAM reader.
    Bam(bam::io::Reader<bgzf::Reader<File>>),

    /// A CRAM reader.
    Cram(cram::io::Reader<File>),
}

/// A reader of aligned reads from a SAM, BAM, or CRAM file.
pub struct Reader {
    /// The path of the alignment file.
    path: PathBuf,

    /// The file header.
    header: sam::Header,

    /// The format-specific reader.
    inner: Inner,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("path", &self.path)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl Reader {
    /// Opens an alignment file and reads its header.
    ///
    /// The format is detected from the file extension. A `reference` FASTA
    /// file is required for CRAM input and ignored otherwise.
    pub fn from_path(path: impl AsRef<Path>, reference: Option<&Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format =
            Format::from_path(&path).ok_or_else(|| Error::UnsupportedFormat(path.clone()))?;
        let io_error = |err| Error::Io(path.clone(), err);

        debug!("opening {} as {format:?}", path.display());

        let (header, inner) = match format {
            Format::Sam => {
                let mut reader = crate::io::open(&path)
                    .map(sam::io::Reader::new)
                    .map_err(io_error)?;
                let header = reader.read_header().map_err(io_error)?;
                (header, Inner::Sam(reader))
            }
            Format::Bam => {
                let mut reader = File::open(&path)
                    .map(bam::io::Reader::new)
                    .map_err(io_error)?;
                let header = reader.read_header().map_err(io_error)?;
                (header, Inner::Bam(reader))
            }
            Format::Cram => {
                let reference = reference.ok_or_else(|| Error::MissingReference(path.clone()))?;
                let repository = reference_repository(reference)
                    .map_err(|err| Error::Io(reference.to_path_buf(), err))?;
                let mut reader = cram::io::reader::Builder::default()
                    .set_reference_sequence_repository(repository)
                    .build_from_path(&path)
                    .map_err(io_error)?;
                let header = reader.read_header().map_err(io_error)?;
                (header, Inner::Cram(reader))
            }
        };

        Ok(Self {
            path,
            header,
            inner,
        })
    }

    /// Gets the path of the alignment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the file header.
    pub fn header(&self) -> &sam::Header {
        &self.header
    }

    /// Gets the sample name from the file header.
    ///
    /// When several read groups carry a sample (`SM`) field, the last one is
    /// used.
    pub fn sample_name(&self) -> Result<String> {
        self.header
            .read_groups()
            .values()
            .filter_map(|read_group| read_group.other_fields().get(&SAMPLE))
            .filter(|sample| !sample.is_empty())
            .last()
            .map(|sample| sample.to_string())
            .ok_or_else(|| Error::MissingSampleTag(self.path.clone()))
    }

    /// Returns an iterator over the records in the file.
    pub fn records(&mut self) -> Box<dyn Iterator<Item = io::Result<Record>> + '_> {
        let Self { header, inner, .. } = self;
        let header: &sam::Header = header;

        match inner {
            Inner::Sam(reader) => Box::new(
                reader
                    .record_bufs(header)
                    .map(|result| result.map(|record| Record::from(&record))),
            ),
            Inner::Bam(reader) => Box::new(reader.records().map(|result| {
                result.map(|record| {
                    Record::new(record.flags(), record.sequence().iter().collect::<Vec<_>>())
                })
            })),
            Inner::Cram(reader) => Box::new(reader.records(header).map(move |result| {
                result
                    .and_then(|record| record.try_into_alignment_record(header))
                    .map(|record| Record::from(&record))
            })),
        }
    }
}

/// Builds the reference sequence repository used to decode CRAM records.
///
/// An indexed reader is used when a `.fai` index sits next to the FASTA file;
/// otherwise the sequences are loaded into memory.
fn reference_repository(path: &Path) -> io::Result<fasta::Repository> {
    let mut index = path.as_os_str().to_owned();
    index.push(".fai");

    if Path::new(&index).exists() {
        debug!("using indexed reference {}", path.display());
        fasta::io::indexed_reader::Builder::default()
            .build_from_path(path)
            .map(fasta::repository::adapters::IndexedReader::new)
            .map(fasta::Repository::new)
    } else {
        debug!("loading reference {} into memory", path.display());
        let mut reader = crate::io::open(path).map(fasta::io::Reader::new)?;
        let records = reader.records().collect::<io::Result<Vec<_>>>()?;
        Ok(fasta::Repository::new(records))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use noodles::core::Position;
    use noodles::sam::alignment::RecordBuf;
    use noodles::sam::alignment::io::Write as _;
    use noodles::sam::alignment::record::cigar::Op;
    use noodles::sam::alignment::record::cigar::op::Kind;
    use noodles::sam::alignment::record_buf::Sequence;
    use noodles::sam::header::record::value::Map;
    use noodles::sam::header::record::value::map::ReadGroup;
    use noodles::sam::header::record::value::map::ReferenceSequence;
    use tempdir::TempDir;

    use super::*;

    /// The reference FASTA used by the CRAM tests.
    const REFERENCE: &str = ">sq0\nACGTAACG\n";

    /// Builds a header with one reference sequence and two read groups, the
    /// second of which carries the sample name.
    fn header() -> std::result::Result<sam::Header, Box<dyn std::error::Error>> {
        let mut read_group = Map::<ReadGroup>::default();
        read_group.other_fields_mut().insert(SAMPLE, "sample0".into());

        Ok(sam::Header::builder()
            .add_reference_sequence(
                "sq0",
                Map::<ReferenceSequence>::new(NonZeroUsize::try_from(8)?),
            )
            .add_read_group("rg0", Map::<ReadGroup>::default())
            .add_read_group("rg1", read_group)
            .build())
    }

    /// Builds a read aligned to `sq0` without gaps.
    fn aligned(
        flags: Flags,
        start: usize,
        sequence: &[u8],
    ) -> std::result::Result<RecordBuf, Box<dyn std::error::Error>> {
        Ok(RecordBuf::builder()
            .set_flags(flags)
            .set_reference_sequence_id(0)
            .set_alignment_start(Position::try_from(start)?)
            .set_cigar([Op::new(Kind::Match, sequence.len())].into_iter().collect())
            .set_sequence(Sequence::from(sequence.to_vec()))
            .build())
    }

    /// Two reads aligned to `sq0`: one on the forward strand at the start and
    /// one stored reverse complemented at the end.
    fn records() -> std::result::Result<Vec<RecordBuf>, Box<dyn std::error::Error>> {
        Ok(vec![
            aligned(Flags::empty(), 1, b"ACGT")?,
            aligned(Flags::REVERSE_COMPLEMENTED, 5, b"AACG")?,
        ])
    }

    /// Asserts that the records read back match [`records()`].
    fn assert_records(records: &[Record]) {
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence(), b"ACGT");
        assert_eq!(records[0].forward_sequence().as_ref(), b"ACGT");
        assert_eq!(records[1].sequence(), b"AACG");
        assert_eq!(records[1].forward_sequence().as_ref(), b"CGTT");
        assert!(records[1].flags().is_reverse_complemented());
    }

    /// Writes [`records()`] to a CRAM file next to an uncompressed reference.
    fn write_cram(
        dir: &Path,
    ) -> std::result::Result<(PathBuf, PathBuf), Box<dyn std::error::Error>> {
        let reference = dir.join("reference.fa");
        std::fs::write(&reference, REFERENCE)?;

        let path = dir.join("reads.cram");
        let header = header()?;
        let mut writer = cram::io::writer::Builder::default()
            .set_reference_sequence_repository(reference_repository(&reference)?)
            .build_from_writer(File::create(&path)?);

        writer.write_alignment_header(&header)?;

        for record in records()? {
            writer.write_alignment_record(&header, &record)?;
        }

        writer.finish(&header)?;

        Ok((path, reference))
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path("a.sam"), Some(Format::Sam));
        assert_eq!(Format::from_path("dir/a.bam"), Some(Format::Bam));
        assert_eq!(Format::from_path("a.cram"), Some(Format::Cram));
        assert_eq!(Format::from_path("a.txt"), None);
        assert_eq!(Format::from_path("a.bam.gz"), None);
    }

    #[test]
    fn test_unsupported_format() {
        let err = Reader::from_path("reads.fastq", None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_cram_requires_reference() {
        let err = Reader::from_path("reads.cram", None).unwrap_err();
        assert!(matches!(err, Error::MissingReference(_)));
    }

    #[test]
    fn test_read_sam() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new("alignment")?;
        let path = dir.path().join("reads.sam");

        std::fs::write(
            &path,
            "@HD\tVN:1.6\tSO:unsorted\n\
             @RG\tID:rg0\tSM:sample0\n\
             r0\t4\t*\t0\t0\t*\t*\t0\t0\tACGTAC\t*\n\
             r1\t20\t*\t0\t0\t*\t*\t0\t0\tAACG\t*\n\
             r2\t516\t*\t0\t0\t*\t*\t0\t0\tACGT\t*\n",
        )?;

        let mut reader = Reader::from_path(&path, None)?;
        assert_eq!(reader.sample_name()?, "sample0");

        let records = reader.records().collect::<io::Result<Vec<_>>>()?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].sequence(), b"ACGTAC");
        assert_eq!(records[1].forward_sequence().as_ref(), b"CGTT");
        assert!(records[2].flags().is_qc_fail());

        Ok(())
    }

    #[test]
    fn test_read_bam() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new("alignment")?;
        let path = dir.path().join("reads.bam");

        let header = header()?;
        let mut writer = bam::io::Writer::new(File::create(&path)?);
        writer.write_alignment_header(&header)?;

        for record in records()? {
            writer.write_alignment_record(&header, &record)?;
        }

        writer.finish(&header)?;
        drop(writer);

        let mut reader = Reader::from_path(&path, Some(Path::new("ignored.fa")))?;
        assert_eq!(reader.sample_name()?, "sample0");

        let records = reader.records().collect::<io::Result<Vec<_>>>()?;
        assert_records(&records);

        Ok(())
    }

    #[test]
    fn test_read_cram() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new("alignment")?;
        let (path, reference) = write_cram(dir.path())?;

        let mut reader = Reader::from_path(&path, Some(&reference))?;
        assert_eq!(reader.sample_name()?, "sample0");

        let records = reader.records().collect::<io::Result<Vec<_>>>()?;
        assert_records(&records);

        Ok(())
    }

    #[test]
    fn test_read_cram_indexed_reference() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new("alignment")?;
        let (path, reference) = write_cram(dir.path())?;
        std::fs::write(dir.path().join("reference.fa.fai"), "sq0\t8\t5\t8\t9\n")?;

        let mut reader = Reader::from_path(&path, Some(&reference))?;
        let records = reader.records().collect::<io::Result<Vec<_>>>()?;
        assert_records(&records);

        Ok(())
    }

    #[test]
    fn test_missing_reference_file() {
        let err = Reader::from_path("reads.cram", Some(Path::new("missing.fa"))).unwrap_err();
        assert!(matches!(
            err,
            Error::Io(ref path, _) if path.as_path() == Path::new("missing.fa")
        ));
    }

    #[test]
    fn test_missing_sample_tag() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new("alignment")?;
        let path = dir.path().join("reads.sam");
        std::fs::write(&path, "@HD\tVN:1.6\n@RG\tID:rg0\n")?;

        let reader = Reader::from_path(&path, None)?;
        let err = reader.sample_name().unwrap_err();
        assert!(matches!(err, Error::MissingSampleTag(_)));

        Ok(())
    }
}
