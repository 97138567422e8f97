//! Opening text inputs and building readers and writers of delimited tables.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::io::{self};
use std::path::Path;

use flate2::read::MultiGzDecoder;

/// The delimiter of every tab-delimited table.
pub const TAB: u8 = b'\t';

/// The file extension that marks a gzip-compressed input.
const GZIP_EXTENSION: &str = "gz";

/// Opens a plain text or gzip-compressed file for buffered reading.
///
/// Files ending in `.gz` are transparently decompressed (including
/// multi-member files such as those produced by `bgzip`).
pub fn open(path: impl AsRef<Path>) -> io::Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path)?;

    match path.extension().is_some_and(|ext| ext == GZIP_EXTENSION) {
        true => Ok(Box::new(BufReader::new(MultiGzDecoder::new(file)))),
        false => Ok(Box::new(BufReader::new(file))),
    }
}

/// Builds a reader of delimited rows.
///
/// Fields are trimmed and quotes are read literally. Rows may have any
/// number of fields and blank lines are skipped.
///
/// # Examples
///
/// ```
/// use crispr_read_counts::io::TAB;
/// use crispr_read_counts::io::delimited_reader;
/// use crispr_read_counts::io::line_number;
///
/// let data = b"a\t\"b\" \nc\n\n";
/// let mut reader = delimited_reader(&data[..], TAB);
/// let records = reader.records().collect::<Result<Vec<_>, _>>()?;
///
/// assert_eq!(records.len(), 2);
/// assert_eq!(&records[0][1], "\"b\"");
/// assert_eq!(line_number(&records[1]), 2);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn delimited_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Builds a writer of tab-delimited reports. Fields are never quoted.
pub fn report_writer<W>(writer: W) -> csv::Writer<W>
where
    W: Write,
{
    csv::WriterBuilder::new()
        .delimiter(TAB)
        .flexible(true)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(writer)
}

/// Gets the (1-based) line number on which a delimited row starts.
pub fn line_number(record: &csv::StringRecord) -> usize {
    record
        .position()
        .map(|position| position.line() as usize)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_report_writer() -> Result<(), Box<dyn std::error::Error>> {
        let mut buffer = Vec::new();

        {
            let mut writer = report_writer(&mut buffer);
            writer.write_record(["a", "b c", "\"d\""])?;
            writer.write_record(["1", "2"])?;
            writer.flush()?;
        }

        assert_eq!(String::from_utf8(buffer)?, "a\tb c\t\"d\"\n1\t2\n");
        Ok(())
    }

    #[test]
    fn test_open_plain_and_gzipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new("io")?;

        let plain = dir.path().join("counts.txt");
        std::fs::write(&plain, "a\tb\n")?;

        let gzipped = dir.path().join("counts.txt.gz");
        let mut encoder = GzEncoder::new(File::create(&gzipped)?, Compression::default());
        encoder.write_all(b"a\tb\n")?;
        encoder.finish()?;

        for path in [plain, gzipped] {
            let mut buffer = String::new();
            open(&path)?.read_to_string(&mut buffer)?;
            assert_eq!(buffer, "a\tb\n");
        }

        Ok(())
    }
}
