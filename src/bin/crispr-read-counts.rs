//! Counts reads mapping to CRISPR guide RNAs.
//!
//! ```shell
//! cargo run --release --features=binaries -- count-single \
//!     --input sample.cram --ref genome.fa --library library.csv --output counts.tsv
//! ```
//!
//! Three subcommands are provided:
//!
//! * `count-single` counts aligned reads (SAM/BAM/CRAM) of a single-guide
//!   screen.
//! * `count-dual` classifies and counts paired FASTQ reads of a dual-guide
//!   screen.
//! * `merge-single` sums several single-guide count reports of one sample.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use clap::Subcommand;
use clap_verbosity_flag::InfoLevel;
use clap_verbosity_flag::Verbosity;
use crispr_read_counts::alignment;
use crispr_read_counts::count::dual::count_pairs;
use crispr_read_counts::count::single::Config;
use crispr_read_counts::count::single::Matcher;
use crispr_read_counts::count::single::count_records;
use crispr_read_counts::fastq::PairedReader;
use crispr_read_counts::io::open as open_input;
use crispr_read_counts::library::Delimiter;
use crispr_read_counts::library::GuideLibrary;
use crispr_read_counts::library::PairLibrary;
use crispr_read_counts::merge::Merger;
use crispr_read_counts::plasmid::PlasmidCounts;
use crispr_read_counts::report;
use crispr_read_counts::report::single::Statistics;
use tracing::info;
use tracing_log::AsTrace as _;
use tracing_subscriber::EnvFilter;

////////////////////////////////////////////////////////////////////////////////////////
// File access checks
////////////////////////////////////////////////////////////////////////////////////////

/// Ensures that a path is an existing, readable file.
fn check_readable(path: &Path, kind: &str) -> Result<()> {
    if !path.is_file() || File::open(path).is_err() {
        bail!(
            "provided {kind} file does not exist or cannot be read: {}",
            path.display()
        );
    }

    Ok(())
}

/// Ensures that a path can be written to as a file: either an existing,
/// writable file or a new file in a writable directory.
fn check_writable(path: &Path, kind: &str) -> Result<()> {
    let writable = if path.exists() {
        path.is_file() && OpenOptions::new().append(true).open(path).is_ok()
    } else {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        parent
            .metadata()
            .is_ok_and(|metadata| metadata.is_dir() && !metadata.permissions().readonly())
    };

    if !writable {
        bail!(
            "cannot write to provided {kind} file: {}",
            path.display()
        );
    }

    Ok(())
}

/// Creates an output file for buffered writing.
fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .with_context(|| format!("creating {}", path.display()))
}

////////////////////////////////////////////////////////////////////////////////////////
// Single-guide counting
////////////////////////////////////////////////////////////////////////////////////////

/// Counts aligned reads of a single-guide screen.
#[derive(clap::Args)]
struct CountSingleArgs {
    /// The input SAM, BAM, or CRAM file.
    #[arg(short, long, visible_alias = "dir")]
    input: PathBuf,

    /// The guide library file (`id, gene, sequence` rows).
    #[arg(short, long)]
    library: PathBuf,

    /// The delimiter of the guide library file (`comma` or `tab`).
    #[arg(short, long, default_value_t = Delimiter::Comma)]
    delimiter: Delimiter,

    /// The output count file.
    #[arg(short, long)]
    output: PathBuf,

    /// The genome reference FASTA file (required for CRAM input).
    #[arg(short, long = "ref")]
    reference: Option<PathBuf>,

    /// A plasmid count file to report next to the sample counts.
    #[arg(short, long)]
    plasmid: Option<PathBuf>,

    /// The number of bases to skip before the guide sequence.
    #[arg(short, long, default_value_t = 0)]
    trim: usize,

    /// Compare reverse complemented guides against the end of each read
    /// (trimming from the end of the read).
    #[arg(long, visible_alias = "rc", default_value_t = false)]
    reverse_complement: bool,

    /// The output statistics file (JSON).
    #[arg(short, long)]
    stats: Option<PathBuf>,
}

/// Runs the `count-single` subcommand.
fn count_single(args: CountSingleArgs) -> Result<()> {
    check_readable(&args.library, "library")?;
    check_readable(&args.input, "input")?;

    if let Some(reference) = &args.reference {
        check_readable(reference, "reference")?;
    }

    if let Some(plasmid) = &args.plasmid {
        check_readable(plasmid, "plasmid count")?;
    }

    check_writable(&args.output, "output count")?;

    if let Some(stats) = &args.stats {
        check_writable(stats, "output stats")?;
    }

    let library = open_input(&args.library)
        .map_err(anyhow::Error::from)
        .and_then(|reader| Ok(GuideLibrary::read_from(reader, args.delimiter)?))
        .with_context(|| format!("reading library {}", args.library.display()))?;
    info!("read {} guides from the library", library.len());

    let plasmid = args
        .plasmid
        .as_deref()
        .map(|path| {
            open_input(path)
                .map_err(anyhow::Error::from)
                .and_then(|reader| Ok(PlasmidCounts::read_from(reader)?))
                .with_context(|| format!("reading plasmid counts {}", path.display()))
        })
        .transpose()?;

    let mut reader = alignment::Reader::from_path(&args.input, args.reference.as_deref())?;
    let sample = reader.sample_name()?;
    info!("counting reads of sample {sample}");

    let matcher = Matcher::new(&library, Config::new(args.trim, args.reverse_complement));
    let counts = count_records(&matcher, reader.records())
        .with_context(|| format!("counting reads in {}", args.input.display()))?;

    let summary =
        report::single::write_counts(create(&args.output)?, &counts, &sample, plasmid.as_ref())
            .with_context(|| format!("writing counts to {}", args.output.display()))?;

    if let Some(stats) = &args.stats {
        report::single::write_stats(create(stats)?, &Statistics::new(counts.stats(), summary))
            .with_context(|| format!("writing stats to {}", stats.display()))?;
    }

    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////
// Dual-guide counting
////////////////////////////////////////////////////////////////////////////////////////

/// Classifies and counts paired reads of a dual-guide screen.
#[derive(clap::Args)]
struct CountDualArgs {
    /// The guide pair library file (tab-delimited, with a header).
    #[arg(short, long)]
    library: PathBuf,

    /// The mate 1 FASTQ file.
    #[arg(long, visible_alias = "f1")]
    fastq1: PathBuf,

    /// The mate 2 FASTQ file.
    #[arg(long, visible_alias = "f2")]
    fastq2: PathBuf,

    /// The sample name.
    #[arg(short = 'n', long)]
    sample: String,

    /// The output classified reads file.
    #[arg(short, long)]
    reads: PathBuf,

    /// The output statistics file.
    #[arg(short, long)]
    stats: PathBuf,

    /// The output count file.
    #[arg(short, long)]
    counts: PathBuf,
}

/// Runs the `count-dual` subcommand.
fn count_dual(args: CountDualArgs) -> Result<()> {
    check_readable(&args.library, "library")?;
    check_readable(&args.fastq1, "FASTQ")?;
    check_readable(&args.fastq2, "FASTQ")?;
    check_writable(&args.reads, "classified reads")?;
    check_writable(&args.counts, "counts")?;
    check_writable(&args.stats, "stats")?;

    let library = open_input(&args.library)
        .map_err(anyhow::Error::from)
        .and_then(|reader| Ok(PairLibrary::read_from(reader)?))
        .with_context(|| format!("reading library {}", args.library.display()))?;
    info!(
        "read {} library rows ({} distinct guide pairs)",
        library.len(),
        library.num_pairs()
    );

    let reader = PairedReader::new(open_input(&args.fastq1)?, open_input(&args.fastq2)?);
    let counts = count_pairs(&library, reader, &args.sample, create(&args.reads)?)
        .with_context(|| {
            format!(
                "classifying reads in {} and {}",
                args.fastq1.display(),
                args.fastq2.display()
            )
        })?;

    let summary = report::dual::write_counts(create(&args.counts)?, &counts, &args.sample)
        .with_context(|| format!("writing counts to {}", args.counts.display()))?;

    report::dual::write_stats(
        create(&args.stats)?,
        &args.sample,
        &counts.stats(),
        &summary,
    )
    .with_context(|| format!("writing stats to {}", args.stats.display()))?;

    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////
// Merging
////////////////////////////////////////////////////////////////////////////////////////

/// Sums single-guide count reports of one sample.
#[derive(clap::Args)]
struct MergeSingleArgs {
    /// A comma-separated list of count files (plain or gzipped).
    #[arg(short, long, required = true, value_delimiter = ',')]
    input: Vec<PathBuf>,

    /// The output count file.
    #[arg(short, long)]
    output: PathBuf,

    /// Whether the count files have a plasmid count column.
    #[arg(short, long, default_value_t = false)]
    plasmid: bool,
}

/// Runs the `merge-single` subcommand.
fn merge_single(args: MergeSingleArgs) -> Result<()> {
    for path in &args.input {
        check_readable(path, "count")?;
    }

    check_writable(&args.output, "output")?;

    let mut merger = Merger::new(args.plasmid);

    for path in &args.input {
        merger
            .add_path(path)
            .with_context(|| format!("merging {}", path.display()))?;
    }

    merger
        .write_to(create(&args.output)?)
        .with_context(|| format!("writing merged counts to {}", args.output.display()))?;

    info!(
        "merged {} guides from {} files",
        merger.len(),
        args.input.len()
    );

    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////
// Main
////////////////////////////////////////////////////////////////////////////////////////

/// The subcommands.
#[derive(Subcommand)]
enum Command {
    /// Count aligned reads of a single-guide screen.
    CountSingle(CountSingleArgs),

    /// Classify and count paired reads of a dual-guide screen.
    CountDual(CountDualArgs),

    /// Merge single-guide count files of one sample.
    MergeSingle(MergeSingleArgs),
}

/// Counts reads mapping to CRISPR guide RNAs.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// The subcommand.
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(EnvFilter::from_default_env())
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(args.verbose.log_level_filter().as_trace())
            .init(),
    };

    match args.command {
        Command::CountSingle(args) => count_single(args),
        Command::CountDual(args) => count_dual(args),
        Command::MergeSingle(args) => merge_single(args),
    }?;

    info!("done");

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_merge_inputs() {
        let args = Args::parse_from([
            "crispr-read-counts",
            "merge-single",
            "-i",
            "a.tsv,b.tsv.gz",
            "-o",
            "out.tsv",
            "--plasmid",
        ]);

        match args.command {
            Command::MergeSingle(args) => {
                assert_eq!(
                    args.input,
                    vec![PathBuf::from("a.tsv"), PathBuf::from("b.tsv.gz")]
                );
                assert!(args.plasmid);
            }
            _ => panic!("expected the merge-single subcommand"),
        }
    }

    #[test]
    fn file_access_checks() -> Result<()> {
        let dir = TempDir::new("checks")?;
        let existing = dir.path().join("existing.txt");
        std::fs::write(&existing, "data")?;

        assert!(check_readable(&existing, "input").is_ok());
        assert!(check_readable(&dir.path().join("missing.txt"), "input").is_err());
        assert!(check_readable(dir.path(), "input").is_err());

        assert!(check_writable(&existing, "output").is_ok());
        assert!(check_writable(&dir.path().join("new.txt"), "output").is_ok());
        assert!(check_writable(dir.path(), "output").is_err());
        assert!(check_writable(&dir.path().join("missing/new.txt"), "output").is_err());

        Ok(())
    }
}
