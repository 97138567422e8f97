//! `crispr-read-counts` is a crate for counting sequencing reads that map to
//! CRISPR guide RNA (sgRNA) sequences.
//!
//! Two experimental designs are supported:
//!
//! - **Single-guide screens**, where reads have been aligned to a reference
//!   genome and stored as SAM, BAM, or CRAM. A fixed-length window of each
//!   read is looked up in a [`GuideLibrary`](library::GuideLibrary) and the
//!   matching guides are counted.
//! - **Dual-guide screens**, where paired raw reads (FASTQ) are matched
//!   directly against a [`PairLibrary`](library::PairLibrary) of left/right
//!   guide pairs. Every read pair is classified into exactly one outcome and
//!   correctly paired guides are counted.
//!
//! In both cases, matching is an exact lookup at a fixed offset: no alignment
//! takes place.
//!
//! ## Single-guide screens
//!
//! A [`Matcher`](count::single::Matcher) is built once from a library and a
//! [`Config`](count::single::Config) (how many bases to trim and whether to
//! match reverse complemented guides against the end of the read). Records are
//! then streamed through [`count_records()`](count::single::count_records),
//! and the resulting [`GuideCounts`](count::single::GuideCounts) are written
//! with [`report::single`].
//!
//! ```
//! use crispr_read_counts::alignment::Record;
//! use crispr_read_counts::count::single::Config;
//! use crispr_read_counts::count::single::Matcher;
//! use crispr_read_counts::count::single::count_records;
//! use crispr_read_counts::library::Delimiter;
//! use crispr_read_counts::library::GuideLibrary;
//! use crispr_read_counts::report;
//! use noodles::sam::alignment::record::Flags;
//!
//! let data = b"ID1,GeneA,ACGTACGTAC\n";
//! let library = GuideLibrary::read_from(&data[..], Delimiter::Comma)?;
//! let matcher = Matcher::new(&library, Config::default());
//!
//! let records = vec![Ok(Record::new(Flags::empty(), b"ACGTACGTAC".to_vec()))];
//! let counts = count_records(&matcher, records)?;
//!
//! let mut output = Vec::new();
//! report::single::write_counts(&mut output, &counts, "sample", None)?;
//! assert_eq!(
//!     String::from_utf8(output)?,
//!     "sgRNA\tgene\tsample.sample\nID1\tGeneA\t1\n"
//! );
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Dual-guide screens
//!
//! Read pairs are read in lockstep with a
//! [`PairedReader`](fastq::PairedReader), classified with
//! [`classify()`](count::dual::classify) and tallied by
//! [`count_pairs()`](count::dual::count_pairs), which also writes one line per
//! classified read pair. The per-row counts and statistics are written with
//! [`report::dual`].
//!
//! ```
//! use crispr_read_counts::count::dual::count_pairs;
//! use crispr_read_counts::fastq::PairedReader;
//! use crispr_read_counts::library::PairLibrary;
//!
//! let data = b"sgrna_left_id\tsgrna_left_seq\tsgrna_right_id\tsgrna_right_seq\tunique_id\tgene_pair_id\ttarget_id\n\
//!              L1\tAAAC\tR1\tGGGA\tU1\tG1\tT1\n";
//! let library = PairLibrary::read_from(&data[..])?;
//!
//! let mate1 = b"@r1/1\nGGGA\n+\nIIII\n";
//! let mate2 = b"@r1/2\nGTTT\n+\nIIII\n";
//! let reader = PairedReader::new(&mate1[..], &mate2[..]);
//!
//! let mut classified = Vec::new();
//! let counts = count_pairs(&library, reader, "sample", &mut classified)?;
//!
//! assert_eq!(counts.count(&library.rows()[0]), 1);
//! assert_eq!(counts.stats().grna1_grna2, 1);
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Merging
//!
//! Single-guide count reports of the same sample can be summed with a
//! [`Merger`](merge::Merger).

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod alignment;
pub mod count;
pub mod fastq;
pub mod io;
pub mod library;
pub mod merge;
pub mod plasmid;
pub mod report;
pub mod sequence;
