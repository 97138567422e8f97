//! Count and statistics reports.
//!
//! Every tabular report is tab-delimited and written with
//! [`report_writer()`](crate::io::report_writer).

pub mod dual;
pub mod single;

/// Guide level tallies derived from a finalized set of counts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CountSummary {
    /// The number of guides (or library rows).
    pub total: u64,

    /// The number of guides with no reads.
    pub zero: u64,

    /// The number of guides with fewer reads than the low count threshold.
    /// Guides with no reads are included.
    pub low: u64,
}

impl CountSummary {
    /// Adds a single guide's count to the summary.
    ///
    /// # Examples
    ///
    /// ```
    /// use crispr_read_counts::report::CountSummary;
    ///
    /// let mut summary = CountSummary::default();
    ///
    /// for count in [0, 3, 15, 100] {
    ///     summary.observe(count, 15);
    /// }
    ///
    /// assert_eq!(summary.total, 4);
    /// assert_eq!(summary.zero, 1);
    /// assert_eq!(summary.low, 2);
    /// ```
    pub fn observe(&mut self, count: u64, low_threshold: u64) {
        self.total += 1;

        if count == 0 {
            self.zero += 1;
        }

        if count < low_threshold {
            self.low += 1;
        }
    }
}
