//! Read classification and counting.
//!
//! [`single`] counts aligned reads against a single-guide library and
//! [`dual`] classifies paired reads against a library of guide pairs.

pub mod dual;
pub mod single;
