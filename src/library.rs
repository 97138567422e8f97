//! Guide RNA libraries.
//!
//! Two kinds of libraries are supported:
//!
//! - [`single::GuideLibrary`], a delimited table of `id, gene, sequence` rows
//!   used when counting single-guide screens.
//! - [`pair::PairLibrary`], a tab-delimited table with named columns describing
//!   left/right guide pairs used when counting dual-guide screens.

use std::str::FromStr;

pub mod pair;
pub mod single;

pub use pair::PairLibrary;
pub use single::GuideLibrary;

/// An error related to parsing a [`Delimiter`].
#[derive(Debug, Eq, PartialEq)]
pub struct ParseDelimiterError(String);

impl std::fmt::Display for ParseDelimiterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid delimiter: expected \"comma\" or \"tab\", found \"{}\"",
            self.0
        )
    }
}

impl std::error::Error for ParseDelimiterError {}

/// The column delimiter of a single-guide library file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Delimiter {
    /// A comma (`,`).
    #[default]
    Comma,

    /// A tab (`\t`).
    Tab,
}

impl Delimiter {
    /// Gets the byte used to split fields.
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => crate::io::TAB,
        }
    }
}

impl FromStr for Delimiter {
    type Err = ParseDelimiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "," | "comma" => Ok(Self::Comma),
            "\t" | "\\t" | "tab" => Ok(Self::Tab),
            other => Err(ParseDelimiterError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Delimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delimiter::Comma => write!(f, "comma"),
            Delimiter::Tab => write!(f, "tab"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimiter_from_str() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!("comma".parse::<Delimiter>()?, Delimiter::Comma);
        assert_eq!(",".parse::<Delimiter>()?, Delimiter::Comma);
        assert_eq!("tab".parse::<Delimiter>()?, Delimiter::Tab);
        assert_eq!("\t".parse::<Delimiter>()?, Delimiter::Tab);

        let err = ";".parse::<Delimiter>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid delimiter: expected \"comma\" or \"tab\", found \";\""
        );

        Ok(())
    }
}
