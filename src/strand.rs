use std::fmt;

/// Represents the strand of a GFF3 feature.
///
/// # Example
///
/// ```
/// use gff3::strand::Strand;
///
/// let strand = Strand::Forward;
/// assert_eq!(strand, Strand::Forward);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    /// Positive strand (`+`).
    Forward,
    /// Negative strand (`-`).
    Reverse,
    /// Relevant but unknown strand (`?`), e.g. an unstranded feature whose
    /// strandedness is still meaningful to the annotation.
    Unknown,
    /// Strand is not applicable to the feature (`.`).
    NotApplicable,
}

impl Strand {
    /// Parses a single-character strand field.
    ///
    /// Returns `None` when `raw` is not one of `+`, `-`, `.`, `?` — callers
    /// attach the offending field and line number to a `ParserError`.
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "+" => Some(Strand::Forward),
            "-" => Some(Strand::Reverse),
            "?" => Some(Strand::Unknown),
            "." => Some(Strand::NotApplicable),
            _ => None,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => f.write_str("+"),
            Strand::Reverse => f.write_str("-"),
            Strand::Unknown => f.write_str("?"),
            Strand::NotApplicable => f.write_str("."),
        }
    }
}

/// Represents the reading frame offset of a coding feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Frame `0`.
    Zero,
    /// Frame `1`.
    One,
    /// Frame `2`.
    Two,
}

impl Phase {
    /// Parses a single-character phase field.
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "0" => Some(Phase::Zero),
            "1" => Some(Phase::One),
            "2" => Some(Phase::Two),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Zero => f.write_str("0"),
            Phase::One => f.write_str("1"),
            Phase::Two => f.write_str("2"),
        }
    }
}
