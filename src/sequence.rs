//! Nucleotide sequence utilities.

/// Gets the Watson-Crick complement of a single nucleotide.
///
/// Case is preserved. Anything that is not one of `A`, `C`, `G`, or `T` (in
/// either case) is returned unchanged.
fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        other => other,
    }
}

/// Reverse complements a sequence of nucleotides.
///
/// Ambiguity codes (such as `N`) and any other non-nucleotide characters are
/// passed through unchanged rather than treated as an error.
///
/// # Examples
///
/// ```
/// use crispr_read_counts::sequence::reverse_complement;
///
/// assert_eq!(reverse_complement("AACGTN"), "NACGTT");
/// assert_eq!(reverse_complement("acgT"), "Acgt");
/// ```
pub fn reverse_complement(sequence: &str) -> String {
    sequence
        .chars()
        .rev()
        .map(|c| match c.is_ascii() {
            true => complement(c as u8) as char,
            false => c,
        })
        .collect()
}

/// Reverse complements a byte sequence of nucleotides.
///
/// See [`reverse_complement()`] for the treatment of non-nucleotide bytes.
pub fn reverse_complement_bytes(sequence: &[u8]) -> Vec<u8> {
    sequence.iter().rev().map(|&b| complement(b)).collect()
}

/// Returns whether a sequence is non-empty and consists only of `A`, `C`,
/// `G`, and `T` (case-insensitive).
///
/// # Examples
///
/// ```
/// use crispr_read_counts::sequence::is_valid_dna;
///
/// assert!(is_valid_dna("ACGTacgt"));
/// assert!(!is_valid_dna("ACGN"));
/// assert!(!is_valid_dna(""));
/// ```
pub fn is_valid_dna(sequence: &str) -> bool {
    !sequence.is_empty()
        && sequence
            .bytes()
            .all(|b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement("ACGT"), "ACGT");
        assert_eq!(reverse_complement("AAAC"), "GTTT");
        assert_eq!(reverse_complement("aaac"), "gttt");
        assert_eq!(reverse_complement(""), "");
    }

    #[test]
    fn test_reverse_complement_passes_through_ambiguity_codes() {
        assert_eq!(reverse_complement("ANRC"), "GRNT");
        assert_eq!(reverse_complement("A-C"), "G-T");
    }

    #[test]
    fn test_reverse_complement_is_an_involution() {
        for s in ["ACGTTGCA", "aCgTTgcA", "GGGGGGGGGGAAAAATTTTC", "t"] {
            assert_eq!(reverse_complement(&reverse_complement(s)), s);
        }
    }

    #[test]
    fn test_reverse_complement_bytes() {
        assert_eq!(reverse_complement_bytes(b"GATTACA"), b"TGTAATC");
    }

    #[test]
    fn test_is_valid_dna() {
        assert!(is_valid_dna("ACGT"));
        assert!(is_valid_dna("acgt"));
        assert!(!is_valid_dna(""));
        assert!(!is_valid_dna("ACGU"));
        assert!(!is_valid_dna("ACG T"));
    }
}
