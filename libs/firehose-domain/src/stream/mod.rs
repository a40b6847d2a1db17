//! Byte stream handling
//!
//! Turns the raw chunks of one session into delimiter-terminated records:
//! [`DecompressingReader`] inflates, [`RecordReassembler`] finds the boundaries.

mod decoder;
mod reassembly;

pub use decoder::DecompressingReader;
pub use reassembly::RecordReassembler;

/// Record delimiter of the feed
pub const DELIMITER: &[u8] = b"\r\n";

/// Position of the first delimiter in `haystack`
pub fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

/// Position of the last delimiter in `haystack`
pub fn rfind_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DELIMITER.len())
        .rposition(|window| window == DELIMITER)
}
