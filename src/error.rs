use thiserror::Error;

/// Fatal conditions a run can hit. None of these are recoverable at the
/// point of detection; the operator re-runs with corrected input or a
/// larger table capacity.
#[derive(Debug, Error)]
pub enum Error {
    /// A record has no `;` between its start and the end of its range.
    #[error("no ';' delimiter in record starting at byte {offset}")]
    MissingDelimiter { offset: usize },

    /// A byte that the measurement grammar does not allow.
    #[error("malformed measurement at byte {offset}: unexpected byte {byte:#04x}")]
    Malformed { offset: usize, byte: u8 },

    /// A record (including the final record of the file) ran out of bytes
    /// before its closing newline.
    #[error("record not terminated by a newline at byte {offset}")]
    MissingTerminator { offset: usize },

    /// The probe budget was exhausted: more distinct names than the table
    /// can hold at its configured capacity.
    #[error("aggregate table full at capacity {capacity}; re-run with a larger --table-capacity")]
    TableFull { capacity: usize },

    #[error("table capacity {capacity} is not a nonzero power of two")]
    BadCapacity { capacity: usize },

    /// A distinct name is not valid UTF-8. Detected before any output is
    /// written, so a failed run never prints a partial report.
    #[error("station name {name:?} is not valid UTF-8")]
    InvalidName { name: String },

    #[error("couldn't write report: {0}")]
    Io(#[from] std::io::Error),
}
