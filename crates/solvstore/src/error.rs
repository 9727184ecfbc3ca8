use thiserror::Error;

/// Errors reported by the pool, repodata and `.solv` I/O layers.
///
/// Malformed input and corrupt-state conditions are fatal for the read that
/// produced them; the owning repodata is poisoned so later lookups
/// short-circuit to "not found".
#[derive(Debug, Error)]
pub enum SolvError {
    /// Underlying read/seek/write failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The input does not start with the `SOLV` magic.
    #[error("not a .solv file (bad magic)")]
    BadMagic,

    /// The input has a version this reader does not understand.
    #[error("unsupported .solv version {0}")]
    UnsupportedVersion(u32),

    /// A section ended before its announced length.
    #[error("unexpected end of data in {0}")]
    Truncated(&'static str),

    /// Structurally invalid data: schema referencing an unknown key, id
    /// referencing an unknown string, inconsistent counts.
    #[error("corrupt .solv data: {0}")]
    Corrupt(&'static str),

    /// An id on the wire exceeds the declared table sizes.
    #[error("id out of range in {0}")]
    IdOutOfRange(&'static str),

    /// A varint kept its continuation bit set past the maximum width.
    #[error("overlong varint")]
    VarintOverflow,

    /// Userdata blobs are limited to 64 KiB on the wire.
    #[error("userdata too large: {0} bytes")]
    UserdataTooLarge(usize),

    /// A key filter callback returned a storage class the writer cannot emit.
    #[error("key filter returned an unsupported storage class")]
    InvalidKeyStorage,

    /// The vertical section announced a page size other than the one the
    /// page store is built for.
    #[error("unsupported page size {0}")]
    UnsupportedPageSize(u32),

    /// A page failed to decompress to a full page (and was not the last).
    #[error("short page {0} in vertical data")]
    ShortPage(usize),

    /// Operation on a repodata that a previous error left unusable.
    #[error("repodata is in error state")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, SolvError>;
