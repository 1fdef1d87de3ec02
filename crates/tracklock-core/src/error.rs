use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Frame decode errors
    #[error("unknown start marker: 0x{0:04X}")]
    UnknownStart(u16),

    #[error("checksum mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("bad framing: {0}")]
    FramingError(String),

    #[error("truncated payload: {0}")]
    TruncatedPayload(String),

    #[error("array span of {span} bytes is not divisible by entry size {entry}")]
    MalformedArrayLength { span: u8, entry: u8 },

    // Frame encode errors
    #[error("payload variant does not match protocol type {0}")]
    PayloadMismatch(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // Identity errors
    #[error("invalid device identity: {0}")]
    InvalidIdentity(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing configuration key: {0}")]
    MissingConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
