use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the driver can report back to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// A line parameter or scheduling bound outside its allowed set.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An order-dependent call made before `open()` or after `close()`.
    #[error("method called out of order: {0}")]
    MethodOrder(&'static str),

    #[error("command already registered: {0}")]
    DuplicateCommand(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Names end up on the wire verbatim, so delimiter bytes are rejected.
    #[error("invalid command name {0:?}")]
    InvalidCommandName(String),

    #[error("connection already open")]
    AlreadyOpen,

    #[error("connection error on {port}: {reason}")]
    Connection { port: String, reason: String },

    #[error("inbound frame exceeded {limit} bytes without a terminator")]
    FrameOverflow { limit: usize },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn connection(port: &str, reason: impl ToString) -> Self {
        Error::Connection {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }
}
