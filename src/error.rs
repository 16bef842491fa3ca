use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("unknown master '{0}'")]
    UnknownMaster(String),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("pool is closed")]
    PoolClosed,

    /// A sentinel reported a new master but no pool could be built for it
    #[error("failed to build pool for master at {addr}: {source}")]
    PoolBuild {
        addr: String,
        #[source]
        source: Box<Error>,
    },

    /// Error reply sent by the server, e.g. `-ERR No such master with that name`
    #[error("{0}")]
    Reply(String),

    #[error("ERR Protocol error: {0}")]
    Protocol(String),

    #[error("timed out waiting for reply")]
    Timeout,

    #[error("exhausted all {0} known sentinels")]
    SentinelsExhausted(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn dial(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Dial {
            addr: addr.into(),
            source,
        }
    }

    pub fn pool_build(addr: impl Into<String>, source: Error) -> Self {
        Self::PoolBuild {
            addr: addr.into(),
            source: Box::new(source),
        }
    }

    /// Whether the error means the link itself is unusable (as opposed to the
    /// server rejecting a single command).
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Dial { .. } | Self::Io(_) | Self::Timeout | Self::Protocol(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
