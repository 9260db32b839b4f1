use thiserror::Error;

/// Failures that stop the driver loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DynarecError {
    #[error("unsupported memory access kind {kind} at pc {pc:#010x}")]
    UnsupportedAccess { kind: u32, pc: u32 },

    #[error("dispatch address {0:#010x} cannot be translated")]
    Untranslatable(u32),

    #[error("translation failed at {addr:#010x}")]
    Translate {
        addr: u32,
        #[source]
        source: TranslateError,
    },

    #[error("compiled function for {0:#010x} has no entry point there")]
    NoEntry(u32),

    #[error("code cache exhausted: {needed} bytes requested")]
    CodeCacheFull { needed: usize },
}

/// Failures reported by a translator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("no guest code backs {0:#010x}")]
    NoCode(u32),

    #[error("instruction fetch failed at {0:#010x}")]
    Fetch(u32),
}
