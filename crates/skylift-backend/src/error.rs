use std::path::Path;
use thiserror::Error;

/// Failures while moving patch artifacts over the wire or onto disk. Probe
/// misses are deliberately not represented here: an absent endpoint is a
/// discovery outcome, not an error.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("download from {url} produced {actual} bytes, expected {expected}")]
    SizeMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn request(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.into(),
            source,
        }
    }

    pub fn status(url: impl Into<String>, status: reqwest::StatusCode) -> Self {
        Self::Status {
            url: url.into(),
            status,
        }
    }

    pub fn size_mismatch(url: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::SizeMismatch {
            url: url.into(),
            expected,
            actual,
        }
    }

    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

/// Failures while provisioning or driving the external patcher.
#[derive(Error, Debug)]
pub enum PatcherError {
    #[error(transparent)]
    Download(#[from] TransferError),

    #[error("failed to provision patcher during {stage}: {details}")]
    Provision {
        stage: &'static str,
        details: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("patcher exited with code {code}: {output}")]
    Failed { code: i32, output: String },

    #[error("patcher timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl PatcherError {
    pub fn provision(stage: &'static str, details: impl Into<String>) -> Self {
        Self::Provision {
            stage,
            details: details.into(),
        }
    }

    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}
