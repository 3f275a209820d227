//! # Tidepool Error Types

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tidepool_pool::PoolError;
use tidepool_tick::TickError;

/// Errors raised while loading a pool manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest {}: {source}", .path.display())]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// The manifest is not valid TOML or does not match the schema.
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    /// A pool entry names a template the host does not know.
    #[error("pool `{pool}` names unknown template `{template}`")]
    UnknownTemplate {
        /// Pool entry.
        pool: String,
        /// Template key.
        template: String,
    },

    /// A pool entry names a parent the host does not know.
    #[error("pool `{pool}` names unknown parent `{parent}`")]
    UnknownParent {
        /// Pool entry.
        pool: String,
        /// Parent key.
        parent: String,
    },
}

/// Any failure surfaced by the coordinator.
#[derive(Error, Debug)]
pub enum TidepoolError {
    /// Pool engine failure.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Dispatcher failure.
    #[error(transparent)]
    Tick(#[from] TickError),

    /// Manifest failure.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Result type for coordinator operations.
pub type TidepoolResult<T> = Result<T, TidepoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tidepool_tick::PhaseKind;

    #[test]
    fn test_manifest_error_messages() {
        let err = ManifestError::UnknownTemplate {
            pool: "bullets".into(),
            template: "prefabs/bullet".into(),
        };
        assert_eq!(
            err.to_string(),
            "pool `bullets` names unknown template `prefabs/bullet`"
        );

        let err = ManifestError::Io {
            path: PathBuf::from("pools.toml"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().starts_with("failed to read manifest pools.toml"));
    }

    #[test]
    fn test_wrapped_errors_are_transparent() {
        let tick = TickError::DispatcherNotInitialized {
            phase: PhaseKind::LateUpdate,
        };
        let err = TidepoolError::from(tick);
        assert_eq!(err.to_string(), tick.to_string());
        assert!(matches!(err, TidepoolError::Tick(_)));
    }
}
