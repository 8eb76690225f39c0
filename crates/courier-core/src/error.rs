use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{ActionKind, JobId};
use crate::ports::StoreError;
use crate::typed::RegistryError;

/// Errors surfaced by the `Engine` API.
///
/// Handler failures never show up here: they are recorded on the job and in
/// the audit log instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("payload encode: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no dead-letter record for {0}")]
    DeadLetterNotFound(JobId),

    #[error("engine already started")]
    AlreadyStarted,

    #[error("no handler registered for kind '{0}'")]
    UnknownKind(ActionKind),
}
