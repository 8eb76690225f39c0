//! HandlerRegistry - Handler の登録と管理
//!
//! Built mutably during start-up, then shared read-only behind an `Arc` by
//! every worker. No locks on the hot path.

use std::collections::HashMap;
use std::sync::Arc;

use super::action::Action;
use super::handler::{DynHandler, Handler, TypedHandler};
use crate::domain::ActionKind;

/// RegistryError は HandlerRegistry の操作エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for kind '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("no handler registered for kind '{0}'")]
    NotRegistered(String),
}

/// kind -> type-erased handler.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionKind, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Action, H: Handler<T> + 'static>(&mut self, handler: H) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    /// Register an untyped handler under its own `kind()`.
    pub fn register_dyn(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let kind = ActionKind::new(handler.kind());
        if self.handlers.contains_key(&kind) {
            return Err(RegistryError::AlreadyRegistered(kind.to_string()));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn get(&self, kind: &ActionKind) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn require(&self, kind: &ActionKind) -> Result<Arc<dyn DynHandler>, RegistryError> {
        self.get(kind)
            .ok_or_else(|| RegistryError::NotRegistered(kind.to_string()))
    }

    pub fn contains(&self, kind: &ActionKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<ActionKind> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
