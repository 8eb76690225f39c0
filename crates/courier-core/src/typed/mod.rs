//! Typed - 型付き Action API
//!
//! Kind strings are bound to payload types at compile time, so a typo in a
//! kind or a handler registered against the wrong payload does not build.
//!
//! # 二層構造
//! - **表層（Typed）**: `Action` trait, `Handler<T>` trait
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod action;
pub mod actions;
pub mod handler;
pub mod registry;

pub use self::action::Action;
pub use self::handler::{ActionContext, DynHandler, Handler, TypedHandler};
pub use self::registry::{HandlerRegistry, RegistryError};
