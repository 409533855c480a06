//! Reconciles cross-chain user application configuration against a declared
//! desired state and applies the resulting changes.

use std::fmt::Display;

use serde::Serializer;

pub mod batch;
pub mod bindings;
pub mod cache;
pub mod cfg;
pub mod chain;
pub mod change;
pub mod error;
pub mod executor;
pub mod gate;
pub mod network;
pub mod params;
pub mod reconcile;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

pub(crate) fn serialize_display<T: Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
