//! The product catalog as the dashboard sees it.
//!
//! [`CatalogSynchronizer`] keeps a local list of products loosely in step with
//! the `products` collection of a [`KeyedStore`](crate::database::KeyedStore).
//! The list is read once by [`load`](CatalogSynchronizer::load) and from then
//! on only changes through this console's own writes; edits made elsewhere
//! show up on the next load.
//!
//! # Write ordering
//!
//! Adding a product and saving an edit update the local list only after the
//! store confirms the write. Toggling availability and deleting follow the
//! configured [`WritePolicy`]:
//!
//! * [`WritePolicy::Optimistic`] applies the local change whatever the store
//!   answers. A failed write leaves the two out of step until the next load.
//! * [`WritePolicy::Confirmed`] applies the local change only after the
//!   store confirms it.
//!
//! Store failures are logged and returned; the dashboard typically ignores
//! them, which shows up as a form that did not clear or a dialog that did not
//! close.

pub mod models;
pub mod sync;


pub use self::models::{CatalogStats, Price, ProductDraft, ProductRecord};
pub use self::sync::CatalogSynchronizer;

use crate::database::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid product: {0}")]
    Validation(String),
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
    #[error("No product with id '{0}'")]
    UnknownProduct(String),
    #[error("No product is being edited")]
    NotEditing,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// When toggles and deletes touch the local list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Update the local list immediately, regardless of the store's answer.
    #[default]
    Optimistic,
    /// Update the local list once the store confirms the write.
    Confirmed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub write_policy: WritePolicy,
    /// Keep the persisted numeric price in the local list after an add or
    /// edit instead of the text the form held.
    pub coerce_local_price: bool,
}
