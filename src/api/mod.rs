//! Purpose: Define the public Rust API boundary for talabarteria.
//! Exports: Product model, repository contract, store backends, and the screen view model.
//! Role: Surface used by the CLI, the HTTP server, and tests; hides storage internals.
//! Invariants: Screens talk to stores only through `ProductStore`.
//! Invariants: Collection files are reached through `LocalClient`, never directly.

mod client;
mod remote;
mod store;
mod view;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::draft::{
    DraftRejection, Field, FieldError, FieldProblem, ProductDraft, ValidatedProduct,
    validate_draft,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::filter::{CategoryTotal, PALETTE, aggregate_by_category, filter_products};
pub use crate::core::product::{COLLECTION, Category, DEFAULT_IMAGE_URL, Product, Scalar};
pub use client::LocalClient;
pub use remote::RemoteClient;
pub use store::{ApiResult, ProductStore};
pub use view::ProductView;
