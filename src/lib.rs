//! Purpose: Shared library crate used by the `talabarteria` CLI, server, and tests.
//! Exports: `api` (stores, view model), `core` (products, validation, collections, errors).
//! Role: Inventory logic for the workshop catalog; binaries stay thin over it.
//! Invariants: Storage and transport details stay behind `api::ProductStore`.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod data_paths;
pub mod notice;
