// Core modules: product model, validation, search/aggregation, local storage, errors.
pub mod collection;
pub mod draft;
pub mod error;
pub mod export;
pub mod filter;
pub mod product;
