//! Purpose: Product repository backed by a local collection file.
//! Exports: `LocalClient`.
//! Role: Default store for the CLI and the storage engine behind `serve`.
//! Invariants: Data directory resolution matches `data_paths::default_data_dir`.
//! Invariants: Every call re-reads the collection file; there is no cache.
#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use super::store::{ApiResult, ProductStore};
use crate::core::collection::Collection;
use crate::core::draft::ValidatedProduct;
use crate::core::error::ErrorKind;
use crate::core::product::{COLLECTION, Product};
use crate::data_paths::default_data_dir;

#[derive(Clone, Debug)]
pub struct LocalClient {
    data_dir: PathBuf,
    collection: String,
}

impl LocalClient {
    pub fn new() -> Self {
        Self {
            data_dir: default_data_dir(),
            collection: COLLECTION.to_string(),
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn collection(&self) -> ApiResult<Collection> {
        Collection::open(&self.data_dir, &self.collection)
    }
}

impl Default for LocalClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductStore for LocalClient {
    fn list_products(&self) -> ApiResult<Vec<Product>> {
        let documents = self.collection()?.list()?;
        tracing::debug!(count = documents.len(), "listed local products");
        Ok(documents
            .iter()
            .map(|document| Product::from_document(&document.id, &document.data))
            .collect())
    }

    fn get_product(&self, id: &str) -> ApiResult<Product> {
        let document = self.collection()?.get(id)?;
        Ok(Product::from_document(document.id, &document.data))
    }

    fn create_product(&self, product: &ValidatedProduct) -> ApiResult<String> {
        let id = self.collection()?.insert(product.to_document())?;
        tracing::debug!(%id, "created local product");
        Ok(id)
    }

    fn update_product(&self, id: &str, product: &ValidatedProduct) -> ApiResult<()> {
        self.collection()?
            .replace(id, product.to_document())
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    err.with_message("product not found")
                } else {
                    err
                }
            })?;
        tracing::debug!(%id, "updated local product");
        Ok(())
    }

    fn delete_product(&self, id: &str) -> ApiResult<()> {
        let removed = self.collection()?.remove(id)?;
        tracing::debug!(%id, removed, "deleted local product");
        Ok(())
    }
}
