//! Purpose: Define the product repository contract shared by every store backend.
//! Exports: `ProductStore`, `ApiResult`.
//! Role: Seam between screens (CLI, `ProductView`) and local/remote collections.
//! Invariants: Every operation is a full round trip; nothing is cached here.
//! Invariants: Writes take a `ValidatedProduct`, so numbers are always re-checked.
//! Invariants: Deleting a missing id succeeds; updating one is `NotFound`.

use crate::core::draft::ValidatedProduct;
use crate::core::error::Error;
use crate::core::product::Product;

pub type ApiResult<T> = Result<T, Error>;

pub trait ProductStore {
    /// Every product in the collection, in store order.
    fn list_products(&self) -> ApiResult<Vec<Product>>;

    fn get_product(&self, id: &str) -> ApiResult<Product>;

    /// Persists a new product and returns the id the store assigned.
    fn create_product(&self, product: &ValidatedProduct) -> ApiResult<String>;

    /// Replaces the whole document at `id`.
    fn update_product(&self, id: &str, product: &ValidatedProduct) -> ApiResult<()>;

    fn delete_product(&self, id: &str) -> ApiResult<()>;
}

impl<S: ProductStore + ?Sized> ProductStore for Box<S> {
    fn list_products(&self) -> ApiResult<Vec<Product>> {
        (**self).list_products()
    }

    fn get_product(&self, id: &str) -> ApiResult<Product> {
        (**self).get_product(id)
    }

    fn create_product(&self, product: &ValidatedProduct) -> ApiResult<String> {
        (**self).create_product(product)
    }

    fn update_product(&self, id: &str, product: &ValidatedProduct) -> ApiResult<()> {
        (**self).update_product(id, product)
    }

    fn delete_product(&self, id: &str) -> ApiResult<()> {
        (**self).delete_product(id)
    }
}
