//! Purpose: Screen-level state for the product list: snapshot, query, visible rows.
//! Exports: `ProductView`.
//! Role: Drives the CLI commands and any UI over a `ProductStore`.
//! Invariants: `visible` changes only through `recalculate`, never implicitly.
//! Invariants: A failed write leaves the snapshot as it was before the call,
//! except that an update rejected as `NotFound` drops the stale entry.
//! Invariants: Background refreshes never resurrect a dropped view.
#![allow(clippy::result_large_err)]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use super::store::{ApiResult, ProductStore};
use crate::core::draft::{ProductDraft, validate_draft};
use crate::core::error::{Error, ErrorKind};
use crate::core::filter::{CategoryTotal, aggregate_by_category, filter_products};
use crate::core::product::Product;

#[derive(Debug, Default)]
struct ViewState {
    products: Vec<Product>,
    query: String,
    visible: Vec<Product>,
}

impl ViewState {
    fn position(&self, id: &str) -> Option<usize> {
        self.products.iter().position(|product| product.id == id)
    }
}

pub struct ProductView<S> {
    store: Arc<S>,
    state: Arc<Mutex<ViewState>>,
}

impl<S: ProductStore> ProductView<S> {
    pub fn new(store: S) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    pub fn with_shared_store(store: Arc<S>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(ViewState::default())),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replaces the snapshot with a fresh listing. On error the previous
    /// snapshot stays in place.
    pub fn refresh(&self) -> ApiResult<usize> {
        let products = self.store.list_products()?;
        let count = products.len();
        self.lock().products = products;
        tracing::debug!(count, "refreshed product snapshot");
        Ok(count)
    }

    pub fn set_query(&self, query: impl Into<String>) {
        self.lock().query = query.into();
    }

    /// Recomputes `visible` from the current snapshot and query.
    pub fn recalculate(&self) {
        let mut state = self.lock();
        state.visible = filter_products(&state.products, &state.query);
    }

    pub fn query(&self) -> String {
        self.lock().query.clone()
    }

    pub fn products(&self) -> Vec<Product> {
        self.lock().products.clone()
    }

    pub fn visible(&self) -> Vec<Product> {
        self.lock().visible.clone()
    }

    pub fn categories(&self) -> Vec<CategoryTotal> {
        aggregate_by_category(&self.lock().products)
    }

    pub fn create(&self, draft: &ProductDraft, require_image: bool) -> ApiResult<String> {
        let validated = validate_draft(draft, require_image).map_err(Error::from)?;
        let id = self.store.create_product(&validated)?;
        self.lock()
            .products
            .push(Product::from_validated(id.clone(), &validated));
        Ok(id)
    }

    pub fn update(&self, id: &str, draft: &ProductDraft) -> ApiResult<()> {
        let validated = validate_draft(draft, false).map_err(Error::from)?;
        let previous = {
            let mut state = self.lock();
            match state.position(id) {
                Some(index) => {
                    let next = Product::from_validated(id, &validated);
                    Some((index, std::mem::replace(&mut state.products[index], next)))
                }
                None => None,
            }
        };

        let result = self.store.update_product(id, &validated);
        if let Err(err) = &result {
            let mut state = self.lock();
            match err.kind() {
                ErrorKind::NotFound => {
                    state.products.retain(|product| product.id != id);
                    tracing::debug!(%id, "dropped stale product after update");
                }
                _ => {
                    if let Some((index, product)) = previous {
                        if index < state.products.len() && state.products[index].id == id {
                            state.products[index] = product;
                        }
                    }
                    tracing::warn!(%id, kind = ?err.kind(), "reverted local update");
                }
            }
        }
        result
    }

    pub fn delete(&self, id: &str) -> ApiResult<()> {
        let removed = {
            let mut state = self.lock();
            state
                .position(id)
                .map(|index| (index, state.products.remove(index)))
        };

        let result = self.store.delete_product(id);
        if result.is_err() {
            if let Some((index, product)) = removed {
                let mut state = self.lock();
                let index = index.min(state.products.len());
                state.products.insert(index, product);
                tracing::warn!(%id, "restored product after failed delete");
            }
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: ProductStore + Send + Sync + 'static> ProductView<S> {
    /// Lists products on a background thread. The thread only holds a weak
    /// handle to the view state; if the view is gone when the listing
    /// arrives, the result is discarded. The handle yields whether the
    /// snapshot was replaced.
    pub fn spawn_refresh(&self) -> JoinHandle<bool> {
        let store = Arc::clone(&self.store);
        let state: Weak<Mutex<ViewState>> = Arc::downgrade(&self.state);
        thread::spawn(move || {
            let products = match store.list_products() {
                Ok(products) => products,
                Err(err) => {
                    tracing::warn!(error = %err, "background refresh failed");
                    return false;
                }
            };
            let Some(state) = state.upgrade() else {
                tracing::debug!("view dropped before refresh completed");
                return false;
            };
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .products = products;
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier, Mutex};

    use super::ProductView;
    use crate::api::{ApiResult, ProductStore};
    use crate::core::draft::{ProductDraft, ValidatedProduct};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::product::Product;

    #[derive(Default)]
    struct FakeStore {
        products: Mutex<Vec<Product>>,
        fail_with: Mutex<Option<ErrorKind>>,
        next_id: Mutex<u32>,
    }

    impl FakeStore {
        fn failing(&self, kind: Option<ErrorKind>) {
            *self.fail_with.lock().expect("lock") = kind;
        }

        fn check(&self) -> ApiResult<()> {
            match *self.fail_with.lock().expect("lock") {
                Some(kind) => Err(Error::new(kind).with_message("injected")),
                None => Ok(()),
            }
        }

        fn stored(&self) -> Vec<Product> {
            self.products.lock().expect("lock").clone()
        }
    }

    impl ProductStore for FakeStore {
        fn list_products(&self) -> ApiResult<Vec<Product>> {
            self.check()?;
            Ok(self.stored())
        }

        fn get_product(&self, id: &str) -> ApiResult<Product> {
            self.check()?;
            self.stored()
                .into_iter()
                .find(|product| product.id == id)
                .ok_or_else(|| Error::new(ErrorKind::NotFound))
        }

        fn create_product(&self, product: &ValidatedProduct) -> ApiResult<String> {
            self.check()?;
            let mut next = self.next_id.lock().expect("lock");
            *next += 1;
            let id = format!("p{next}");
            self.products
                .lock()
                .expect("lock")
                .push(Product::from_validated(id.clone(), product));
            Ok(id)
        }

        fn update_product(&self, id: &str, product: &ValidatedProduct) -> ApiResult<()> {
            self.check()?;
            let mut products = self.products.lock().expect("lock");
            let slot = products
                .iter_mut()
                .find(|existing| existing.id == id)
                .ok_or_else(|| Error::new(ErrorKind::NotFound))?;
            *slot = Product::from_validated(id, product);
            Ok(())
        }

        fn delete_product(&self, id: &str) -> ApiResult<()> {
            self.check()?;
            self.products
                .lock()
                .expect("lock")
                .retain(|product| product.id != id);
            Ok(())
        }
    }

    fn draft(nombre: &str, cantidad: &str, categoria: &str) -> ProductDraft {
        ProductDraft {
            nombre: nombre.to_string(),
            descripcion: "Cuero".to_string(),
            precio: "10".to_string(),
            cantidad: cantidad.to_string(),
            categoria: categoria.to_string(),
            image: Some("file:///foto.jpg".to_string()),
        }
    }

    fn seeded() -> ProductView<FakeStore> {
        let view = ProductView::new(FakeStore::default());
        view.create(&draft("Bolso", "5", "bolsos"), true).expect("create");
        view.create(&draft("Bota", "2", "calzado"), true).expect("create");
        view.create(&draft("Cartera", "3", "bolsos"), true).expect("create");
        view
    }

    #[test]
    fn visible_changes_only_on_recalculate() {
        let view = seeded();
        view.refresh().expect("refresh");
        view.set_query("bo");
        assert!(view.visible().is_empty());
        view.recalculate();
        let names = view
            .visible()
            .into_iter()
            .filter_map(|product| product.nombre)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Bolso", "Bota"]);
        assert_eq!(view.query(), "bo");
    }

    #[test]
    fn categories_follow_snapshot() {
        let view = seeded();
        let totals = view.categories();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].category, "bolsos");
        assert_eq!(totals[0].total_quantity, 8.0);
        assert_eq!(totals[1].category, "calzado");
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let view = seeded();
        view.store().failing(Some(ErrorKind::StoreUnavailable));
        let err = view.refresh().expect_err("offline");
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert_eq!(view.products().len(), 3);
    }

    #[test]
    fn create_rejects_invalid_draft_without_touching_store() {
        let view = seeded();
        let err = view
            .create(&draft("", "2.5", "bolsos"), false)
            .expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(view.store().stored().len(), 3);
        assert_eq!(view.products().len(), 3);
    }

    #[test]
    fn create_requires_image_when_asked() {
        let view = ProductView::new(FakeStore::default());
        let mut no_image = draft("Bolso", "1", "bolsos");
        no_image.image = None;
        let err = view.create(&no_image, true).expect_err("image");
        assert_eq!(err.kind(), ErrorKind::ImageRequired);
        view.create(&no_image, false).expect("optional image");
    }

    #[test]
    fn update_reverts_when_store_unavailable() {
        let view = seeded();
        let id = view.products()[0].id.clone();
        view.store().failing(Some(ErrorKind::StoreUnavailable));
        let err = view
            .update(&id, &draft("Bolso grande", "9", "bolsos"))
            .expect_err("offline");
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert_eq!(view.products()[0].nombre.as_deref(), Some("Bolso"));
    }

    #[test]
    fn update_not_found_drops_stale_entry() {
        let view = seeded();
        let id = view.products()[1].id.clone();
        view.store().products.lock().expect("lock").retain(|p| p.id != id);
        let err = view
            .update(&id, &draft("Bota", "1", "calzado"))
            .expect_err("gone");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(view.products().iter().all(|product| product.id != id));
    }

    #[test]
    fn update_applies_locally_and_remotely() {
        let view = seeded();
        let id = view.products()[0].id.clone();
        view.update(&id, &draft("Bolso grande", "9", "bolsos"))
            .expect("update");
        assert_eq!(view.products()[0].nombre.as_deref(), Some("Bolso grande"));
        assert_eq!(view.store().stored()[0].nombre.as_deref(), Some("Bolso grande"));
    }

    #[test]
    fn delete_restores_position_on_failure() {
        let view = seeded();
        let id = view.products()[1].id.clone();
        view.store().failing(Some(ErrorKind::StoreUnavailable));
        view.delete(&id).expect_err("offline");
        assert_eq!(view.products()[1].id, id);

        view.store().failing(None);
        view.delete(&id).expect("delete");
        assert_eq!(view.products().len(), 2);
        assert_eq!(view.store().stored().len(), 2);
    }

    struct SlowStore {
        gate: Arc<Barrier>,
        listed: AtomicBool,
    }

    impl ProductStore for SlowStore {
        fn list_products(&self) -> ApiResult<Vec<Product>> {
            self.gate.wait();
            self.listed.store(true, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn get_product(&self, _id: &str) -> ApiResult<Product> {
            Err(Error::new(ErrorKind::NotFound))
        }

        fn create_product(&self, _product: &ValidatedProduct) -> ApiResult<String> {
            Err(Error::new(ErrorKind::StoreUnavailable))
        }

        fn update_product(&self, _id: &str, _product: &ValidatedProduct) -> ApiResult<()> {
            Err(Error::new(ErrorKind::StoreUnavailable))
        }

        fn delete_product(&self, _id: &str) -> ApiResult<()> {
            Err(Error::new(ErrorKind::StoreUnavailable))
        }
    }

    #[test]
    fn background_refresh_is_discarded_after_view_drops() {
        let gate = Arc::new(Barrier::new(2));
        let store = Arc::new(SlowStore {
            gate: Arc::clone(&gate),
            listed: AtomicBool::new(false),
        });
        let view = ProductView::with_shared_store(Arc::clone(&store));
        let handle = view.spawn_refresh();
        drop(view);
        gate.wait();
        assert!(!handle.join().expect("join"));
        assert!(store.listed.load(Ordering::SeqCst));
    }

    #[test]
    fn background_refresh_applies_while_view_alive() {
        let view = seeded();
        view.store()
            .products
            .lock()
            .expect("lock")
            .truncate(1);
        let applied = view.spawn_refresh().join().expect("join");
        assert!(applied);
        assert_eq!(view.products().len(), 1);
    }
}
