use crate::entities::{CatalogSnapshot, CreateOutcome, NewProduct, Product, ProductPatch, MAX_PRODUCTS};
use crate::errors::DomainError;
use crate::repositories::ProductRepository;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
enum ReadPhase {
    Loading,
    Refreshing,
}

/// Owned by whoever holds the writer lock.
#[derive(Debug, Default)]
struct WriterState {
    /// False until the first successful read and after any failed reload.
    snapshot_current: bool,
}

/// Catalog Service - the single in-process authority on which products exist.
///
/// Every mutation goes through here so the size limit is checked before the
/// store is touched, and every successful mutation is followed by a full
/// reload before a new [`CatalogSnapshot`] is published. Mutations and reloads
/// are serialized behind one writer lock. The limit is checked against the
/// published snapshot while it is known to match the store, and against a
/// fresh store count otherwise.
pub struct CatalogService {
    product_repository: Arc<dyn ProductRepository>,
    snapshot: watch::Sender<CatalogSnapshot>,
    write_lock: Mutex<WriterState>,
}

impl CatalogService {
    pub fn new(product_repository: Arc<dyn ProductRepository>) -> Self {
        let (snapshot, _) = watch::channel(CatalogSnapshot::pending());
        Self {
            product_repository,
            snapshot,
            write_lock: Mutex::new(WriterState::default()),
        }
    }

    /// Prepare the store and perform the first full read.
    pub async fn initialize(&self) -> Result<(), DomainError> {
        self.product_repository.initialize().await?;
        self.load_all().await?;
        info!(
            product_count = self.snapshot.borrow().product_count,
            "Catalog initialized"
        );
        Ok(())
    }

    pub async fn load_all(&self) -> Result<(), DomainError> {
        let mut state = self.write_lock.lock().await;
        self.reload(&mut state, ReadPhase::Loading).await
    }

    /// Same as [`load_all`](Self::load_all) but flagged as a user-initiated
    /// refresh.
    pub async fn refresh(&self) -> Result<(), DomainError> {
        let mut state = self.write_lock.lock().await;
        self.reload(&mut state, ReadPhase::Refreshing).await
    }

    /// Create a product unless the catalog is already full.
    ///
    /// Once the insert succeeds the product is reported as created, even if
    /// the reload that follows fails.
    pub async fn create(&self, product: NewProduct) -> Result<CreateOutcome, DomainError> {
        let mut state = self.write_lock.lock().await;

        let published = self.snapshot.borrow().product_count;
        let product_count = if state.snapshot_current {
            published
        } else {
            debug!("Snapshot stale, counting products in the store");
            self.product_repository
                .count()
                .await
                .inspect_err(|e| error!(error = %e, "Failed to count products"))?
        };
        if product_count >= MAX_PRODUCTS {
            warn!(product_count, max = MAX_PRODUCTS, "Product limit reached, create rejected");
            return Ok(CreateOutcome::LimitReached);
        }

        let id = self
            .product_repository
            .insert(&product)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to create product"))?;
        info!(id, name = %product.name, "Product created");

        self.reload_after_write(&mut state).await;
        Ok(CreateOutcome::Created { id })
    }

    /// Apply a partial update. An unknown id is a silent no-op.
    pub async fn update(&self, id: i32, patch: ProductPatch) -> Result<(), DomainError> {
        let mut state = self.write_lock.lock().await;

        let touched = self
            .product_repository
            .update(id, &patch)
            .await
            .inspect_err(|e| error!(id, error = %e, "Failed to update product"))?;
        if touched {
            info!(id, "Product updated");
        } else {
            debug!(id, "Update skipped, no such product");
        }

        self.reload_after_write(&mut state).await;
        Ok(())
    }

    /// Remove a product. An unknown id is a silent no-op.
    pub async fn delete(&self, id: i32) -> Result<(), DomainError> {
        let mut state = self.write_lock.lock().await;

        let removed = self
            .product_repository
            .delete(id)
            .await
            .inspect_err(|e| error!(id, error = %e, "Failed to delete product"))?;
        if removed {
            info!(id, "Product deleted");
        } else {
            debug!(id, "Delete skipped, no such product");
        }

        self.reload_after_write(&mut state).await;
        Ok(())
    }

    /// Get product by ID, read straight from the store.
    pub async fn get_product(&self, id: i32) -> Result<Product, DomainError> {
        match self.product_repository.find_by_id(id).await? {
            Some(product) => Ok(product),
            None => Err(DomainError::ProductNotFound(id)),
        }
    }

    pub async fn search(&self, term: &str) -> Result<Vec<Product>, DomainError> {
        self.product_repository.find_by_name_contains(term).await
    }

    /// Copy of the currently published snapshot.
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn is_at_max_limit(&self) -> bool {
        self.snapshot.borrow().is_at_max_limit
    }

    // The write is already durable; a failed reload only leaves the snapshot
    // stale until the next successful read.
    async fn reload_after_write(&self, state: &mut WriterState) {
        if let Err(e) = self.reload(state, ReadPhase::Loading).await {
            warn!(error = %e, "Write committed but catalog reload failed");
        }
    }

    async fn reload(&self, state: &mut WriterState, phase: ReadPhase) -> Result<(), DomainError> {
        self.snapshot.send_modify(|s| match phase {
            ReadPhase::Loading => s.loading = true,
            ReadPhase::Refreshing => s.refreshing = true,
        });

        match self.product_repository.find_all().await {
            Ok(products) => {
                debug!(count = products.len(), ?phase, "Catalog reloaded");
                self.snapshot.send_replace(CatalogSnapshot::loaded(products));
                state.snapshot_current = true;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, ?phase, "Failed to load products");
                self.snapshot.send_modify(|s| {
                    s.loading = false;
                    s.refreshing = false;
                });
                state.snapshot_current = false;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// In-memory store with switches for injecting storage faults.
    #[derive(Default)]
    struct FakeRepository {
        rows: StdMutex<Vec<Product>>,
        next_id: AtomicUsize,
        inserts: AtomicUsize,
        fail_writes: AtomicBool,
        fail_reads: AtomicBool,
    }

    impl FakeRepository {
        fn fault(&self) -> DomainError {
            DomainError::RepositoryError("disk I/O error".to_string())
        }

        fn sorted(mut rows: Vec<Product>) -> Vec<Product> {
            rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
            rows
        }

        // Strictly increasing timestamps keep ordering deterministic.
        fn tick(&self, seq: usize) -> chrono::DateTime<Utc> {
            Utc::now() + Duration::milliseconds(seq as i64)
        }
    }

    #[async_trait]
    impl ProductRepository for FakeRepository {
        async fn initialize(&self) -> Result<(), DomainError> {
            Ok(())
        }

        async fn find_all(&self) -> Result<Vec<Product>, DomainError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(self.fault());
            }
            Ok(Self::sorted(self.rows.lock().unwrap().clone()))
        }

        async fn find_by_name_contains(&self, fragment: &str) -> Result<Vec<Product>, DomainError> {
            let needle = fragment.trim().to_lowercase();
            let all = self.find_all().await?;
            Ok(all
                .into_iter()
                .filter(|p| p.name.to_lowercase().contains(&needle))
                .collect())
        }

        async fn find_by_id(&self, id: i32) -> Result<Option<Product>, DomainError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == Some(id))
                .cloned())
        }

        async fn insert(&self, product: &NewProduct) -> Result<i32, DomainError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(self.fault());
            }
            self.inserts.fetch_add(1, Ordering::SeqCst);
            let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.tick(seq);
            let id = seq as i32;
            self.rows.lock().unwrap().push(Product::with_id(
                id,
                product.name.clone(),
                product.quantity,
                product.price,
                product.image_uri.clone(),
                now,
                now,
            ));
            Ok(id)
        }

        async fn update(&self, id: i32, patch: &ProductPatch) -> Result<bool, DomainError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(self.fault());
            }
            let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.tick(seq);
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.iter_mut().find(|p| p.id == Some(id)) else {
                return Ok(false);
            };
            if let Some(quantity) = patch.quantity {
                row.quantity = quantity;
            }
            if let Some(name) = &patch.name {
                row.name = name.clone();
            }
            row.updated_at = now;
            Ok(true)
        }

        async fn delete(&self, id: i32) -> Result<bool, DomainError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(self.fault());
            }
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|p| p.id != Some(id));
            Ok(rows.len() != before)
        }

        async fn count(&self) -> Result<usize, DomainError> {
            Ok(self.rows.lock().unwrap().len())
        }
    }

    fn service() -> (Arc<FakeRepository>, CatalogService) {
        let repository = Arc::new(FakeRepository::default());
        let service = CatalogService::new(repository.clone());
        (repository, service)
    }

    fn item(name: &str) -> NewProduct {
        NewProduct::new(name, 3, 2.5)
    }

    #[tokio::test]
    async fn starts_pending_until_initialized() {
        let (_, service) = service();
        assert!(service.snapshot().loading);

        service.initialize().await.unwrap();
        let snapshot = service.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.product_count, 0);

        // idempotent
        service.initialize().await.unwrap();
        assert_eq!(service.snapshot().product_count, 0);
    }

    #[tokio::test]
    async fn limit_scenario() {
        let (repository, service) = service();
        service.initialize().await.unwrap();

        let mut ids = Vec::new();
        for name in ["Apples", "Bread", "Milk", "Eggs", "Rice"] {
            match service.create(item(name)).await.unwrap() {
                CreateOutcome::Created { id } => ids.push(id),
                CreateOutcome::LimitReached => panic!("rejected {name} below the limit"),
            }
        }
        let snapshot = service.snapshot();
        assert_eq!(snapshot.product_count, 5);
        assert!(snapshot.is_at_max_limit);

        let outcome = service.create(item("Sugar")).await.unwrap();
        assert_eq!(outcome, CreateOutcome::LimitReached);
        assert_eq!(service.snapshot().product_count, 5);
        assert_eq!(repository.inserts.load(Ordering::SeqCst), 5);

        service.delete(ids[0]).await.unwrap();
        let snapshot = service.snapshot();
        assert_eq!(snapshot.product_count, 4);
        assert!(!snapshot.is_at_max_limit);

        assert!(service.create(item("Sugar")).await.unwrap().is_created());
        assert_eq!(service.snapshot().product_count, 5);
    }

    #[tokio::test]
    async fn limit_is_checked_against_loaded_state() {
        let (repository, service) = service();
        for i in 0..MAX_PRODUCTS {
            repository.insert(&item(&format!("seed{i}"))).await.unwrap();
        }
        service.initialize().await.unwrap();
        assert!(service.is_at_max_limit());

        let outcome = service.create(item("extra")).await.unwrap();
        assert_eq!(outcome, CreateOutcome::LimitReached);
        assert_eq!(repository.count().await.unwrap(), MAX_PRODUCTS);
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_snapshot() {
        let (repository, service) = service();
        service.initialize().await.unwrap();
        service.create(item("Apples")).await.unwrap();
        let before = service.snapshot();

        repository.fail_writes.store(true, Ordering::SeqCst);
        let err = service.create(item("Bread")).await.unwrap_err();
        assert!(matches!(err, DomainError::RepositoryError(_)));
        assert_eq!(service.snapshot(), before);

        let id = before.products[0].id.unwrap();
        assert!(service.update(id, ProductPatch::default().quantity(9)).await.is_err());
        assert!(service.delete(id).await.is_err());
        assert_eq!(service.snapshot(), before);
    }

    #[tokio::test]
    async fn failed_reload_clears_flags_and_keeps_products() {
        let (repository, service) = service();
        service.initialize().await.unwrap();
        service.create(item("Apples")).await.unwrap();

        repository.fail_reads.store(true, Ordering::SeqCst);
        assert!(service.refresh().await.is_err());

        let snapshot = service.snapshot();
        assert!(!snapshot.refreshing);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.product_count, 1);
    }

    #[tokio::test]
    async fn update_moves_product_to_front() {
        let (_, service) = service();
        service.initialize().await.unwrap();
        let CreateOutcome::Created { id: first } = service.create(item("Apples")).await.unwrap()
        else {
            panic!("expected create");
        };
        service.create(item("Bread")).await.unwrap();
        assert_eq!(service.snapshot().products[0].name, "Bread");

        service
            .update(first, ProductPatch::default().quantity(7))
            .await
            .unwrap();
        let snapshot = service.snapshot();
        assert_eq!(snapshot.products[0].id, Some(first));
        assert_eq!(snapshot.products[0].quantity, 7);
    }

    #[tokio::test]
    async fn missing_ids_are_no_ops_except_lookup() {
        let (_, service) = service();
        service.initialize().await.unwrap();
        service.create(item("Apples")).await.unwrap();

        service
            .update(404, ProductPatch::default().quantity(1))
            .await
            .unwrap();
        service.delete(404).await.unwrap();
        assert_eq!(service.snapshot().product_count, 1);

        let err = service.get_product(404).await.unwrap_err();
        assert!(matches!(err, DomainError::ProductNotFound(404)));
    }

    #[tokio::test]
    async fn subscribers_see_published_snapshots() {
        let (_, service) = service();
        service.initialize().await.unwrap();
        let mut rx = service.subscribe();

        service.create(item("Apples")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().product_count, 1);
    }

    #[tokio::test]
    async fn concurrent_creates_never_exceed_limit() {
        let (repository, service) = service();
        let service = Arc::new(service);
        service.initialize().await.unwrap();
        for i in 0..MAX_PRODUCTS - 1 {
            service.create(item(&format!("p{i}"))).await.unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.create(item(&format!("race{i}"))).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_created() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(repository.count().await.unwrap(), MAX_PRODUCTS);
        assert_eq!(service.snapshot().product_count, MAX_PRODUCTS);
    }

    #[tokio::test]
    async fn search_reads_from_store() {
        let (_, service) = service();
        service.initialize().await.unwrap();
        for name in ["Apples", "Grapes", "Bread"] {
            service.create(item(name)).await.unwrap();
        }

        let names: Vec<_> = service
            .search("AP")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Grapes", "Apples"]);
    }

    #[tokio::test]
    async fn committed_create_counts_toward_limit_after_failed_reload() {
        let (repository, service) = service();
        service.initialize().await.unwrap();
        for i in 0..MAX_PRODUCTS - 1 {
            service.create(item(&format!("p{i}"))).await.unwrap();
        }

        repository.fail_reads.store(true, Ordering::SeqCst);
        let outcome = service.create(item("fifth")).await.unwrap();
        assert!(outcome.is_created());
        assert_eq!(repository.count().await.unwrap(), MAX_PRODUCTS);
        // published view lags behind the store until a read succeeds
        let snapshot = service.snapshot();
        assert_eq!(snapshot.product_count, MAX_PRODUCTS - 1);
        assert!(!snapshot.loading);

        repository.fail_reads.store(false, Ordering::SeqCst);
        let outcome = service.create(item("sixth")).await.unwrap();
        assert_eq!(outcome, CreateOutcome::LimitReached);
        assert_eq!(repository.count().await.unwrap(), MAX_PRODUCTS);

        service.refresh().await.unwrap();
        assert!(service.is_at_max_limit());
    }

    #[tokio::test]
    async fn create_before_initialize_counts_the_store() {
        let (repository, service) = service();
        for i in 0..MAX_PRODUCTS {
            repository.insert(&item(&format!("seed{i}"))).await.unwrap();
        }

        let outcome = service.create(item("extra")).await.unwrap();
        assert_eq!(outcome, CreateOutcome::LimitReached);
        assert_eq!(repository.inserts.load(Ordering::SeqCst), MAX_PRODUCTS);
    }

    #[tokio::test]
    async fn committed_update_and_delete_succeed_despite_failed_reload() {
        let (repository, service) = service();
        service.initialize().await.unwrap();
        let CreateOutcome::Created { id } = service.create(item("Apples")).await.unwrap() else {
            panic!("expected create");
        };

        repository.fail_reads.store(true, Ordering::SeqCst);
        service
            .update(id, ProductPatch::default().quantity(9))
            .await
            .unwrap();
        assert_eq!(repository.find_by_id(id).await.unwrap().unwrap().quantity, 9);

        service.delete(id).await.unwrap();
        assert_eq!(repository.count().await.unwrap(), 0);
        assert_eq!(service.snapshot().product_count, 1);

        repository.fail_reads.store(false, Ordering::SeqCst);
        service.load_all().await.unwrap();
        assert_eq!(service.snapshot().product_count, 0);
    }
}
