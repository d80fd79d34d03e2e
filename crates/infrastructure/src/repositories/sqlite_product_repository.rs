use crate::database::{products, SqlitePool, CREATE_PRODUCTS_TABLE};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use domain::{DomainError, NewProduct, Product, ProductPatch, ProductRepository};
use tokio::sync::OnceCell;
use tracing::info;

// Database model - separate from domain entity
#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct ProductModel {
    id: i32,
    name: String,
    quantity: i32,
    price: f64,
    image_uri: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = products)]
struct NewProductModel {
    name: String,
    quantity: i32,
    price: f64,
    image_uri: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

// `None` fields are left out of the UPDATE; `image_uri: Some(None)` writes NULL.
#[derive(AsChangeset)]
#[diesel(table_name = products)]
struct ProductChangeset {
    name: Option<String>,
    quantity: Option<i32>,
    price: Option<f64>,
    image_uri: Option<Option<String>>,
    updated_at: NaiveDateTime,
}

impl From<ProductModel> for Product {
    fn from(model: ProductModel) -> Self {
        Product::with_id(
            model.id,
            model.name,
            model.quantity,
            model.price,
            model.image_uri,
            model.created_at.and_utc(),
            model.updated_at.and_utc(),
        )
    }
}

impl NewProductModel {
    fn stamped(product: &NewProduct, now: NaiveDateTime) -> Self {
        Self {
            name: product.name.clone(),
            quantity: product.quantity,
            price: product.price,
            image_uri: product.image_uri.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl ProductChangeset {
    fn stamped(patch: &ProductPatch, now: NaiveDateTime) -> Self {
        Self {
            name: patch.name.clone(),
            quantity: patch.quantity,
            price: patch.price,
            image_uri: patch.image_uri.clone(),
            updated_at: now,
        }
    }
}

/// Escape `LIKE` wildcards so the fragment is matched literally.
fn like_pattern(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    escaped.push('%');
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub struct SqliteProductRepository {
    pool: SqlitePool,
    schema_ready: OnceCell<()>,
}

impl SqliteProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

    /// Run a query on a pooled connection without blocking the runtime.
    async fn run<T, F>(&self, query: F) -> Result<T, DomainError>
    where
        F: FnOnce(&mut SqliteConnection) -> QueryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DomainError::RepositoryError(e.to_string()))?;
            query(&mut conn).map_err(|e| DomainError::RepositoryError(e.to_string()))
        })
        .await
        .map_err(|e| DomainError::RepositoryError(e.to_string()))?
    }

    async fn create_schema(&self) -> Result<(), DomainError> {
        self.run(|conn| diesel::sql_query(CREATE_PRODUCTS_TABLE).execute(conn))
            .await?;
        Ok(())
    }

    // First access creates the table when `initialize` was never called.
    async fn ensure_schema(&self) -> Result<(), DomainError> {
        self.schema_ready
            .get_or_try_init(|| self.create_schema())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for SqliteProductRepository {
    async fn initialize(&self) -> Result<(), DomainError> {
        self.create_schema().await?;
        // Already set when a lazy init ran first.
        let _ = self.schema_ready.set(());
        info!("Products table ready");
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<Product>, DomainError> {
        self.ensure_schema().await?;

        let result = self
            .run(|conn| {
                products::table
                    .order((products::updated_at.desc(), products::id.desc()))
                    .select(ProductModel::as_select())
                    .load::<ProductModel>(conn)
            })
            .await?;

        Ok(result.into_iter().map(|model| model.into()).collect())
    }

    async fn find_by_name_contains(&self, fragment: &str) -> Result<Vec<Product>, DomainError> {
        if fragment.trim().is_empty() {
            return self.find_all().await;
        }
        self.ensure_schema().await?;

        // SQLite LIKE folds ASCII case only.
        let pattern = like_pattern(fragment);
        let result = self
            .run(move |conn| {
                products::table
                    .filter(products::name.like(pattern).escape('\\'))
                    .order((products::updated_at.desc(), products::id.desc()))
                    .select(ProductModel::as_select())
                    .load::<ProductModel>(conn)
            })
            .await?;

        Ok(result.into_iter().map(|model| model.into()).collect())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Product>, DomainError> {
        self.ensure_schema().await?;

        let result = self
            .run(move |conn| {
                products::table
                    .find(id)
                    .select(ProductModel::as_select())
                    .first::<ProductModel>(conn)
                    .optional()
            })
            .await?;

        Ok(result.map(|model| model.into()))
    }

    async fn insert(&self, product: &NewProduct) -> Result<i32, DomainError> {
        self.ensure_schema().await?;

        let new_product = NewProductModel::stamped(product, Utc::now().naive_utc());

        self.run(move |conn| {
            diesel::insert_into(products::table)
                .values(&new_product)
                .returning(products::id)
                .get_result::<i32>(conn)
        })
        .await
    }

    async fn update(&self, id: i32, patch: &ProductPatch) -> Result<bool, DomainError> {
        self.ensure_schema().await?;

        let changeset = ProductChangeset::stamped(patch, Utc::now().naive_utc());

        let rows = self
            .run(move |conn| {
                diesel::update(products::table.find(id))
                    .set(&changeset)
                    .execute(conn)
            })
            .await?;

        Ok(rows > 0)
    }

    async fn delete(&self, id: i32) -> Result<bool, DomainError> {
        self.ensure_schema().await?;

        let rows = self
            .run(move |conn| diesel::delete(products::table.find(id)).execute(conn))
            .await?;

        Ok(rows > 0)
    }

    async fn count(&self) -> Result<usize, DomainError> {
        self.ensure_schema().await?;

        let count = self
            .run(|conn| products::table.count().get_result::<i64>(conn))
            .await?;

        Ok(count as usize)
    }
}
