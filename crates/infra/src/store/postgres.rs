//! Postgres-backed inventory + ledger.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | `StoreError` | Scenario |
//! |------------|-----------------|--------------|----------|
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transaction won |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Two purchases locked products in opposite order |
//! | Database (unique violation) | `23505` | `Conflict` | Concurrent insert of the same key |
//! | Database (other) | any other | `Backend` | Constraint violations, bad data |
//! | Other | N/A | `Backend` | Network errors, pool closed, decoding |
//!
//! A versioned `UPDATE` that matches no row is also reported as `Conflict`.
//!
//! ## Thread Safety
//!
//! `PostgresCommerceStore` is `Send + Sync`; the SQLx pool handles connection
//! sharing. Each purchase commits through exactly one SQL transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use checkout_core::{AggregateId, AggregateRoot, ExpectedVersion, Money, UserId};
use checkout_products::{Product, ProductDetails, ProductId};
use checkout_purchasing::{
    BuyerId, InventoryStore, NewPurchase, Purchase, PurchaseId, PurchaseLedger, PurchaseLineItem,
    PurchaseStatus, PurchaseTransaction, StoreError, TransactionalStore,
};

use crate::config::PostgresConfig;

/// Schema statements, applied in order by `PostgresCommerceStore::migrate`.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        product_id  UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        category    TEXT NOT NULL,
        unit_price  BIGINT NOT NULL CHECK (unit_price >= 0),
        stock       BIGINT NOT NULL CHECK (stock >= 0),
        description TEXT,
        attributes  JSONB NOT NULL DEFAULT '{}'::jsonb,
        version     BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchases (
        purchase_id BIGSERIAL PRIMARY KEY,
        buyer_id    UUID NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        status      TEXT NOT NULL,
        total       BIGINT NOT NULL CHECK (total >= 0)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS purchases_buyer_idx ON purchases (buyer_id, purchase_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchase_line_items (
        purchase_id  BIGINT NOT NULL REFERENCES purchases (purchase_id),
        line_no      INT NOT NULL,
        product_id   UUID NOT NULL,
        product_name TEXT NOT NULL,
        quantity     BIGINT NOT NULL CHECK (quantity > 0),
        unit_price   BIGINT NOT NULL CHECK (unit_price >= 0),
        subtotal     BIGINT NOT NULL CHECK (subtotal >= 0),
        PRIMARY KEY (purchase_id, line_no)
    )
    "#,
];

const PRODUCT_COLUMNS: &str =
    "product_id, name, category, unit_price, stock, description, attributes, version";

const UPSERT_PRODUCT: &str = r#"
    INSERT INTO products (
        product_id, name, category, unit_price, stock, description, attributes, version
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (product_id)
    DO UPDATE SET
        name = EXCLUDED.name,
        category = EXCLUDED.category,
        unit_price = EXCLUDED.unit_price,
        stock = EXCLUDED.stock,
        description = EXCLUDED.description,
        attributes = EXCLUDED.attributes,
        version = GREATEST(products.version + 1, EXCLUDED.version)
"#;

/// Postgres-backed inventory store and purchase ledger.
#[derive(Debug, Clone)]
pub struct PostgresCommerceStore {
    pool: Arc<PgPool>,
}

impl PostgresCommerceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool from configuration.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    /// Insert or replace a catalog product.
    ///
    /// Replacing bumps the stored version past its current value, so any
    /// transaction that read the old row fails its versioned write.
    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    pub async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(UPSERT_PRODUCT)
            .bind(product_uuid(product.id_typed()))
            .bind(product.name())
            .bind(product.category())
            .bind(to_db_i64("unit_price", product.unit_price().minor_units())?)
            .bind(i64::from(product.stock()))
            .bind(product.details().description.as_deref())
            .bind(Json(&product.details().attributes))
            .bind(to_db_i64("version", product.version())?)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("upsert_product", e))?;
        Ok(())
    }

    async fn load_purchases(&self, headers: Vec<PgRow>) -> Result<Vec<Purchase>, StoreError> {
        if headers.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<i64> = headers
            .iter()
            .map(|row| row.try_get::<i64, _>("purchase_id"))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_purchase", e))?;

        let line_rows = sqlx::query(
            r#"
            SELECT purchase_id, product_id, product_name, quantity, unit_price
            FROM purchase_line_items
            WHERE purchase_id = ANY($1)
            ORDER BY purchase_id ASC, line_no ASC
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_line_items", e))?;

        let mut lines: HashMap<i64, Vec<PurchaseLineItem>> = HashMap::new();
        for row in &line_rows {
            let purchase_id: i64 = row
                .try_get("purchase_id")
                .map_err(|e| map_sqlx_error("decode_line_item", e))?;
            lines
                .entry(purchase_id)
                .or_default()
                .push(line_from_row(row)?);
        }

        headers
            .iter()
            .map(|row| {
                let id: i64 = row
                    .try_get("purchase_id")
                    .map_err(|e| map_sqlx_error("decode_purchase", e))?;
                purchase_from_row(row, lines.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

#[async_trait]
impl InventoryStore for PostgresCommerceStore {
    #[instrument(skip_all, fields(product_id = %product_id), err)]
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1"
        ))
        .bind(product_uuid(product_id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }
}

#[async_trait]
impl PurchaseLedger for PostgresCommerceStore {
    #[instrument(skip_all, fields(purchase_id = %id), err)]
    async fn find_by_id(&self, id: PurchaseId) -> Result<Option<Purchase>, StoreError> {
        // Ids past BIGINT range were never assigned.
        let Some(raw_id) = db_purchase_id(id) else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT purchase_id, buyer_id, created_at, status, total
            FROM purchases
            WHERE purchase_id = $1
            "#,
        )
        .bind(raw_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_purchase", e))?;

        Ok(self.load_purchases(rows).await?.into_iter().next())
    }

    #[instrument(skip_all, fields(buyer_id = %buyer_id, purchase_count), err)]
    async fn find_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Purchase>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT purchase_id, buyer_id, created_at, status, total
            FROM purchases
            WHERE buyer_id = $1
            ORDER BY purchase_id ASC
            "#,
        )
        .bind(*buyer_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_purchases_by_buyer", e))?;

        let purchases = self.load_purchases(rows).await?;
        Span::current().record("purchase_count", purchases.len());
        Ok(purchases)
    }

    #[instrument(skip(self), err)]
    async fn find_all(&self) -> Result<Vec<Purchase>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT purchase_id, buyer_id, created_at, status, total
            FROM purchases
            ORDER BY purchase_id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_all_purchases", e))?;

        self.load_purchases(rows).await
    }
}

#[async_trait]
impl TransactionalStore for PostgresCommerceStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTransaction {
            tx,
            next_line_no: HashMap::new(),
        })
    }
}

/// One SQL transaction. Dropping it without `commit` rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    next_line_no: HashMap<PurchaseId, i32>,
}

impl core::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresTransaction")
            .field("next_line_no", &self.next_line_no)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PurchaseTransaction for PostgresTransaction {
    async fn product(&mut self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        // Row lock: concurrent purchases of the same product queue here.
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1 FOR UPDATE"
        ))
        .bind(product_uuid(product_id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn update_product(
        &mut self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let product_id = product.id_typed();
        let stock = i64::from(product.stock());
        let version = to_db_i64("version", product.version())?;

        let ExpectedVersion(seen) = expected;

        let result = sqlx::query(
            "UPDATE products SET stock = $1, version = $2 WHERE product_id = $3 AND version = $4",
        )
        .bind(stock)
        .bind(version)
        .bind(product_uuid(product_id))
        .bind(to_db_i64("expected_version", seen)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::conflict(format!(
                "product {product_id}: no row at version {seen}"
            )));
        }
        Ok(())
    }

    async fn insert_purchase(&mut self, purchase: &NewPurchase) -> Result<PurchaseId, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO purchases (buyer_id, created_at, status, total)
            VALUES ($1, $2, $3, $4)
            RETURNING purchase_id
            "#,
        )
        .bind(*purchase.buyer_id().as_uuid())
        .bind(purchase.created_at())
        .bind(purchase.status().as_str())
        .bind(to_db_i64("total", purchase.total().minor_units())?)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_purchase", e))?;

        let raw: i64 = row
            .try_get("purchase_id")
            .map_err(|e| map_sqlx_error("insert_purchase", e))?;
        let id = PurchaseId(from_db_u64("purchase_id", raw)?);
        self.next_line_no.insert(id, 1);
        Ok(id)
    }

    async fn insert_line_item(
        &mut self,
        purchase_id: PurchaseId,
        line: &PurchaseLineItem,
    ) -> Result<(), StoreError> {
        let line_no = self.next_line_no.get_mut(&purchase_id).ok_or_else(|| {
            StoreError::backend(format!("purchase {purchase_id} not inserted in this transaction"))
        })?;
        let this_line = *line_no;
        *line_no += 1;

        sqlx::query(
            r#"
            INSERT INTO purchase_line_items (
                purchase_id, line_no, product_id, product_name, quantity, unit_price, subtotal
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(to_db_i64("purchase_id", purchase_id.0)?)
        .bind(this_line)
        .bind(product_uuid(line.product_id()))
        .bind(line.product_name())
        .bind(i64::from(line.quantity()))
        .bind(to_db_i64("unit_price", line.unit_price().minor_units())?)
        .bind(to_db_i64("subtotal", line.subtotal().minor_units())?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_line_item", e))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn product_uuid(id: ProductId) -> Uuid {
    *id.0.as_uuid()
}

fn db_purchase_id(id: PurchaseId) -> Option<i64> {
    i64::try_from(id.0).ok()
}

fn to_db_i64(column: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::backend(format!("{column} {value} exceeds BIGINT range")))
}

fn from_db_u64(column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::backend(format!("{column} is negative: {value}")))
}

fn from_db_u32(column: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::backend(format!("{column} out of range: {value}")))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let decode = |e| map_sqlx_error("decode_product", e);

    let id: Uuid = row.try_get("product_id").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    let category: String = row.try_get("category").map_err(decode)?;
    let unit_price: i64 = row.try_get("unit_price").map_err(decode)?;
    let stock: i64 = row.try_get("stock").map_err(decode)?;
    let description: Option<String> = row.try_get("description").map_err(decode)?;
    let Json(attributes): Json<BTreeMap<String, String>> =
        row.try_get("attributes").map_err(decode)?;
    let version: i64 = row.try_get("version").map_err(decode)?;

    Product::restore(
        ProductId::new(AggregateId::from_uuid(id)),
        name,
        category,
        Money::from_minor(from_db_u64("unit_price", unit_price)?),
        from_db_u32("stock", stock)?,
        ProductDetails {
            description,
            attributes,
        },
        from_db_u64("version", version)?,
    )
    .map_err(|e| StoreError::backend(format!("product {id}: {e}")))
}

fn line_from_row(row: &PgRow) -> Result<PurchaseLineItem, StoreError> {
    let decode = |e| map_sqlx_error("decode_line_item", e);

    let product_id: Uuid = row.try_get("product_id").map_err(decode)?;
    let product_name: String = row.try_get("product_name").map_err(decode)?;
    let quantity: i64 = row.try_get("quantity").map_err(decode)?;
    let unit_price: i64 = row.try_get("unit_price").map_err(decode)?;

    PurchaseLineItem::restore(
        ProductId::new(AggregateId::from_uuid(product_id)),
        product_name,
        from_db_u32("quantity", quantity)?,
        Money::from_minor(from_db_u64("unit_price", unit_price)?),
    )
    .map_err(|e| StoreError::backend(format!("line item of product {product_id}: {e}")))
}

fn purchase_from_row(row: &PgRow, items: Vec<PurchaseLineItem>) -> Result<Purchase, StoreError> {
    let decode = |e| map_sqlx_error("decode_purchase", e);

    let id: i64 = row.try_get("purchase_id").map_err(decode)?;
    let buyer_id: Uuid = row.try_get("buyer_id").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let total: i64 = row.try_get("total").map_err(decode)?;

    let status = PurchaseStatus::parse(&status)
        .map_err(|e| StoreError::backend(format!("purchase {id}: {e}")))?;

    Purchase::restore(
        PurchaseId(from_db_u64("purchase_id", id)?),
        UserId::from_uuid(buyer_id),
        created_at,
        status,
        Money::from_minor(from_db_u64("total", total)?),
        items,
    )
    .map_err(|e| StoreError::backend(format!("purchase {id}: {e}")))
}

/// Map SQLx errors to `StoreError`, classifying retryable database codes as conflicts.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            if matches!(code.as_ref(), "40001" | "40P01" | "23505") {
                return StoreError::conflict(format!("{operation}: {db_err}"));
            }
        }
    }
    StoreError::backend(format!("{operation}: {err}"))
}
