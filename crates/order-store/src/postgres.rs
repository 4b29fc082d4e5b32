use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AbandonedCart, CartId, EmailEvent, EmailEventId, EmailKind, EmailStatus, InsertOutcome,
    ItemAttributes, NewAbandonedCart, NewEmailEvent, NewOrder, NotificationStatus, OrderId,
    OrderItemId, OrderItemRecord, OrderRecord, OrderStatus, OrderStore, OrderStoreExt,
    OrderTotals, Profile, RecoveryStatus, Result, SchemaLevel, ShippingAddress, StoreError, UserId,
    schema::{ADDITIVE_CHANGES, EXPECTED_SCHEMA_VERSION, EXTENDED_ITEM_COLUMNS},
    store::validate_new_order,
};

const CAPTURE_CONSTRAINT: &str = "orders_gateway_capture_id_key";

const ORDER_COLUMNS: &str = r#"
    id, user_id, email, customer_name,
    subtotal_cents, min_order_adjustment_cents, discount_cents, discount_label,
    discount_source, tax_cents, shipping_cents, total_cents, currency, status,
    gateway_order_id, gateway_capture_id,
    shipping_name, shipping_street, shipping_city, shipping_state, shipping_zip,
    shipping_country,
    confirmation_email_status, confirmation_emailed_at,
    admin_notification_status, admin_notification_sent_at, created_at
"#;

const CORE_ITEM_SELECT: &str = r#"
    id, order_id, position, width_in, height_in, quantity, material, grommets, rope_feet,
    pole_pockets, pole_pocket_position, pole_pocket_size, pole_pocket_cost_cents,
    unit_price_cents, line_total_cents, file_key, created_at
"#;

const FULL_ITEM_SELECT: &str = r#"
    id, order_id, position, width_in, height_in, quantity, material, grommets, rope_feet,
    pole_pockets, pole_pocket_position, pole_pocket_size, pole_pocket_cost_cents,
    unit_price_cents, line_total_cents, file_key,
    file_url, print_ready_url, web_preview_url, thumbnail_url, text_elements,
    overlay_image, overlay_images, canvas_background_color,
    design_service_enabled, design_request_text, design_draft_preference,
    design_draft_contact, design_uploaded_assets, created_at
"#;

const CART_COLUMNS: &str = r#"
    id, user_id, email, cart_contents, total_value_cents, recovery_status,
    last_activity_at, recovered_at, recovered_order_id
"#;

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
    level: SchemaLevel,
}

impl PostgresOrderStore {
    /// Creates a store over an already migrated pool.
    pub fn new(pool: PgPool, level: SchemaLevel) -> Self {
        Self { pool, level }
    }

    /// Brings the schema up to date and creates a store at whatever level
    /// the database ended up supporting.
    ///
    /// Never fails: a failed migration run falls back to applying each
    /// additive change independently, and every failure there is logged as
    /// a schema warning.
    pub async fn prepare(pool: PgPool) -> Self {
        let level = match Self::run_migrations(&pool).await {
            Ok(()) => SchemaLevel::Full,
            Err(e) => {
                tracing::warn!(error = %e, "migrations failed, attempting additive schema heal");
                Self::heal(&pool).await;
                Self::detect_level(&pool).await
            }
        };

        tracing::info!(?level, expected_version = EXPECTED_SCHEMA_VERSION, "order store ready");
        Self { pool, level }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(pool).await
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn heal(pool: &PgPool) {
        for change in ADDITIVE_CHANGES {
            if let Err(e) = sqlx::raw_sql(change.sql).execute(pool).await {
                metrics::counter!("schema_heal_failures_total").increment(1);
                tracing::warn!(change = change.name, error = %e, "schema heal step failed");
            }
        }
    }

    async fn detect_level(pool: &PgPool) -> SchemaLevel {
        let columns = sqlx::query(
            r#"
            SELECT column_name::text AS column_name
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = 'order_items'
            "#,
        )
        .fetch_all(pool)
        .await;

        match columns {
            Ok(rows) => {
                let present: HashSet<String> = rows
                    .iter()
                    .filter_map(|row| row.try_get::<String, _>("column_name").ok())
                    .collect();
                if EXTENDED_ITEM_COLUMNS
                    .iter()
                    .all(|column| present.contains(*column))
                {
                    SchemaLevel::Full
                } else {
                    SchemaLevel::Core
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not inspect order_items, assuming core schema");
                SchemaLevel::Core
            }
        }
    }

    /// Inserts a profile row.
    pub async fn insert_profile(&self, profile: &Profile) -> Result<()> {
        sqlx::query("INSERT INTO profiles (id, email, username) VALUES ($1, $2, $3)")
            .bind(profile.id.as_uuid())
            .bind(&profile.email)
            .bind(&profile.username)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts a cart snapshot.
    pub async fn insert_abandoned_cart(&self, cart: &NewAbandonedCart) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO abandoned_carts
                (id, user_id, email, cart_contents, total_value_cents, recovery_status, last_activity_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.user_id.map(|id| id.as_uuid()))
        .bind(&cart.email)
        .bind(&cart.cart_contents)
        .bind(cart.total_value_cents)
        .bind(cart.recovery_status.as_str())
        .bind(cart.last_activity_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn is_capture_conflict(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db_err) if db_err.constraint() == Some(CAPTURE_CONSTRAINT))
    }

    async fn existing_for_capture(&self, capture_id: &str) -> Result<InsertOutcome> {
        let order = self.find_order_by_capture(capture_id).await?.ok_or_else(|| {
            StoreError::Unavailable(format!(
                "capture {capture_id} conflicted but no order carries it"
            ))
        })?;
        let items = self.get_order_items(order.id).await?;
        Ok(InsertOutcome::Existing { order, items })
    }

    async fn insert_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item: &OrderItemRecord,
    ) -> std::result::Result<(), sqlx::Error> {
        let a = &item.attributes;
        match self.level {
            SchemaLevel::Full => {
                sqlx::query(
                    r#"
                    INSERT INTO order_items (
                        id, order_id, position, width_in, height_in, quantity, material, grommets,
                        rope_feet, pole_pockets, pole_pocket_position, pole_pocket_size,
                        pole_pocket_cost_cents, unit_price_cents, line_total_cents, file_key,
                        file_url, print_ready_url, web_preview_url, thumbnail_url,
                        text_elements, overlay_image, overlay_images, canvas_background_color,
                        design_service_enabled, design_request_text, design_draft_preference,
                        design_draft_contact, design_uploaded_assets, created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                            $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29,
                            $30)
                    "#,
                )
                .bind(item.id.as_uuid())
                .bind(item.order_id.as_uuid())
                .bind(item.position)
                .bind(a.width_in)
                .bind(a.height_in)
                .bind(a.quantity)
                .bind(&a.material)
                .bind(&a.grommets)
                .bind(a.rope_feet)
                .bind(a.pole_pockets)
                .bind(&a.pole_pocket_position)
                .bind(&a.pole_pocket_size)
                .bind(a.pole_pocket_cost_cents)
                .bind(a.unit_price_cents)
                .bind(a.line_total_cents)
                .bind(&a.file_key)
                .bind(&a.file_url)
                .bind(&a.print_ready_url)
                .bind(&a.web_preview_url)
                .bind(&a.thumbnail_url)
                .bind(&a.text_elements)
                .bind(&a.overlay_image)
                .bind(&a.overlay_images)
                .bind(&a.canvas_background_color)
                .bind(a.design_service_enabled)
                .bind(&a.design_request_text)
                .bind(&a.design_draft_preference)
                .bind(&a.design_draft_contact)
                .bind(&a.design_uploaded_assets)
                .bind(item.created_at)
                .execute(&mut **tx)
                .await?;
            }
            SchemaLevel::Core => {
                sqlx::query(
                    r#"
                    INSERT INTO order_items (
                        id, order_id, position, width_in, height_in, quantity, material, grommets,
                        rope_feet, pole_pockets, pole_pocket_position, pole_pocket_size,
                        pole_pocket_cost_cents, unit_price_cents, line_total_cents, file_key,
                        created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                            $17)
                    "#,
                )
                .bind(item.id.as_uuid())
                .bind(item.order_id.as_uuid())
                .bind(item.position)
                .bind(a.width_in)
                .bind(a.height_in)
                .bind(a.quantity)
                .bind(&a.material)
                .bind(&a.grommets)
                .bind(a.rope_feet)
                .bind(a.pole_pockets)
                .bind(&a.pole_pocket_position)
                .bind(&a.pole_pocket_size)
                .bind(a.pole_pocket_cost_cents)
                .bind(a.unit_price_cents)
                .bind(a.line_total_cents)
                .bind(&a.file_key)
                .bind(item.created_at)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<OrderRecord> {
        let status: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown order status {status:?}")))?;

        Ok(OrderRecord {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: row
                .try_get::<Option<Uuid>, _>("user_id")?
                .map(UserId::from_uuid),
            email: row.try_get("email")?,
            customer_name: row.try_get("customer_name")?,
            totals: OrderTotals {
                subtotal_cents: row.try_get("subtotal_cents")?,
                min_order_adjustment_cents: row.try_get("min_order_adjustment_cents")?,
                discount_cents: row.try_get("discount_cents")?,
                discount_label: row.try_get("discount_label")?,
                discount_source: row.try_get("discount_source")?,
                tax_cents: row.try_get("tax_cents")?,
                shipping_cents: row.try_get("shipping_cents")?,
                total_cents: row.try_get("total_cents")?,
            },
            currency: row.try_get("currency")?,
            status,
            gateway_order_id: row.try_get("gateway_order_id")?,
            gateway_capture_id: row.try_get("gateway_capture_id")?,
            shipping: ShippingAddress {
                name: row.try_get("shipping_name")?,
                street: row.try_get("shipping_street")?,
                city: row.try_get("shipping_city")?,
                state: row.try_get("shipping_state")?,
                zip: row.try_get("shipping_zip")?,
                country: row.try_get("shipping_country")?,
            },
            confirmation_email_status: NotificationStatus::parse(
                &row.try_get::<String, _>("confirmation_email_status")?,
            ),
            confirmation_emailed_at: row.try_get("confirmation_emailed_at")?,
            admin_notification_status: NotificationStatus::parse(
                &row.try_get::<String, _>("admin_notification_status")?,
            ),
            admin_notification_sent_at: row.try_get("admin_notification_sent_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_item(row: PgRow, level: SchemaLevel) -> Result<OrderItemRecord> {
        let mut attributes = ItemAttributes {
            width_in: row.try_get("width_in")?,
            height_in: row.try_get("height_in")?,
            quantity: row.try_get("quantity")?,
            material: row.try_get("material")?,
            grommets: row.try_get("grommets")?,
            rope_feet: row.try_get("rope_feet")?,
            pole_pockets: row.try_get("pole_pockets")?,
            pole_pocket_position: row.try_get("pole_pocket_position")?,
            pole_pocket_size: row.try_get("pole_pocket_size")?,
            pole_pocket_cost_cents: row.try_get("pole_pocket_cost_cents")?,
            unit_price_cents: row.try_get("unit_price_cents")?,
            line_total_cents: row.try_get("line_total_cents")?,
            file_key: row.try_get("file_key")?,
            ..ItemAttributes::default()
        };

        if level == SchemaLevel::Full {
            attributes.file_url = row.try_get("file_url")?;
            attributes.print_ready_url = row.try_get("print_ready_url")?;
            attributes.web_preview_url = row.try_get("web_preview_url")?;
            attributes.thumbnail_url = row.try_get("thumbnail_url")?;
            attributes.text_elements = row.try_get("text_elements")?;
            attributes.overlay_image = row.try_get("overlay_image")?;
            attributes.overlay_images = row.try_get("overlay_images")?;
            attributes.canvas_background_color = row.try_get("canvas_background_color")?;
            attributes.design_service_enabled = row.try_get("design_service_enabled")?;
            attributes.design_request_text = row.try_get("design_request_text")?;
            attributes.design_draft_preference = row.try_get("design_draft_preference")?;
            attributes.design_draft_contact = row.try_get("design_draft_contact")?;
            attributes.design_uploaded_assets = row.try_get("design_uploaded_assets")?;
        }

        Ok(OrderItemRecord {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            position: row.try_get("position")?,
            attributes,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_profile(row: PgRow) -> Result<Profile> {
        Ok(Profile {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            email: row.try_get("email")?,
            username: row.try_get("username")?,
        })
    }

    fn row_to_cart(row: PgRow) -> Result<AbandonedCart> {
        let status: String = row.try_get("recovery_status")?;
        let recovery_status = RecoveryStatus::parse(&status)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown recovery status {status:?}")))?;

        Ok(AbandonedCart {
            id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: row
                .try_get::<Option<Uuid>, _>("user_id")?
                .map(UserId::from_uuid),
            email: row.try_get("email")?,
            cart_contents: row.try_get("cart_contents")?,
            total_value_cents: row.try_get("total_value_cents")?,
            recovery_status,
            last_activity_at: row.try_get("last_activity_at")?,
            recovered_at: row.try_get("recovered_at")?,
            recovered_order_id: row
                .try_get::<Option<Uuid>, _>("recovered_order_id")?
                .map(OrderId::from_uuid),
        })
    }

    fn row_to_email_event(row: PgRow) -> Result<EmailEvent> {
        let kind: String = row.try_get("type")?;
        let status: String = row.try_get("status")?;

        Ok(EmailEvent {
            id: EmailEventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            kind: EmailKind::parse(&kind)
                .ok_or_else(|| StoreError::CorruptRow(format!("unknown email type {kind:?}")))?,
            recipient: row.try_get("to_email")?,
            status: EmailStatus::parse(&status)
                .ok_or_else(|| StoreError::CorruptRow(format!("unknown email status {status:?}")))?,
            provider_message_id: row.try_get("provider_msg_id")?,
            error_message: row.try_get("error_message")?,
            attempt: row.try_get("attempt")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    fn schema_level(&self) -> SchemaLevel {
        self.level
    }

    async fn find_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT id, email, username FROM profiles WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_profile).transpose()
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let row = sqlx::query(
            "SELECT id, email, username FROM profiles WHERE LOWER(email) = LOWER($1) LIMIT 1",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_profile).transpose()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<InsertOutcome> {
        validate_new_order(&order)?;

        if let Some(capture_id) = order.gateway_capture_id.as_deref()
            && self.find_order_by_capture(capture_id).await?.is_some()
        {
            return self.existing_for_capture(capture_id).await;
        }

        let now = Utc::now();
        let record = OrderRecord::from_new(&order, now);

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, email, customer_name,
                subtotal_cents, min_order_adjustment_cents, discount_cents, discount_label,
                discount_source, tax_cents, shipping_cents, total_cents, currency, status,
                gateway_order_id, gateway_capture_id,
                shipping_name, shipping_street, shipping_city, shipping_state, shipping_zip,
                shipping_country, confirmation_email_status, admin_notification_status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.user_id.map(|id| id.as_uuid()))
        .bind(&record.email)
        .bind(&record.customer_name)
        .bind(record.totals.subtotal_cents)
        .bind(record.totals.min_order_adjustment_cents)
        .bind(record.totals.discount_cents)
        .bind(&record.totals.discount_label)
        .bind(&record.totals.discount_source)
        .bind(record.totals.tax_cents)
        .bind(record.totals.shipping_cents)
        .bind(record.totals.total_cents)
        .bind(&record.currency)
        .bind(record.status.as_str())
        .bind(&record.gateway_order_id)
        .bind(&record.gateway_capture_id)
        .bind(&record.shipping.name)
        .bind(&record.shipping.street)
        .bind(&record.shipping.city)
        .bind(&record.shipping.state)
        .bind(&record.shipping.zip)
        .bind(&record.shipping.country)
        .bind(record.confirmation_email_status.as_str())
        .bind(record.admin_notification_status.as_str())
        .bind(record.created_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // A concurrent finalizer won the race for this capture
            if Self::is_capture_conflict(&e)
                && let Some(capture_id) = record.gateway_capture_id.as_deref()
            {
                tx.rollback().await?;
                return self.existing_for_capture(capture_id).await;
            }
            return Err(StoreError::Database(e));
        }

        let mut items = Vec::with_capacity(order.items.len());
        for (position, attributes) in (0..).zip(order.items) {
            let mut item = OrderItemRecord {
                id: OrderItemId::new(),
                order_id: record.id,
                position,
                attributes,
                created_at: now,
            };
            if self.level == SchemaLevel::Core {
                crate::schema::strip_extended(&mut item.attributes);
            }
            // Dropping the transaction on error rolls the order back
            self.insert_item(&mut tx, &item).await?;
            items.push(item);
        }

        tx.commit().await?;

        Ok(InsertOutcome::Created {
            order: record,
            items,
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let columns = match self.level {
            SchemaLevel::Full => FULL_ITEM_SELECT,
            SchemaLevel::Core => CORE_ITEM_SELECT,
        };
        let rows = sqlx::query(&format!(
            "SELECT {columns} FROM order_items WHERE order_id = $1 ORDER BY position ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Self::row_to_item(row, self.level))
            .collect()
    }

    async fn find_order_by_capture(&self, capture_id: &str) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE gateway_capture_id = $1"
        ))
        .bind(capture_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn link_capture(
        &self,
        order_id: OrderId,
        gateway_order_id: &str,
        capture_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET gateway_order_id = $2, gateway_capture_id = $3
            WHERE id = $1 AND (gateway_capture_id IS NULL OR gateway_capture_id = $3)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(gateway_order_id)
        .bind(capture_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(true),
            Ok(_) => match self.get_order(order_id).await? {
                None => Ok(false),
                Some(order) => match order.gateway_capture_id {
                    Some(existing) if existing != capture_id => {
                        Err(StoreError::OrderAlreadyCaptured {
                            order_id,
                            existing_capture_id: existing,
                        })
                    }
                    _ => Ok(false),
                },
            },
            Err(e) if Self::is_capture_conflict(&e) => {
                let existing = self
                    .find_order_by_capture(capture_id)
                    .await?
                    .map(|order| order.id)
                    .ok_or(StoreError::Database(e))?;
                Err(StoreError::CaptureAlreadyLinked {
                    capture_id: capture_id.to_string(),
                    existing,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn claim_confirmation(&self, order_id: OrderId) -> Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE orders
            SET confirmation_email_status = 'sending'
            WHERE id = $1
              AND confirmation_email_status = 'unsent'
              AND confirmation_emailed_at IS NULL
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.order_exists(order_id).await? {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(false)
    }

    async fn release_confirmation(&self, order_id: OrderId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET confirmation_email_status = 'unsent'
            WHERE id = $1 AND confirmation_email_status = 'sending'
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_confirmation_sent(&self, order_id: OrderId, at: DateTime<Utc>) -> Result<()> {
        let done = sqlx::query(
            r#"
            UPDATE orders
            SET confirmation_email_status = 'sent', confirmation_emailed_at = $2
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn mark_admin_notified(&self, order_id: OrderId, at: DateTime<Utc>) -> Result<()> {
        let done = sqlx::query(
            r#"
            UPDATE orders
            SET admin_notification_status = 'sent', admin_notification_sent_at = $2
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn find_recoverable_cart(
        &self,
        user_id: Option<UserId>,
        email: &str,
    ) -> Result<Option<AbandonedCart>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {CART_COLUMNS}
            FROM abandoned_carts
            WHERE recovery_status IN ('active', 'abandoned')
              AND (
                    ($1::uuid IS NOT NULL AND user_id = $1)
                 OR ($2 <> '' AND LOWER(email) = LOWER($2))
              )
            ORDER BY last_activity_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id.map(|id| id.as_uuid()))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_cart).transpose()
    }

    async fn mark_cart_recovered(
        &self,
        cart_id: CartId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE abandoned_carts
            SET recovery_status = 'recovered', recovered_at = $3, recovered_order_id = $2
            WHERE id = $1 AND recovery_status IN ('active', 'abandoned')
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected() == 1)
    }

    async fn append_email_event(&self, event: NewEmailEvent) -> Result<EmailEvent> {
        let event = EmailEvent::from_new(event, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO email_events
                (id, order_id, type, to_email, status, provider_msg_id, error_message, attempt, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.order_id.as_uuid())
        .bind(event.kind.as_str())
        .bind(&event.recipient)
        .bind(event.status.as_str())
        .bind(&event.provider_message_id)
        .bind(&event.error_message)
        .bind(event.attempt)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(event)
    }

    async fn email_events_for_order(&self, order_id: OrderId) -> Result<Vec<EmailEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, type, to_email, status, provider_msg_id, error_message, attempt, created_at
            FROM email_events
            WHERE order_id = $1
            ORDER BY created_at ASC, attempt ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_email_event).collect()
    }
}
