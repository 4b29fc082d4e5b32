//! Schema versioning for the order tables.
//!
//! The schema is owned by the versioned migrations under `migrations/`.
//! [`ADDITIVE_CHANGES`] repeats the purely additive parts of those
//! migrations in idempotent form so a store whose migration run failed can
//! still heal itself one statement at a time.

use serde::{Deserialize, Serialize};

use crate::records::{DEFAULT_CANVAS_BACKGROUND, ItemAttributes};

/// Highest migration version this build knows about.
pub const EXPECTED_SCHEMA_VERSION: i64 = 4;

/// Which `order_items` columns the store can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaLevel {
    /// Every item column exists.
    Full,
    /// Only [`CORE_ITEM_COLUMNS`] are guaranteed.
    Core,
}

/// Item columns present since the first migration.
pub const CORE_ITEM_COLUMNS: &[&str] = &[
    "id",
    "order_id",
    "position",
    "width_in",
    "height_in",
    "quantity",
    "material",
    "grommets",
    "rope_feet",
    "pole_pockets",
    "pole_pocket_position",
    "pole_pocket_size",
    "pole_pocket_cost_cents",
    "unit_price_cents",
    "line_total_cents",
    "file_key",
];

/// Item columns added by later migrations.
pub const EXTENDED_ITEM_COLUMNS: &[&str] = &[
    "file_url",
    "print_ready_url",
    "web_preview_url",
    "thumbnail_url",
    "text_elements",
    "overlay_image",
    "overlay_images",
    "canvas_background_color",
    "design_service_enabled",
    "design_request_text",
    "design_draft_preference",
    "design_draft_contact",
    "design_uploaded_assets",
];

/// One idempotent schema statement.
#[derive(Debug, Clone, Copy)]
pub struct AdditiveChange {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Additive statements attempted independently when migrations fail.
pub const ADDITIVE_CHANGES: &[AdditiveChange] = &[
    AdditiveChange {
        name: "order_items.file_url",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS file_url TEXT",
    },
    AdditiveChange {
        name: "order_items.print_ready_url",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS print_ready_url TEXT",
    },
    AdditiveChange {
        name: "order_items.web_preview_url",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS web_preview_url TEXT",
    },
    AdditiveChange {
        name: "order_items.thumbnail_url",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS thumbnail_url TEXT",
    },
    AdditiveChange {
        name: "order_items.text_elements",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS text_elements JSONB NOT NULL DEFAULT '[]'::jsonb",
    },
    AdditiveChange {
        name: "order_items.overlay_image",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS overlay_image JSONB",
    },
    AdditiveChange {
        name: "order_items.overlay_images",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS overlay_images JSONB",
    },
    AdditiveChange {
        name: "order_items.canvas_background_color",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS canvas_background_color TEXT NOT NULL DEFAULT '#FFFFFF'",
    },
    AdditiveChange {
        name: "order_items.design_service_enabled",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS design_service_enabled BOOLEAN NOT NULL DEFAULT FALSE",
    },
    AdditiveChange {
        name: "order_items.design_request_text",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS design_request_text TEXT",
    },
    AdditiveChange {
        name: "order_items.design_draft_preference",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS design_draft_preference TEXT",
    },
    AdditiveChange {
        name: "order_items.design_draft_contact",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS design_draft_contact TEXT",
    },
    AdditiveChange {
        name: "order_items.design_uploaded_assets",
        sql: "ALTER TABLE order_items ADD COLUMN IF NOT EXISTS design_uploaded_assets JSONB",
    },
    AdditiveChange {
        name: "abandoned_carts",
        sql: r#"
            CREATE TABLE IF NOT EXISTS abandoned_carts (
                id UUID PRIMARY KEY,
                user_id UUID,
                email TEXT,
                cart_contents JSONB NOT NULL DEFAULT '[]'::jsonb,
                total_value_cents BIGINT NOT NULL DEFAULT 0,
                recovery_status TEXT NOT NULL DEFAULT 'active',
                last_activity_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                recovered_at TIMESTAMPTZ,
                recovered_order_id UUID
            )
        "#,
    },
    AdditiveChange {
        name: "email_events",
        sql: r#"
            CREATE TABLE IF NOT EXISTS email_events (
                id UUID PRIMARY KEY,
                order_id UUID NOT NULL,
                type TEXT NOT NULL,
                to_email TEXT NOT NULL,
                status TEXT NOT NULL,
                provider_msg_id TEXT,
                error_message TEXT,
                attempt INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
    },
];

/// Names of extended columns that carry a non-default value in any item.
///
/// These are the fields a core-level write would lose.
pub fn populated_extended_fields(items: &[ItemAttributes]) -> Vec<&'static str> {
    EXTENDED_ITEM_COLUMNS
        .iter()
        .copied()
        .filter(|column| items.iter().any(|item| has_extended_value(item, column)))
        .collect()
}

fn has_extended_value(item: &ItemAttributes, column: &str) -> bool {
    match column {
        "file_url" => item.file_url.is_some(),
        "print_ready_url" => item.print_ready_url.is_some(),
        "web_preview_url" => item.web_preview_url.is_some(),
        "thumbnail_url" => item.thumbnail_url.is_some(),
        "text_elements" => match &item.text_elements {
            serde_json::Value::Null => false,
            serde_json::Value::Array(values) => !values.is_empty(),
            _ => true,
        },
        "overlay_image" => item.overlay_image.is_some(),
        "overlay_images" => item.overlay_images.is_some(),
        "canvas_background_color" => item.canvas_background_color != DEFAULT_CANVAS_BACKGROUND,
        "design_service_enabled" => item.design_service_enabled,
        "design_request_text" => item.design_request_text.is_some(),
        "design_draft_preference" => item.design_draft_preference.is_some(),
        "design_draft_contact" => item.design_draft_contact.is_some(),
        "design_uploaded_assets" => item.design_uploaded_assets.is_some(),
        _ => false,
    }
}

/// Resets every extended field to the value a core-only row reads back as.
pub fn strip_extended(item: &mut ItemAttributes) {
    let defaults = ItemAttributes::default();
    item.file_url = None;
    item.print_ready_url = None;
    item.web_preview_url = None;
    item.thumbnail_url = None;
    item.text_elements = defaults.text_elements;
    item.overlay_image = None;
    item.overlay_images = None;
    item.canvas_background_color = defaults.canvas_background_color;
    item.design_service_enabled = false;
    item.design_request_text = None;
    item.design_draft_preference = None;
    item.design_draft_contact = None;
    item.design_uploaded_assets = None;
}
