//! Cart lines as submitted by the storefront.

use order_store::ItemAttributes;
use order_store::records::{DEFAULT_CANVAS_BACKGROUND, DEFAULT_GROMMETS, DEFAULT_MATERIAL};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::pricing::PricedLine;

/// A priced cart line.
///
/// Deserialization is lenient the way the storefront needs: missing or
/// null fields take their defaults and `quantity` defaults to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "nullable")]
    pub unit_price_cents: i64,
    #[serde(default = "one", deserialize_with = "quantity_or_one")]
    pub quantity: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub line_total_cents: i64,
    #[serde(flatten)]
    pub configuration: ItemConfiguration,
}

/// Manufacturing and artwork choices for one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemConfiguration {
    #[serde(default, deserialize_with = "nullable")]
    pub width_in: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub height_in: f64,
    #[serde(default = "default_material", deserialize_with = "material_or_default")]
    pub material: String,
    #[serde(default = "default_grommets", deserialize_with = "grommets_or_default")]
    pub grommets: String,
    #[serde(default, deserialize_with = "nullable")]
    pub rope_feet: f64,
    #[serde(default)]
    pub pole_pockets: Option<PolePockets>,
    #[serde(default)]
    pub pole_pocket_position: Option<String>,
    #[serde(default)]
    pub pole_pocket_size: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub pole_pocket_cost_cents: i64,
    #[serde(default)]
    pub file_key: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub print_ready_url: Option<String>,
    #[serde(default)]
    pub web_preview_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub text_elements: Option<Value>,
    #[serde(default)]
    pub overlay_image: Option<Value>,
    #[serde(default)]
    pub overlay_images: Option<Value>,
    #[serde(default)]
    pub canvas_background_color: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub design_service_enabled: bool,
    #[serde(default)]
    pub design_request_text: Option<String>,
    #[serde(default)]
    pub design_draft_preference: Option<String>,
    #[serde(default)]
    pub design_draft_contact: Option<String>,
    #[serde(default)]
    pub design_uploaded_assets: Option<Value>,
}

impl Default for ItemConfiguration {
    fn default() -> Self {
        Self {
            width_in: 0.0,
            height_in: 0.0,
            material: default_material(),
            grommets: default_grommets(),
            rope_feet: 0.0,
            pole_pockets: None,
            pole_pocket_position: None,
            pole_pocket_size: None,
            pole_pocket_cost_cents: 0,
            file_key: None,
            file_url: None,
            print_ready_url: None,
            web_preview_url: None,
            thumbnail_url: None,
            text_elements: None,
            overlay_image: None,
            overlay_images: None,
            canvas_background_color: None,
            design_service_enabled: false,
            design_request_text: None,
            design_draft_preference: None,
            design_draft_contact: None,
            design_uploaded_assets: None,
        }
    }
}

/// Pole pockets arrive either as a flag or as a position name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolePockets {
    Flag(bool),
    Position(String),
}

impl PolePockets {
    /// `"none"`, `"false"` and blank positions mean no pockets.
    pub fn enabled(&self) -> bool {
        match self {
            PolePockets::Flag(flag) => *flag,
            PolePockets::Position(position) => {
                let position = position.trim();
                !(position.is_empty()
                    || position.eq_ignore_ascii_case("none")
                    || position.eq_ignore_ascii_case("false"))
            }
        }
    }

    fn position(&self) -> Option<&str> {
        match self {
            PolePockets::Position(position) if self.enabled() => Some(position.trim()),
            _ => None,
        }
    }
}

impl LineItem {
    /// A line with default configuration.
    pub fn new(unit_price_cents: i64, quantity: i64, line_total_cents: i64) -> Self {
        Self {
            unit_price_cents,
            quantity,
            line_total_cents,
            configuration: ItemConfiguration::default(),
        }
    }

    pub fn with_configuration(mut self, configuration: ItemConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Converts into the persisted attribute shape, clamping amounts that
    /// cannot be negative.
    pub fn into_attributes(self) -> ItemAttributes {
        let c = self.configuration;
        let pole_pockets = c.pole_pockets.as_ref().is_some_and(PolePockets::enabled);
        let pole_pocket_position = c.pole_pocket_position.clone().or_else(|| {
            c.pole_pockets
                .as_ref()
                .and_then(PolePockets::position)
                .map(str::to_string)
        });

        ItemAttributes {
            width_in: finite_or_zero(c.width_in),
            height_in: finite_or_zero(c.height_in),
            quantity: i32::try_from(self.quantity.max(0)).unwrap_or(i32::MAX),
            material: c.material,
            grommets: c.grommets,
            rope_feet: finite_or_zero(c.rope_feet),
            pole_pockets,
            pole_pocket_position,
            pole_pocket_size: c.pole_pocket_size,
            pole_pocket_cost_cents: c.pole_pocket_cost_cents.max(0),
            unit_price_cents: self.unit_price_cents.max(0),
            line_total_cents: self.line_total_cents.max(0),
            file_key: c.file_key,
            file_url: c.file_url,
            print_ready_url: c.print_ready_url,
            web_preview_url: c.web_preview_url,
            thumbnail_url: c.thumbnail_url,
            text_elements: c
                .text_elements
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| Value::Array(Vec::new())),
            overlay_image: c.overlay_image.filter(|v| !v.is_null()),
            overlay_images: c.overlay_images.filter(|v| !v.is_null()),
            canvas_background_color: c
                .canvas_background_color
                .filter(|color| !color.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CANVAS_BACKGROUND.to_string()),
            design_service_enabled: c.design_service_enabled,
            design_request_text: c.design_request_text,
            design_draft_preference: c.design_draft_preference,
            design_draft_contact: c.design_draft_contact,
            design_uploaded_assets: c.design_uploaded_assets.filter(|v| !v.is_null()),
        }
    }
}

impl PricedLine for LineItem {
    fn line_total_cents(&self) -> i64 {
        self.line_total_cents
    }

    fn quantity(&self) -> i64 {
        self.quantity
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn one() -> i64 {
    1
}

fn default_material() -> String {
    DEFAULT_MATERIAL.to_string()
}

fn default_grommets() -> String {
    DEFAULT_GROMMETS.to_string()
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn quantity_or_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(1))
}

fn material_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(default_material))
}

fn grommets_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(default_grommets))
}
