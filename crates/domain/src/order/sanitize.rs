//! Strips browser-local and inline artwork references before they are
//! persisted.

use order_store::ItemAttributes;
use serde_json::Value;

/// References longer than this are inline payloads, not URLs.
pub const MAX_REFERENCE_LEN: usize = 10_000;

/// URL-bearing keys inside overlay and uploaded-asset documents.
const NESTED_URL_KEYS: &[&str] = &["url", "originalUrl", "thumbnailUrl"];

/// True for `blob:` and `data:` URIs (any case) and oversized strings.
pub fn is_unsafe_reference(value: &str) -> bool {
    if value.len() > MAX_REFERENCE_LEN {
        return true;
    }
    let head = value.trim_start();
    ["blob:", "data:"].iter().any(|scheme| {
        head.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Nulls every unsafe reference on an item.
///
/// Returns the paths that were cleared, e.g. `file_url` or
/// `overlay_images[1].originalUrl`.
pub fn sanitize_item(item: &mut ItemAttributes) -> Vec<String> {
    let mut cleared = Vec::new();

    for (name, field) in [
        ("file_url", &mut item.file_url),
        ("print_ready_url", &mut item.print_ready_url),
        ("web_preview_url", &mut item.web_preview_url),
        ("thumbnail_url", &mut item.thumbnail_url),
    ] {
        if field.as_deref().is_some_and(is_unsafe_reference) {
            *field = None;
            cleared.push(name.to_string());
        }
    }

    if let Some(overlay) = item.overlay_image.as_mut() {
        sanitize_document(overlay, "overlay_image", &mut cleared);
    }
    if let Some(overlays) = item.overlay_images.as_mut() {
        sanitize_document(overlays, "overlay_images", &mut cleared);
    }
    if let Some(assets) = item.design_uploaded_assets.as_mut() {
        sanitize_document(assets, "design_uploaded_assets", &mut cleared);
    }

    cleared
}

fn sanitize_document(value: &mut Value, path: &str, cleared: &mut Vec<String>) {
    match value {
        Value::Array(entries) => {
            for (index, entry) in entries.iter_mut().enumerate() {
                sanitize_document(entry, &format!("{path}[{index}]"), cleared);
            }
        }
        Value::Object(map) => {
            for key in NESTED_URL_KEYS {
                if let Some(slot) = map.get_mut(*key)
                    && slot.as_str().is_some_and(is_unsafe_reference)
                {
                    *slot = Value::Null;
                    cleared.push(format!("{path}.{key}"));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn detects_unsafe_references() {
        assert!(is_unsafe_reference("blob:https://shop.test/1234"));
        assert!(is_unsafe_reference("BLOB:https://shop.test/1234"));
        assert!(is_unsafe_reference("data:image/png;base64,AAAA"));
        assert!(is_unsafe_reference(&"x".repeat(MAX_REFERENCE_LEN + 1)));

        assert!(!is_unsafe_reference("https://cdn.test/banner.png"));
        assert!(!is_unsafe_reference(&"x".repeat(MAX_REFERENCE_LEN)));
        assert!(!is_unsafe_reference(""));
        assert!(!is_unsafe_reference("da"));
    }

    #[test]
    fn clears_top_level_fields() {
        let mut item = ItemAttributes {
            file_url: Some("blob:https://shop.test/abc".into()),
            thumbnail_url: Some("data:image/png;base64,AAAA".into()),
            web_preview_url: Some("https://cdn.test/preview.png".into()),
            ..ItemAttributes::default()
        };

        let cleared = sanitize_item(&mut item);
        assert_eq!(cleared, vec!["file_url", "thumbnail_url"]);
        assert_eq!(item.file_url, None);
        assert_eq!(item.thumbnail_url, None);
        assert_eq!(
            item.web_preview_url.as_deref(),
            Some("https://cdn.test/preview.png")
        );
    }

    #[test]
    fn clears_nested_overlay_and_asset_urls() {
        let mut item = ItemAttributes {
            overlay_image: Some(json!({
                "url": "data:image/png;base64,AAAA",
                "originalUrl": "https://cdn.test/logo.png",
                "scale": 0.5,
            })),
            overlay_images: Some(json!([
                { "url": "https://cdn.test/a.png" },
                { "url": "https://cdn.test/b.png", "thumbnailUrl": "blob:https://shop.test/t" },
            ])),
            design_uploaded_assets: Some(json!([{ "url": "blob:https://shop.test/asset" }])),
            ..ItemAttributes::default()
        };

        let cleared = sanitize_item(&mut item);
        assert_eq!(
            cleared,
            vec![
                "overlay_image.url",
                "overlay_images[1].thumbnailUrl",
                "design_uploaded_assets[0].url",
            ]
        );
        assert_eq!(
            item.overlay_image,
            Some(json!({
                "url": null,
                "originalUrl": "https://cdn.test/logo.png",
                "scale": 0.5,
            }))
        );
        assert_eq!(
            item.overlay_images.as_ref().unwrap()[1]["url"],
            json!("https://cdn.test/b.png")
        );
    }

    #[test]
    fn clean_items_are_untouched() {
        let mut item = ItemAttributes {
            file_url: Some("https://cdn.test/banner.png".into()),
            ..ItemAttributes::default()
        };
        let before = item.clone();
        assert!(sanitize_item(&mut item).is_empty());
        assert_eq!(item, before);
    }
}
