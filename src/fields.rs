use itertools::Itertools;
use lazy_regex::regex;
use nalda_types::product::Product;
use nalda_types::term::TermIndex;

pub const CATEGORY_TAXONOMY: &str = "product_cat";

const GTIN_META_KEYS: [&str; 11] = [
    "_gtin",
    "_ean",
    "_isbn",
    "_upc",
    "_barcode",
    "gtin",
    "ean",
    "isbn",
    "upc",
    "barcode",
    "_global_unique_id",
];

const BRAND_TAXONOMIES: [&str; 4] = ["product_brand", "pa_brand", "brand", "pwb-brand"];
const BRAND_META_KEYS: [&str; 3] = ["_brand", "brand", "_product_brand"];

const MAX_GALLERY_IMAGES: usize = 4;

fn meta_value<'a>(product: &'a Product, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| product.meta.get(*key))
        .map(String::as_str)
        .find(|v| !v.is_empty())
}

/// GTIN from the unit's meta, then the parent's, then the SKU when it looks
/// like a bare 8-14 digit code.
pub fn resolve_gtin(unit: &Product, parent: Option<&Product>) -> String {
    if let Some(gtin) = meta_value(unit, &GTIN_META_KEYS) {
        return gtin.to_string();
    }
    if let Some(gtin) = parent.and_then(|p| meta_value(p, &GTIN_META_KEYS)) {
        return gtin.to_string();
    }
    let sku = unit.sku.trim();
    if regex!(r"^[0-9]{8,14}$").is_match(sku) {
        return sku.to_string();
    }
    String::new()
}

/// Brand from the first matching brand taxonomy term, then brand meta keys.
/// Empty means the caller should fall back to the configured default brand.
pub fn resolve_brand(unit: &Product, parent: Option<&Product>, terms: &TermIndex) -> String {
    let owner = parent.unwrap_or(unit);
    for taxonomy in BRAND_TAXONOMIES {
        if let Some(term) = terms.terms_of(owner, taxonomy).first() {
            return term.name.clone();
        }
    }
    meta_value(unit, &BRAND_META_KEYS)
        .map(ToString::to_string)
        .unwrap_or_default()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CategoryPaths {
    pub primary: String,
    pub seller: String,
}

/// Walks every assigned category up its parent chain. The primary category is
/// the first term's full path; the seller category joins all distinct paths
/// with the same " > " separator the paths themselves use.
pub fn resolve_categories(
    unit: &Product,
    parent: Option<&Product>,
    terms: &TermIndex,
) -> CategoryPaths {
    let owner = parent.unwrap_or(unit);
    let paths: Vec<String> = terms
        .terms_of(owner, CATEGORY_TAXONOMY)
        .into_iter()
        .map(|term| terms.chain(term).path())
        .collect();
    let primary = paths.first().cloned().unwrap_or_default();
    let seller = paths
        .into_iter()
        .unique()
        .join(nalda_types::term::PATH_SEPARATOR);
    CategoryPaths { primary, seller }
}

/// A product attribute, checked on the variation first (namespaced then bare
/// key), then on the parent.
pub fn resolve_attribute(unit: &Product, parent: Option<&Product>, name: &str) -> String {
    let keys = [format!("pa_{name}"), name.to_string()];
    if unit.is_variation() {
        for key in &keys {
            if let Some(value) = unit.attributes.get(key).filter(|v| !v.is_empty()) {
                return value.clone();
            }
        }
    }
    let owner = parent.unwrap_or(unit);
    for key in &keys {
        if let Some(value) = owner.attributes.get(key).filter(|v| !v.is_empty()) {
            return value.clone();
        }
    }
    String::new()
}

pub fn resolve_colour(unit: &Product, parent: Option<&Product>) -> String {
    let colour = resolve_attribute(unit, parent, "color");
    if colour.is_empty() {
        resolve_attribute(unit, parent, "colour")
    } else {
        colour
    }
}

pub fn resolve_size(unit: &Product, parent: Option<&Product>) -> String {
    resolve_attribute(unit, parent, "size")
}

/// Parent name for variations, with the selected attribute values appended.
pub fn resolve_title(unit: &Product, parent: Option<&Product>) -> String {
    let mut title = parent
        .map(|p| p.name.clone())
        .unwrap_or_else(|| unit.name.clone());
    if unit.is_variation() {
        let parts = unit
            .attributes
            .iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
            .join(", ");
        if !parts.is_empty() {
            title.push_str(" - ");
            title.push_str(&parts);
        }
    }
    title
}

/// Long description falling back to the short one, stripped of markup.
pub fn resolve_description(unit: &Product, parent: Option<&Product>) -> String {
    let owner = parent.unwrap_or(unit);
    let raw = if owner.description.is_empty() {
        &owner.short_description
    } else {
        &owner.description
    };
    crate::strip_html(raw)
}

#[derive(Debug, Default)]
pub struct ResolvedImages {
    pub main: String,
    pub gallery: Vec<String>,
}

/// Main image from the unit or its parent; up to four gallery images, the
/// parent's gallery used only when the unit has none of its own.
pub fn resolve_images(unit: &Product, parent: Option<&Product>) -> ResolvedImages {
    let main = unit
        .image
        .clone()
        .filter(|url| !url.is_empty())
        .or_else(|| {
            parent.and_then(|p| p.image.clone()).filter(|url| !url.is_empty())
        })
        .unwrap_or_default();
    let gallery = if unit.gallery.is_empty() {
        parent.map(|p| p.gallery.as_slice()).unwrap_or_default()
    } else {
        unit.gallery.as_slice()
    };
    ResolvedImages {
        main,
        gallery: gallery.iter().take(MAX_GALLERY_IMAGES).cloned().collect(),
    }
}
