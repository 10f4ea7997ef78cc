use crate::{fields, units};
use nalda_types::product::Product;
use nalda_types::settings::ExportSettings;
use nalda_types::term::TermIndex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Stock value reported for units that track no quantity but are in stock.
pub const FALLBACK_STOCK: i64 = 999;

/// Column order of the marketplace feed. Written explicitly so a run with
/// zero sellable units still produces the header row.
pub const CSV_HEADERS: [&str; 37] = [
    "gtin",
    "title",
    "country",
    "condition",
    "price",
    "tax",
    "currency",
    "delivery_time_days",
    "stock",
    "return_days",
    "main_image_url",
    "brand",
    "category",
    "google_category",
    "seller_category",
    "description",
    "length_mm",
    "width_mm",
    "height_mm",
    "weight_g",
    "shipping_length_mm",
    "shipping_width_mm",
    "shipping_height_mm",
    "shipping_weight_g",
    "volume_ml",
    "size",
    "colour",
    "image_2_url",
    "image_3_url",
    "image_4_url",
    "image_5_url",
    "delete_product",
    "author",
    "language",
    "format",
    "year",
    "publisher",
];

/// One feed row per sellable unit. Field order matches `CSV_HEADERS`.
#[derive(Debug, Serialize, PartialEq)]
pub struct FeedRow {
    pub gtin: String,
    pub title: String,
    pub country: String,
    pub condition: String,
    pub price: String,
    pub tax: String,
    pub currency: String,
    pub delivery_time_days: String,
    pub stock: i64,
    pub return_days: String,
    pub main_image_url: String,
    pub brand: String,
    pub category: String,
    pub google_category: String,
    pub seller_category: String,
    pub description: String,
    pub length_mm: String,
    pub width_mm: String,
    pub height_mm: String,
    pub weight_g: String,
    pub shipping_length_mm: String,
    pub shipping_width_mm: String,
    pub shipping_height_mm: String,
    pub shipping_weight_g: String,
    pub volume_ml: String,
    pub size: String,
    pub colour: String,
    pub image_2_url: String,
    pub image_3_url: String,
    pub image_4_url: String,
    pub image_5_url: String,
    pub delete_product: String,
    pub author: String,
    pub language: String,
    pub format: String,
    pub year: String,
    pub publisher: String,
}

/// Why a unit was left out of the feed. A third reason, a unit that could not
/// be materialized at all, is tallied by the engine before row building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    NoGtin,
    NoPrice,
}

pub fn build_row(
    unit: &Product,
    parent: Option<&Product>,
    settings: &ExportSettings,
    terms: &TermIndex,
) -> Result<FeedRow, Skip> {
    let gtin = fields::resolve_gtin(unit, parent);
    if settings.require_gtin && gtin.is_empty() {
        return Err(Skip::NoGtin);
    }
    let price = match unit.price {
        Some(price) if price > Decimal::ZERO => price,
        _ => return Err(Skip::NoPrice),
    };

    let stock = match unit.stock {
        Some(quantity) => quantity.max(0),
        None if unit.in_stock => FALLBACK_STOCK,
        None => 0,
    };

    let images = fields::resolve_images(unit, parent);
    let mut gallery = images.gallery.into_iter();
    let categories = fields::resolve_categories(unit, parent, terms);
    let mut brand = fields::resolve_brand(unit, parent, terms);
    if brand.is_empty() {
        brand = settings.default_brand.clone();
    }

    Ok(FeedRow {
        gtin,
        title: fields::resolve_title(unit, parent),
        country: settings.country.clone(),
        condition: settings.condition.as_str().to_string(),
        price: format_price(price),
        tax: settings.tax_rate.clone(),
        currency: settings.currency.clone(),
        delivery_time_days: settings.delivery_days.clone(),
        stock,
        return_days: settings.return_days.clone(),
        main_image_url: images.main,
        brand,
        category: categories.primary,
        google_category: String::new(),
        seller_category: categories.seller,
        description: fields::resolve_description(unit, parent),
        length_mm: units::to_millimeters(unit.length, &unit.dimension_unit),
        width_mm: units::to_millimeters(unit.width, &unit.dimension_unit),
        height_mm: units::to_millimeters(unit.height, &unit.dimension_unit),
        weight_g: units::to_grams(unit.weight, &unit.weight_unit),
        shipping_length_mm: String::new(),
        shipping_width_mm: String::new(),
        shipping_height_mm: String::new(),
        shipping_weight_g: String::new(),
        volume_ml: String::new(),
        size: fields::resolve_size(unit, parent),
        colour: fields::resolve_colour(unit, parent),
        image_2_url: gallery.next().unwrap_or_default(),
        image_3_url: gallery.next().unwrap_or_default(),
        image_4_url: gallery.next().unwrap_or_default(),
        image_5_url: gallery.next().unwrap_or_default(),
        delete_product: String::new(),
        author: String::new(),
        language: settings.language.clone(),
        format: String::new(),
        year: String::new(),
        publisher: String::new(),
    })
}

fn format_price(price: Decimal) -> String {
    format!(
        "{:.2}",
        price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::fields::tests::product;
    use rust_decimal_macros::dec;

    fn settings() -> ExportSettings {
        ExportSettings::default()
    }

    #[test]
    fn zero_price_is_skipped_regardless_of_gtin() {
        let mut p = product(1);
        p.meta.insert("_ean".to_string(), "4006381333931".to_string());
        p.price = Some(Decimal::ZERO);
        assert_eq!(
            Err(Skip::NoPrice),
            build_row(&p, None, &settings(), &TermIndex::default())
        );

        p.price = None;
        assert_eq!(
            Err(Skip::NoPrice),
            build_row(&p, None, &settings(), &TermIndex::default())
        );
    }

    #[test]
    fn missing_gtin_skips_only_when_required() {
        let mut p = product(1);
        p.price = Some(dec!(9.9));

        assert_eq!(
            Err(Skip::NoGtin),
            build_row(&p, None, &settings(), &TermIndex::default())
        );

        let mut relaxed = settings();
        relaxed.require_gtin = false;
        let row = build_row(&p, None, &relaxed, &TermIndex::default()).unwrap();
        assert_eq!("", row.gtin);
        assert_eq!("9.90", row.price);
    }

    #[test]
    fn price_is_formatted_with_two_decimals() {
        let mut p = product(1);
        p.sku = "12345678".to_string();
        p.price = Some(dec!(10));
        let row = build_row(&p, None, &settings(), &TermIndex::default()).unwrap();
        assert_eq!("10.00", row.price);

        p.price = Some(dec!(10.005));
        let row = build_row(&p, None, &settings(), &TermIndex::default()).unwrap();
        assert_eq!("10.01", row.price);
    }

    #[test]
    fn missing_stock_uses_availability_flag() {
        let mut p = product(1);
        p.sku = "12345678".to_string();
        p.price = Some(dec!(5));

        p.stock = None;
        p.in_stock = true;
        let row = build_row(&p, None, &settings(), &TermIndex::default()).unwrap();
        assert_eq!(FALLBACK_STOCK, row.stock);

        p.in_stock = false;
        let row = build_row(&p, None, &settings(), &TermIndex::default()).unwrap();
        assert_eq!(0, row.stock);

        p.stock = Some(-4);
        let row = build_row(&p, None, &settings(), &TermIndex::default()).unwrap();
        assert_eq!(0, row.stock);

        p.stock = Some(12);
        let row = build_row(&p, None, &settings(), &TermIndex::default()).unwrap();
        assert_eq!(12, row.stock);
    }

    #[test]
    fn settings_fill_the_static_columns() {
        let mut p = product(1);
        p.sku = "12345678".to_string();
        p.price = Some(dec!(19.99));
        let mut settings = settings();
        settings.default_brand = "HouseBrand".to_string();
        settings.language = "de".to_string();

        let row = build_row(&p, None, &settings, &TermIndex::default()).unwrap();
        assert_eq!("CH", row.country);
        assert_eq!("new", row.condition);
        assert_eq!("8.1", row.tax);
        assert_eq!("CHF", row.currency);
        assert_eq!("1", row.delivery_time_days);
        assert_eq!("14", row.return_days);
        assert_eq!("HouseBrand", row.brand);
        assert_eq!("de", row.language);
        assert_eq!("", row.google_category);
    }

    #[test]
    fn dimensions_are_converted_per_unit_settings() {
        let mut p = product(1);
        p.sku = "12345678".to_string();
        p.price = Some(dec!(5));
        p.length = Some(dec!(2));
        p.width = Some(dec!(1));
        p.dimension_unit = "in".to_string();
        p.weight = Some(dec!(1.5));
        p.weight_unit = "kg".to_string();

        let row = build_row(&p, None, &settings(), &TermIndex::default()).unwrap();
        assert_eq!("51", row.length_mm);
        assert_eq!("25", row.width_mm);
        assert_eq!("", row.height_mm);
        assert_eq!("1500", row.weight_g);
    }
}
