//! Local -> marketplace record translation.
//!
//! Everything here is a pure function of the input row and the translator
//! configuration; two calls with the same inputs produce identical output.

use serde::{Deserialize, Serialize};

use crate::product::{
    cents_to_units, ImageUrl, Installments, LocalProduct, RemoteProduct, StockInfo,
};

/// Static business rules applied to every outbound record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Storefront origin used to build product and image URLs (no trailing slash needed).
    pub storefront_url: String,
    pub department: String,
    pub cross_docking_days: u32,
    pub installment_months: u32,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            storefront_url: "https://www.example.com".to_string(),
            department: "Informática".to_string(),
            cross_docking_days: 2,
            installment_months: 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Translator {
    cfg: TranslatorConfig,
    origin: String,
}

impl Translator {
    pub fn new(cfg: TranslatorConfig) -> Self {
        let origin = cfg.storefront_url.trim_end_matches('/').to_string();
        Self { cfg, origin }
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.cfg
    }

    pub fn product_url(&self, id: &str) -> String {
        format!("{}/product/{}", self.origin, id)
    }

    pub fn image_url(&self, id: &str, image: &str) -> String {
        format!("{}/img/{}/{}", self.origin, id, image)
    }

    /// Build the outbound marketplace record for `p`.
    pub fn to_remote(&self, p: &LocalProduct) -> RemoteProduct {
        let ean = if p.ean.trim().is_empty() {
            find_ean(&p.detail)
        } else {
            p.ean.clone()
        };

        let price = cents_to_units(p.price_cents);

        let url_images = p
            .images
            .iter()
            .enumerate()
            .map(|(i, img)| ImageUrl {
                main: i == 0,
                url: self.image_url(&p.id, img),
            })
            .collect();

        RemoteProduct {
            id: p.id.clone(),
            name: p.name.clone(),
            description: p.detail.clone(),
            department: self.cfg.department.clone(),
            sub_department: p.category.clone(),
            ean,
            free_shipping: false,
            base_price: price,
            price,
            installments: Installments {
                amount_months: self.cfg.installment_months,
                price: cents_to_units(self.installment_cents(p.price_cents)),
            },
            quantity: p.quantity,
            availability: is_available(p),
            stock_info: StockInfo {
                cross_docking: self.cfg.cross_docking_days,
                height: centi_to_unit_str(p.dimensions.height_cm, 100),
                length: centi_to_unit_str(p.dimensions.length_cm, 100),
                width: centi_to_unit_str(p.dimensions.width_cm, 100),
                weight: centi_to_unit_str(p.dimensions.weight_g, 1000),
            },
            url_images,
            url: self.product_url(&p.id),
        }
    }

    /// Removal batches carry only the ID.
    pub fn to_removal_id(&self, p: &LocalProduct) -> String {
        p.id.clone()
    }

    /// Per-month price, truncated to the cent.
    pub fn installment_cents(&self, price_cents: i64) -> i64 {
        let months = i64::from(self.cfg.installment_months.max(1));
        price_cents.div_euclid(months)
    }
}

/// Derived availability flag.
///
/// Listing is decided by the caller (unlisted rows go to the removal batch), so
/// an unlisted row is reported unavailable here as well.
pub fn is_available(p: &LocalProduct) -> bool {
    p.listed && p.commercialize && p.quantity > 0 && p.price_cents > 0 && !p.name.is_empty()
}

/// Extract an EAN from free text.
///
/// Takes the first line containing `ean` (any case) and returns the trimmed
/// field following its first `;`. No match, or a matching line without a
/// `;`, yields an empty string.
pub fn find_ean(text: &str) -> String {
    let Some(line) = text
        .split('\n')
        .find(|line| line.to_lowercase().contains("ean"))
    else {
        return String::new();
    };

    line.split(';')
        .nth(1)
        .map(|field| field.trim().to_string())
        .unwrap_or_default()
}

fn centi_to_unit_str(value: i32, per_unit: i32) -> String {
    format!("{:.3}", f64::from(value) / f64::from(per_unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Dimensions;
    use chrono::{TimeZone, Utc};

    fn base() -> LocalProduct {
        LocalProduct {
            id: "5c8f1a".to_string(),
            name: "SSD 480GB".to_string(),
            category: "Armazenamento".to_string(),
            detail: "Leitura 500MB/s".to_string(),
            ean: "7890000000001".to_string(),
            price_cents: 29_990,
            dimensions: Dimensions {
                length_cm: 12,
                height_cm: 1,
                width_cm: 8,
                weight_g: 250,
            },
            quantity: 4,
            commercialize: true,
            listed: true,
            images: vec!["a.jpg".to_string(), "b.jpg".to_string(), "c.jpg".to_string()],
            updated_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            deleted_at: None,
        }
    }

    fn tr() -> Translator {
        Translator::new(TranslatorConfig {
            storefront_url: "https://shop.test/".to_string(),
            ..TranslatorConfig::default()
        })
    }

    #[test]
    fn availability_requires_every_condition() {
        assert!(is_available(&base()));

        let mut p = base();
        p.commercialize = false;
        assert!(!is_available(&p));

        let mut p = base();
        p.quantity = 0;
        assert!(!is_available(&p));

        let mut p = base();
        p.price_cents = 0;
        assert!(!is_available(&p));

        let mut p = base();
        p.name.clear();
        assert!(!is_available(&p));
    }

    #[test]
    fn zero_stock_still_translates_with_price() {
        let mut p = base();
        p.quantity = 0;
        let r = tr().to_remote(&p);
        assert!(!r.availability);
        assert_eq!(r.price_cents(), 29_990);
    }

    #[test]
    fn only_first_image_is_main_and_order_is_kept() {
        let r = tr().to_remote(&base());
        let mains: Vec<bool> = r.url_images.iter().map(|i| i.main).collect();
        assert_eq!(mains, vec![true, false, false]);
        assert_eq!(r.url_images[0].url, "https://shop.test/img/5c8f1a/a.jpg");
        assert_eq!(r.url_images[2].url, "https://shop.test/img/5c8f1a/c.jpg");
    }

    #[test]
    fn no_images_yields_empty_list() {
        let mut p = base();
        p.images.clear();
        assert!(tr().to_remote(&p).url_images.is_empty());
    }

    #[test]
    fn urls_and_category_path() {
        let r = tr().to_remote(&base());
        assert_eq!(r.url, "https://shop.test/product/5c8f1a");
        assert_eq!(r.department, "Informática");
        assert_eq!(r.sub_department, "Armazenamento");
        assert!(!r.free_shipping);
        assert_eq!(r.base_price, r.price);
    }

    #[test]
    fn dimensions_are_meters_and_kilograms() {
        let r = tr().to_remote(&base());
        assert_eq!(r.stock_info.length, "0.120");
        assert_eq!(r.stock_info.height, "0.010");
        assert_eq!(r.stock_info.width, "0.080");
        assert_eq!(r.stock_info.weight, "0.250");
        assert_eq!(r.stock_info.cross_docking, 2);
    }

    #[test]
    fn installment_price_truncates_to_cent() {
        let t = tr();
        assert_eq!(t.installment_cents(10_000), 3_333);
        let r = t.to_remote(&base());
        assert_eq!(r.installments.amount_months, 3);
        assert!((r.installments.price - 99.96).abs() < 1e-9);
    }

    #[test]
    fn declared_ean_wins_over_detail() {
        let mut p = base();
        p.detail = "EAN; 111".to_string();
        assert_eq!(tr().to_remote(&p).ean, "7890000000001");
    }

    #[test]
    fn missing_ean_falls_back_to_detail() {
        let mut p = base();
        p.ean.clear();
        p.detail = "Marca; X\nCódigo EAN; 7891234567890\n".to_string();
        assert_eq!(tr().to_remote(&p).ean, "7891234567890");
    }

    #[test]
    fn find_ean_rules() {
        assert_eq!(find_ean("EAN; 7891234567890"), "7891234567890");
        assert_eq!(find_ean("foo\nEAN: 7891234567890;extra\nbar"), "extra");
        assert_eq!(find_ean("ean;a;b"), "a");
        assert_eq!(find_ean("Ean ;  42  "), "42");
        assert_eq!(find_ean("no code here"), "");
        assert_eq!(find_ean(""), "");
        // matching line without a separator
        assert_eq!(find_ean("EAN 789\nother; 1"), "");
    }

    #[test]
    fn removal_id_is_passthrough() {
        assert_eq!(tr().to_removal_id(&base()), "5c8f1a");
    }

    #[test]
    fn translation_is_deterministic() {
        let t = tr();
        assert_eq!(t.to_remote(&base()), t.to_remote(&base()));
    }
}
