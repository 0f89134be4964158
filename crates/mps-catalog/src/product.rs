use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Integer cents per currency unit.
pub const CENTS_SCALE: i64 = 100;

// ---------------------------------------------------------------------------
// Local side
// ---------------------------------------------------------------------------

/// Physical dimensions as stored by the storefront.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length_cm: i32,
    pub height_cm: i32,
    pub width_cm: i32,
    pub weight_g: i32,
}

/// One product row from the local catalog store.
///
/// The reader returns every field regardless of the commercialize/listed flags;
/// the engine decides what to do with unlisted and soft-deleted rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalProduct {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Free text shown as the description. May embed an `EAN; <code>` line.
    pub detail: String,
    /// Declared EAN. Empty when the storefront never set one.
    pub ean: String,
    pub price_cents: i64,
    pub dimensions: Dimensions,
    pub quantity: i32,
    pub commercialize: bool,
    /// "List on marketplace" flag.
    pub listed: bool,
    /// Image file names, in display order.
    pub images: Vec<String>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LocalProduct {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Soft-deleted rows are never eligible, whatever their flags say.
    pub fn is_eligible_for_listing(&self) -> bool {
        !self.is_deleted() && self.listed
    }

    /// Why this row belongs in a removal batch, or `None` if it should be upserted.
    pub fn removal_reason(&self) -> Option<RemovalReason> {
        if self.is_deleted() {
            Some(RemovalReason::Deleted)
        } else if !self.listed {
            Some(RemovalReason::Unlisted)
        } else {
            None
        }
    }
}

/// Why a product ID ended up in a removal batch. Diagnostics only; the wire
/// payload is the bare ID in every case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Deleted,
    Unlisted,
    /// Active on the marketplace but unknown to the local store.
    NeverExisted,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::Deleted => "deleted",
            RemovalReason::Unlisted => "unlisted",
            RemovalReason::NeverExisted => "never_existed",
        }
    }
}

/// A removal batch member.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RemovalCandidate {
    pub id: String,
    pub reason: RemovalReason,
}

impl RemovalCandidate {
    pub fn new(id: impl Into<String>, reason: RemovalReason) -> Self {
        Self {
            id: id.into(),
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound wire shape
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Installments {
    pub amount_months: u32,
    /// Price per month.
    pub price: f64,
}

/// Shipping block. Lengths in meters, weight in kilograms, both as 3-decimal strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockInfo {
    pub cross_docking: u32,
    pub height: String,
    pub length: String,
    pub width: String,
    pub weight: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// The marketplace expects `"true"` / `"false"` strings here.
    #[serde(serialize_with = "bool_as_str", deserialize_with = "bool_from_str")]
    pub main: bool,
    pub url: String,
}

/// Product as submitted to `POST /products`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteProduct {
    pub id: String,
    pub name: String,
    pub description: String,
    pub department: String,
    pub sub_department: String,
    pub ean: String,
    pub free_shipping: bool,
    pub base_price: f64,
    pub price: f64,
    pub installments: Installments,
    pub quantity: i32,
    pub availability: bool,
    pub stock_info: StockInfo,
    pub url_images: Vec<ImageUrl>,
    pub url: String,
}

impl RemoteProduct {
    pub fn price_cents(&self) -> i64 {
        cents_from_units(self.price)
    }
}

// ---------------------------------------------------------------------------
// Inbound view
// ---------------------------------------------------------------------------

/// Product as listed by `GET /products`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteListing {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub free_shipping: bool,
    #[serde(default)]
    pub base_price: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub installments: Option<Installments>,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub url: String,
    /// `false` means the marketplace already considers the item removed.
    #[serde(default)]
    pub active: bool,
}

impl RemoteListing {
    pub fn price_cents(&self) -> i64 {
        cents_from_units(self.price)
    }

    /// Field-wise equality against what we would submit.
    ///
    /// Compares id, free-shipping, price (in cents), quantity and URL. The
    /// `active` flag is checked separately by the audit.
    pub fn matches(&self, wanted: &RemoteProduct) -> bool {
        self.id == wanted.id
            && self.free_shipping == wanted.free_shipping
            && self.price_cents() == wanted.price_cents()
            && self.quantity == wanted.quantity
            && self.url == wanted.url
    }
}

// ---------------------------------------------------------------------------
// Money helpers
// ---------------------------------------------------------------------------

pub fn cents_to_units(cents: i64) -> f64 {
    cents as f64 / CENTS_SCALE as f64
}

pub fn cents_from_units(units: f64) -> i64 {
    (units * CENTS_SCALE as f64).round() as i64
}

fn bool_as_str<S: Serializer>(v: &bool, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(if *v { "true" } else { "false" })
}

fn bool_from_str<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Str(String),
    }
    match Raw::deserialize(d)? {
        Raw::Bool(b) => Ok(b),
        Raw::Str(s) => Ok(s.trim().eq_ignore_ascii_case("true")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(listed: bool, deleted: bool) -> LocalProduct {
        LocalProduct {
            id: "p1".to_string(),
            name: "Mouse".to_string(),
            category: "Periféricos".to_string(),
            detail: String::new(),
            ean: String::new(),
            price_cents: 4990,
            dimensions: Dimensions::default(),
            quantity: 3,
            commercialize: true,
            listed,
            images: vec![],
            updated_at: Utc::now(),
            deleted_at: if deleted { Some(Utc::now()) } else { None },
        }
    }

    #[test]
    fn soft_deleted_row_is_never_eligible() {
        let p = row(true, true);
        assert!(!p.is_eligible_for_listing());
        assert_eq!(p.removal_reason(), Some(RemovalReason::Deleted));
    }

    #[test]
    fn unlisted_row_is_removed_as_unlisted() {
        let p = row(false, false);
        assert_eq!(p.removal_reason(), Some(RemovalReason::Unlisted));
    }

    #[test]
    fn listed_row_has_no_removal_reason() {
        assert_eq!(row(true, false).removal_reason(), None);
    }

    #[test]
    fn image_main_flag_serializes_as_string() {
        let img = ImageUrl {
            main: true,
            url: "https://x/img/1/a.jpg".to_string(),
        };
        let v = serde_json::to_value(&img).unwrap();
        assert_eq!(v["main"], "true");

        let back: ImageUrl =
            serde_json::from_str(r#"{"main":"false","url":"u"}"#).unwrap();
        assert!(!back.main);
    }

    #[test]
    fn listing_decodes_with_missing_optional_fields() {
        let l: RemoteListing =
            serde_json::from_str(r#"{"id":"a","price":10.5,"quantity":2,"active":true}"#)
                .unwrap();
        assert_eq!(l.price_cents(), 1050);
        assert!(l.url.is_empty());
        assert!(l.installments.is_none());
    }

    #[test]
    fn cents_round_trip_survives_float_noise() {
        assert_eq!(cents_from_units(0.1 + 0.2), 30);
        assert_eq!(cents_from_units(cents_to_units(129_990)), 129_990);
    }
}
