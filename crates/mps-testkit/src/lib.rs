//! mps-testkit
//!
//! In-memory stand-ins for the catalog store, the watermark store and the
//! marketplace API, plus small builders for product rows. The fakes record
//! every call so scenarios can assert on what the engine sent.

use std::fs;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use mps_catalog::{Dimensions, LocalProduct, RemoteListing, Translator};

mod fakes;

pub use fakes::{
    FakeMarketplace, InMemoryCatalog, InMemoryWatermarkStore, SubmissionGate, SubmittedTicket,
};

/// Fixed base instant so scenario timestamps are reproducible.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// `t0() + secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

/// A listed, sellable product updated at `updated_at`.
pub fn product(id: &str, updated_at: DateTime<Utc>) -> LocalProduct {
    LocalProduct {
        id: id.to_string(),
        name: format!("Produto {id}"),
        category: "Periféricos".to_string(),
        detail: format!("Marca; Genérica\nEAN; 789{:0>10}", id.len()),
        ean: String::new(),
        price_cents: 10_000,
        dimensions: Dimensions {
            length_cm: 20,
            height_cm: 5,
            width_cm: 15,
            weight_g: 400,
        },
        quantity: 5,
        commercialize: true,
        listed: true,
        images: vec![format!("{id}-1.jpg"), format!("{id}-2.jpg")],
        updated_at,
        deleted_at: None,
    }
}

pub fn deleted(mut p: LocalProduct) -> LocalProduct {
    p.deleted_at = Some(p.updated_at);
    p
}

pub fn unlisted(mut p: LocalProduct) -> LocalProduct {
    p.listed = false;
    p
}

/// The active marketplace listing that exactly reflects `p`.
pub fn listing_for(translator: &Translator, p: &LocalProduct) -> RemoteListing {
    let r = translator.to_remote(p);
    RemoteListing {
        id: r.id,
        name: r.name,
        free_shipping: r.free_shipping,
        base_price: r.base_price,
        price: r.price,
        installments: Some(r.installments),
        quantity: r.quantity,
        url: r.url,
        active: true,
    }
}

/// Load product rows from a JSON array file.
pub fn load_products_json(path: &str) -> Result<Vec<LocalProduct>> {
    let s = fs::read_to_string(path).with_context(|| format!("read products fixture: {path}"))?;
    let rows: Vec<LocalProduct> = serde_json::from_str(&s).context("parse products json")?;

    for w in rows.windows(2) {
        if w[0].updated_at > w[1].updated_at {
            anyhow::bail!("fixture rows not ordered by updated_at: {}", w[1].id);
        }
    }
    Ok(rows)
}
