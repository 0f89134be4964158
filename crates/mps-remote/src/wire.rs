//! Marketplace request/response bodies.

use chrono::NaiveDateTime;
use mps_catalog::{RemoteListing, RemoteProduct};
use serde::{Deserialize, Deserializer, Serialize};

/// `requestTimestamp` layout used by receipts (no zone).
pub const RECEIPT_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Serialize)]
pub(crate) struct UpsertBody<'a> {
    pub products: &'a [RemoteProduct],
}

#[derive(Debug, Serialize)]
pub(crate) struct RemovalId<'a> {
    pub id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RemovalBody<'a> {
    pub products: Vec<RemovalId<'a>>,
}

/// Immediate answer to a batch submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAck {
    #[serde(rename = "ticket")]
    pub id: String,
    #[serde(default)]
    pub results: Vec<TicketItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketItem {
    pub product_id: String,
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

/// Polled outcome of a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub finished: bool,
    #[serde(default)]
    pub quantity: u32,
    #[serde(
        rename = "requestTimestamp",
        default,
        deserialize_with = "receipt_timestamp",
        skip_serializing
    )]
    pub request_timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub results: Vec<ReceiptItem>,
}

impl Receipt {
    /// `(product_id, status)` pairs, in receipt order.
    pub fn statuses(&self) -> impl Iterator<Item = (&str, u16)> {
        self.results.iter().map(|r| (r.product_id.as_str(), r.status))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub product_id: String,
    pub status: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub warning_messages: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default)]
    pub current_page: usize,
    #[serde(default)]
    pub products_per_page: usize,
    #[serde(default)]
    pub total_products: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct CatalogPage {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub products: Vec<RemoteListing>,
}

fn receipt_timestamp<'de, D>(d: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDateTime::parse_from_str(s, RECEIPT_TS_FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn null_as_empty<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}
