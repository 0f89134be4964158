//! mps-remote
//!
//! Marketplace boundary: the [`MarketplaceApi`] trait and its reqwest-backed
//! implementation.
//!
//! This crate only speaks HTTP. It does not decide what to submit or what to
//! do with a receipt; the engine in `mps-runtime` does.

mod error;
pub mod wire;

use std::time::Duration;

use mps_catalog::{RemoteListing, RemoteProduct};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

pub use error::RemoteError;
pub use wire::{Receipt, ReceiptItem, TicketAck, TicketItem};

use wire::{CatalogPage, RemovalBody, RemovalId, UpsertBody};

/// Listing size at which the marketplace stops paginating reliably.
pub const DEFAULT_CAPACITY_WARN: usize = 500;

/// Hard stop on catalog pagination, in case the marketplace keeps answering.
const MAX_CATALOG_PAGES: usize = 1_000;

/// Marketplace operations used by the reconciliation engine.
///
/// Implementations must be `Send + Sync`; the engine calls the upsert and
/// removal submissions concurrently.
#[async_trait::async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// `POST /products`. Empty input returns `Ok(None)` without a request.
    async fn submit_upserts(
        &self,
        products: &[RemoteProduct],
    ) -> Result<Option<TicketAck>, RemoteError>;

    /// `DELETE /products`. Empty input returns `Ok(None)` without a request.
    async fn submit_removals(&self, ids: &[String]) -> Result<Option<TicketAck>, RemoteError>;

    /// `GET /receipt/{ticket}`.
    async fn fetch_receipt(&self, ticket_id: &str) -> Result<Receipt, RemoteError>;

    /// `GET /products`, every page materialized.
    async fn fetch_remote_catalog(&self) -> Result<Vec<RemoteListing>, RemoteError>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
    /// `total_products` at or above this is logged as a capacity warning.
    pub capacity_warn: usize,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("password", &"<REDACTED>")
            .field("timeout", &self.timeout)
            .field("capacity_warn", &self.capacity_warn)
            .finish()
    }
}

/// Marketplace client. Stateless apart from the connection pool; clone freely.
///
/// Credentials are passed in by the caller; do not log them.
#[derive(Debug, Clone)]
pub struct HttpMarketplaceClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    capacity_warn: usize,
}

impl HttpMarketplaceClient {
    pub fn new(cfg: ClientConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            user: cfg.user,
            password: cfg.password,
            capacity_warn: cfg.capacity_warn,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .basic_auth(&self.user, Some(&self.password));
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        debug!(%method, %url, "marketplace request");
        let resp = req.send().await?;

        let status = resp.status();
        let text = resp.text().await?;

        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| RemoteError::Decode(format!("{method} {path}: {e}; body={text}")))
    }
}

#[async_trait::async_trait]
impl MarketplaceApi for HttpMarketplaceClient {
    async fn submit_upserts(
        &self,
        products: &[RemoteProduct],
    ) -> Result<Option<TicketAck>, RemoteError> {
        if products.is_empty() {
            return Ok(None);
        }
        let ack: TicketAck = self
            .send(Method::POST, "/products", &[], Some(&UpsertBody { products }))
            .await?;
        Ok(Some(ack))
    }

    async fn submit_removals(&self, ids: &[String]) -> Result<Option<TicketAck>, RemoteError> {
        if ids.is_empty() {
            return Ok(None);
        }
        let body = RemovalBody {
            products: ids.iter().map(|id| RemovalId { id }).collect(),
        };
        let ack: TicketAck = self
            .send(Method::DELETE, "/products", &[], Some(&body))
            .await?;
        Ok(Some(ack))
    }

    async fn fetch_receipt(&self, ticket_id: &str) -> Result<Receipt, RemoteError> {
        let path = format!("/receipt/{ticket_id}");
        self.send::<(), Receipt>(Method::GET, &path, &[], None)
            .await
    }

    async fn fetch_remote_catalog(&self) -> Result<Vec<RemoteListing>, RemoteError> {
        let mut out: Vec<RemoteListing> = Vec::new();

        for page in 1..=MAX_CATALOG_PAGES {
            let body: CatalogPage = self
                .send::<(), CatalogPage>(
                    Method::GET,
                    "/products",
                    &[("page", page.to_string())],
                    None,
                )
                .await?;

            let total = body.pagination.total_products;
            if page == 1 && total >= self.capacity_warn {
                warn!(
                    total_products = total,
                    ceiling = self.capacity_warn,
                    "marketplace catalog at or above page-size ceiling"
                );
            }

            let got = body.products.len();
            out.extend(body.products);
            debug!(page, got, total, collected = out.len(), "catalog page");

            if got == 0 || out.len() >= total {
                break;
            }
        }

        Ok(out)
    }
}

// -----------------
// Tests (no network)
// -----------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let cfg = ClientConfig {
            base_url: "https://m.test".into(),
            user: "shop".into(),
            password: "hunter2".into(),
            timeout: Duration::from_secs(5),
            capacity_warn: DEFAULT_CAPACITY_WARN,
        };
        let s = format!("{cfg:?}");
        assert!(!s.contains("hunter2"));
        assert!(s.contains("<REDACTED>"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = HttpMarketplaceClient::new(ClientConfig {
            base_url: "https://m.test/api/".into(),
            user: "u".into(),
            password: "p".into(),
            timeout: Duration::from_secs(5),
            capacity_warn: DEFAULT_CAPACITY_WARN,
        })
        .unwrap();
        assert_eq!(c.url("/products"), "https://m.test/api/products");
    }

    #[test]
    fn api_is_object_safe() {
        fn _takes(_: &dyn MarketplaceApi) {}
    }
}
