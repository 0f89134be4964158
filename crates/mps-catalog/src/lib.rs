//! mps-catalog
//!
//! Catalog domain types shared by every other crate:
//! - `LocalProduct`: a storefront product row as read from the local store.
//! - `RemoteProduct`: the outbound marketplace wire shape (derived, never stored).
//! - `RemoteListing`: the inbound view the marketplace reports back.
//! - `Translator`: the pure local -> remote mapping.
//! - `CatalogReader` / `WatermarkStore`: the storage boundary the engine consumes.
//!
//! Deterministic, pure logic apart from the async trait definitions. No IO.

mod product;
mod source;
mod translate;

pub use product::*;
pub use source::{CatalogReader, WatermarkStore, WATERMARK_PARAM};
pub use translate::{find_ean, is_available, Translator, TranslatorConfig};
