// ABOUTME: Main library entry point for the pricewatch price extraction and resolution engine.
// ABOUTME: Re-exports the public API: PriceEngine, EngineBuilder, ExtractionResult, overrides, and error types.

//! Pricewatch - resolves the current retail price published on a supplier's product page.
//!
//! The engine acquires the page (plain HTTP first, a rendered browser session
//! as fallback), runs an ordered list of independent price extractors over the
//! content, and resolves their candidates by confidence. Known problem domains
//! can be handled by site overrides, which also carry per-domain tax and
//! markup adjustments. Failures never surface as errors: every call returns an
//! [`ExtractionResult`] describing what was found or why nothing was.
//!
//! # Example
//!
//! ```no_run
//! use pricewatch_engine::PriceEngine;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = PriceEngine::builder().build();
//!     let result = engine.resolve_price("https://shop.example.com/products/intake").await;
//!     match result.price {
//!         Some(price) => println!("{price} ({})", result.note),
//!         None => eprintln!("{}", result.error.unwrap_or_default()),
//!     }
//! }
//! ```

pub mod engine;
pub mod error;
pub mod extractors;
pub mod money;
pub mod options;
pub mod overrides;
pub mod render;
pub mod resolver;
pub mod resource;
pub mod result;

pub use crate::engine::PriceEngine;
pub use crate::error::{AcquisitionError, ConfigError, ErrorCode};
pub use crate::extractors::select::SelectorSpec;
pub use crate::extractors::{ExtractorTag, PriceCandidate};
pub use crate::money::Money;
pub use crate::options::{AcquisitionTuning, CentsNormalization, EngineBuilder, Options};
pub use crate::overrides::{
    load_builtin_registry, load_registry_from_path, parse_registry, SiteAdjustment, SiteOverride,
    SiteOverrideHandler, SiteOverrideRegistry,
};
pub use crate::render::{BrowserLauncher, BrowserSession, VisibleNode};
pub use crate::resource::gate::{GateSummary, RequestGate};
pub use crate::result::{AcquisitionAttempt, ExtractionResult, Strategy};

#[cfg(feature = "chromium")]
pub use crate::render::chromium::ChromiumLauncher;
