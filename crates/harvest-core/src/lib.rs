//! Harvest Core - model reference resolution and acquisition.
//!
//! Turns a user-supplied model reference (a Civitai or HuggingFace URL, a
//! bare numeric id, or a `namespace/repo` id) into classified files on disk
//! with a provenance record next to the primary artifact.
//!
//! # Example
//!
//! ```rust,ignore
//! use harvest_core::{AcquireOptions, AcquisitionEngine, CatalogSet, CatalogTokens};
//! use harvest_core::{ModelDirectories, Settings};
//!
//! #[tokio::main]
//! async fn main() -> harvest_core::Result<()> {
//!     let settings = Settings::default();
//!     let catalogs = CatalogSet::from_settings(&settings, CatalogTokens::resolve(None, None))?;
//!     let engine = AcquisitionEngine::builder(catalogs)
//!         .settings(&settings)
//!         .directories(ModelDirectories::from_settings(&settings, None)?)
//!         .build()?;
//!
//!     let outcome = engine
//!         .acquire("https://civitai.com/models/4201", AcquireOptions::default())
//!         .await?;
//!     println!("{} files written", outcome.written_paths().len());
//!     Ok(())
//! }
//! ```

pub mod acquisition;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod metadata;
pub mod network;

// Re-export commonly used types
pub use acquisition::{
    AcquireOptions, AcquisitionEngine, AcquisitionOutcome, CategoryClassifier,
    DestinationCategory, EngineBuilder, FileFailure, FileStatus, ModelDirectories, OutcomeTier,
    ProvenanceRecord, ProvenanceWriter, ReferenceParser, SourceKind, SourceReference,
};
pub use cancel::CancellationToken;
pub use catalog::{CatalogSet, CatalogTokens, RemoteCatalog, ResolvedManifest, SearchHit};
pub use config::Settings;
pub use error::{HarvestError, Result};
pub use network::{DownloadError, DownloadErrorKind, DownloadProgress, Downloader};
