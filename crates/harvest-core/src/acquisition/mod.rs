//! Acquisition pipeline: from a user-supplied reference to files on disk.
//!
//! # Architecture
//!
//! ```text
//! AcquisitionEngine
//!     │
//!     ├── ReferenceParser - URL / bare id / repo id -> SourceReference
//!     │
//!     ├── CatalogSet (RemoteCatalog) - SourceReference -> ResolvedManifest
//!     │
//!     ├── CategoryClassifier + DirectoryResolver - file -> destination
//!     │
//!     ├── segments - multi-file artifact grouping and validation
//!     │
//!     ├── Downloader - streaming transfer with hashing and cancellation
//!     │
//!     └── ProvenanceWriter - JSON sidecar next to the primary artifact
//! ```

pub mod batch;
mod category;
mod directories;
mod engine;
mod local;
mod outcome;
mod provenance;
mod reference;
pub mod segments;

pub use batch::{run_batch, BatchConfig, BatchEntry, BatchEntryReport, BatchEntryStatus, BatchReport};
pub use category::{
    has_weight_extension, is_main_model_file, CategoryClassifier, ClassificationBasis,
    DestinationCategory,
};
pub use directories::{DirectoryResolver, ModelDirectories};
pub use engine::{AcquireOptions, AcquisitionEngine, EngineBuilder, FileProgressCallback};
pub use local::{list_local_models, LocalModel};
pub use outcome::{
    AcquisitionOutcome, FileFailure, FileOutcome, FileStatus, GroupOutcome, OutcomeTier,
};
pub use provenance::{ProvenanceRecord, ProvenanceWriter};
pub use reference::{ParseError, ReferenceParser, SecondaryId, SourceKind, SourceReference};
pub use segments::{SegmentGroup, SegmentMember, SegmentValidation};
