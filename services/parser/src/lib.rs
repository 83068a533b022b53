//! Airlink Parser - Turns airport-operations workbooks into stored analyses
//!
//! Responsibilities:
//! - Read departure (flight log) and base (customer billing) workbooks
//! - Normalize headers and decode Excel serial date/time pairs
//! - Enrich every row into a typed record (airtime, linkage, billing status)
//! - Aggregate per-sheet statistics and chart payloads
//! - Persist analyses in chunks of at most 500 records, with retry
//! - Serve search, grouped statistics and dashboard reports from the store
//!
//! The HTTP surface lives in the `api` service; the `parser` binary runs the
//! same pipeline against a workbook on disk.

pub mod charts;
pub mod clock;
pub mod columns;
pub mod config;
pub mod enrich;
pub mod error;
pub mod excel_time;
pub mod persist;
pub mod query;
pub mod raw;
pub mod records;
pub mod report;
pub mod retry;
pub mod stats;
pub mod store;
pub mod telemetry;
pub mod workbook;

pub use clock::{Clock, FixedClock, ProcessingRun, SystemClock};
pub use config::{Config, StoreKind};
pub use error::{ConfigError, QueryError, ReportError, SheetError, StoreError, WorkbookError};
pub use persist::{chunk_records, Persister, CHUNK_SIZE};
pub use records::{FileType, FlightRecord, BaseRecord, Record};
pub use retry::RetryPolicy;
pub use store::{AnalysisDocument, DataChunk, DocumentStore, MemoryDocumentStore, PgDocumentStore};
pub use workbook::{process_workbook, SheetOutcome, SheetReport, WorkbookReport};
