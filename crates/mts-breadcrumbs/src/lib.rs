//! MTS Breadcrumbs - a bounded trail of recent user interactions
//!
//! Every event is redacted with the built-in PII catalogue before it is
//! queued. The queue is capped by count and by serialized size, evicting the
//! oldest entries first, and is mirrored to a [`PersistenceProvider`] in the
//! background after each change.

pub mod error;
pub mod event;
pub mod manager;
pub mod storage;

pub use error::{BreadcrumbError, BreadcrumbResult};
pub use event::{BreadcrumbEvent, BreadcrumbKind};
pub use manager::{BreadcrumbConfig, BreadcrumbManager, BreadcrumbStats};
pub use storage::{select_provider, FileStorage, MemoryStorage, PersistenceProvider, ProcessStorage};
