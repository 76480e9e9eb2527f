//! Service layer
//!
//! The web handlers and the scheduler both drive the same [`GuideService`],
//! which owns the configuration, the cache layout and the HTTP client.

pub mod guide;

pub use guide::{render_artifacts, FilterReport, GuideService, UpdateReport};
