//! Everything that turns raw playlist and guide documents into reconciled
//! playlist entries, plus the scheduler that triggers it periodically.

pub mod alias_fixups;
pub mod m3u_parser;
pub mod reconcile;
pub mod scheduler;
pub mod xmltv_parser;

pub use alias_fixups::AliasFixups;
pub use m3u_parser::M3uParser;
pub use reconcile::{match_channel, reconcile, MatchKind, ReconciliationOutcome, Reconciler};
pub use scheduler::SchedulerService;
pub use xmltv_parser::{GuideElement, XmltvReader};
