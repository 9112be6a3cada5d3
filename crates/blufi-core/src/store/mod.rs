// ── Session state stores ──
//
// Written only by the event bus and the orchestrator; everything else
// reads snapshots or subscribes to `watch` updates.

mod catalog;
mod collection;
mod session_log;

pub use catalog::Catalog;
pub use session_log::SessionLog;
