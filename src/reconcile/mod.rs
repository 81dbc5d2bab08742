//! Reconciliation of the live crawl, the ledgers and the filesystem.
//!
//! For every URL in the union of this cycle's crawl and both ledgers, the
//! [`Reconciler`] assigns exactly one [`Disposition`] and one [`Action`]:
//!
//! | File on disk | Download record | `downloaded` | Disposition |
//! |---|---|---|---|
//! | no | no | any | `missing_completely` |
//! | no | yes | any | `missing_on_disk` |
//! | yes | missing or elsewhere, or flag false | | `outdated_record` (backfilled) |
//! | yes | yes | true | `correctly_tracked` |

mod engine;
mod oracle;
mod plan;

pub use engine::{Assessment, Reconciler};
pub use oracle::{FileOracle, FsOracle};
pub use plan::{Action, ActionPlan, Disposition, PlanEntry, RunMode};
