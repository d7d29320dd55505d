//! Controller for the Installation CRD
//!
//! The controller follows the Kubernetes observe-diff-act loop: every pass
//! re-reads the Installation, advances it by at most one preflight, teardown
//! or stage-sequencing step, writes back what changed and requeues.

mod context;
mod deletion;
mod installation;
mod preflight;
mod stage;
mod status;
mod watches;

pub use context::{Context, ContextBuilder};
pub use installation::{error_policy, reconcile};
pub use preflight::PREFLIGHT_PASSED;
pub use watches::installation_for_namespace;
