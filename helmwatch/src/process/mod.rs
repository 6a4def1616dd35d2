use super::*;

mod completion;
pub mod diagnostics;
pub mod history;
pub mod join;
pub mod membership;

pub use completion::{prepare_join_completion, JoinCompletion, JoinReceiver};
pub use diagnostics::{
    diagnose, Diagnosis, DiagnosisDetails, DiagnosisInput, DiagnosisStatus, FormationState,
    NoMasterReason, RemoteHistoryView,
};
pub use history::MasterHistory;
pub use join::{Applied, JoinBatch, JoinExecutor, JoinRequest};
pub use membership::{IndexMetadata, MembershipState, Node, NodeRoles, Version, VotingExclusion};

use tracing::{debug, info, warn};
