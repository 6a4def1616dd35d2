use super::*;

use tokio::sync::oneshot;

/// Completion of one join request.
/// Exactly one of success or failure is delivered, exactly once.
pub struct JoinCompletion(oneshot::Sender<Result<StateVersion, Error>>);

impl JoinCompletion {
    pub fn complete_ok(self, version: StateVersion) {
        self.0.send(Ok(version)).ok();
    }

    pub fn complete_err(self, e: Error) {
        self.0.send(Err(e)).ok();
    }
}

pub type JoinReceiver = oneshot::Receiver<Result<StateVersion, Error>>;

pub fn prepare_join_completion() -> (JoinCompletion, JoinReceiver) {
    let (tx, rx) = oneshot::channel();
    (JoinCompletion(tx), rx)
}
