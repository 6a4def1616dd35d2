use super::*;

pub mod poll_formation;

use tokio::task::AbortHandle;

/// Wrapper around an `AbortHandle` that aborts when it is dropped.
pub struct ThreadHandle(pub AbortHandle);
impl Drop for ThreadHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}
