//! Per-batch callbacks of the bulk processor.

use super::BulkResponse;
use crate::error::ClientError;

type BeforeFn = Box<dyn Fn(u64, usize) + Send + Sync>;
type AfterFn = Box<dyn Fn(u64, usize, &BulkResponse) + Send + Sync>;
type FailureFn = Box<dyn Fn(u64, usize, &ClientError) + Send + Sync>;

/// Three independent callbacks, each receiving the execution id and the number
/// of documents in the batch:
///
/// - `before`: the batch is about to be sent,
/// - `after`: the cluster answered (the response may still hold item failures),
/// - `after_failure`: the request failed as a whole.
///
/// Callbacks run on the processor's worker task; context such as the target
/// address is captured by the closures.
pub struct BulkListener {
    before: BeforeFn,
    after: AfterFn,
    after_failure: FailureFn,
}

impl BulkListener {
    pub fn new() -> Self {
        Self {
            before: Box::new(|_, _| {}),
            after: Box::new(|_, _, _| {}),
            after_failure: Box::new(|_, _, _| {}),
        }
    }

    pub fn on_before(mut self, f: impl Fn(u64, usize) + Send + Sync + 'static) -> Self {
        self.before = Box::new(f);
        self
    }

    pub fn on_after(
        mut self,
        f: impl Fn(u64, usize, &BulkResponse) + Send + Sync + 'static,
    ) -> Self {
        self.after = Box::new(f);
        self
    }

    pub fn on_failure(
        mut self,
        f: impl Fn(u64, usize, &ClientError) + Send + Sync + 'static,
    ) -> Self {
        self.after_failure = Box::new(f);
        self
    }

    pub(crate) fn before(&self, execution_id: u64, actions: usize) {
        (self.before)(execution_id, actions)
    }

    pub(crate) fn after(&self, execution_id: u64, actions: usize, response: &BulkResponse) {
        (self.after)(execution_id, actions, response)
    }

    pub(crate) fn after_failure(&self, execution_id: u64, actions: usize, error: &ClientError) {
        (self.after_failure)(execution_id, actions, error)
    }
}

impl Default for BulkListener {
    fn default() -> Self {
        Self::new()
    }
}
