use std::pin::Pin;

use wag_common::Result;

/// The result of a dispatched send-queue job: a verbatim HTTP response to
/// relay back to the caller.
#[derive(Debug, Clone)]
pub struct QueueResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

pub type Job = Pin<Box<dyn Future<Output = Result<QueueResponse>> + Send>>;
