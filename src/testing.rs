//! In-memory transport used by unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use crate::{HttpTransport, RequestSpec, ResponseSink, Result, SunsyncError};

#[derive(Clone, Debug)]
pub(crate) enum Reply {
    /// 200 with this body.
    Body(String),
    /// Non-2xx status with an empty body.
    Status(u16),
}

/// Replays queued replies in order; once the queue runs dry it repeats the fallback.
#[derive(Clone, Debug)]
pub(crate) struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Reply,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<RequestSpec>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            fallback: Reply::Status(500),
            hits: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn always(reply: Reply) -> Self {
        Self::new([]).with_fallback(reply)
    }

    pub(crate) fn with_fallback(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<RequestSpec> {
        self.seen.lock().expect("request log mutex").clone()
    }
}

impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &RequestSpec, sink: &mut ResponseSink) -> Result<()> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .expect("request log mutex")
            .push(request.clone());

        let reply = self
            .replies
            .lock()
            .expect("reply queue mutex")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Body(body) => {
                sink.write(body.into_bytes());
                Ok(())
            }
            Reply::Status(status) => Err(SunsyncError::Http {
                status,
                body: String::new(),
            }),
        }
    }
}
