//! Scripted transport for exercising the client without a network.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;

use super::transport::{ApiRequest, ApiResponse, HttpTransport, TransportError};

pub(crate) type Reply = Result<ApiResponse, TransportError>;

type Handler = Box<dyn Fn(ApiRequest) -> BoxFuture<'static, Reply> + Send + Sync>;

pub(crate) struct ScriptedTransport {
    calls: Mutex<Vec<ApiRequest>>,
    handler: Handler,
}

impl ScriptedTransport {
    pub(crate) fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Reply + Send + Sync + 'static,
    {
        Self::new_async(move |request| {
            let reply = handler(&request);
            async move { reply }.boxed()
        })
    }

    pub(crate) fn new_async<F>(handler: F) -> Arc<Self>
    where
        F: Fn(ApiRequest) -> BoxFuture<'static, Reply> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    pub(crate) fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of requests whose URL ends with `suffix`.
    pub(crate) fn count(&self, suffix: &str) -> usize {
        self.calls().iter().filter(|r| r.url.ends_with(suffix)).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        (self.handler)(request).await
    }
}

pub(crate) fn reply(status: u16, body: &str) -> Reply {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok(ApiResponse::new(status, body))
}
