use std::future::Future;
use std::pin::Pin;

use crate::{
    AvailableModel, BoxedEventStream, ModelRequest, ModelResponse, ProviderError, ProviderKind,
    ResponseRequest,
};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Uniform contract every provider adapter satisfies.
///
/// `complete`/`stream` speak the turn-based protocol. Adapters that also speak the item-based
/// protocol override `supports_responses` and the two response methods.
pub trait ModelProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn list_models<'a>(&'a self) -> ProviderFuture<'a, Result<Vec<AvailableModel>, ProviderError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>>;

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>>;

    fn supports_responses(&self) -> bool {
        false
    }

    fn create_response<'a>(
        &'a self,
        _request: ResponseRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        let kind = self.kind();
        Box::pin(async move {
            Err(ProviderError::unsupported(format!(
                "{kind} does not support the responses protocol"
            )))
        })
    }

    fn stream_response<'a>(
        &'a self,
        _request: ResponseRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        let kind = self.kind();
        Box::pin(async move {
            Err(ProviderError::unsupported(format!(
                "{kind} does not support the responses protocol"
            )))
        })
    }
}
