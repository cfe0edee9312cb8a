use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ApiProvider, ProviderResponse};

/// Wrap an async closure as an `ApiProvider` with the given id.
pub fn from_async_fn<F, Fut>(id: impl Into<String>, f: F) -> Arc<dyn ApiProvider>
where
	F: Send + Sync + 'static + Fn(String) -> Fut,
	Fut: Future<Output = ProviderResponse> + Send + 'static,
{
	struct FunctionProvider<F, Fut>
	where
		F: Send + Sync + 'static + Fn(String) -> Fut,
		Fut: Future<Output = ProviderResponse> + Send + 'static,
	{
		id: String,
		f: F,
	}

	#[async_trait]
	impl<F, Fut> ApiProvider for FunctionProvider<F, Fut>
	where
		F: Send + Sync + 'static + Fn(String) -> Fut,
		Fut: Future<Output = ProviderResponse> + Send + 'static,
	{
		fn id(&self) -> &str {
			&self.id
		}

		async fn call_api(&self, prompt: &str) -> ProviderResponse {
			(self.f)(prompt.to_string()).await
		}
	}

	Arc::new(FunctionProvider { id: id.into(), f })
}
