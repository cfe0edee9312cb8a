use crate::error::LoadError;
use crate::loader::ProviderLoader;
use crate::providers::ProviderSpec;
use crate::types::TestCase;

/// Replace every test and assertion provider override with a resolved
/// provider, in declaration order.
pub async fn resolve_nested_providers(
    tests: &mut [TestCase],
    loader: &ProviderLoader,
) -> Result<(), LoadError> {
    for test in tests.iter_mut() {
        if let Some(spec) = test.provider.as_mut() {
            resolve_in_place(spec, loader).await?;
        }
        for assertion in test.assert.iter_mut() {
            if let Some(spec) = assertion.provider.as_mut() {
                resolve_in_place(spec, loader).await?;
            }
        }
    }
    Ok(())
}

async fn resolve_in_place(spec: &mut ProviderSpec, loader: &ProviderLoader) -> Result<(), LoadError> {
    if matches!(spec, ProviderSpec::Resolved(_)) {
        return Ok(());
    }
    let provider = loader.resolve(spec).await?;
    tracing::debug!(provider = provider.id(), "resolved nested provider");
    *spec = ProviderSpec::Resolved(provider);
    Ok(())
}
