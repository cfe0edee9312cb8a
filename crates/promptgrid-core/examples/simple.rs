use std::sync::Arc;

use promptgrid_core::{
    from_async_fn, load_suite, Assertion, AssertionKind, EvaluateOptions, EvaluateTestSuite, Evaluator,
    NoopTelemetry, ProviderResponse, ProviderSpec, TestCase, TestSource, TokenUsage,
};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example 1: an in-process provider, no API key needed
    let shouty = from_async_fn("shouty", |prompt| async move {
        ProviderResponse::output(prompt.to_uppercase(), TokenUsage::default())
    });

    let suite = EvaluateTestSuite {
        providers: vec![ProviderSpec::Resolved(shouty)],
        prompts: vec![json!("Say hello to {{name}}"), json!("Wave at {{name}}")],
        tests: TestSource::Inline(vec![
            TestCase::new()
                .var("name", "Ada")
                .assertion(Assertion::new(AssertionKind::Icontains, "ada")),
            TestCase::new()
                .var("name", "Grace")
                .assertion(Assertion::new(AssertionKind::Regex, "^[A-Z ]+$")),
        ]),
        ..EvaluateTestSuite::default()
    };

    let evaluator = Evaluator::builder().telemetry(Arc::new(NoopTelemetry)).build();
    let result = evaluator.evaluate(&suite, &EvaluateOptions::default()).await?;
    println!("{}", result.summary_table());

    // Example 2: load a suite file if provided (needs OPENAI_API_KEY for openai: providers)
    if let Some(path) = std::env::args().nth(1) {
        let suite = load_suite(&path).await?;
        let result = evaluator.evaluate(&suite, &EvaluateOptions::default()).await?;
        println!("{}", result.summary_table());
    }

    Ok(())
}
