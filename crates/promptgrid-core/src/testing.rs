use crate::types::EvaluationResult;
use anyhow::Result;

/// Helper to assert an evaluation's pass rate meets a threshold.
///
/// Use this in your `#[tokio::test]` functions.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn test_my_prompts() -> Result<()> {
///     let suite = promptgrid_core::config::load_suite("promptgrid.yaml").await?;
///     let result = promptgrid_core::evaluate(&suite, &EvaluateOptions::default()).await?;
///
///     // Assert 80% pass rate
///     assert_pass_rate(&result, 0.8)?;
///
///     Ok(())
/// }
/// ```
pub fn assert_pass_rate(result: &EvaluationResult, min_pass_rate: f64) -> Result<()> {
    let pass_rate = result.stats.pass_rate();
    if pass_rate < min_pass_rate {
        anyhow::bail!(
            "Evaluation failed: pass rate {:.1}% is below threshold {:.1}%\n{}",
            pass_rate * 100.0,
            min_pass_rate * 100.0,
            result.summary_table()
        );
    }
    Ok(())
}

/// Helper to assert every cell passed.
pub fn assert_all_passed(result: &EvaluationResult) -> Result<()> {
    if result.stats.failures > 0 {
        anyhow::bail!(
            "Evaluation failed: {}/{} cells passed\n{}",
            result.stats.successes,
            result.stats.total(),
            result.summary_table()
        );
    }
    Ok(())
}
