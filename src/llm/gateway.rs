/// Retry-wrapped access to an LLM provider
use super::{LlmError, LlmProvider};
use crate::retry::RetryPolicy;
use std::sync::Arc;
use tracing::debug;

/// The one place where provider throttling is absorbed
///
/// Only [`LlmError::RateLimited`] is retried. Authorization, malformed input
/// and every other failure propagate on the first attempt, and an exhausted
/// budget returns the last rate-limit error unchanged.
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
    temperature: f32,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, policy: RetryPolicy, temperature: f32) -> Self {
        Self {
            provider,
            policy,
            temperature,
        }
    }

    pub fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(
            "Sending {} char prompt to {}",
            prompt.len(),
            self.provider.name()
        );
        self.policy.run(
            |_| self.provider.complete(prompt, self.temperature),
            LlmError::is_rate_limited,
        )
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed list of outcomes, one per call
    struct Scripted {
        outcomes: Mutex<Vec<Result<String, LlmError>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<String, LlmError>>) -> Arc<Self> {
            outcomes.reverse();
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl LlmProvider for Scripted {
        fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String, LlmError> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("exhausted".to_string()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn throttled() -> Result<String, LlmError> {
        Err(LlmError::RateLimited {
            provider: "scripted".into(),
            message: "quota".into(),
        })
    }

    fn instant(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, 0.0, Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn test_rate_limit_is_retried() {
        let provider = Scripted::new(vec![throttled(), throttled(), Ok("ok".into())]);
        let gateway = LlmGateway::new(provider.clone(), instant(15), 0.0);
        assert_eq!(gateway.generate("prompt").unwrap(), "ok");
        assert_eq!(provider.calls(), 3);
    }

    #[test]
    fn test_exhausted_budget_reraises_rate_limit() {
        let provider = Scripted::new((0..5).map(|_| throttled()).collect());
        let gateway = LlmGateway::new(provider.clone(), instant(3), 0.0);
        let err = gateway.generate("prompt").unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(provider.calls(), 3);
    }

    #[test]
    fn test_authorization_error_is_not_retried() {
        let provider = Scripted::new(vec![
            Err(LlmError::Unauthorized {
                provider: "scripted".into(),
                message: "bad key".into(),
            }),
            Ok("never".into()),
        ]);
        let gateway = LlmGateway::new(provider.clone(), instant(15), 0.0);
        assert!(matches!(
            gateway.generate("prompt"),
            Err(LlmError::Unauthorized { .. })
        ));
        assert_eq!(provider.calls(), 1);
    }
}
