use crate::error::Result;
use crate::identifier::Identifier;
use crate::policy::QuotaPolicy;
use crate::status::Status;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Stateful quota decision service.
///
/// `check` accounts for the current request and reports the resulting state
/// in one atomic step. Two concurrent checks for the same identifier must
/// never both be admitted when only one unit of quota is left.
#[async_trait]
pub trait QuotaEngine: Send + Sync {
    async fn check(&self, identifier: &Identifier, policy: &QuotaPolicy) -> Result<Status>;
}

#[async_trait]
impl<E> QuotaEngine for Arc<E>
where
    E: QuotaEngine + ?Sized,
{
    async fn check(&self, identifier: &Identifier, policy: &QuotaPolicy) -> Result<Status> {
        (**self).check(identifier, policy).await
    }
}

/// Key under which a fixed-window counter is stored. Scoped by the whole
/// policy so distinct policies never share a counter.
pub(crate) fn window_key(identifier: &Identifier, policy: &QuotaPolicy) -> String {
    format!(
        "{}:{}:{}",
        identifier,
        policy.limit(),
        effective_window(policy).as_millis()
    )
}

/// Window length used for counting; zero-length windows count as 1ms.
pub(crate) fn effective_window(policy: &QuotaPolicy) -> Duration {
    policy.window().max(Duration::from_millis(1))
}
