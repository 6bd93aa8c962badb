//! Post-commit echo
//!
//! After a payment or settings change commits, the new aggregate paid amount
//! is pushed back to the CRM and a payment notice is sent. Both run in a
//! spawned task, off the transactional path; failures are logged and dropped.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use core_kernel::{DealId, RetryPolicy};
use domain_crm::CrmPort;

use crate::ports::{NotificationPort, PaymentNotice};

/// What the echo task should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub deal_id: DealId,
    pub paid_amount: i64,
    /// Present when a payment was recorded
    pub notice: Option<PaymentNotice>,
}

/// How an echo went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoOutcome {
    pub crm_updated: bool,
    pub attempts: u32,
    pub notified: bool,
}

/// Pushes committed state to the CRM and the notification channel
#[derive(Clone)]
pub struct PaidAmountEcho {
    crm: Arc<dyn CrmPort>,
    notifier: Arc<dyn NotificationPort>,
    retry: RetryPolicy,
}

impl PaidAmountEcho {
    pub fn new(crm: Arc<dyn CrmPort>, notifier: Arc<dyn NotificationPort>, retry: RetryPolicy) -> Self {
        Self { crm, notifier, retry }
    }

    /// Runs the echo in a background task
    pub fn spawn(&self, request: EchoRequest) -> JoinHandle<EchoOutcome> {
        let echo = self.clone();
        tokio::spawn(async move { echo.run(request).await })
    }

    /// Runs the echo to completion
    ///
    /// The CRM push is tried up to `retry.max_attempts` times, sleeping
    /// `retry.delay_after(n)` between attempts. The notice is sent once,
    /// whatever happened to the push.
    pub async fn run(&self, request: EchoRequest) -> EchoOutcome {
        let mut attempts = 0;
        let mut crm_updated = false;

        while attempts < self.retry.max_attempts {
            let attempt = attempts;
            attempts += 1;
            match self.crm.push_paid_amount(&request.deal_id, request.paid_amount).await {
                Ok(()) => {
                    debug!(deal_id = %request.deal_id, paid_amount = request.paid_amount, attempts, "Paid amount echoed to CRM");
                    crm_updated = true;
                    break;
                }
                Err(e) if attempts < self.retry.max_attempts => {
                    warn!(deal_id = %request.deal_id, attempt = attempts, error = %e, "CRM echo failed, retrying");
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                }
                Err(e) => {
                    error!(deal_id = %request.deal_id, attempts, error = %e, "CRM echo abandoned");
                }
            }
        }

        let mut notified = false;
        if let Some(notice) = &request.notice {
            match self.notifier.payment_recorded(notice).await {
                Ok(()) => notified = true,
                Err(e) => {
                    warn!(deal_id = %notice.deal_id, payment_id = %notice.payment_id, error = %e, "Payment notification failed");
                }
            }
        }

        EchoOutcome {
            crm_updated,
            attempts,
            notified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::PaymentSource;
    use crate::ports::mock::RecordingNotifier;
    use core_kernel::PaymentId;
    use domain_crm::MockCrmPort;

    fn request(with_notice: bool) -> EchoRequest {
        let deal_id = DealId::new("55").unwrap();
        EchoRequest {
            deal_id: deal_id.clone(),
            paid_amount: 40000,
            notice: with_notice.then(|| PaymentNotice {
                deal_id,
                payment_id: PaymentId::new("p1").unwrap(),
                title: "Kitchen".to_string(),
                amount: 40000,
                source: PaymentSource::Gateway,
                paid_amount: 40000,
                total_amount: 300000,
            }),
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let crm = Arc::new(MockCrmPort::new());
        crm.fail_next_pushes(2);
        let notifier = Arc::new(RecordingNotifier::new());
        let echo = PaidAmountEcho::new(crm.clone(), notifier.clone(), RetryPolicy::immediate(3));

        let outcome = echo.run(request(true)).await;
        assert!(outcome.crm_updated);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.notified);
        assert_eq!(crm.pushes().await.len(), 1);
        assert_eq!(notifier.notices().await.len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_bound() {
        let crm = Arc::new(MockCrmPort::new());
        crm.fail_next_pushes(5);
        let notifier = Arc::new(RecordingNotifier::new());
        let echo = PaidAmountEcho::new(crm.clone(), notifier.clone(), RetryPolicy::immediate(3));

        let outcome = echo.run(request(true)).await;
        assert!(!outcome.crm_updated);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.notified);
        assert!(crm.pushes().await.is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_is_swallowed() {
        let crm = Arc::new(MockCrmPort::new());
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.fail_next(1);
        let echo = PaidAmountEcho::new(crm, notifier, RetryPolicy::immediate(1));

        let outcome = echo.spawn(request(true)).await.unwrap();
        assert!(outcome.crm_updated);
        assert!(!outcome.notified);
    }

    #[tokio::test]
    async fn test_settings_echo_sends_no_notice() {
        let crm = Arc::new(MockCrmPort::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let echo = PaidAmountEcho::new(crm, notifier.clone(), RetryPolicy::immediate(1));

        let outcome = echo.run(request(false)).await;
        assert!(!outcome.notified);
        assert!(notifier.notices().await.is_empty());
    }
}
