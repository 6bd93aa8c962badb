//! Notification adapter that writes payment notices to the log

use async_trait::async_trait;
use tracing::info;

use core_kernel::{DomainPort, PortError};

use crate::ports::{NotificationPort, PaymentNotice};

/// Emits each payment notice as a structured `info` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl DomainPort for TracingNotifier {}

#[async_trait]
impl NotificationPort for TracingNotifier {
    async fn payment_recorded(&self, notice: &PaymentNotice) -> Result<(), PortError> {
        info!(
            deal_id = %notice.deal_id,
            payment_id = %notice.payment_id,
            title = %notice.title,
            amount = notice.amount,
            source = %notice.source,
            paid_amount = notice.paid_amount,
            total_amount = notice.total_amount,
            "Payment recorded"
        );
        Ok(())
    }
}
