//! The canonical subscription state machine, free of I/O.

use stowage_entity::billing::{CanonicalEventKind, SubscriptionStatus};

/// Status and failure count after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The next status.
    pub status: SubscriptionStatus,
    /// Consecutive failed payments after the event.
    pub failed_payment_count: i32,
}

/// Apply `kind` to an existing subscription.
///
/// Terminal states absorb every event. Kinds that do not apply to the
/// current state leave it unchanged.
pub fn transition(
    status: SubscriptionStatus,
    failed_payment_count: i32,
    kind: &CanonicalEventKind,
    max_failed_payments: i32,
) -> Transition {
    use SubscriptionStatus::*;

    let unchanged = Transition {
        status,
        failed_payment_count,
    };
    if status.is_terminal() {
        return unchanged;
    }

    match (status, kind) {
        (Active | PastDue, CanonicalEventKind::InvoicePaid) => Transition {
            status: Active,
            failed_payment_count: 0,
        },
        (Active | PastDue, CanonicalEventKind::InvoiceFailed) => {
            let failures = failed_payment_count + 1;
            Transition {
                status: if status == PastDue && failures >= max_failed_payments {
                    Failed
                } else {
                    PastDue
                },
                failed_payment_count: failures,
            }
        }
        (Active, CanonicalEventKind::Paused) => Transition {
            status: Paused,
            failed_payment_count,
        },
        (Paused, CanonicalEventKind::Resumed) => Transition {
            status: Active,
            failed_payment_count: 0,
        },
        (_, CanonicalEventKind::Cancelled) => Transition {
            status: Cancelled,
            failed_payment_count,
        },
        (_, CanonicalEventKind::Expired) => Transition {
            status: Expired,
            failed_payment_count,
        },
        _ => unchanged,
    }
}

/// Required change to the user's entitlement after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementChange {
    /// Add the plan's bytes.
    Grant,
    /// Remove the previously granted bytes.
    Revoke,
    /// Leave the entitlement as is.
    Keep,
}

/// Decide the entitlement change for a subscription now in `status`.
///
/// `PastDue` keeps its entitlement as a grace period.
pub fn entitlement_change(status: SubscriptionStatus, applied: bool) -> EntitlementChange {
    match status {
        SubscriptionStatus::Active if !applied => EntitlementChange::Grant,
        SubscriptionStatus::Paused
        | SubscriptionStatus::Cancelled
        | SubscriptionStatus::Expired
        | SubscriptionStatus::Failed
            if applied =>
        {
            EntitlementChange::Revoke
        }
        _ => EntitlementChange::Keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubscriptionStatus::*;

    fn step(status: SubscriptionStatus, failures: i32, kind: CanonicalEventKind) -> Transition {
        transition(status, failures, &kind, 3)
    }

    #[test]
    fn test_payment_failures_escalate_to_failed() {
        let t = step(Active, 0, CanonicalEventKind::InvoiceFailed);
        assert_eq!(t, Transition { status: PastDue, failed_payment_count: 1 });
        let t = step(t.status, t.failed_payment_count, CanonicalEventKind::InvoiceFailed);
        assert_eq!(t.status, PastDue);
        let t = step(t.status, t.failed_payment_count, CanonicalEventKind::InvoiceFailed);
        assert_eq!(t, Transition { status: Failed, failed_payment_count: 3 });
    }

    #[test]
    fn test_recovery_resets_failures() {
        let t = step(PastDue, 2, CanonicalEventKind::InvoicePaid);
        assert_eq!(t, Transition { status: Active, failed_payment_count: 0 });
    }

    #[test]
    fn test_pause_resume_and_cancel() {
        assert_eq!(step(Active, 0, CanonicalEventKind::Paused).status, Paused);
        assert_eq!(step(Paused, 0, CanonicalEventKind::Resumed).status, Active);
        assert_eq!(step(Paused, 0, CanonicalEventKind::InvoicePaid).status, Paused);
        assert_eq!(step(PastDue, 1, CanonicalEventKind::Cancelled).status, Cancelled);
        assert_eq!(step(Paused, 0, CanonicalEventKind::Expired).status, Expired);
    }

    #[test]
    fn test_past_due_subscription_cannot_pause() {
        let t = step(PastDue, 2, CanonicalEventKind::Paused);
        assert_eq!(t, Transition { status: PastDue, failed_payment_count: 2 });
    }

    #[test]
    fn test_terminal_states_absorb_events() {
        for terminal in [Cancelled, Expired, Failed] {
            assert_eq!(step(terminal, 0, CanonicalEventKind::InvoicePaid).status, terminal);
            assert_eq!(step(terminal, 0, CanonicalEventKind::Resumed).status, terminal);
        }
    }

    #[test]
    fn test_entitlement_changes() {
        assert_eq!(entitlement_change(Active, false), EntitlementChange::Grant);
        assert_eq!(entitlement_change(Active, true), EntitlementChange::Keep);
        assert_eq!(entitlement_change(PastDue, true), EntitlementChange::Keep);
        assert_eq!(entitlement_change(Paused, true), EntitlementChange::Revoke);
        assert_eq!(entitlement_change(Failed, true), EntitlementChange::Revoke);
        assert_eq!(entitlement_change(Cancelled, false), EntitlementChange::Keep);
    }
}
