//! Entitlement state reconciliation.
//!
//! A pure classifier over millisecond epochs: the same inputs always
//! produce the same outcome, so replaying an identical upstream response
//! is idempotent by construction.

use entity::sea_orm_active_enums::SubscriptionStatus;

const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput {
    pub now_ms: i64,
    pub purchase_date_ms: Option<i64>,
    pub expires_date_ms: Option<i64>,
    pub grace_expires_ms: Option<i64>,
    pub trial_days: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlement {
    pub status: SubscriptionStatus,
    pub period_start_ms: i64,
    pub period_end_ms: i64,
}

/// Trial wins over plain active; grace is only considered once the
/// subscription is no longer active.
pub fn reconcile(input: ReconcileInput) -> Entitlement {
    let ReconcileInput {
        now_ms,
        purchase_date_ms,
        expires_date_ms,
        grace_expires_ms,
        trial_days,
    } = input;

    let is_active = expires_date_ms.is_some_and(|expires| expires > now_ms);
    let in_grace = !is_active && grace_expires_ms.is_some_and(|grace| grace > now_ms);
    // Dates come from upstream JSON, so the window math must saturate
    // rather than overflow on extreme values.
    let in_trial = is_active
        && trial_days > 0
        && purchase_date_ms.is_some_and(|purchase| {
            let window = i64::from(trial_days).saturating_mul(MS_PER_DAY);
            purchase.saturating_add(window) > now_ms
        });

    let status = if in_trial {
        SubscriptionStatus::InTrial
    } else if is_active {
        SubscriptionStatus::Active
    } else if in_grace {
        SubscriptionStatus::InGrace
    } else {
        SubscriptionStatus::Expired
    };

    let period_start_ms = purchase_date_ms.unwrap_or(now_ms);
    let period_end_ms = if is_active {
        expires_date_ms.unwrap_or(now_ms)
    } else {
        grace_expires_ms.or(expires_date_ms).unwrap_or(now_ms)
    };

    Entitlement {
        status,
        period_start_ms,
        period_end_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn input() -> ReconcileInput {
        ReconcileInput {
            now_ms: NOW,
            purchase_date_ms: None,
            expires_date_ms: None,
            grace_expires_ms: None,
            trial_days: 0,
        }
    }

    #[test]
    fn unexpired_without_trial_is_active() {
        let out = reconcile(ReconcileInput {
            expires_date_ms: Some(NOW + 1000),
            ..input()
        });
        assert_eq!(out.status, SubscriptionStatus::Active);
        assert_eq!(out.period_end_ms, NOW + 1000);
    }

    #[test]
    fn recent_purchase_within_trial_window_is_in_trial() {
        let out = reconcile(ReconcileInput {
            purchase_date_ms: Some(NOW - 1000),
            expires_date_ms: Some(NOW + 100_000),
            trial_days: 7,
            ..input()
        });
        assert_eq!(out.status, SubscriptionStatus::InTrial);
        assert_eq!(out.period_start_ms, NOW - 1000);
        assert_eq!(out.period_end_ms, NOW + 100_000);
    }

    #[test]
    fn expired_with_live_grace_window_is_in_grace() {
        let out = reconcile(ReconcileInput {
            expires_date_ms: Some(NOW - 1000),
            grace_expires_ms: Some(NOW + 5000),
            ..input()
        });
        assert_eq!(out.status, SubscriptionStatus::InGrace);
        assert_eq!(out.period_end_ms, NOW + 5000);
    }

    #[test]
    fn expired_without_grace_is_expired() {
        let out = reconcile(ReconcileInput {
            expires_date_ms: Some(NOW - 1000),
            ..input()
        });
        assert_eq!(out.status, SubscriptionStatus::Expired);
        assert_eq!(out.period_end_ms, NOW - 1000);
    }

    #[test]
    fn trial_window_elapsed_falls_back_to_active() {
        let out = reconcile(ReconcileInput {
            purchase_date_ms: Some(NOW - 8 * MS_PER_DAY),
            expires_date_ms: Some(NOW + 100_000),
            trial_days: 7,
            ..input()
        });
        assert_eq!(out.status, SubscriptionStatus::Active);
    }

    #[test]
    fn grace_does_not_override_active() {
        let out = reconcile(ReconcileInput {
            expires_date_ms: Some(NOW + 1000),
            grace_expires_ms: Some(NOW + 50_000),
            ..input()
        });
        assert_eq!(out.status, SubscriptionStatus::Active);
        // period_end follows the active expiry, not the stale grace date
        assert_eq!(out.period_end_ms, NOW + 1000);
    }

    #[test]
    fn no_dates_at_all_is_expired_anchored_to_now() {
        let out = reconcile(input());
        assert_eq!(out.status, SubscriptionStatus::Expired);
        assert_eq!(out.period_start_ms, NOW);
        assert_eq!(out.period_end_ms, NOW);
    }

    #[test]
    fn extreme_upstream_dates_do_not_overflow() {
        let out = reconcile(ReconcileInput {
            purchase_date_ms: Some(i64::MAX),
            expires_date_ms: Some(NOW + 1000),
            trial_days: i32::MAX,
            ..input()
        });
        assert_eq!(out.status, SubscriptionStatus::InTrial);

        let out = reconcile(ReconcileInput {
            purchase_date_ms: Some(i64::MIN),
            expires_date_ms: Some(NOW + 1000),
            trial_days: 7,
            ..input()
        });
        assert_eq!(out.status, SubscriptionStatus::Active);
    }

    #[test]
    fn is_deterministic() {
        let i = ReconcileInput {
            purchase_date_ms: Some(NOW - 500),
            expires_date_ms: Some(NOW + 500),
            grace_expires_ms: Some(NOW + 900),
            trial_days: 3,
            ..input()
        };
        assert_eq!(reconcile(i), reconcile(i));
    }
}
