//! Safety Limits Integration Tests
//!
//! Tests for plan size limits, run timeouts and their YAML form.

use omniwire::core::{SafetyLimits, SafetyTracker, SafetyViolation};
use omniwire::domain::{Address, Eid, PendingTransaction, Point};

fn transactions(eid: u32, count: usize) -> Vec<PendingTransaction> {
    (0..count)
        .map(|i| {
            PendingTransaction::new(
                Point::new(Eid(eid), Address::parse("0x1").unwrap()),
                vec![i as u8],
                format!("tx {}", i),
            )
        })
        .collect()
}

#[test]
fn test_max_transactions() {
    let limits = SafetyLimits {
        max_transactions: 3,
        ..Default::default()
    };

    assert!(limits.validate_plan(&transactions(1, 3)).is_ok());

    let result = limits.validate_plan(&transactions(1, 4));
    match result {
        Err(SafetyViolation::MaxTransactions { actual, limit }) => {
            assert_eq!(actual, 4);
            assert_eq!(limit, 3);
        }
        _ => panic!("Expected MaxTransactions violation"),
    }
}

#[test]
fn test_max_transactions_per_chain() {
    let limits = SafetyLimits {
        max_transactions_per_chain: 2,
        ..Default::default()
    };

    let mut plan = transactions(1, 2);
    plan.extend(transactions(2, 2));
    assert!(limits.validate_plan(&plan).is_ok());

    plan.extend(transactions(2, 1));
    let result = limits.validate_plan(&plan);
    match result {
        Err(SafetyViolation::MaxTransactionsPerChain { eid, actual, limit }) => {
            assert_eq!(eid, Eid(2));
            assert_eq!(actual, 3);
            assert_eq!(limit, 2);
        }
        _ => panic!("Expected MaxTransactionsPerChain violation"),
    }
}

#[test]
fn test_empty_plan_is_valid() {
    let limits = SafetyLimits {
        max_transactions: 0,
        ..Default::default()
    };
    assert!(limits.validate_plan(&[]).is_ok());
}

#[test]
fn test_tracker_recording() {
    let limits = SafetyLimits {
        max_transactions: 5,
        ..Default::default()
    };

    let mut tracker = SafetyTracker::new();
    assert_eq!(tracker.transactions_planned, 0);
    assert!(limits.check(&tracker).is_ok());

    tracker.record_plan(5);
    assert_eq!(tracker.transactions_planned, 5);
    assert!(limits.check(&tracker).is_ok());

    tracker.record_plan(1);
    assert!(matches!(
        limits.check(&tracker),
        Err(SafetyViolation::MaxTransactions { actual: 6, limit: 5 })
    ));
}

#[test]
fn test_zero_run_timeout_trips_immediately() {
    let limits = SafetyLimits {
        run_timeout_seconds: 0,
        ..Default::default()
    };

    let tracker = SafetyTracker::new();
    assert!(matches!(
        limits.check(&tracker),
        Err(SafetyViolation::RunTimeout { limit_seconds: 0, .. })
    ));
}

#[test]
fn test_safety_limits_yaml_parsing() {
    let yaml = r#"
max_transactions: 10
run_timeout_seconds: 600
"#;

    let limits: SafetyLimits = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(limits.max_transactions, 10);
    assert_eq!(limits.run_timeout_seconds, 600);

    // Unset fields keep their defaults
    assert_eq!(limits.max_transactions_per_chain, 100);
    assert_eq!(limits.confirmation_timeout_seconds, 300);
}

#[test]
fn test_safety_limits_default_values() {
    let limits = SafetyLimits::default();

    assert_eq!(limits.max_transactions, 200);
    assert_eq!(limits.max_transactions_per_chain, 100);
    assert_eq!(limits.run_timeout_seconds, 3600); // 1 hour
    assert_eq!(limits.confirmation_timeout_seconds, 300); // 5 min
}

#[test]
fn test_violation_messages() {
    let violation = SafetyViolation::MaxTransactionsPerChain {
        eid: Eid(30101),
        actual: 3,
        limit: 2,
    };
    assert_eq!(violation.to_string(), "Maximum transactions on chain 30101 exceeded: 3 > 2");
}
