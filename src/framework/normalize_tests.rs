//! Unit tests for framework validation and scale conversion.

use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::error::FrameworkError;

fn remote_payload() -> serde_json::Value {
    json!({
        "arguments": {
            "db0": {
                "name": "db0",
                "argument": "I should choose Optune as a treatment.",
                "initial_weight": 0.75,
                "strength": 0.73,
                "provenance": "topic"
            },
            "s1": {
                "name": "s1",
                "argument": "Optune shows a survival advantage.",
                "initial_weight": 0.95,
                "strength": 0.9,
                "provenance": "agent"
            },
            "a1": {
                "name": "a1",
                "argument": "Optune is highly inconvenient to use.",
                "initial_weight": 0.85,
                "strength": 0.4,
                "provenance": "agent"
            }
        },
        "attacks": [["a1", "db0"]],
        "supports": [["s1", "db0"]]
    })
}

fn parse_remote(value: serde_json::Value) -> FrameworkResult<ArgumentationFramework> {
    let wire: FractionFramework = serde_json::from_value(value)?;
    from_remote(wire)
}

// ============================================================================
// Scale conversion
// ============================================================================

#[test]
fn test_half_converts_both_ways() {
    assert_eq!(percent_to_fraction(50), 0.5);
    assert_eq!(fraction_to_percent(0.5), 50);
}

#[test]
fn test_every_whole_percent_round_trips_exactly() {
    for percent in 0..=100u8 {
        let literal: f64 = format!("{}.{:02}", percent / 100, percent % 100)
            .parse()
            .unwrap();
        assert_eq!(percent_to_fraction(percent), literal, "percent {}", percent);
        assert_eq!(fraction_to_percent(literal), percent, "fraction {}", literal);
    }
}

#[test]
fn test_rounding_is_half_away_from_zero() {
    assert_eq!(fraction_to_percent(0.125), 13);
    assert_eq!(fraction_to_percent(0.625), 63);
    assert_eq!(fraction_to_percent(0.124), 12);
}

#[test]
fn test_extra_precision_is_lost_on_the_wire() {
    let percent = fraction_to_percent(0.7349);
    assert_eq!(percent, 73);
    assert_ne!(percent_to_fraction(percent), 0.7349);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_from_remote_valid_payload() {
    let af = parse_remote(remote_payload()).unwrap();
    assert_eq!(af.nodes().len(), 3);
    assert_eq!(af.topic().id, "db0");
    assert_eq!(af.confidence(), 73);
    assert_eq!(af.attack_edges(), &[Edge::new("a1", "db0")]);
    assert_eq!(af.support_edges(), &[Edge::new("s1", "db0")]);
}

#[test]
fn test_missing_topic_is_malformed() {
    let mut payload = remote_payload();
    payload["arguments"]["db0"]["provenance"] = json!("agent");

    let err = parse_remote(payload).unwrap_err();
    assert!(matches!(err, FrameworkError::TopicCount { count: 0 }));
    assert!(err.is_malformed_snapshot());
}

#[test]
fn test_two_topics_is_malformed() {
    let mut payload = remote_payload();
    payload["arguments"]["s1"]["provenance"] = json!("topic");

    let err = parse_remote(payload).unwrap_err();
    assert!(matches!(err, FrameworkError::TopicCount { count: 2 }));
}

#[test]
fn test_dangling_edge_is_malformed() {
    let mut payload = remote_payload();
    payload["supports"] = json!([["ghost", "db0"]]);

    let err = parse_remote(payload).unwrap_err();
    assert!(matches!(err, FrameworkError::DanglingEdge { .. }));
    assert!(err.is_malformed_snapshot());
}

#[test]
fn test_out_of_range_score_is_rejected() {
    let mut payload = remote_payload();
    payload["arguments"]["s1"]["strength"] = json!(1.5);

    let err = parse_remote(payload).unwrap_err();
    assert!(matches!(
        err,
        FrameworkError::OutOfRange {
            field: "strength",
            ..
        }
    ));
    assert!(!err.is_malformed_snapshot());
}

#[test]
fn test_missing_field_is_rejected_not_defaulted() {
    let mut payload = remote_payload();
    payload.as_object_mut().unwrap().remove("supports");

    let err = parse_remote(payload).unwrap_err();
    assert!(matches!(err, FrameworkError::Json(_)));
}

#[test]
fn test_percent_over_hundred_is_rejected() {
    let mut wire = to_percent(&parse_remote(remote_payload()).unwrap());
    if let Some(arg) = wire.arguments.get_mut("s1") {
        arg.initial_weight = 120;
    }

    let err = from_percent(wire).unwrap_err();
    assert!(matches!(
        err,
        FrameworkError::OutOfRange {
            field: "initial_weight",
            ..
        }
    ));
}

// ============================================================================
// Export / import
// ============================================================================

#[test]
fn test_export_uses_percentage_scale() {
    let af = parse_remote(remote_payload()).unwrap();
    let wire = to_percent(&af);

    assert_eq!(wire.arguments["db0"].strength, 73);
    assert_eq!(wire.arguments["db0"].initial_weight, 75);
    assert_eq!(wire.arguments["s1"].strength, 90);
}

#[test]
fn test_export_import_export_is_byte_identical() {
    let af = parse_remote(remote_payload()).unwrap();
    let first = export_json(&af).unwrap();

    let reimported = import_json(&first).unwrap();
    let second = export_json(&reimported).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_to_remote_keeps_fractions() {
    let af = parse_remote(remote_payload()).unwrap();
    let wire = to_remote(&af);

    assert_eq!(wire.arguments["db0"].strength, 0.73);
    assert_eq!(wire.attacks, vec![("a1".to_string(), "db0".to_string())]);
}

#[test]
fn test_merge_is_full_replacement() {
    let old = parse_remote(remote_payload()).unwrap().into_snapshot();

    let mut payload = remote_payload();
    payload["arguments"]["db0"]["strength"] = json!(0.2);
    let new = parse_remote(payload).unwrap().into_snapshot();

    let merged = merge(Some(&old), new.clone());
    assert!(std::sync::Arc::ptr_eq(&merged, &new));
    assert_eq!(merged.confidence(), 20);

    let first = merge(None, old.clone());
    assert!(std::sync::Arc::ptr_eq(&first, &old));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fraction_to_percent_is_nearest_whole_percent(fraction in 0.0f64..=1.0) {
            let percent = fraction_to_percent(fraction);
            prop_assert!(percent <= 100);
            prop_assert!((f64::from(percent) - fraction * 100.0).abs() <= 0.5 + 1e-9);
        }

        #[test]
        fn percent_survives_a_fraction_round_trip(percent in 0u8..=100) {
            prop_assert_eq!(fraction_to_percent(percent_to_fraction(percent)), percent);
        }
    }
}
