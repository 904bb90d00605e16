//! Property-based tests for query extraction.
//!
//! 1. Whatever the model says, a successful parse is always valid
//! 2. Extraction is deterministic and never invents text
//! 3. Wrapping JSON in prose or fences does not change the result
//! 4. Projections only carry fields that were present

use std::collections::BTreeMap;
use std::time::Duration;

use proptest::prelude::*;
use tracequery_nlq::{
    decode_response, extract_json, parse_duration, ErrorProjection, SearchParams, MAX_LIMIT,
};

// ============================================================================
// Strategies
// ============================================================================

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

fn duration_literal_strategy() -> impl Strategy<Value = String> {
    (0u64..5000, prop_oneof![
        Just("ns"),
        Just("us"),
        Just("ms"),
        Just("s"),
        Just("m"),
        Just("h"),
    ])
        .prop_map(|(n, unit)| format!("{n}{unit}"))
}

fn tags_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z]{1,8}(\\.[a-z_]{1,8})?", "[a-zA-Z0-9 ]{1,12}", 0..4)
}

/// Arbitrary parameters; may or may not pass validation.
fn params_strategy() -> impl Strategy<Value = SearchParams> {
    (
        prop::option::of(name_strategy()),
        prop::option::of(name_strategy()),
        tags_strategy(),
        prop::option::of(duration_literal_strategy()),
        prop::option::of(duration_literal_strategy()),
        prop::option::of(any::<bool>()),
        prop::option::of(-10i64..2000),
    )
        .prop_map(
            |(service_name, operation_name, tags, min_duration, max_duration, error, limit)| {
                SearchParams {
                    service_name,
                    operation_name,
                    tags,
                    min_duration,
                    max_duration,
                    error,
                    limit,
                }
            },
        )
}

/// Surrounding chatter that contains neither braces nor backticks.
fn prose_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z ,.!:]{0,40}"
}

// ============================================================================
// Decode Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn successful_decode_always_validates(raw in ".{0,200}") {
        if let Ok(params) = decode_response(&raw) {
            prop_assert_eq!(params.validate(), Ok(()));
        }
    }

    #[test]
    fn decode_agrees_with_validate(params in params_strategy()) {
        let json = serde_json::to_string(&params).unwrap();
        match decode_response(&json) {
            Ok(decoded) => {
                prop_assert_eq!(&decoded, &params);
                prop_assert!(params.validate().is_ok());
            }
            Err(err) => {
                prop_assert_eq!(err.code(), "VALIDATION_FAILED");
                prop_assert!(params.validate().is_err());
            }
        }
    }

    #[test]
    fn limit_bounds(limit in -100i64..2000) {
        let params = SearchParams { limit: Some(limit), ..SearchParams::default() };
        prop_assert_eq!(params.validate().is_ok(), (1..=MAX_LIMIT).contains(&limit));
    }
}

// ============================================================================
// Extraction Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn extraction_is_deterministic(raw in ".{0,200}") {
        prop_assert_eq!(extract_json(&raw), extract_json(&raw));
    }

    #[test]
    fn extracted_text_comes_from_input(raw in ".{0,200}") {
        if let Some(found) = extract_json(&raw) {
            prop_assert!(raw.contains(found.json));
            prop_assert!(serde_json::from_str::<serde_json::Value>(found.json).is_ok());
        }
    }

    #[test]
    fn wrapping_does_not_change_result(
        params in params_strategy(),
        before in prose_strategy(),
        after in prose_strategy(),
    ) {
        let json = serde_json::to_string(&params).unwrap();
        let plain = decode_response(&json);

        let prose = format!("{before}{json}{after}");
        prop_assert_eq!(&decode_response(&prose), &plain);

        let fenced = format!("{before}\n```json\n{json}\n```\n{after}");
        prop_assert_eq!(&decode_response(&fenced), &plain);
    }
}

// ============================================================================
// Projection Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn query_map_has_only_present_keys(params in params_strategy()) {
        let map = params.to_query_map();
        prop_assert_eq!(map.contains_key("service"), params.service_name.is_some());
        prop_assert_eq!(map.contains_key("operation"), params.operation_name.is_some());
        prop_assert_eq!(map.contains_key("minDuration"), params.min_duration.is_some());
        prop_assert_eq!(map.contains_key("maxDuration"), params.max_duration.is_some());
        prop_assert_eq!(map.contains_key("limit"), params.limit.is_some());
        prop_assert_eq!(map.contains_key("tags"), !params.tags.is_empty());
        prop_assert!(!map.contains_key("error"));
    }

    #[test]
    fn error_tag_only_for_true(params in params_strategy()) {
        let map = params.to_query_map_with(ErrorProjection::Tag);
        let error_tag = map
            .get("tags")
            .and_then(|t| t.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        // A user-supplied `error` tag is never overwritten.
        let expected = match params.error {
            Some(true) => params.tags.get("error").cloned().or_else(|| Some("true".to_string())),
            _ => params.tags.get("error").cloned(),
        };
        prop_assert_eq!(error_tag, expected);
    }

    #[test]
    fn millisecond_literals(n in 0u64..10_000_000) {
        prop_assert_eq!(parse_duration(&format!("{n}ms")), Ok(Duration::from_millis(n)));
    }
}
