//! Mapping engine tests
//!
//! Collection transforms over random inputs, and a driver run end to end
//! into `FormFlowInstructions`.

use formflow::{DriverConfig, DriverFormat, Error, MappingEngine};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};

fn driver(mappings: Value) -> DriverConfig {
    DriverConfig::from_value(
        json!({
            "driver": {"name": "t", "version": "1.0.0", "source": "Src", "target": "Tgt"},
            "mappings": mappings
        }),
        "t",
    )
    .unwrap()
}

fn engine() -> MappingEngine {
    let mut engine = MappingEngine::new();
    engine.targets_mut().register_passthrough("Tgt");
    engine
}

proptest! {
    #[test]
    fn test_filter_never_grows(items in prop::collection::vec(0i64..100, 0..20)) {
        let d = driver(json!({
            "kept": {"source": "items", "transform": "filter", "condition": "item > 50"}
        }));
        let out = engine().transform(&json!({"items": items.clone()}), &d).unwrap().unwrap();
        let kept: Vec<i64> = serde_json::from_value(out["kept"].clone()).unwrap();
        let expected: Vec<i64> = items.iter().copied().filter(|i| *i > 50).collect();

        prop_assert!(kept.len() <= items.len());
        // order is preserved
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn test_array_map_preserves_length(items in prop::collection::vec("[a-z]{1,8}", 0..20)) {
        let d = driver(json!({
            "mapped": {"source": "items", "transform": "array_map", "handler": {"name": "{{ item }}"}}
        }));
        let out = engine().transform(&json!({"items": items.clone()}), &d).unwrap().unwrap();
        let mapped = out["mapped"].as_array().cloned().unwrap_or_default();

        prop_assert_eq!(mapped.len(), items.len());
        for (entry, item) in mapped.iter().zip(&items) {
            prop_assert_eq!(&entry["name"], &json!(item));
        }
    }

    #[test]
    fn test_count_and_join(items in prop::collection::vec("[a-z]{1,4}", 0..10)) {
        let d = driver(json!({
            "count": {"source": "items", "transform": "count"},
            "joined": {"source": "items", "transform": "join", "separator": "-"}
        }));
        let out = engine().transform(&json!({"items": items.clone()}), &d).unwrap().unwrap();
        prop_assert_eq!(&out["count"], &json!(items.len()));
        prop_assert_eq!(&out["joined"], &json!(items.join("-")));
    }
}

const VOUCHER_DRIVER: &str = r#"
driver:
  name: voucher-redemption
  version: "1.0"
  source: App\Models\Voucher
  target: FormFlowInstructions
  description: Voucher redemption flow
constants:
  priorities:
    kyc: 1
mappings:
  reference_id: "disburse-{{ source.code }}"
  steps:
    source: inputs
    transform: array_map
    handler:
      handler: "{{ item.handler }}"
      config:
        title: "{{ item.title ?? 'Step' }}"
        step_name: "{{ item.handler }}"
  callbacks:
    on_complete: "{{ 'https://pay.test/disburse/' ~ source.code ~ '/complete' }}"
filters:
  skip_flow_if:
    - "source.redeemed == true"
  steps:
    - "item.handler != 'splash'"
"#;

fn voucher(redeemed: bool) -> Value {
    json!({
        "code": "ABC-123",
        "redeemed": redeemed,
        "inputs": [
            {"handler": "splash"},
            {"handler": "form", "title": "Wallet"},
            {"handler": "kyc"}
        ]
    })
}

#[test]
fn test_driver_into_instructions() {
    let driver = DriverConfig::parse(VOUCHER_DRIVER, DriverFormat::Yaml, "voucher.yaml").unwrap();
    let instructions = MappingEngine::new()
        .transform_instructions(&voucher(false), &driver)
        .unwrap()
        .unwrap();

    assert_eq!(instructions.reference_id, "disburse-ABC-123");
    let handlers: Vec<&str> = instructions.steps.iter().map(|s| s.handler.as_str()).collect();
    assert_eq!(handlers, vec!["form", "kyc"]);
    assert_eq!(instructions.steps[0].config["title"], json!("Wallet"));
    assert_eq!(instructions.steps[1].config["title"], json!("Step"));
    assert_eq!(
        instructions.callbacks.on_complete.as_deref(),
        Some("https://pay.test/disburse/ABC-123/complete")
    );
    assert!(instructions.validate().is_ok());
}

#[test]
fn test_skip_flow_if_suppresses_output() {
    let driver = DriverConfig::parse(VOUCHER_DRIVER, DriverFormat::Yaml, "voucher.yaml").unwrap();
    let result = MappingEngine::new().transform(&voucher(true), &driver).unwrap();
    assert_eq!(result, None);
}

#[test]
fn test_unknown_target_fails() {
    let d = driver(json!({"a": 1}));
    let err = MappingEngine::new().transform(&json!({}), &d).unwrap_err();
    assert!(matches!(err, Error::TargetResolution(target) if target == "Tgt"));
}

#[test]
fn test_malformed_mapping_rejected_at_load() {
    let err = DriverConfig::from_value(
        json!({
            "driver": {"name": "t", "version": "1.0", "source": "Src", "target": "Tgt"},
            "mappings": {"bad": {"source": "items", "transform": "explode"}}
        }),
        "t",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}
