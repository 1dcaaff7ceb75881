// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::parse_config;
use serde_json::{json, Value};

#[test]
fn mapping_configs_pass_through() {
    let config = json!({ "x": 1, "y": 70 });
    assert_eq!(parse_config(config.clone()), config);
}

#[test]
fn null_and_empty_strings_become_null() {
    assert_eq!(parse_config(Value::Null), Value::Null);
    assert_eq!(parse_config(json!("")), Value::Null);
    assert_eq!(parse_config(json!("   \n  ")), Value::Null);
}

#[test]
fn yaml_strings_parse_first() {
    let parsed = parse_config(json!("x: 1\nz: -3\ndump_strategy: dump_to_left_chest\n"));
    assert_eq!(parsed["x"], 1);
    assert_eq!(parsed["z"], -3);
    assert_eq!(parsed["dump_strategy"], "dump_to_left_chest");
}

#[test]
fn json_strings_parse_as_fallback() {
    // Valid JSON is also valid YAML, so it lands on the YAML path; the point
    // is that the mapping comes out structured either way.
    let parsed = parse_config(json!("{\"x\": 4, \"y\": 12}"));
    assert_eq!(parsed["x"], 4);
    assert_eq!(parsed["y"], 12);
}

#[test]
fn unparseable_strings_survive_as_raw_text() {
    let parsed = parse_config(json!("{{{{"));
    assert_eq!(parsed, json!("{{{{"));
}
