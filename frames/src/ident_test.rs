use super::*;

#[test]
fn numeric_and_string_ids_normalize_to_the_same_key() {
    let numeric = UserKey::from_json(&serde_json::json!(42)).expect("numeric id");
    let text = UserKey::from_json(&serde_json::json!("42")).expect("string id");
    assert!(numeric.matches(&text));
    assert_eq!(numeric, UserKey::from(42));
}

#[test]
fn integral_float_ids_drop_the_fraction() {
    assert_eq!(normalize_id(&serde_json::json!(42.0)).as_deref(), Some("42"));
}

#[test]
fn fractional_float_ids_keep_their_digits() {
    assert_eq!(normalize_id(&serde_json::json!(4.5)).as_deref(), Some("4.5"));
}

#[test]
fn blank_and_non_scalar_ids_are_rejected() {
    assert!(normalize_id(&serde_json::json!("  ")).is_none());
    assert!(normalize_id(&serde_json::json!(null)).is_none());
    assert!(normalize_id(&serde_json::json!({"id": 1})).is_none());
    assert!(UserKey::new("").is_none());
}

#[test]
fn string_ids_are_trimmed() {
    assert_eq!(UserKey::new(" 7 ").expect("key").as_str(), "7");
}

#[test]
fn different_ids_do_not_match() {
    let local = UserKey::from(42);
    let other = UserKey::new("99").expect("key");
    assert!(!local.matches(&other));
}

#[test]
fn zero_is_not_an_identifying_key() {
    assert!(!UserKey::from(0).is_identifying());
    assert!(UserKey::from(1).is_identifying());
}

#[test]
fn deserializes_from_number_or_string_and_serializes_as_string() {
    let from_number: UserKey = serde_json::from_value(serde_json::json!(13)).expect("number");
    let from_string: UserKey = serde_json::from_value(serde_json::json!("13")).expect("string");
    assert_eq!(from_number, from_string);
    assert_eq!(serde_json::to_value(&from_number).expect("serialize"), serde_json::json!("13"));
}

#[test]
fn deserialize_rejects_booleans() {
    assert!(serde_json::from_value::<UserKey>(serde_json::json!(true)).is_err());
}
