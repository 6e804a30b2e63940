use plc_telemetry::new_request_ids;

#[test]
fn request_ids_are_distinct_uuids() {
    let ids = new_request_ids();
    assert!(uuid::Uuid::parse_str(&ids.request_id).is_ok());
    assert!(uuid::Uuid::parse_str(&ids.trace_id).is_ok());
    assert_ne!(ids.request_id, ids.trace_id);

    let next = new_request_ids();
    assert_ne!(ids.request_id, next.request_id);
}
