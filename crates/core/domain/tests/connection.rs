use domain::{ConnectionState, ConnectionStatus, ProtocolKind};

#[test]
fn initial_state_is_disconnected() {
    let state = ConnectionState::initial(ProtocolKind::Ads);

    assert_eq!(state.protocol, ProtocolKind::Ads);
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.success_rate.is_none());
    assert!(state.next_retry_in_ms.is_none());
}

#[test]
fn only_connected_and_degraded_are_online() {
    assert!(ConnectionStatus::Connected.is_online());
    assert!(ConnectionStatus::Degraded.is_online());
    assert!(!ConnectionStatus::Connecting.is_online());
    assert!(!ConnectionStatus::Disconnected.is_online());
}

#[test]
fn state_serializes_camel_case() {
    let mut state = ConnectionState::initial(ProtocolKind::Modbus);
    state.status = ConnectionStatus::Degraded;
    state.consecutive_failures = 3;

    let value = serde_json::to_value(&state).expect("serialize");
    assert_eq!(value["status"], "degraded");
    assert_eq!(value["consecutiveFailures"], 3);
    assert!(value.get("nextRetryInMs").is_some());
}

#[test]
fn protocol_names_parse_case_insensitively() {
    assert_eq!(ProtocolKind::parse("modbus"), Some(ProtocolKind::Modbus));
    assert_eq!(ProtocolKind::parse(" ADS "), Some(ProtocolKind::Ads));
    assert_eq!(ProtocolKind::parse("opcua"), None);
}
