use serde_json::json;

use super::*;

// ==================== ConnectionOptions Tests ====================

#[test]
fn test_connection_options_default() {
    let opts = ConnectionOptions::default();

    assert!(opts.auto_reconnect, "auto_reconnect should default to true");
    assert_eq!(opts.reconnect_delay_ms, 1000);
    assert_eq!(opts.max_reconnect_delay_ms, 30000);
    assert_eq!(opts.max_reconnect_attempts, Some(10));
    assert!((opts.reconnect_jitter - 0.3).abs() < f64::EPSILON);
    assert_eq!(opts.batch_interval_ms, 50);
    assert_eq!(opts.batch_size, 10);
    assert_eq!(opts.flush_threshold, 10);
    assert!(opts.resubscribe_on_reconnect);
}

#[test]
fn test_connection_options_builder_pattern() {
    let opts = ConnectionOptions::new()
        .with_auto_reconnect(false)
        .with_reconnect_delay_ms(2000)
        .with_max_reconnect_attempts(None)
        .with_batch_size(3)
        .with_resubscribe_on_reconnect(false);

    assert!(!opts.auto_reconnect);
    assert_eq!(opts.reconnect_delay_ms, 2000);
    assert!(opts.max_reconnect_attempts.is_none());
    assert_eq!(opts.batch_size, 3);
    assert!(!opts.resubscribe_on_reconnect);
}

#[test]
fn test_connection_options_deserialize_partial() {
    let opts: ConnectionOptions =
        serde_json::from_value(json!({ "batch_size": 25, "auto_reconnect": false })).unwrap();

    assert_eq!(opts.batch_size, 25);
    assert!(!opts.auto_reconnect);
    assert_eq!(opts.reconnect_delay_ms, 1000, "missing fields fall back to defaults");
}

// ==================== ConnectionStatus Tests ====================

#[test]
fn test_connection_status_state() {
    let mut status = ConnectionStatus::default();
    assert_eq!(status.state(), ConnectionState::Disconnected);

    status.reconnecting = true;
    assert_eq!(status.state(), ConnectionState::Reconnecting);

    status.connected = true;
    status.reconnecting = false;
    assert_eq!(status.state(), ConnectionState::Connected);
}

#[test]
fn test_connection_status_display() {
    let status = ConnectionStatus {
        reconnecting: true,
        error: Some("connection reset".to_string()),
        retry_in_ms: Some(1200),
        ..Default::default()
    };

    assert_eq!(status.to_string(), "reconnecting (connection reset; retry in 1200ms)");
}

#[test]
fn test_connection_status_serialization_skips_empty() {
    let value = serde_json::to_value(ConnectionStatus::default()).unwrap();
    assert_eq!(
        value,
        json!({ "connected": false, "reconnecting": false, "reconnect_attempt": 0 })
    );
}

// ==================== EventKind Tests ====================

#[test]
fn test_event_kind_known_names() {
    assert_eq!(EventKind::from_name("order:created"), EventKind::OrderCreated);
    assert_eq!(EventKind::from_name("heartbeat:ack"), EventKind::HeartbeatAck);
    assert_eq!(EventKind::from("bot:invite_code"), EventKind::BotInviteCode);
    assert_eq!(EventKind::SystemHealth.as_str(), "system:health");
}

#[test]
fn test_event_kind_custom_names_are_preserved() {
    let kind = EventKind::from_name("raffle:winner");
    assert_eq!(kind, EventKind::Custom("raffle:winner".to_string()));
    assert_eq!(kind.to_string(), "raffle:winner");
}

#[test]
fn test_event_kind_control_classification() {
    assert!(EventKind::Status.is_control());
    assert!(EventKind::Session.is_control());
    assert!(!EventKind::OrderUpdated.is_control());
}

// ==================== Wire Message Tests ====================

#[test]
fn test_client_message_heartbeat_shape() {
    let raw = serde_json::to_string(&ClientMessage::heartbeat(1_700_000_000_000)).unwrap();
    assert_eq!(raw, r#"{"event":"heartbeat","data":{"timestamp":1700000000000}}"#);
}

#[test]
fn test_server_message_decoding() {
    let msg: ServerMessage =
        serde_json::from_str(r#"{"event":"drop:stock","data":{"dropId":"d1","remaining":4}}"#)
            .unwrap();
    assert_eq!(msg.event, EventKind::DropStockChanged);
    assert_eq!(msg.data["remaining"], 4);
}

#[test]
fn test_server_message_without_data() {
    let msg: ServerMessage = serde_json::from_str(r#"{"event":"heartbeat:ack"}"#).unwrap();
    assert!(msg.data.is_null());
    assert_eq!(msg.echoed_timestamp(), None);
}

#[test]
fn test_server_message_session_id() {
    let msg: ServerMessage =
        serde_json::from_str(r#"{"event":"session","data":{"sid":"abc123"}}"#).unwrap();
    assert_eq!(msg.session_id().as_deref(), Some("abc123"));
}

#[test]
fn test_link_event_kind() {
    let status = LinkEvent::Status(ConnectionStatus::default());
    assert_eq!(status.kind(), EventKind::Status);
    assert!(status.payload().is_none());

    let server = LinkEvent::Server {
        kind: EventKind::KpiUpdated,
        payload: json!({ "revenue": 10 }),
    };
    assert_eq!(server.kind(), EventKind::KpiUpdated);
    assert!(server.status().is_none());
}
