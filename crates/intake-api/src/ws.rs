// SPDX-License-Identifier: Apache-2.0

//! Live-channel message protocol. Clients announce interest with
//! `subscribe_inspection`; the server pushes `inspection_update` for every
//! persisted patch on the subscribed inspection.

use intake_model::UpdateEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeInspection { inspection_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    InspectionUpdate { data: UpdateEvent },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use intake_model::InspectionId;
    use serde_json::json;

    #[test]
    fn subscribe_message_uses_wire_tag() {
        let msg: ClientMessage = serde_json::from_value(
            json!({"type": "subscribe_inspection", "inspection_id": "abc"}),
        )
        .expect("deserialize subscribe");
        assert_eq!(
            msg,
            ClientMessage::SubscribeInspection {
                inspection_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn update_message_nests_event_under_data() {
        let event = UpdateEvent {
            inspection_id: InspectionId::parse("i-1").expect("id"),
            path: "exterior.notes".to_string(),
            value: json!("ok"),
            timestamp: Utc::now(),
            actor_id: "u-1".to_string(),
        };
        let value = serde_json::to_value(ServerMessage::InspectionUpdate { data: event })
            .expect("serialize update");
        assert_eq!(value["type"], "inspection_update");
        assert_eq!(value["data"]["path"], "exterior.notes");
    }

    #[test]
    fn unknown_message_types_fail_to_parse() {
        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "ping"})).is_err());
    }
}
