use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use super::error::IngressError;

/// Envelope posted by a Pub/Sub push subscription.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PushRequest {
    pub message: PushMessage,
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64 encoded JSON [`StorageNotification`].
    pub data: String,
    pub message_id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Object-finalized notification carried inside the push message.
#[derive(Debug, Deserialize, Validate)]
pub struct StorageNotification {
    #[validate(length(min = 1, message = "Object name is required"))]
    pub name: String,
    pub bucket: Option<String>,
}

impl PushRequest {
    pub fn decode(&self) -> Result<StorageNotification, IngressError> {
        let raw = STANDARD.decode(self.message.data.trim())?;
        let notification: StorageNotification = serde_json::from_slice(&raw)?;
        notification.validate()?;
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_request(data: &str) -> PushRequest {
        PushRequest {
            message: PushMessage {
                data: STANDARD.encode(data),
                message_id: Some("1".into()),
                attributes: HashMap::new(),
            },
            subscription: None,
        }
    }

    #[test]
    fn decodes_the_object_name() {
        let notification = push_request(r#"{"name":"sample.mp4","bucket":"raw-videos"}"#)
            .decode()
            .unwrap();
        assert_eq!(notification.name, "sample.mp4");
        assert_eq!(notification.bucket.as_deref(), Some("raw-videos"));
    }

    #[test]
    fn envelope_uses_pubsub_field_names() {
        let body = r#"{"message":{"data":"e30=","messageId":"42","attributes":{"eventType":"OBJECT_FINALIZE"}},"subscription":"projects/p/subscriptions/s"}"#;
        let request: PushRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.message.message_id.as_deref(), Some("42"));
        assert_eq!(request.message.attributes["eventType"], "OBJECT_FINALIZE");
    }

    #[test]
    fn missing_or_empty_name_is_rejected() {
        assert!(matches!(push_request("{}").decode(), Err(IngressError::Json(_))));
        assert!(matches!(push_request(r#"{"name":""}"#).decode(), Err(IngressError::Invalid(_))));
    }

    #[test]
    fn garbage_data_is_rejected() {
        let mut request = push_request("{}");
        request.message.data = "%%% not base64 %%%".into();
        assert!(matches!(request.decode(), Err(IngressError::Base64(_))));

        assert!(matches!(push_request("not json").decode(), Err(IngressError::Json(_))));
    }
}
