//! Push notifications through the Expo push service.

use serde_json::{Value, json};
use strangers_core::PushNotification;
use tracing::{debug, warn};

use crate::error::Result;

/// Best-effort notification delivery. `send` never blocks and never fails;
/// delivery problems are logged.
pub trait PushGateway: Send + Sync {
    fn send(&self, token: &str, notification: &PushNotification);
}

pub struct ExpoPush {
    url: String,
    http_client: reqwest::Client,
}

impl ExpoPush {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http_client: reqwest::Client::new(),
        }
    }
}

impl PushGateway for ExpoPush {
    fn send(&self, token: &str, notification: &PushNotification) {
        if token.is_empty() {
            return;
        }
        let body = expo_message(token, notification);
        let client = self.http_client.clone();
        let url = self.url.clone();

        // Fire-and-forget; nothing waits on the push service.
        tokio::spawn(async move {
            match deliver(&client, &url, &body).await {
                Ok(response) => debug!("Expo push response: {response}"),
                Err(e) => warn!("Expo push failed: {e}"),
            }
        });
    }
}

async fn deliver(client: &reqwest::Client, url: &str, body: &Value) -> Result<Value> {
    let response = client
        .post(url)
        .header("Accept", "application/json")
        .json(body)
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}

/// Expo push message for one device.
fn expo_message(token: &str, notification: &PushNotification) -> Value {
    let mut data = json!({ "type": notification.kind.as_str() });
    if let Some(from) = &notification.from {
        data["from"] = json!(from.as_str());
    }
    json!({
        "to": token,
        "sound": "default",
        "title": notification.title,
        "body": notification.body,
        "data": data,
    })
}

/// Used when `PUSH_DISABLED` is set.
pub struct DisabledPush;

impl PushGateway for DisabledPush {
    fn send(&self, _token: &str, notification: &PushNotification) {
        debug!(kind = notification.kind.as_str(), "push disabled, dropping notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paired_message_shape() {
        let message = expo_message("ExponentPushToken[abc]", &PushNotification::paired());
        assert_eq!(
            message,
            json!({
                "to": "ExponentPushToken[abc]",
                "sound": "default",
                "title": "Found a Stranger!",
                "body": "A stranger is waiting. Come back to chat!",
                "data": {"type": "paired"},
            })
        );
    }

    #[test]
    fn chat_message_carries_sender() {
        let notification = PushNotification::message("hello", &"conn-1".into());
        let message = expo_message("tok", &notification);
        assert_eq!(message["title"], "New message");
        assert_eq!(message["body"], "hello");
        assert_eq!(message["data"], json!({"type": "chat", "from": "conn-1"}));
    }

    #[test]
    fn blank_text_gets_generic_body() {
        let message = expo_message("tok", &PushNotification::message("  ", &"c".into()));
        assert_eq!(message["body"], "You have a new message");
    }
}
