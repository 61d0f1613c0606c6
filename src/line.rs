//! LINE Messaging API client: webhook envelope, signature check, reply transport.

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

const LINE_API_BASE_URL: &str = "https://api.line.me";

/// One delivery envelope from the platform, possibly carrying several events.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Single-use capability permitting exactly one reply.
    pub reply_token: Option<String>,
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub text: Option<String>,
}

/// Check `x-line-signature` against the raw request body.
///
/// The platform sends Base64(HMAC-SHA256(channel secret, body)).
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    expected == signature
}

/// Outbound reply transport; the dispatcher only sees this seam.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Send one text message through a reply token. Tokens are single-use;
    /// the platform rejects reuse.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), Error>;
}

pub struct LineClient {
    access_token: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ReplyRequest<'a> {
    #[serde(rename = "replyToken")]
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    text: &'a str,
}

impl LineClient {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            base_url: LINE_API_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    fn with_base_url(access_token: String, base_url: String) -> Self {
        Self {
            access_token,
            base_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReplySender for LineClient {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), Error> {
        let request = ReplyRequest {
            reply_token,
            messages: vec![TextMessage {
                msg_type: "text",
                text,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v2/bot/message/reply", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_passes() {
        let body = br#"{"events":[]}"#;
        let signature = sign("channel-secret", body);
        assert!(verify_signature("channel-secret", body, &signature));
    }

    #[test]
    fn test_tampered_body_fails() {
        let signature = sign("channel-secret", br#"{"events":[]}"#);
        assert!(!verify_signature(
            "channel-secret",
            br#"{"events":[{}]}"#,
            &signature
        ));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let body = br#"{"events":[]}"#;
        let signature = sign("other-secret", body);
        assert!(!verify_signature("channel-secret", body, &signature));
    }

    #[test]
    fn test_garbage_signature_fails() {
        assert!(!verify_signature("channel-secret", b"body", "not-base64!"));
        assert!(!verify_signature("channel-secret", b"body", ""));
    }

    #[test]
    fn test_webhook_payload_deserialization() {
        let json = r#"{
            "destination": "U0123456789abcdef",
            "events": [
                {
                    "type": "message",
                    "replyToken": "0f3779fba3b349968c5d07db31eab56f",
                    "source": {"type": "user", "userId": "U4af4980629"},
                    "timestamp": 1462629479859,
                    "message": {"id": "325708", "type": "text", "text": "你好"}
                }
            ]
        }"#;

        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.events.len(), 1);
        let event = &payload.events[0];
        assert_eq!(event.event_type, "message");
        assert_eq!(
            event.reply_token.as_deref(),
            Some("0f3779fba3b349968c5d07db31eab56f")
        );
        let message = event.message.as_ref().unwrap();
        assert_eq!(message.msg_type, "text");
        assert_eq!(message.text.as_deref(), Some("你好"));
    }

    #[test]
    fn test_non_message_event_deserialization() {
        let json = r#"{"events":[{"type":"follow","replyToken":"abc123"}]}"#;
        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.events[0].event_type, "follow");
        assert!(payload.events[0].message.is_none());
    }

    #[tokio::test]
    async fn test_reply_posts_token_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .and(body_json(serde_json::json!({
                "replyToken": "token-1",
                "messages": [{"type": "text", "text": "哈囉！"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = LineClient::with_base_url("access-token".to_string(), server.uri());
        client
            .reply("token-1", "哈囉！")
            .await
            .expect("reply should succeed");
    }

    #[tokio::test]
    async fn test_reply_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"message": "Invalid reply token"})),
            )
            .mount(&server)
            .await;

        let client = LineClient::with_base_url("access-token".to_string(), server.uri());
        let err = client
            .reply("used-token", "hi")
            .await
            .expect_err("reply should fail");
        assert!(matches!(err, Error::Api(_)));
        assert!(err.to_string().contains("400"));
    }
}
