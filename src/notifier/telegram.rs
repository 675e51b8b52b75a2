use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NotifyError;
use crate::notifier::Notifier;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const CHANNEL: &str = "telegram";

/// Posts HTML messages to one chat through the Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    token: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: TELEGRAM_API_URL.into(),
            token,
            chat_id,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        CHANNEL
    }

    fn send(&self, text: &str) -> BoxFuture<'_, Result<(), Report<NotifyError>>> {
        let text = text.to_owned();
        Box::pin(async move {
            let delivery = || NotifyError::Delivery {
                channel: CHANNEL.into(),
            };
            let body = SendMessage {
                chat_id: &self.chat_id,
                text: &text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            };

            // reqwest errors print their URL, and the URL carries the token.
            let response = self
                .client
                .post(self.endpoint())
                .json(&body)
                .send()
                .await
                .map_err(reqwest::Error::without_url)
                .change_context(delivery())?;

            let status = response.status();
            let reply: ApiResponse = response
                .json()
                .await
                .map_err(reqwest::Error::without_url)
                .change_context(delivery())
                .attach_with(|| format!("HTTP status: {status}"))?;

            if !reply.ok {
                return Err(Report::new(delivery()).attach(format!(
                    "HTTP status: {status}, description: {}",
                    reply.description.unwrap_or_default()
                )));
            }

            debug!(chat_id = %self.chat_id, "telegram message delivered");
            Ok(())
        })
    }
}
