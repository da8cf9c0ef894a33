use log::info;
use reqwest::header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use crate::cli::Args;
use crate::models::chat::{ ChatMessage, SenderRole };

const SYSTEM_PROMPT: &str =
    "You are a support operator drafting a reply to the customer. \
     Answer the conversation below concisely and helpfully. \
     Respond with the reply text only.";

/// Optional suggested-reply generation against an OpenAI-compatible
/// chat-completions endpoint. A failed or misconfigured call fails this
/// operation alone; conversation and roster state are never touched.
pub struct ReplyAssistant {
    http: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize, Deserialize)]
struct AssistMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct AssistRequest {
    model: String,
    messages: Vec<AssistMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct AssistResponse {
    choices: Vec<AssistChoice>,
}

#[derive(Deserialize)]
struct AssistChoice {
    message: AssistMessage,
}

impl ReplyAssistant {
    /// Construct only when an assist endpoint is configured.
    pub fn from_args(args: &Args) -> Option<Self> {
        let base_url = args.assist_base_url.clone()?;
        info!("reply assistant enabled against {}", base_url);
        Some(Self {
            http: HttpClient::new(),
            base_url,
            api_key: args.assist_api_key.clone(),
            model: args.assist_model.clone(),
        })
    }

    /// Draft a reply to the conversation so far. Errors carry enough detail
    /// to show the operator why the suggestion failed.
    pub async fn suggest_reply(
        &self,
        conversation: &[ChatMessage]
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        if self.api_key.is_empty() {
            return Err("assist API key is not configured (set ASSIST_API_KEY)".into());
        }
        if conversation.is_empty() {
            return Err("nothing to reply to yet".into());
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = AssistRequest {
            model: self.model.clone(),
            messages: vec![
                AssistMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                AssistMessage {
                    role: "user".to_string(),
                    content: transcript_prompt(conversation),
                }
            ],
            temperature: 0.7,
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|e|
                format!("invalid assist API key: {}", e)
            )?
        );

        let response = self.http.post(&url).headers(headers).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("assist request failed with status {}: {}", status, body).into());
        }

        let parsed: AssistResponse = response.json().await?;
        let choice = parsed.choices
            .into_iter()
            .next()
            .ok_or("assist response contained no choices")?;
        Ok(choice.message.content.trim().to_string())
    }
}

/// Render the conversation the way the completion endpoint expects to read
/// it: one labelled line per message.
fn transcript_prompt(conversation: &[ChatMessage]) -> String {
    let mut result = String::from("Conversation so far:\n");
    for message in conversation {
        let label = match message.sender {
            SenderRole::User => "Customer",
            SenderRole::Admin => "Operator",
        };
        result.push_str(&format!("{}: {}\n", label, message.content));
    }
    result
}
