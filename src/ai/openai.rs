use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;

use super::TitleService;
use crate::config::Config;

pub struct OpenAiService {
    api_key: String,
    model: String,
    endpoint: String,
    system_prompt: String,
    user_prompt: String,
    client: Client,
}

impl OpenAiService {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.network.timeout())
            .build()
            .context("Failed to build OpenAI HTTP client")?;
        Ok(Self {
            api_key: config.openai.api_key.clone(),
            model: config.openai.model.clone(),
            endpoint: config.openai.endpoint.clone(),
            system_prompt: config.title.system_prompt.clone(),
            user_prompt: config.title.user_prompt.clone(),
            client,
        })
    }

    fn request_body(&self, image_base64: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": self.system_prompt
                },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "text",
                            "text": self.user_prompt
                        },
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:image/jpeg;base64,{image_base64}"),
                                "detail": "low"
                            }
                        }
                    ]
                }
            ],
            "max_tokens": 100
        })
    }
}

#[async_trait::async_trait]
impl TitleService for OpenAiService {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn caption(&self, image_base64: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(image_base64))
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read OpenAI response")?;

        if !status.is_success() {
            anyhow::bail!("OpenAI API error ({}): {}", status, text);
        }

        extract_content(&text)
    }
}

fn extract_content(text: &str) -> Result<String> {
    let json: serde_json::Value =
        serde_json::from_str(text).context("Failed to parse OpenAI response JSON")?;

    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .context("No content in OpenAI response")?;

    Ok(content.to_string())
}
