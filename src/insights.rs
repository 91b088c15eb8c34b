use anyhow::{anyhow, Context};
use serde_json::json;
use std::time::Duration;

use crate::config::Config;

const GENERATE_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Call the configured generative-text model with an optional system
/// instruction prepended to the prompt. Errors when no API key is set so
/// handlers can answer `ai_unavailable` instead of crashing the daemon.
pub fn generate_text(
    config: &Config,
    prompt: &str,
    system_instruction: Option<&str>,
) -> anyhow::Result<String> {
    let api_key = config
        .gemini_api_key
        .as_deref()
        .ok_or_else(|| anyhow!("GEMINI_API_KEY is not set"))?;

    let full_prompt = match system_instruction {
        Some(instruction) => format!("{}\n\n{}", instruction, prompt),
        None => prompt.to_string(),
    };

    let url = format!(
        "{}/{}:generateContent?key={}",
        GENERATE_ENDPOINT, config.gemini_model, api_key
    );
    let body = json!({
        "contents": [{ "parts": [{ "text": full_prompt }] }]
    });

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build http client")?;
    let resp = client
        .post(&url)
        .json(&body)
        .send()
        .context("text generation request failed")?;

    let status = resp.status();
    let payload: serde_json::Value = resp
        .json()
        .context("text generation response was not JSON")?;
    if !status.is_success() {
        let message = payload
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("upstream error");
        return Err(anyhow!("text generation failed ({}): {}", status, message));
    }

    let text = payload
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    Ok(text)
}
