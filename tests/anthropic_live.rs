use anyhow::Result;
use std::path::Path;

use pagebook::anthropic::model::{ContentBlock, Message, MessageRequest};
use pagebook::anthropic::{AnthropicClient, ModelService};
use pagebook::config;

// Needs ./config.yaml and a real key (file or ANTHROPIC_API_KEY).
#[tokio::test]
#[ignore]
async fn live_model_answers_with_text() -> Result<()> {
    let cfg = config::load(Some(Path::new("./config.yaml")))?;
    let key = cfg
        .api_key()
        .ok_or_else(|| anyhow::anyhow!("no API key configured"))?;
    let client = AnthropicClient::new(key, cfg.anthropic.version.clone())?;

    let request = MessageRequest {
        model: cfg.anthropic.model.clone(),
        max_tokens: 64,
        messages: vec![Message::user(vec![ContentBlock::Text {
            text: "Reply with the single word: pong".into(),
        }])],
    };
    let response = client.create_message(&request).await?;
    let text = response.first_text();
    println!("model replied: {}", text);
    assert!(!text.trim().is_empty());
    Ok(())
}
