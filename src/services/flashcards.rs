//! Flashcard generation
//!
//! Turns a block of study material into flashcard proposals through a structured completion

use crate::models::chat::{ChatCompletionRequest, ChatMessage, ModelParams};
use crate::models::schema::JsonSchema;
use crate::services::client::GatewayClient;
use crate::utils::error::{helpers::validation_error, GatewayResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are an assistant that writes study flashcards. \
Read the user's text and produce concise question-and-answer pairs covering its key facts. \
Each front is a question or prompt of at most 200 characters. \
Each back is the answer of at most 500 characters. \
Write in the same language as the source text.";

/// One generated card awaiting user review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardProposal {
    pub front: String,
    pub back: String,
}

/// Generation limits
#[derive(Debug, Clone, PartialEq)]
pub struct FlashcardGeneratorConfig {
    pub min_source_chars: usize,
    pub max_source_chars: usize,
    pub max_front_chars: usize,
    pub max_back_chars: usize,
    /// Overrides the client's default model
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for FlashcardGeneratorConfig {
    fn default() -> Self {
        Self {
            min_source_chars: 1000,
            max_source_chars: 10_000,
            max_front_chars: 200,
            max_back_chars: 500,
            model: None,
            temperature: Some(0.3),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedFlashcards {
    flashcards: Vec<FlashcardProposal>,
}

/// Schema requested from the model
pub fn flashcards_schema() -> JsonSchema {
    let card = JsonSchema::object([
        ("front", JsonSchema::string().with_description("Question or prompt")),
        ("back", JsonSchema::string().with_description("Answer")),
    ]);
    JsonSchema::object([("flashcards", JsonSchema::array(card))])
}

/// Flashcard generator backed by a gateway client
#[derive(Debug, Clone)]
pub struct FlashcardGenerator {
    client: GatewayClient,
    config: FlashcardGeneratorConfig,
}

impl FlashcardGenerator {
    pub fn new(client: GatewayClient) -> Self {
        Self::with_config(client, FlashcardGeneratorConfig::default())
    }

    pub fn with_config(client: GatewayClient, config: FlashcardGeneratorConfig) -> Self {
        Self { client, config }
    }

    /// Generate proposals from `source_text`
    ///
    /// Cards that are blank after trimming are dropped; overlong sides are truncated.
    pub async fn generate(&self, source_text: &str, user_id: Option<&str>) -> GatewayResult<Vec<FlashcardProposal>> {
        let source = source_text.trim();
        let length = source.chars().count();
        if length < self.config.min_source_chars || length > self.config.max_source_chars {
            return Err(validation_error(format!(
                "Source text must be between {} and {} characters, got {}",
                self.config.min_source_chars, self.config.max_source_chars, length
            )));
        }

        let mut request = ChatCompletionRequest::new(vec![ChatMessage::system(SYSTEM_PROMPT)?, ChatMessage::user(source)?])
            .with_schema(flashcards_schema())
            .with_params(ModelParams {
                temperature: self.config.temperature,
                ..Default::default()
            });
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }
        if let Some(user_id) = user_id {
            request = request.with_user_id(user_id);
        }

        let generated: GeneratedFlashcards = self.client.chat_completion_structured(request).await?;
        let total = generated.flashcards.len();
        let proposals: Vec<FlashcardProposal> = generated
            .flashcards
            .into_iter()
            .filter_map(|card| self.normalize(card))
            .collect();

        debug!(generated = total, kept = proposals.len(), "Flashcard proposals ready");
        Ok(proposals)
    }

    fn normalize(&self, card: FlashcardProposal) -> Option<FlashcardProposal> {
        let front = truncate_chars(card.front.trim(), self.config.max_front_chars);
        let back = truncate_chars(card.back.trim(), self.config.max_back_chars);
        if front.is_empty() || back.is_empty() {
            return None;
        }
        Some(FlashcardProposal { front, back })
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
