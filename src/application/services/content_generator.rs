use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::GenerationSettings;
use crate::domain::ports::llm_provider::{
    ChatMessage, CompletionRequest, GenerationError, LlmProvider,
};
use crate::domain::services::section_parser;

const SYSTEM_PROMPT: &str = "You are an expert SEO copywriter. Write accurate, well-structured \
content grounded in the supplied website context. Always answer using exactly this template, \
with each label on its own line:

META_TITLE: <title, at most 60 characters>
META_DESCRIPTION: <description, at most 160 characters>
CONTENT:
<article body in Markdown with H2/H3 headings>
FAQ:
<3-5 question and answer pairs, each as 'Q: ...' then 'A: ...'>
SCHEMA:
<a single JSON-LD object (schema.org FAQPage or Article), no commentary>";

/// Length band accepted around the target word count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthBand {
    pub min: usize,
    pub max: usize,
}

impl LengthBand {
    pub fn around(target: u32, tolerance: f64) -> Self {
        let target = f64::from(target);
        let tolerance = tolerance.clamp(0.0, 1.0);
        Self {
            min: (target * (1.0 - tolerance)).floor() as usize,
            max: (target * (1.0 + tolerance)).ceil() as usize,
        }
    }

    pub fn contains(&self, words: usize) -> bool {
        words >= self.min && words <= self.max
    }
}

/// Turns crawl context into a raw, labelled draft via the LLM provider.
#[derive(Clone)]
pub struct ContentGenerator {
    provider: Arc<dyn LlmProvider>,
    settings: GenerationSettings,
}

impl ContentGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: GenerationSettings) -> Self {
        Self { provider, settings }
    }

    /// Generate a draft, then refine its length for at most
    /// `max_refinements` rounds. A refinement that errors or loses the
    /// section template leaves the previous draft in place.
    pub async fn generate(
        &self,
        context: &str,
        topic: &str,
        keywords: &[String],
        target_length: u32,
    ) -> Result<String, GenerationError> {
        let base = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(context, topic, keywords, target_length)),
        ];

        let mut draft = self.call(base.clone()).await?;
        let band = LengthBand::around(target_length, self.settings.length_tolerance);

        for round in 1..=self.settings.max_refinements {
            let words = section_parser::body_word_count(&draft);
            if band.contains(words) {
                debug!(words, round, "Draft length within band");
                break;
            }

            info!(words, target = target_length, round, "Refining draft length");
            let mut messages = base.clone();
            messages.push(ChatMessage::assistant(draft.clone()));
            messages.push(ChatMessage::user(refinement_instruction(
                words,
                target_length,
            )));

            match self.call(messages).await {
                Ok(refined) => {
                    let keeps_template = section_parser::parse(&refined).is_ok();
                    if keeps_template || section_parser::parse(&draft).is_err() {
                        draft = refined;
                    } else {
                        warn!(round, "Refined draft lost the section template; keeping previous");
                        break;
                    }
                }
                Err(e) => {
                    warn!(round, error = %e, category = e.category(), "Refinement failed; keeping previous draft");
                    break;
                }
            }
        }

        Ok(draft)
    }

    async fn call(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        metrics::counter!("llm_requests_total").increment(1);
        let request = CompletionRequest {
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        tokio::time::timeout(self.settings.timeout, self.provider.complete(request))
            .await
            .map_err(|_| GenerationError::Timeout(self.settings.timeout))?
    }
}

fn build_prompt(context: &str, topic: &str, keywords: &[String], target_length: u32) -> String {
    format!(
        "Topic: {topic}\n\
         Target keywords: {keywords}\n\
         Target length: about {target_length} words in the CONTENT section.\n\n\
         Use the keywords naturally in the title, description, headings and body. \
         Base facts on the website context below; do not invent product details.\n\n\
         Website context:\n{context}",
        keywords = keywords.join(", "),
    )
}

fn refinement_instruction(words: usize, target_length: u32) -> String {
    let direction = if words < target_length as usize {
        "Expand"
    } else {
        "Trim"
    };
    format!(
        "The CONTENT section has {words} words but should have about {target_length}. \
         {direction} it to roughly {target_length} words. Return the complete response again \
         using the same template and labels."
    )
}
