//! Answer synthesis - grounded generation over retrieved chunks
//!
//! Provides:
//! - Bounded context construction, best chunk first
//! - A strict prompt restricting the model to that context
//! - Refusal detection against configured decline phrases
//! - Extractive fallback when generation is unavailable

use docvault_common::config::{GenerationConfig, SynthesisConfig};
use docvault_common::errors::{AppError, Result};
use docvault_common::llm::{GenerationRequest, Generator};
use docvault_common::models::{AnswerMode, ScoredChunk};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Separator between context blocks
const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Synthesized answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedAnswer {
    /// Answer text; empty when `no_answer` is set
    pub answer: String,

    pub no_answer: bool,

    pub mode: AnswerMode,

    /// Generation failed and the answer is an excerpt instead
    pub degraded: bool,

    /// Context blocks the model cited as `[n]` (1-based, ascending)
    pub citations: Vec<usize>,
}

impl SynthesizedAnswer {
    fn none() -> Self {
        Self {
            answer: String::new(),
            no_answer: true,
            mode: AnswerMode::None,
            degraded: false,
            citations: Vec::new(),
        }
    }
}

/// Generates answers constrained to retrieved evidence
pub struct Synthesizer {
    generator: Arc<dyn Generator>,
    config: SynthesisConfig,
    temperature: f32,
    max_tokens: usize,
    citation_pattern: regex_lite::Regex,
    decline_phrases: Vec<String>,
}

impl Synthesizer {
    pub fn new(
        generator: Arc<dyn Generator>,
        config: SynthesisConfig,
        generation: &GenerationConfig,
    ) -> Result<Self> {
        let citation_pattern = regex_lite::Regex::new(r"\[(\d+)\]")
            .map_err(|e| AppError::internal(format!("citation pattern: {}", e)))?;
        let decline_phrases = config
            .decline_phrases
            .iter()
            .map(|p| normalize_reply(p))
            .filter(|p| !p.is_empty())
            .collect();

        Ok(Self {
            generator,
            config,
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
            citation_pattern,
            decline_phrases,
        })
    }

    /// Answer `question` from `chunks` (best first).
    ///
    /// Never fails: no evidence gives a no-answer without calling the
    /// model, and a failed generation degrades to the best chunk's text.
    pub async fn synthesize(&self, question: &str, chunks: &[ScoredChunk]) -> SynthesizedAnswer {
        let Some(best) = chunks.first() else {
            return SynthesizedAnswer::none();
        };

        let (context, used) = self.build_context(chunks);
        let request = GenerationRequest {
            system: Some(self.system_prompt()),
            prompt: build_prompt(question, &context),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let start = Instant::now();
        match self.generator.generate(&request).await {
            Ok(output) => {
                let answer = output.trim();
                if answer.is_empty() || self.is_decline(answer) {
                    tracing::info!(
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Model declined to answer"
                    );
                    return SynthesizedAnswer::none();
                }

                SynthesizedAnswer {
                    answer: answer.to_string(),
                    no_answer: false,
                    mode: AnswerMode::Generated,
                    degraded: false,
                    citations: self.extract_citations(answer, used),
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    chunk_id = %best.chunk.id,
                    "Generation failed, answering with top excerpt"
                );
                SynthesizedAnswer {
                    answer: best.chunk.text.clone(),
                    no_answer: false,
                    mode: AnswerMode::Extractive,
                    degraded: true,
                    citations: vec![1],
                }
            }
        }
    }

    /// Numbered context blocks within the character budget and the
    /// number of chunks that made it in. The first block is always
    /// present, cut to the budget if it alone exceeds it.
    fn build_context(&self, chunks: &[ScoredChunk]) -> (String, usize) {
        let budget = self.config.max_context_chars;
        let mut context = String::new();
        let mut used_chars = 0;
        let mut used = 0;

        for (i, scored) in chunks.iter().enumerate() {
            let block = format!(
                "[{}] {}\n{}",
                i + 1,
                scored.chunk.document_id(),
                scored.chunk.text
            );
            let separator = if i == 0 { 0 } else { BLOCK_SEPARATOR.chars().count() };
            let block_chars = block.chars().count();

            if used_chars + separator + block_chars > budget {
                if i == 0 {
                    context = block.chars().take(budget).collect();
                    used = 1;
                }
                break;
            }
            if i > 0 {
                context.push_str(BLOCK_SEPARATOR);
            }
            context.push_str(&block);
            used_chars += separator + block_chars;
            used += 1;
        }

        (context, used)
    }

    fn system_prompt(&self) -> String {
        let decline = self
            .config
            .decline_phrases
            .first()
            .map(String::as_str)
            .unwrap_or("NO_ANSWER");
        format!(
            "Tu es un assistant documentaire pour une entreprise SaaS multi-tenant.\n\n\
             RÈGLES STRICTES:\n\
             1. Réponds UNIQUEMENT en te basant sur les documents fournis\n\
             2. Si l'information n'est PAS dans les documents, réponds exactement \"{}\" et rien d'autre\n\
             3. Ne jamais inventer ou supposer des informations\n\
             4. Cite tes sources avec leur numéro entre crochets, par exemple [1]\n\
             5. Sois concis et précis\n\
             6. Réponds dans la langue de la question",
            decline
        )
    }

    fn is_decline(&self, output: &str) -> bool {
        let reply = normalize_reply(output);
        self.decline_phrases.iter().any(|p| reply.starts_with(p.as_str()))
    }

    /// Valid `[n]` references in the model output
    fn extract_citations(&self, output: &str, blocks: usize) -> Vec<usize> {
        let mut citations: Vec<usize> = self
            .citation_pattern
            .captures_iter(output)
            .filter_map(|cap| cap.get(1)?.as_str().parse::<usize>().ok())
            .filter(|n| (1..=blocks).contains(n))
            .collect();
        citations.sort_unstable();
        citations.dedup();
        citations
    }
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Contexte (documents disponibles):\n{}\n\n\
         Question: {}\n\n\
         Réponds à la question en te basant STRICTEMENT sur les documents ci-dessus.",
        context, question
    )
}

/// Lowercase, trim, and strip surrounding quotes and trailing punctuation
fn normalize_reply(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '«' || c == '»')
        .trim_end_matches(|c: char| c == '.' || c == '!' || c.is_whitespace())
        .trim()
        .to_lowercase()
}
