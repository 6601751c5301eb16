//! Prompt construction for the three answer strategies.
//!
//! Every builder is a pure function of the question and the ranked chunks.
//! The chunks are serialized once, in rank order, into labeled blocks that
//! the model cites as `[Source N]`.

use super::RetrievedChunk;
use crate::error::KneeRagError;
use serde::{Deserialize, Serialize};

/// Domain framing shared verbatim by every strategy.
pub const SAFETY_FRAMING: &str = "You are an AI assistant specialized in orthopedic knee injuries \
(ACL, meniscus, collateral ligaments, cartilage). Use ONLY the provided context to answer. \
If the context does not support an answer, say that you cannot answer this from the available \
sources and recommend consulting a qualified medical professional.";

/// Separator placed between context blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Prompt strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVersion {
    /// Zero-shot, concise answer with inline citations.
    V1,
    /// Few-shot, fixed four-part structure.
    V2,
    /// Silent chain-of-thought, only the conclusion is returned.
    V3,
}

impl PromptVersion {
    /// All strategies, in evaluation order.
    pub const ALL: [PromptVersion; 3] = [PromptVersion::V1, PromptVersion::V2, PromptVersion::V3];

    /// Human-readable strategy name.
    pub fn label(&self) -> &'static str {
        match self {
            PromptVersion::V1 => "zero-shot",
            PromptVersion::V2 => "few-shot structured",
            PromptVersion::V3 => "chain-of-thought",
        }
    }
}

impl std::str::FromStr for PromptVersion {
    type Err = KneeRagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v1" | "1" => Ok(PromptVersion::V1),
            "v2" | "2" => Ok(PromptVersion::V2),
            "v3" | "3" => Ok(PromptVersion::V3),
            _ => Err(KneeRagError::InvalidArgument(format!(
                "unknown prompt version {:?} (expected v1, v2 or v3)",
                s
            ))),
        }
    }
}

impl std::fmt::Display for PromptVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptVersion::V1 => write!(f, "v1"),
            PromptVersion::V2 => write!(f, "v2"),
            PromptVersion::V3 => write!(f, "v3"),
        }
    }
}

/// Build the complete prompt for `version`.
pub fn build_prompt(version: PromptVersion, question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = serialize_context(chunks);
    match version {
        PromptVersion::V1 => zero_shot(&context, question),
        PromptVersion::V2 => few_shot_structured(&context, question),
        PromptVersion::V3 => chain_of_thought(&context, question),
    }
}

/// Serialize chunks into `[Source i | source | page p]` blocks, in the given order.
///
/// No reordering or deduplication happens here: block `i` is the `i`-th
/// retrieval result.
pub fn serialize_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Source {} | {} | page {}]\n{}",
                i + 1,
                chunk.metadata.source_label(),
                chunk.metadata.page_label(),
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

fn zero_shot(context: &str, question: &str) -> String {
    format!(
        "{SAFETY_FRAMING}

Context:
{context}

Question: {question}

Instructions: Answer in one or two concise paragraphs. Support each claim with an inline \
citation of the form [Source N], where N is the number of the context block it comes from.

Answer:
"
    )
}

const FEW_SHOT_EXAMPLE: &str = "### Example
Question: What should a patient do in the first week after a suspected MCL sprain?

Summary:
Most isolated MCL sprains heal without surgery; the first week focuses on protecting the ligament \
while controlling pain and swelling [Source 1].

Key recommendations:
- Ice, compression and elevation to limit swelling [Source 1].
- A hinged knee brace with weight bearing as tolerated [Source 2].

Warnings/red flags:
- Inability to bear weight, locking or marked instability needs prompt specialist assessment [Source 2].

Sources:
- [Source 1], [Source 2]
### End of example";

fn few_shot_structured(context: &str, question: &str) -> String {
    format!(
        "{SAFETY_FRAMING}

Context:
{context}

Answer using exactly the structure of the example below. Reuse the four headings verbatim and in \
the same order: Summary, Key recommendations, Warnings/red flags, Sources. Cite context blocks as \
[Source N]. The example shows the format only; its content is not evidence.

{FEW_SHOT_EXAMPLE}

Question: {question}

Answer:
"
    )
}

fn chain_of_thought(context: &str, question: &str) -> String {
    format!(
        "{SAFETY_FRAMING}

Context:
{context}

Question: {question}

Instructions: Before answering, reason step by step silently: decide which context blocks are \
relevant, check whether they agree, and work out what the evidence supports. Do NOT write out \
this reasoning. Output only the final conclusion in one or two short paragraphs, with inline \
citations of the form [Source N].

Final answer:
"
    )
}
