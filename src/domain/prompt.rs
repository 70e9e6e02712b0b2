//! Per-notation instruction templates and prompt assembly.
//!
//! Templates reference four placeholders: `{subject}`, `{snippets}`,
//! `{query}` and `{memory}`. Substitution is a single left-to-right pass, so
//! braces inside substituted text are never expanded again.

use serde::{Deserialize, Serialize};

use crate::domain::{Conversation, DocumentChunk, Notation};

const LADDER_TEMPLATE: &str = include_str!("../../prompts/ladder.txt");
const FBD_TEMPLATE: &str = include_str!("../../prompts/fbd.txt");
const STL_TEMPLATE: &str = include_str!("../../prompts/stl.txt");
const SCL_TEMPLATE: &str = include_str!("../../prompts/scl.txt");

const PLACEHOLDERS: [&str; 4] = ["subject", "snippets", "query", "memory"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub ladder: String,
    pub fbd: String,
    pub stl: String,
    pub scl: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            ladder: LADDER_TEMPLATE.to_string(),
            fbd: FBD_TEMPLATE.to_string(),
            stl: STL_TEMPLATE.to_string(),
            scl: SCL_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn template(&self, notation: Notation) -> &str {
        match notation {
            Notation::Ladder => &self.ladder,
            Notation::Fbd => &self.fbd,
            Notation::Stl => &self.stl,
            Notation::Scl => &self.scl,
        }
    }

    /// Notations whose template lacks the query or snippets placeholder.
    pub fn incomplete(&self) -> Vec<Notation> {
        Notation::ALL
            .into_iter()
            .filter(|n| {
                let t = self.template(*n);
                !t.contains("{query}") || !t.contains("{snippets}")
            })
            .collect()
    }

    pub fn compose(
        &self,
        notation: Notation,
        subject: &str,
        snippets: &[DocumentChunk],
        query: &str,
        memory: &Conversation,
    ) -> String {
        let snippets = render_snippets(snippets);
        let memory = memory.render_memory();

        fill(self.template(notation), |name| match name {
            "subject" => Some(subject),
            "snippets" => Some(snippets.as_str()),
            "query" => Some(query),
            "memory" => Some(memory.as_str()),
            _ => None,
        })
    }
}

/// Numbered passages, each headed by the file and page it came from.
pub fn render_snippets(snippets: &[DocumentChunk]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] {} (page {})\n{}",
                i + 1,
                chunk.metadata.source,
                chunk.metadata.page_label,
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn fill<'a>(template: &str, value: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let matched = PLACEHOLDERS.into_iter().find_map(|name| {
            let tail = after.strip_prefix(name)?.strip_prefix('}')?;
            Some((value(name)?, tail))
        });

        match matched {
            Some((text, tail)) => {
                out.push_str(text);
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
