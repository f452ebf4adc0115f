//! Prompt contract for the two pipeline flows.

use serde::{Deserialize, Serialize};

use crate::CompletionRequest;

const ANALYSIS_SYSTEM: &str = "You are a senior engineer reviewing a Salesforce and GitHub \
code repository. Answer the user's question using only the repository context provided. \
Reference files by path. If the context does not contain the answer, say so plainly.";

const GENERATION_SYSTEM: &str = "You are a senior Salesforce engineer implementing a user \
story in an existing repository. Respond with ONLY a JSON object. Each key is a \
repository-relative file path; each value is the complete new content of that file. \
Include only files you create or change. Do not wrap the JSON in prose.";

/// The user story a generation run implements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryBrief {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

impl StoryBrief {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.acceptance_criteria.push(criterion.into());
        self
    }

    /// Text the relevance router sees for this story.
    pub fn as_query(&self) -> String {
        if self.description.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.description)
        }
    }
}

/// Prompt for a code-analysis question.
pub fn analysis_request(question: &str, context: &str, max_tokens: u32) -> CompletionRequest {
    CompletionRequest {
        system: ANALYSIS_SYSTEM.to_string(),
        prompt: format!("Repository context:\n\n{context}\n\nQuestion: {question}"),
        max_tokens,
    }
}

/// Prompt for generating the files of a story.
pub fn generation_request(story: &StoryBrief, context: &str, max_tokens: u32) -> CompletionRequest {
    let mut prompt = format!("User story: {}\n", story.title);
    if !story.description.trim().is_empty() {
        prompt.push_str(&format!("\nDescription:\n{}\n", story.description.trim()));
    }
    if !story.acceptance_criteria.is_empty() {
        prompt.push_str("\nAcceptance criteria:\n");
        for criterion in &story.acceptance_criteria {
            prompt.push_str(&format!("- {criterion}\n"));
        }
    }
    prompt.push_str(&format!("\nRepository context:\n\n{context}\n"));
    prompt.push_str(
        "\nReturn the JSON object now, for example {\"path/to/File.cls\": \"full content\"}.",
    );
    CompletionRequest {
        system: GENERATION_SYSTEM.to_string(),
        prompt,
        max_tokens,
    }
}
