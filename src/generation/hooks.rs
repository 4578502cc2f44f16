//! Collaborators the pipeline calls through narrow interfaces: prompt
//! construction, content cleanup, and artifact persistence.

use crate::generation::plan::{Plan, WorkItem};
use std::path::{Path, PathBuf};

pub trait PromptBuilder: Send + Sync {
    /// Returns `(system_prompt, user_prompt)`.
    fn build_prompts(&self, plan: &Plan, item: &WorkItem) -> (String, String);
}

/// Pure, idempotent transform applied to produced text before it is written.
pub trait PostProcessor: Send + Sync {
    fn process(&self, text: &str) -> String;
}

pub trait ArtifactStore: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    fn write(&self, path: &str, content: &str) -> std::io::Result<()>;
}

const DEFAULT_SYSTEM_PROMPT: &str = "You write pages for a static website. \
Respond with a complete Markdown document that starts with a YAML front matter \
block delimited by '---' lines, containing at least title, description and draft: false. \
Do not wrap the document in code fences.";

const DEFAULT_USER_TEMPLATE: &str = "Write the page \"{title}\" for {site}.\n\
Description: {description}\n\
Target length: about {word_count} words.\n\
Keywords: {keywords}\n\
Link to these pages where relevant: {links}";

/// Renders prompts from `{placeholder}` templates.
#[derive(Debug, Clone)]
pub struct PagePromptBuilder {
    pub system_prompt: String,
    pub user_template: String,
}

impl Default for PagePromptBuilder {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }
}

impl PromptBuilder for PagePromptBuilder {
    fn build_prompts(&self, plan: &Plan, item: &WorkItem) -> (String, String) {
        let site = plan
            .context
            .get("site_title")
            .map(String::as_str)
            .unwrap_or("the site");
        let or_none = |values: &[String]| {
            if values.is_empty() {
                "none".to_string()
            } else {
                values.join(", ")
            }
        };

        let mut user = self
            .user_template
            .replace("{title}", &item.title)
            .replace("{site}", site)
            .replace("{description}", &item.description)
            .replace("{word_count}", &item.word_count.to_string())
            .replace("{keywords}", &or_none(&item.keywords))
            .replace("{links}", &or_none(&item.links))
            .replace("{path}", &item.path);
        for (key, value) in &plan.context {
            user = user.replace(&format!("{{{key}}}"), value);
        }
        (self.system_prompt.clone(), user)
    }
}

/// Strips a wrapping code fence and repairs misspelled booleans in front matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontMatterCleanup;

impl PostProcessor for FrontMatterCleanup {
    fn process(&self, text: &str) -> String {
        let unfenced = strip_code_fence(text.trim());
        fix_front_matter_booleans(unfenced.trim())
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.trim_end().strip_suffix("```") else {
        return text;
    };
    // Drop the info string (```markdown) on the opening line.
    match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => body,
    }
}

fn fix_front_matter_booleans(text: &str) -> String {
    let mut lines = text.lines();
    if lines.next() != Some("---") {
        return text.to_string();
    }
    let mut out = vec!["---".to_string()];
    let mut in_front_matter = true;
    for line in lines {
        if in_front_matter && line.trim() == "---" {
            in_front_matter = false;
            out.push(line.to_string());
            continue;
        }
        if in_front_matter {
            out.push(fix_boolean_value(line));
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

fn fix_boolean_value(line: &str) -> String {
    let Some((key, value)) = line.split_once(':') else {
        return line.to_string();
    };
    let fixed = match value.trim() {
        "flase" | "fasle" | "fales" => "false",
        "ture" | "treu" | "tru" => "true",
        _ => return line.to_string(),
    };
    format!("{key}: {fixed}")
}

/// Writes artifacts below a root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let relative = Path::new(path);
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn write(&self, path: &str, content: &str) -> std::io::Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, content)
    }
}
