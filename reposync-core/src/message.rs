//! Tera templates for commit messages and pull request text.
//!
//! Templates are compiled and trial-rendered against sample data when the
//! policy is resolved, so a template referencing an unknown variable fails the
//! run up front instead of failing one repository halfway through its writes.

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::ConfigError;

pub const DEFAULT_COMMIT_MESSAGE: &str = "chore(sync): {{ action }} {{ path }}";
pub const DEFAULT_PR_TITLE: &str = "chore: sync shared repository files";
pub const DEFAULT_PR_BODY: &str = include_str!("templates/pull_request.md.tera");

const COMMIT: &str = "commit_message";
const PR_TITLE: &str = "pull_request_title";
const PR_BODY: &str = "pull_request_body";

/// Variables available to the commit message template.
#[derive(Debug, Clone, Serialize)]
pub struct CommitContext<'a> {
    pub repository: &'a str,
    pub branch: &'a str,
    pub path: &'a str,
    pub action: &'a str,
}

/// Variables available to the pull request title and body templates.
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestContext<'a> {
    pub repository: &'a str,
    pub branch: &'a str,
    pub base: &'a str,
    pub changes: Vec<ChangeLine<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeLine<'a> {
    pub path: &'a str,
    pub action: &'a str,
}

/// Compiled commit and pull request templates.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    tera: Tera,
    commit_source: String,
}

impl MessageTemplates {
    /// Compile all three templates and trial-render each one.
    pub fn compile(commit: &str, pr_title: &str, pr_body: &str) -> Result<Self, ConfigError> {
        let mut tera = Tera::default();
        for (name, source) in [(COMMIT, commit), (PR_TITLE, pr_title), (PR_BODY, pr_body)] {
            tera.add_raw_template(name, source)
                .map_err(|source| ConfigError::InvalidTemplate {
                    name: label(name),
                    source,
                })?;
        }
        let templates = Self {
            tera,
            commit_source: commit.to_owned(),
        };
        templates.trial_render()?;
        Ok(templates)
    }

    /// The raw commit message template.
    pub fn commit_source(&self) -> &str {
        &self.commit_source
    }

    pub fn commit_message(&self, ctx: &CommitContext<'_>) -> Result<String, tera::Error> {
        let rendered = self.tera.render(COMMIT, &Context::from_serialize(ctx)?)?;
        Ok(rendered.trim().to_owned())
    }

    /// Render `(title, body)` for a pull request.
    pub fn pull_request(
        &self,
        ctx: &PullRequestContext<'_>,
    ) -> Result<(String, String), tera::Error> {
        let context = Context::from_serialize(ctx)?;
        let title = self.tera.render(PR_TITLE, &context)?;
        let body = self.tera.render(PR_BODY, &context)?;
        Ok((title.trim().to_owned(), body))
    }

    fn trial_render(&self) -> Result<(), ConfigError> {
        let commit = CommitContext {
            repository: "owner/name",
            branch: "work-branch",
            path: "docs/example.md",
            action: "update",
        };
        self.commit_message(&commit)
            .map_err(|source| ConfigError::InvalidTemplate {
                name: label(COMMIT),
                source,
            })?;

        let pr = PullRequestContext {
            repository: "owner/name",
            branch: "work-branch",
            base: "main",
            changes: vec![ChangeLine {
                path: "docs/example.md",
                action: "update",
            }],
        };
        let context = Context::from_serialize(&pr).map_err(|source| {
            ConfigError::InvalidTemplate {
                name: label(PR_TITLE),
                source,
            }
        })?;
        for name in [PR_TITLE, PR_BODY] {
            self.tera
                .render(name, &context)
                .map_err(|source| ConfigError::InvalidTemplate {
                    name: label(name),
                    source,
                })?;
        }
        Ok(())
    }
}

fn label(name: &str) -> &'static str {
    match name {
        COMMIT => "commit message",
        PR_TITLE => "pull request title",
        _ => "pull request body",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> MessageTemplates {
        MessageTemplates::compile(DEFAULT_COMMIT_MESSAGE, DEFAULT_PR_TITLE, DEFAULT_PR_BODY)
            .expect("defaults compile")
    }

    #[test]
    fn default_commit_message_names_action_and_path() {
        let msg = defaults()
            .commit_message(&CommitContext {
                repository: "acme/widgets",
                branch: "reposync-update",
                path: "CODE_OF_CONDUCT.md",
                action: "add",
            })
            .expect("render");
        assert_eq!(msg, "chore(sync): add CODE_OF_CONDUCT.md");
    }

    #[test]
    fn default_body_lists_every_change() {
        let (title, body) = defaults()
            .pull_request(&PullRequestContext {
                repository: "acme/widgets",
                branch: "reposync-update",
                base: "main",
                changes: vec![
                    ChangeLine {
                        path: "a.md",
                        action: "add",
                    },
                    ChangeLine {
                        path: ".github/CODEOWNERS",
                        action: "update",
                    },
                ],
            })
            .expect("render");
        assert_eq!(title, DEFAULT_PR_TITLE);
        assert!(body.contains("`a.md`"));
        assert!(body.contains("`.github/CODEOWNERS`"));
    }

    #[test]
    fn syntax_error_is_reported_against_the_template() {
        let err = MessageTemplates::compile("{{ path", DEFAULT_PR_TITLE, DEFAULT_PR_BODY)
            .expect_err("unclosed tag");
        assert!(matches!(
            err,
            ConfigError::InvalidTemplate {
                name: "commit message",
                ..
            }
        ));
    }

    #[test]
    fn unknown_variable_fails_at_compile_time() {
        let err = MessageTemplates::compile(DEFAULT_COMMIT_MESSAGE, "{{ ticket }}", DEFAULT_PR_BODY)
            .expect_err("unknown variable");
        assert!(matches!(
            err,
            ConfigError::InvalidTemplate {
                name: "pull request title",
                ..
            }
        ));
    }
}
