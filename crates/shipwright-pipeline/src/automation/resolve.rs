use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use shipwright_core::context::AgentContext;
use shipwright_core::repository::{
    GitIdentity, IssueRef, RepoCoordinates, RepositoryDescriptor, WorkspaceDescriptor,
};

use crate::credential::Credential;

/// A named way of finding a value.
pub struct Strategy<I: ?Sized, T> {
    pub name: &'static str,
    pub resolve: fn(&I) -> Option<T>,
}

/// A value plus the name of the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: &'static str,
}

/// Try strategies in order; the first hit wins.
pub fn first_match<I: ?Sized, T>(strategies: &[Strategy<I, T>], input: &I) -> Option<Resolved<T>> {
    strategies.iter().find_map(|s| {
        (s.resolve)(input).map(|value| Resolved {
            value,
            source: s.name,
        })
    })
}

// ── Repository ──

/// Everything repository resolution may look at.
#[derive(Debug, Clone, Copy)]
pub struct RepoSources<'a> {
    pub context: &'a AgentContext,
    pub request_fields: &'a Map<String, Value>,
    pub workspace: Option<&'a WorkspaceDescriptor>,
}

const CONTEXT_REPO_ALIASES: &[&str] = &["repo", "githubRepository", "repositoryUrl", "repoUrl"];
const REQUEST_REPO_KEYS: &[&str] = &["repository", "repo", "repositoryUrl"];

/// Ordered repository strategies.
pub fn repository_strategies<'a>() -> [Strategy<RepoSources<'a>, RepositoryDescriptor>; 5] {
    [
        Strategy {
            name: "context.repository",
            resolve: |s| s.context.repository.as_ref().and_then(descriptor_from_value),
        },
        Strategy {
            name: "context.automation",
            resolve: |s| {
                ["repository", "repo"]
                    .iter()
                    .filter_map(|k| s.context.automation.get(*k))
                    .find_map(descriptor_from_value)
            },
        },
        Strategy {
            name: "context.alias",
            resolve: |s| {
                CONTEXT_REPO_ALIASES
                    .iter()
                    .filter_map(|k| s.context.extra.get(*k))
                    .find_map(descriptor_from_value)
            },
        },
        Strategy {
            name: "request",
            resolve: |s| {
                REQUEST_REPO_KEYS
                    .iter()
                    .filter_map(|k| s.request_fields.get(*k))
                    .find_map(descriptor_from_value)
            },
        },
        Strategy {
            name: "workspace.remote",
            resolve: |s| {
                let url = s.workspace?.git.as_ref()?.remote_url.as_deref()?;
                descriptor_from_str(url)
            },
        },
    ]
}

/// Resolve the repository and apply per-call overrides from context.
pub fn resolve_repository(sources: &RepoSources<'_>) -> Option<Resolved<RepositoryDescriptor>> {
    let mut resolved = first_match(&repository_strategies(), sources)?;
    apply_overrides(&mut resolved.value, sources.context);
    Some(resolved)
}

fn descriptor_from_str(s: &str) -> Option<RepositoryDescriptor> {
    let c = RepoCoordinates::parse(s)?;
    let mut d = RepositoryDescriptor::new(c.owner, c.name);
    d.clone_url = c.clone_url;
    Some(d)
}

fn str_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Accepts `"owner/name"`, a URL, or an object with owner/name fields.
pub fn descriptor_from_value(value: &Value) -> Option<RepositoryDescriptor> {
    match value {
        Value::String(s) => descriptor_from_str(s),
        Value::Object(obj) => {
            let mut d = if let (Some(owner), Some(name)) = (
                obj.get("owner").and_then(|o| {
                    o.as_str()
                        .or_else(|| o.get("login").and_then(Value::as_str))
                }),
                str_field(obj, &["name", "repo"]),
            ) {
                let name = name.rsplit('/').next().unwrap_or(name);
                descriptor_from_str(&format!("{}/{name}", owner.trim()))?
            } else {
                let text = str_field(obj, &["fullName", "full_name", "url", "cloneUrl", "clone_url", "htmlUrl"])?;
                descriptor_from_str(text)?
            };
            if let Some(url) = str_field(obj, &["cloneUrl", "clone_url", "url"]) {
                if let Some(c) = RepoCoordinates::parse(url) {
                    if c.clone_url.is_some() {
                        d.clone_url = c.clone_url;
                    }
                }
            }
            if let Some(branch) = str_field(obj, &["defaultBranch", "default_branch"]) {
                d.default_branch = branch.to_string();
            }
            Some(d)
        }
        _ => None,
    }
}

fn issue_from_value(value: &Value) -> Option<IssueRef> {
    let number = |v: &Value| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.trim().trim_start_matches('#').parse().ok()))
    };
    if let Some(n) = number(value) {
        return Some(IssueRef {
            id: None,
            number: n,
            url: None,
            title: None,
        });
    }
    let obj = value.as_object()?;
    Some(IssueRef {
        id: obj.get("id").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        number: obj.get("number").and_then(number)?,
        url: str_field(obj, &["url", "htmlUrl", "html_url"]).map(String::from),
        title: str_field(obj, &["title"]).map(String::from),
    })
}

fn flag(value: Option<&Value>) -> bool {
    value.is_some_and(|v| v.as_bool() == Some(true) || v.as_str() == Some("true"))
}

/// Per-call overrides: branch, base, issue, labels, identity and flags.
pub fn apply_overrides(d: &mut RepositoryDescriptor, ctx: &AgentContext) {
    let auto = &ctx.automation;
    if let Some(b) = ctx
        .branch
        .as_deref()
        .or_else(|| str_field(auto, &["branch"]))
        .filter(|b| !b.trim().is_empty())
    {
        d.branch = Some(b.trim().to_string());
    }
    if let Some(b) = ctx
        .base_branch
        .as_deref()
        .or_else(|| str_field(auto, &["base", "baseBranch"]))
        .filter(|b| !b.trim().is_empty())
    {
        d.base = Some(b.trim().to_string());
    }
    if let Some(issue) = ["issue", "issueNumber"]
        .iter()
        .filter_map(|k| auto.get(*k).or_else(|| ctx.extra.get(*k)))
        .find_map(issue_from_value)
    {
        d.issue = Some(issue);
    }
    if let Some(labels) = auto.get("labels").and_then(Value::as_array) {
        d.labels = labels
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
    }
    if let Some(identity) = ["gitIdentity", "gitUser"]
        .iter()
        .filter_map(|k| auto.get(*k))
        .filter_map(Value::as_object)
        .find_map(|o| {
            Some(GitIdentity {
                name: str_field(o, &["name"])?.to_string(),
                email: str_field(o, &["email"])?.to_string(),
            })
        })
    {
        d.git_identity = Some(identity);
    }
    d.dry_run = d.dry_run || flag(auto.get("dryRun"));
    d.allow_empty_commit = d.allow_empty_commit || flag(auto.get("allowEmptyCommit"));
}

// ── Credential ──

/// Everything credential resolution may look at.
#[derive(Debug, Clone, Copy)]
pub struct CredentialSources<'a> {
    pub explicit: Option<&'a SecretString>,
    pub context: &'a AgentContext,
    pub ambient: Option<&'a Credential>,
}

const CONTEXT_TOKEN_ALIASES: &[&str] = &[
    "githubToken",
    "github_token",
    "gitToken",
    "accessToken",
    "token",
];
const AUTOMATION_TOKEN_ALIASES: &[&str] = &["token", "githubToken"];

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Ordered credential strategies: explicit, context aliases, ambient.
pub fn credential_strategies<'a>() -> [Strategy<CredentialSources<'a>, Credential>; 4] {
    [
        Strategy {
            name: "explicit",
            resolve: |s| {
                let token = non_empty(s.explicit?.expose_secret())?;
                Some(Credential::new(token, "explicit"))
            },
        },
        Strategy {
            name: "context",
            resolve: |s| {
                let token = str_field(&s.context.extra, CONTEXT_TOKEN_ALIASES)?;
                Some(Credential::new(token, "context"))
            },
        },
        Strategy {
            name: "context.automation",
            resolve: |s| {
                let token = str_field(&s.context.automation, AUTOMATION_TOKEN_ALIASES)?;
                Some(Credential::new(token, "context.automation"))
            },
        },
        Strategy {
            name: "ambient",
            resolve: |s| {
                let c = s.ambient?;
                non_empty(c.expose())?;
                Some(c.clone())
            },
        },
    ]
}

pub fn resolve_credential(sources: &CredentialSources<'_>) -> Option<Resolved<Credential>> {
    first_match(&credential_strategies(), sources)
}
