//! Domain types for hydration targets.
//!
//! A [`Target`] owns its declared [`SourceHydrator`] configuration and the
//! [`HydratorStatus`] the engine records for it. All types are serializable
//! via serde + serde_yaml; the store writes one YAML document per target.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use globset::Glob;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a target inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetName(pub String);

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TargetName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TargetName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed name for a project (the policy scope of its targets).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectName(pub String);

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// `<project>/<target>`: the identity used for refresh requests and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub project: ProjectName,
    pub name: TargetName,
}

impl QualifiedName {
    pub fn new(project: impl Into<ProjectName>, name: impl Into<TargetName>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}

impl FromStr for QualifiedName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((project, name))
                if !project.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(project, name))
            }
            _ => Err(format!("expected '<project>/<target>', got '{s}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Hydrator configuration
// ---------------------------------------------------------------------------

/// Where unrendered manifests are read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct DrySource {
    pub repo_url: String,
    pub target_revision: String,
    #[serde(default)]
    pub path: String,
}

/// Where rendered manifests are consumed from by the downstream sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct SyncSource {
    pub target_branch: String,
    pub path: String,
}

/// Optional staging branch that receives hydrated manifests instead of the
/// sync branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct HydrateTo {
    pub target_branch: String,
}

/// The declared hydration configuration of a target.
///
/// Compared by value: a stored snapshot equals the live configuration only
/// when every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct SourceHydrator {
    pub dry_source: DrySource,
    pub sync_source: SyncSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hydrate_to: Option<HydrateTo>,
}

impl SourceHydrator {
    /// Branch hydrated manifests are committed to: the hydrate-to branch when
    /// declared, otherwise the sync branch.
    pub fn destination_branch(&self) -> &str {
        match &self.hydrate_to {
            Some(hydrate_to) => &hydrate_to.target_branch,
            None => &self.sync_source.target_branch,
        }
    }

    /// The dry source as a manifest-generation request.
    pub fn dry_manifest_source(&self) -> ManifestSource {
        ManifestSource {
            repo_url: self.dry_source.repo_url.clone(),
            path: self.dry_source.path.clone(),
            target_revision: self.dry_source.target_revision.clone(),
        }
    }
}

/// A (repo, path, revision) triple handed to manifest generation and to
/// project permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestSource {
    pub repo_url: String,
    pub path: String,
    pub target_revision: String,
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (path: {}, revision: {})",
            self.repo_url, self.path, self.target_revision
        )
    }
}

// ---------------------------------------------------------------------------
// Hydrator status
// ---------------------------------------------------------------------------

/// Lifecycle state of one hydration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrationPhase {
    Hydrating,
    Hydrated,
    Failed,
}

impl fmt::Display for HydrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HydrationPhase::Hydrating => write!(f, "hydrating"),
            HydrationPhase::Hydrated => write!(f, "hydrated"),
            HydrationPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Record of one hydration attempt for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrationOperation {
    pub phase: HydrationPhase,
    pub started_at: DateTime<Utc>,
    /// Absent while the operation is in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_sha: String,
    /// Present only when the operation succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hydrated_sha: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Configuration the operation was started with.
    pub source_hydrator: SourceHydrator,
}

/// Retained copy of the most recent successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulHydrationOperation {
    pub dry_sha: String,
    pub hydrated_sha: String,
    pub source_hydrator: SourceHydrator,
}

/// Hydration status recorded on a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HydratorStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<HydrationOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_operation: Option<SuccessfulHydrationOperation>,
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A deployment target whose manifests may be hydrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: TargetName,
    pub project: ProjectName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hydrator: Option<SourceHydrator>,
    /// Set by an operator to force hydration on the next trigger evaluation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hydrate_requested: bool,
    #[serde(default)]
    pub status: HydratorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Target {
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName {
            project: self.project.clone(),
            name: self.name.clone(),
        }
    }

    /// The source the downstream sync engine deploys from, which is what the
    /// project policy must permit: the dry repository at the sync branch and
    /// path.
    pub fn source(&self) -> Option<ManifestSource> {
        self.source_hydrator.as_ref().map(|hydrator| ManifestSource {
            repo_url: hydrator.dry_source.repo_url.clone(),
            path: hydrator.sync_source.path.clone(),
            target_revision: hydrator.sync_source.target_branch.clone(),
        })
    }
}

/// Repository access used for writing hydrated manifests.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCredentials {
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl RepoCredentials {
    /// Unauthenticated access to `repo_url`.
    pub fn anonymous(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            username: None,
            password: None,
        }
    }
}

impl fmt::Debug for RepoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoCredentials")
            .field("repo_url", &self.repo_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A project: the permission scope of its targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: ProjectName,
    /// Repository URL glob patterns targets may deploy from (`*`, `?`,
    /// `[...]` and `{a,b}`); a leading `!` denies.
    #[serde(default)]
    pub source_repos: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// A source is permitted when at least one allow pattern matches its repo
    /// URL and no deny pattern does.
    pub fn is_source_permitted(&self, source: &ManifestSource) -> bool {
        let mut allowed = false;
        for pattern in &self.source_repos {
            if let Some(deny) = pattern.strip_prefix('!') {
                if repo_pattern_matches(deny, &source.repo_url) {
                    return false;
                }
            } else if repo_pattern_matches(pattern, &source.repo_url) {
                allowed = true;
            }
        }
        allowed
    }
}

/// Glob match over the whole URL. `*` crosses `/`; an invalid pattern
/// matches nothing.
fn repo_pattern_matches(pattern: &str, repo_url: &str) -> bool {
    match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(repo_url),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "ignoring invalid source repo pattern");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn hydrator(hydrate_to: Option<&str>) -> SourceHydrator {
        SourceHydrator {
            dry_source: DrySource {
                repo_url: "https://git.example.com/platform.git".to_string(),
                target_revision: "main".to_string(),
                path: "apps/guestbook".to_string(),
            },
            sync_source: SyncSource {
                target_branch: "env/prod".to_string(),
                path: "guestbook".to_string(),
            },
            hydrate_to: hydrate_to.map(|branch| HydrateTo {
                target_branch: branch.to_string(),
            }),
        }
    }

    fn project(patterns: &[&str]) -> Project {
        Project {
            name: ProjectName::from("platform"),
            source_repos: patterns.iter().map(|p| p.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    fn source(repo_url: &str) -> ManifestSource {
        ManifestSource {
            repo_url: repo_url.to_string(),
            path: "guestbook".to_string(),
            target_revision: "env/prod".to_string(),
        }
    }

    #[test]
    fn newtype_display() {
        assert_eq!(TargetName::from("guestbook").to_string(), "guestbook");
        assert_eq!(ProjectName::from("platform").to_string(), "platform");
        assert_eq!(
            QualifiedName::new("platform", "guestbook").to_string(),
            "platform/guestbook"
        );
    }

    #[test]
    fn qualified_name_parse() {
        let parsed: QualifiedName = "platform/guestbook".parse().expect("parse");
        assert_eq!(parsed, QualifiedName::new("platform", "guestbook"));
    }

    #[rstest]
    #[case("guestbook")]
    #[case("/guestbook")]
    #[case("platform/")]
    #[case("a/b/c")]
    #[case("")]
    fn qualified_name_rejects(#[case] input: &str) {
        let err = input.parse::<QualifiedName>().unwrap_err();
        assert!(err.contains("expected '<project>/<target>'"));
    }

    #[test]
    fn destination_branch_prefers_hydrate_to() {
        assert_eq!(hydrator(None).destination_branch(), "env/prod");
        assert_eq!(
            hydrator(Some("env/prod-next")).destination_branch(),
            "env/prod-next"
        );
    }

    #[test]
    fn snapshot_equality_is_structural() {
        let a = hydrator(None);
        let mut b = a.clone();
        assert_eq!(a, b);
        b.sync_source.path = "guestbook-v2".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn wildcard_permits_everything() {
        assert!(project(&["*"]).is_source_permitted(&source("anything")));
    }

    #[test]
    fn empty_source_repos_permit_nothing() {
        assert!(!project(&[]).is_source_permitted(&source("https://git.example.com/a.git")));
    }

    #[test]
    fn prefix_patterns_and_denials() {
        let p = project(&["https://git.example.com/*", "!https://git.example.com/secret*"]);
        assert!(p.is_source_permitted(&source("https://git.example.com/platform.git")));
        assert!(!p.is_source_permitted(&source("https://git.example.com/secret.git")));
        assert!(!p.is_source_permitted(&source("https://other.example.com/platform.git")));
    }

    #[rstest]
    #[case("a*c", "abbbc", true)]
    #[case("*", "", true)]
    #[case("a*c", "abbbd", false)]
    #[case("exact", "exact", true)]
    #[case("exact", "exactly", false)]
    #[case("https://github.com/org/*", "https://github.com/org/team/repo", true)]
    #[case("https://github.com/org/repo-?", "https://github.com/org/repo-1", true)]
    #[case("https://github.com/org/repo-?", "https://github.com/org/repo-12", false)]
    #[case("https://github.com/org/repo-[0-9]", "https://github.com/org/repo-1", true)]
    #[case("https://github.com/org/repo-[0-9]", "https://github.com/org/repo-x", false)]
    #[case("https://github.com/org/{repo-1,other}", "https://github.com/org/repo-1", true)]
    #[case("https://github.com/org/{repo-1,other}", "https://github.com/org/repo-2", false)]
    #[case("repo-[", "repo-[", false)]
    fn repo_patterns(#[case] pattern: &str, #[case] url: &str, #[case] expected: bool) {
        assert_eq!(repo_pattern_matches(pattern, url), expected);
    }

    #[test]
    fn class_pattern_denies() {
        let p = project(&["https://github.com/org/*", "!https://github.com/org/repo-[0-9]"]);
        assert!(!p.is_source_permitted(&source("https://github.com/org/repo-1")));
        assert!(p.is_source_permitted(&source("https://github.com/org/repo-x")));
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = RepoCredentials {
            repo_url: "https://git.example.com/platform.git".to_string(),
            username: Some("bot".to_string()),
            password: Some("hunter2".to_string()),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn target_serde_roundtrip_omits_empty_status() {
        let now = Utc::now();
        let target = Target {
            name: TargetName::from("guestbook"),
            project: ProjectName::from("platform"),
            source_hydrator: Some(hydrator(None)),
            hydrate_requested: false,
            status: HydratorStatus::default(),
            created_at: now,
            updated_at: now,
        };
        let yaml = serde_yaml::to_string(&target).expect("serialize");
        assert!(!yaml.contains("hydrate_requested"));
        assert!(!yaml.contains("current_operation"));
        let back: Target = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, target);
    }
}
