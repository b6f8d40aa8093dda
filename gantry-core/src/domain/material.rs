//! Material domain types
//!
//! A material is a source of change for a pipeline: an SCM repository or an
//! upstream pipeline stage. Materials are identified by their fingerprint, a
//! hash over connection parameters only. Two checkouts of the same repository
//! into different folders, or with different filters, share a fingerprint.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::filter::Filter;
use super::url::UrlArgument;

static NO_FILTER: Filter = Filter::empty();

/// Material kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialType {
    Git,
    Hg,
    Svn,
    P4,
    Dependency,
}

impl std::fmt::Display for MaterialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaterialType::Git => write!(f, "GitMaterial"),
            MaterialType::Hg => write!(f, "HgMaterial"),
            MaterialType::Svn => write!(f, "SvnMaterial"),
            MaterialType::P4 => write!(f, "P4Material"),
            MaterialType::Dependency => write!(f, "DependencyMaterial"),
        }
    }
}

/// Checkout options shared by every SCM material
///
/// None of these take part in the fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmOptions {
    /// Destination folder relative to the pipeline working directory
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub filter: Filter,
    /// Treat the filter as an allow-list instead of an ignore list
    #[serde(default)]
    pub invert_filter: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMaterialConfig {
    pub url: UrlArgument,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub submodule_folder: Option<String>,
    #[serde(default)]
    pub shallow_clone: bool,
    #[serde(flatten)]
    pub options: ScmOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HgMaterialConfig {
    pub url: UrlArgument,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(flatten)]
    pub options: ScmOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvnMaterialConfig {
    pub url: UrlArgument,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub check_externals: bool,
    #[serde(flatten)]
    pub options: ScmOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P4MaterialConfig {
    pub server_and_port: String,
    #[serde(default)]
    pub username: Option<String>,
    pub view: String,
    #[serde(flatten)]
    pub options: ScmOptions,
}

/// Dependency on a stage of an upstream pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMaterialConfig {
    pub pipeline_name: String,
    pub stage_name: String,
}

impl DependencyMaterialConfig {
    pub fn new(pipeline_name: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            stage_name: stage_name.into(),
        }
    }

    /// Whether this dependency points at the given pipeline (case-insensitive)
    pub fn depends_on(&self, pipeline_name: &str) -> bool {
        self.pipeline_name.eq_ignore_ascii_case(pipeline_name)
    }
}

/// A configured material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MaterialConfig {
    Git(GitMaterialConfig),
    Hg(HgMaterialConfig),
    Svn(SvnMaterialConfig),
    P4(P4MaterialConfig),
    Dependency(DependencyMaterialConfig),
}

// =============================================================================
// Constructors
// =============================================================================

impl MaterialConfig {
    pub fn git(url: impl Into<String>) -> Self {
        MaterialConfig::Git(GitMaterialConfig {
            url: UrlArgument::new(url),
            branch: None,
            submodule_folder: None,
            shallow_clone: false,
            options: ScmOptions::default(),
        })
    }

    pub fn git_on_branch(url: impl Into<String>, branch: impl Into<String>) -> Self {
        let mut material = Self::git(url);
        if let MaterialConfig::Git(git) = &mut material {
            git.branch = Some(branch.into());
        }
        material
    }

    pub fn hg(url: impl Into<String>) -> Self {
        MaterialConfig::Hg(HgMaterialConfig {
            url: UrlArgument::new(url),
            branch: None,
            options: ScmOptions::default(),
        })
    }

    pub fn svn(url: impl Into<String>, username: Option<&str>) -> Self {
        MaterialConfig::Svn(SvnMaterialConfig {
            url: UrlArgument::new(url),
            username: username.map(str::to_string),
            check_externals: false,
            options: ScmOptions::default(),
        })
    }

    pub fn p4(
        server_and_port: impl Into<String>,
        username: Option<&str>,
        view: impl Into<String>,
    ) -> Self {
        MaterialConfig::P4(P4MaterialConfig {
            server_and_port: server_and_port.into(),
            username: username.map(str::to_string),
            view: view.into(),
            options: ScmOptions::default(),
        })
    }

    pub fn dependency(pipeline_name: impl Into<String>, stage_name: impl Into<String>) -> Self {
        MaterialConfig::Dependency(DependencyMaterialConfig::new(pipeline_name, stage_name))
    }

    /// Sets the destination folder; no effect on dependency materials
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        if let Some(options) = self.options_mut() {
            options.folder = Some(folder.into());
        }
        self
    }

    /// Sets the ignore filter; no effect on dependency materials
    pub fn with_filter(mut self, filter: Filter) -> Self {
        if let Some(options) = self.options_mut() {
            options.filter = filter;
        }
        self
    }

    /// Turns the filter into an allow-list; no effect on dependency materials
    pub fn with_inverted_filter(mut self) -> Self {
        if let Some(options) = self.options_mut() {
            options.invert_filter = true;
        }
        self
    }

    pub fn set_filter(&mut self, filter: Filter) {
        if let Some(options) = self.options_mut() {
            options.filter = filter;
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

impl MaterialConfig {
    pub fn material_type(&self) -> MaterialType {
        match self {
            MaterialConfig::Git(_) => MaterialType::Git,
            MaterialConfig::Hg(_) => MaterialType::Hg,
            MaterialConfig::Svn(_) => MaterialType::Svn,
            MaterialConfig::P4(_) => MaterialType::P4,
            MaterialConfig::Dependency(_) => MaterialType::Dependency,
        }
    }

    /// Stable identity of the material
    ///
    /// SHA-256 over the connection attributes, including a git submodule
    /// folder when one is set. Credentials, destination folder and filters
    /// are left out.
    pub fn fingerprint(&self) -> String {
        let material_type = self.material_type();
        match self {
            MaterialConfig::Git(git) => {
                let mut attributes = vec![
                    ("url", git.url.without_credentials()),
                    ("branch", git.branch.clone().unwrap_or_else(|| "master".to_string())),
                ];
                if let Some(folder) = &git.submodule_folder {
                    attributes.push(("submoduleFolder", folder.clone()));
                }
                fingerprint_of(material_type, &attributes)
            }
            MaterialConfig::Hg(hg) => fingerprint_of(
                material_type,
                &[
                    ("url", hg.url.without_credentials()),
                    ("branch", hg.branch.clone().unwrap_or_default()),
                ],
            ),
            MaterialConfig::Svn(svn) => fingerprint_of(
                material_type,
                &[
                    ("url", svn.url.without_credentials()),
                    ("username", svn.username.clone().unwrap_or_default()),
                    ("checkExternals", svn.check_externals.to_string()),
                ],
            ),
            MaterialConfig::P4(p4) => fingerprint_of(
                material_type,
                &[
                    ("serverAndPort", p4.server_and_port.trim().to_string()),
                    ("userName", p4.username.clone().unwrap_or_default()),
                    ("view", normalize_view(&p4.view)),
                ],
            ),
            MaterialConfig::Dependency(dependency) => fingerprint_of(
                material_type,
                &[
                    ("pipelineName", dependency.pipeline_name.to_lowercase()),
                    ("stageName", dependency.stage_name.to_lowercase()),
                ],
            ),
        }
    }

    /// Human readable name, safe for logs
    pub fn display_name(&self) -> String {
        match self {
            MaterialConfig::Git(git) => match &git.branch {
                Some(branch) => format!("{} ({})", git.url.for_display(), branch),
                None => git.url.for_display(),
            },
            MaterialConfig::Hg(hg) => hg.url.for_display(),
            MaterialConfig::Svn(svn) => svn.url.for_display(),
            MaterialConfig::P4(p4) => format!("{}:{}", p4.server_and_port, p4.view.trim()),
            MaterialConfig::Dependency(dependency) => {
                format!("{} [{}]", dependency.pipeline_name, dependency.stage_name)
            }
        }
    }

    pub fn url(&self) -> Option<&UrlArgument> {
        match self {
            MaterialConfig::Git(git) => Some(&git.url),
            MaterialConfig::Hg(hg) => Some(&hg.url),
            MaterialConfig::Svn(svn) => Some(&svn.url),
            MaterialConfig::P4(_) | MaterialConfig::Dependency(_) => None,
        }
    }

    pub fn as_dependency(&self) -> Option<&DependencyMaterialConfig> {
        match self {
            MaterialConfig::Dependency(dependency) => Some(dependency),
            _ => None,
        }
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self, MaterialConfig::Dependency(_))
    }

    /// Whether this is a git material checked out from `url`
    ///
    /// Credentials on either side are ignored. Used to route post-commit
    /// notifications to the materials they concern.
    pub fn matches_repository_url(&self, url: &str) -> bool {
        match self {
            MaterialConfig::Git(git) => git.url.is_same_repository(url),
            _ => false,
        }
    }
}

// =============================================================================
// Checkout Options
// =============================================================================

impl MaterialConfig {
    pub fn folder(&self) -> Option<&str> {
        self.options().and_then(|options| options.folder.as_deref())
    }

    pub fn filter(&self) -> &Filter {
        self.options()
            .map(|options| &options.filter)
            .unwrap_or(&NO_FILTER)
    }

    pub fn is_invert_filter(&self) -> bool {
        self.options().is_some_and(|options| options.invert_filter)
    }

    /// Whether a change to `file_name` alone should not trigger this material
    pub fn should_ignore_file(&self, file_name: &str) -> bool {
        let matched = self.filter().matches(file_name);
        if self.is_invert_filter() {
            !matched
        } else {
            matched
        }
    }

    fn options(&self) -> Option<&ScmOptions> {
        match self {
            MaterialConfig::Git(git) => Some(&git.options),
            MaterialConfig::Hg(hg) => Some(&hg.options),
            MaterialConfig::Svn(svn) => Some(&svn.options),
            MaterialConfig::P4(p4) => Some(&p4.options),
            MaterialConfig::Dependency(_) => None,
        }
    }

    fn options_mut(&mut self) -> Option<&mut ScmOptions> {
        match self {
            MaterialConfig::Git(git) => Some(&mut git.options),
            MaterialConfig::Hg(hg) => Some(&mut hg.options),
            MaterialConfig::Svn(svn) => Some(&mut svn.options),
            MaterialConfig::P4(p4) => Some(&mut p4.options),
            MaterialConfig::Dependency(_) => None,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn fingerprint_of(material_type: MaterialType, attributes: &[(&str, String)]) -> String {
    let mut parts = vec![format!("type={}", material_type)];
    parts.extend(
        attributes
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{key}={value}")),
    );

    let mut hasher = Sha256::new();
    hasher.update(parts.join("<|>").as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_view(view: &str) -> String {
    view.split_whitespace().collect::<Vec<_>>().join(" ")
}
