//! Modification domain types
//!
//! Changes observed on a material, grouped per material fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::material::{MaterialConfig, MaterialType};

pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifiedAction {
    Added,
    Modified,
    Deleted,
    Unknown,
}

/// A file touched by a modification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifiedFile {
    pub file_name: String,
    pub folder_name: Option<String>,
    pub action: ModifiedAction,
}

/// One revision of a material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub user_name: Option<String>,
    pub comment: Option<String>,
    pub email_address: Option<String>,
    pub modified_time: DateTime<Utc>,
    pub revision: String,
    #[serde(default)]
    pub modified_files: Vec<ModifiedFile>,
}

impl Modification {
    pub fn new(
        user_name: Option<&str>,
        comment: &str,
        email_address: Option<&str>,
        modified_time: DateTime<Utc>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            user_name: user_name.map(str::to_string),
            comment: Some(comment.to_string()),
            email_address: email_address.map(str::to_string),
            modified_time,
            revision: revision.into(),
            modified_files: Vec::new(),
        }
    }

    pub fn create_modified_file(
        &mut self,
        file_name: impl Into<String>,
        folder_name: Option<&str>,
        action: ModifiedAction,
    ) -> &ModifiedFile {
        self.modified_files.push(ModifiedFile {
            file_name: file_name.into(),
            folder_name: folder_name.map(str::to_string),
            action,
        });
        &self.modified_files[self.modified_files.len() - 1]
    }

    /// The committer, or `anonymous` when the SCM did not report one
    pub fn user_display_name(&self) -> &str {
        match self.user_name.as_deref() {
            Some(user) if !user.trim().is_empty() => user,
            _ => ANONYMOUS,
        }
    }
}

/// Modifications of a single material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRevision {
    pub fingerprint: String,
    pub material_type: MaterialType,
    pub modifications: Vec<Modification>,
}

impl MaterialRevision {
    pub fn new(material: &MaterialConfig, modifications: Vec<Modification>) -> Self {
        Self {
            fingerprint: material.fingerprint(),
            material_type: material.material_type(),
            modifications,
        }
    }

    /// Revision string of the most recent modification
    pub fn latest_revision(&self) -> Option<&str> {
        self.modifications
            .iter()
            .max_by_key(|modification| modification.modified_time)
            .map(|modification| modification.revision.as_str())
    }

    pub fn all_files(&self) -> impl Iterator<Item = &ModifiedFile> {
        self.modifications
            .iter()
            .flat_map(|modification| modification.modified_files.iter())
    }

    /// Whether the material's filter rules out every file in these
    /// modifications
    ///
    /// A material without a filter never ignores anything.
    pub fn should_be_ignored_by(&self, material: &MaterialConfig) -> bool {
        if material.filter().should_never_ignore() {
            return false;
        }

        self.all_files()
            .all(|file| material.should_ignore_file(&file.file_name))
    }
}

/// Ordered set of material revisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialRevisions {
    revisions: Vec<MaterialRevision>,
}

impl MaterialRevisions {
    pub fn new(revisions: Vec<MaterialRevision>) -> Self {
        Self { revisions }
    }

    pub fn add(&mut self, revision: MaterialRevision) {
        self.revisions.push(revision);
    }

    pub fn add_all(&mut self, other: MaterialRevisions) {
        self.revisions.extend(other.revisions);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MaterialRevision> {
        self.revisions.iter()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Option<&MaterialRevision> {
        self.revisions
            .iter()
            .find(|revision| revision.fingerprint == fingerprint)
    }
}

impl<'a> IntoIterator for &'a MaterialRevisions {
    type Item = &'a MaterialRevision;
    type IntoIter = std::slice::Iter<'a, MaterialRevision>;

    fn into_iter(self) -> Self::IntoIter {
        self.revisions.iter()
    }
}

impl From<MaterialRevision> for MaterialRevisions {
    fn from(revision: MaterialRevision) -> Self {
        Self::new(vec![revision])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::Filter;

    fn modification_touching(files: &[&str]) -> Modification {
        let mut modification =
            Modification::new(Some("user"), "comment", Some("i@u.com"), Utc::now(), "foo");
        for file in files {
            modification.create_modified_file(*file, None, ModifiedAction::Added);
        }
        modification
    }

    #[test]
    fn test_user_display_name_defaults_to_anonymous() {
        let mut modification = modification_touching(&[]);
        assert_eq!(modification.user_display_name(), "user");

        modification.user_name = None;
        assert_eq!(modification.user_display_name(), ANONYMOUS);

        modification.user_name = Some("  ".to_string());
        assert_eq!(modification.user_display_name(), ANONYMOUS);
    }

    #[test]
    fn test_ignored_when_every_file_is_filtered() {
        let material = MaterialConfig::hg("hg-url").with_filter(Filter::from_patterns(["docs/**"]));
        let revision = MaterialRevision::new(
            &material,
            vec![
                modification_touching(&["docs/a.md"]),
                modification_touching(&["docs/b/c.md"]),
            ],
        );

        assert!(revision.should_be_ignored_by(&material));
    }

    #[test]
    fn test_not_ignored_when_any_file_passes_the_filter() {
        let material = MaterialConfig::hg("hg-url").with_filter(Filter::from_patterns(["docs/**"]));
        let revision = MaterialRevision::new(
            &material,
            vec![modification_touching(&["docs/a.md", "src/lib.rs"])],
        );

        assert!(!revision.should_be_ignored_by(&material));
    }

    #[test]
    fn test_never_ignored_without_filter() {
        let material = MaterialConfig::hg("hg-url");
        let revision = MaterialRevision::new(&material, vec![modification_touching(&[])]);

        assert!(!revision.should_be_ignored_by(&material));
    }

    #[test]
    fn test_latest_revision_uses_modified_time() {
        let material = MaterialConfig::git("url");
        let mut older = modification_touching(&["a"]);
        older.revision = "r1".to_string();
        older.modified_time = Utc::now() - chrono::Duration::hours(1);
        let mut newer = modification_touching(&["b"]);
        newer.revision = "r2".to_string();

        let revision = MaterialRevision::new(&material, vec![newer, older]);
        assert_eq!(revision.latest_revision(), Some("r2"));
    }

    #[test]
    fn test_find_by_fingerprint() {
        let git = MaterialConfig::git("url");
        let hg = MaterialConfig::hg("url");
        let mut revisions = MaterialRevisions::from(MaterialRevision::new(&git, vec![]));
        revisions.add_all(MaterialRevisions::from(MaterialRevision::new(&hg, vec![])));

        assert_eq!(revisions.len(), 2);
        assert_eq!(
            revisions
                .find_by_fingerprint(&hg.fingerprint())
                .map(|revision| revision.material_type),
            Some(MaterialType::Hg)
        );
        assert!(revisions.find_by_fingerprint("missing").is_none());
    }
}
