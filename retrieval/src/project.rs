//! Project directories.
//!
//! A project is one named directory under the projects root:
//!
//! ```text
//! <projects_dir>/<name>/
//! ├── documents/          copied source documents
//! ├── manifest.json       name, document count, creation time
//! ├── citation.json       reserved for saved citations
//! ├── chunks.db           chunk store
//! ├── vector_index.json   vector index snapshot
//! └── metadata.json       side metadata (optional)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, RetrievalError};
use crate::splitter::is_supported;

const DOCUMENTS_DIR: &str = "documents";
const MANIFEST_FILE: &str = "manifest.json";
const CITATIONS_FILE: &str = "citation.json";
const CHUNK_STORE_FILE: &str = "chunks.db";
const INDEX_FILE: &str = "vector_index.json";
const SIDE_METADATA_FILE: &str = "metadata.json";
const MANIFEST_VERSION: &str = "0.1.0";

/// What to do when a document with the same file name is already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Refuse with a validation error.
    #[default]
    Error,
    /// Store under the first free `name (n).ext`.
    Rename,
    /// Replace the existing file.
    Overwrite,
}

/// Project manifest as stored in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub project_name: String,
    pub documents_dir: PathBuf,
    pub num_documents: usize,
    pub created_at: DateTime<Utc>,
    pub version: String,
}

/// Root directory holding every project.
#[derive(Debug, Clone)]
pub struct Projects {
    root: PathBuf,
}

impl Projects {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new, empty project.
    pub fn create(&self, name: &str) -> Result<Project> {
        validate_name(name)?;
        let project = Project::at(name, self.root.join(name));
        if project.root.exists() {
            return Err(RetrievalError::Validation(format!(
                "project '{name}' already exists at {}",
                project.root.display()
            )));
        }

        fs::create_dir_all(project.documents_dir())?;
        fs::write(project.root.join(CITATIONS_FILE), "{}")?;

        let manifest = Manifest {
            project_name: name.to_string(),
            documents_dir: project.documents_dir(),
            num_documents: 0,
            created_at: Utc::now(),
            version: MANIFEST_VERSION.to_string(),
        };
        project.write_manifest(&manifest)?;

        info!("Created project '{name}' at {}", project.root.display());
        Ok(project)
    }

    /// Open an existing project.
    pub fn open(&self, name: &str) -> Result<Project> {
        validate_name(name)?;
        let project = Project::at(name, self.root.join(name));
        if !project.manifest_path().is_file() {
            return Err(RetrievalError::Validation(format!(
                "project '{name}' does not exist under {}",
                self.root.display()
            )));
        }
        Ok(project)
    }

    /// Names of all projects, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().join(MANIFEST_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RetrievalError::Validation(
            "project name must not be empty".to_string(),
        ));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(RetrievalError::Validation(format!(
            "project name '{name}' must not contain path separators"
        )));
    }
    Ok(())
}

/// A single project directory.
///
/// Two values are the same project when their root directories are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    name: String,
    root: PathBuf,
}

impl Project {
    /// Refer to a project directory without touching the filesystem.
    pub fn at(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.root.join(DOCUMENTS_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn chunk_store_path(&self) -> PathBuf {
        self.root.join(CHUNK_STORE_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn side_metadata_path(&self) -> PathBuf {
        self.root.join(SIDE_METADATA_FILE)
    }

    /// Read the manifest.
    pub fn manifest(&self) -> Result<Manifest> {
        let content = fs::read_to_string(self.manifest_path())?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let content = serde_json::to_string_pretty(manifest)?;
        fs::write(self.manifest_path(), content)?;
        Ok(())
    }

    /// Copy a source document into `documents/` and return its new path.
    ///
    /// Nothing is copied when the source is missing, has an unsupported
    /// extension, or collides under [`DuplicatePolicy::Error`].
    pub fn add_document(&self, source: &Path, policy: DuplicatePolicy) -> Result<PathBuf> {
        self.stage_document(source, policy)?.commit()
    }

    /// Copy a source document into `documents/` without recording it yet.
    ///
    /// The manifest only changes on [`StagedDocument::commit`].
    /// [`StagedDocument::discard`] removes the copy and puts back any
    /// document it replaced.
    pub fn stage_document(
        &self,
        source: &Path,
        policy: DuplicatePolicy,
    ) -> Result<StagedDocument> {
        if !source.is_file() {
            return Err(RetrievalError::Validation(format!(
                "document not found: {}",
                source.display()
            )));
        }
        if !is_supported(source) {
            return Err(RetrievalError::Validation(format!(
                "unsupported document type: {}",
                source.display()
            )));
        }
        let file_name = source.file_name().ok_or_else(|| {
            RetrievalError::Validation(format!("not a file path: {}", source.display()))
        })?;

        let documents_dir = self.documents_dir();
        fs::create_dir_all(&documents_dir)?;

        let mut target = documents_dir.join(file_name);
        let mut replaced = None;
        if target.exists() {
            match policy {
                DuplicatePolicy::Error => {
                    return Err(RetrievalError::Validation(format!(
                        "document already exists: {}",
                        target.display()
                    )));
                }
                DuplicatePolicy::Rename => target = free_name(&target),
                DuplicatePolicy::Overwrite => {
                    let backup = documents_dir.join(format!(
                        ".{}.replaced",
                        file_name.to_string_lossy()
                    ));
                    fs::rename(&target, &backup)?;
                    debug!("Overwriting {}", target.display());
                    replaced = Some(backup);
                }
            }
        }

        if let Err(err) = fs::copy(source, &target) {
            if let Some(backup) = &replaced {
                fs::rename(backup, &target)?;
            }
            return Err(err.into());
        }

        Ok(StagedDocument {
            project: self.clone(),
            source: source.to_path_buf(),
            path: target,
            replaced,
        })
    }
}

/// A document copied into a project but not yet recorded in its manifest.
#[derive(Debug)]
#[must_use = "a staged document must be committed or discarded"]
pub struct StagedDocument {
    project: Project,
    source: PathBuf,
    path: PathBuf,

    /// Previous copy moved aside by [`DuplicatePolicy::Overwrite`].
    replaced: Option<PathBuf>,
}

impl StagedDocument {
    /// Where the document was copied to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the copy and count it in the manifest if it is a new document.
    pub fn commit(self) -> Result<PathBuf> {
        match &self.replaced {
            Some(backup) => fs::remove_file(backup)?,
            None => {
                let mut manifest = self.project.manifest()?;
                manifest.num_documents += 1;
                self.project.write_manifest(&manifest)?;
            }
        }

        info!(
            "Added {} to project '{}' as {}",
            self.source.display(),
            self.project.name,
            self.path.display()
        );
        Ok(self.path)
    }

    /// Remove the copy and restore the document it replaced.
    pub fn discard(self) -> Result<()> {
        fs::remove_file(&self.path)?;
        if let Some(backup) = &self.replaced {
            fs::rename(backup, &self.path)?;
        }
        debug!("Discarded staged copy {}", self.path.display());
        Ok(())
    }
}

/// First `stem (n).ext` next to `taken` that does not exist yet.
fn free_name(taken: &Path) -> PathBuf {
    let stem = taken
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = taken
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1;
    loop {
        let candidate = taken.with_file_name(format!("{stem} ({n}){extension}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Projects) {
        let temp_dir = TempDir::new().unwrap();
        let projects = Projects::new(temp_dir.path().join("projects"));
        (temp_dir, projects)
    }

    #[test]
    fn test_create_writes_layout() {
        let (_temp_dir, projects) = setup();
        let project = projects.create("p1").unwrap();

        assert!(project.documents_dir().is_dir());
        assert_eq!(
            fs::read_to_string(project.root().join("citation.json")).unwrap(),
            "{}"
        );

        let manifest = project.manifest().unwrap();
        assert_eq!(manifest.project_name, "p1");
        assert_eq!(manifest.num_documents, 0);
        assert_eq!(manifest.version, "0.1.0");
        assert_eq!(manifest.documents_dir, project.documents_dir());
    }

    #[test]
    fn test_create_rejects_existing_and_bad_names() {
        let (_temp_dir, projects) = setup();
        projects.create("p1").unwrap();

        assert!(matches!(
            projects.create("p1"),
            Err(RetrievalError::Validation(_))
        ));
        assert!(matches!(projects.create(""), Err(RetrievalError::Validation(_))));
        assert!(matches!(
            projects.create("a/b"),
            Err(RetrievalError::Validation(_))
        ));
        assert!(matches!(projects.create(".."), Err(RetrievalError::Validation(_))));
    }

    #[test]
    fn test_open_and_list() {
        let (_temp_dir, projects) = setup();
        assert!(projects.list().unwrap().is_empty());
        assert!(matches!(
            projects.open("missing"),
            Err(RetrievalError::Validation(_))
        ));

        let created = projects.create("beta").unwrap();
        projects.create("alpha").unwrap();

        assert_eq!(projects.open("beta").unwrap(), created);
        assert_eq!(projects.list().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_add_document_validation() {
        let (temp_dir, projects) = setup();
        let project = projects.create("p1").unwrap();

        assert!(matches!(
            project.add_document(&temp_dir.path().join("nope.pdf"), DuplicatePolicy::Error),
            Err(RetrievalError::Validation(_))
        ));

        let docx = temp_dir.path().join("paper.docx");
        fs::write(&docx, "binary").unwrap();
        assert!(matches!(
            project.add_document(&docx, DuplicatePolicy::Error),
            Err(RetrievalError::Validation(_))
        ));
        assert_eq!(project.manifest().unwrap().num_documents, 0);
    }

    #[test]
    fn test_add_document_duplicate_policies() {
        let (temp_dir, projects) = setup();
        let project = projects.create("p1").unwrap();
        let source = temp_dir.path().join("notes.txt");
        fs::write(&source, "first").unwrap();

        let first = project.add_document(&source, DuplicatePolicy::Error).unwrap();
        assert_eq!(first, project.documents_dir().join("notes.txt"));

        assert!(matches!(
            project.add_document(&source, DuplicatePolicy::Error),
            Err(RetrievalError::Validation(_))
        ));

        let renamed = project.add_document(&source, DuplicatePolicy::Rename).unwrap();
        assert_eq!(renamed, project.documents_dir().join("notes (1).txt"));
        let renamed_again = project.add_document(&source, DuplicatePolicy::Rename).unwrap();
        assert_eq!(renamed_again, project.documents_dir().join("notes (2).txt"));

        fs::write(&source, "second").unwrap();
        let overwritten = project
            .add_document(&source, DuplicatePolicy::Overwrite)
            .unwrap();
        assert_eq!(overwritten, first);
        assert_eq!(fs::read_to_string(&first).unwrap(), "second");

        assert_eq!(project.manifest().unwrap().num_documents, 3);
        assert_eq!(fs::read_dir(project.documents_dir()).unwrap().count(), 3);
    }

    #[test]
    fn test_discarded_document_leaves_project_unchanged() {
        let (temp_dir, projects) = setup();
        let project = projects.create("p1").unwrap();
        let source = temp_dir.path().join("notes.txt");
        fs::write(&source, "first").unwrap();

        let staged = project.stage_document(&source, DuplicatePolicy::Error).unwrap();
        assert!(staged.path().is_file());
        staged.discard().unwrap();

        assert_eq!(project.manifest().unwrap().num_documents, 0);
        assert_eq!(fs::read_dir(project.documents_dir()).unwrap().count(), 0);

        // Nothing blocks adding the same document again.
        let added = project.add_document(&source, DuplicatePolicy::Error).unwrap();
        assert_eq!(project.manifest().unwrap().num_documents, 1);

        fs::write(&source, "second").unwrap();
        project
            .stage_document(&source, DuplicatePolicy::Overwrite)
            .unwrap()
            .discard()
            .unwrap();
        assert_eq!(fs::read_to_string(&added).unwrap(), "first");
        assert_eq!(fs::read_dir(project.documents_dir()).unwrap().count(), 1);
        assert_eq!(project.manifest().unwrap().num_documents, 1);
    }
}
