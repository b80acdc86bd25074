//! Encodings of an object graph: STEP clear text, XML and folder trees.
//!
//! ## Key Components
//!
//! - [`ObjectSerializer`] - stream-level read/write of one graph, implemented by
//!   [`StepSerializer`] and [`XmlSerializer`]
//! - [`FolderSerializer`] - one XML document per nested object in a directory tree
//! - [`ObjectStore`] - identity bookkeeping of the writers (reference counts, ids, which objects
//!   are already written)
//! - [`DeferredRefs`] - forward references of the readers, resolved when the target appears
//! - [`ReadDiagnostic`] - problems a reader recovered from (unknown types, dangling references)
//!
//! ## Two passes
//!
//! Every writer walks the graph twice. The first pass writes into a sink and only counts how
//! often each object is reached; the second pass uses those counts to decide which objects are
//! written in place and which get an id (STEP `#n`, XML `id`/`href`).
//!
//! ## Files
//!
//! [`load_file`] and [`save_file`] pick the encoding from the path ([`FileFormat::detect`]):
//!
//! ```rust,no_run
//! use docgraph_core::{codec::{load_file, save_file}, config::SerializerConfig, schema::SCHEMAS};
//!
//! # fn main() -> Result<(), docgraph_core::DocGraphError> {
//! let config = SerializerConfig::default();
//! let catalog = SCHEMAS.get("WIDGET_SCHEMA_2_1").expect("registered schema");
//! let loaded = load_file("model.step", catalog, &config)?;
//! save_file("model.xml", &loaded.graph, loaded.root, &config)?;
//! # Ok(())
//! # }
//! ```

pub mod deferred;
pub mod diagnostic;
pub mod folder;
pub mod identity;
pub mod step;
pub mod text;
pub mod xml;

pub use deferred::{DeferredRefs, PendingRef};
pub use diagnostic::{DanglingReference, ReadDiagnostic};
pub use folder::FolderSerializer;
pub use identity::{identity_value, sanitize_id, IdentityRecord, ObjectStore};
pub use step::{schema_version, StepHeader, StepSerializer};
pub use xml::XmlSerializer;

use std::{
    collections::BTreeMap,
    fs,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
    sync::Arc,
};

use crate::{
    config::SerializerConfig,
    error::DocGraphError,
    graph::{EntityId, Graph},
    schema::Catalog,
};

/// Read or write one graph as a single stream.
pub trait ObjectSerializer {
    fn read_object(&self, input: &mut dyn Read) -> Result<ReadOutcome, DocGraphError>;

    fn write_object(
        &self,
        output: &mut dyn Write,
        graph: &Graph,
        root: EntityId,
    ) -> Result<(), DocGraphError>;
}

/// Everything a reader produced.
#[derive(Debug)]
pub struct ReadOutcome {
    pub graph: Graph,
    pub root: EntityId,
    /// Objects by the id they carried in the source (`#12`, `P1`, ...).
    pub instances: BTreeMap<String, EntityId>,
    pub diagnostics: Vec<ReadDiagnostic>,
    /// Schema named in the STEP header; `None` for XML and folders.
    pub schema_identifier: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Step,
    Xml,
    Folder,
}

impl FileFormat {
    /// Directories (and extension-less paths that do not exist yet) are folders; files are
    /// matched against the configured extension lists.
    pub fn detect(path: &Path, config: &SerializerConfig) -> Result<Self, DocGraphError> {
        if path.is_dir() {
            return Ok(FileFormat::Folder);
        }
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            if !path.exists() {
                return Ok(FileFormat::Folder);
            }
            return Err(DocGraphError::UnsupportedFormat(format!(
                "cannot tell the format of {}",
                path.display()
            )));
        };
        let matches = |list: &[String]| list.iter().any(|e| e.eq_ignore_ascii_case(extension));
        if matches(&config.extensions.step) {
            Ok(FileFormat::Step)
        } else if matches(&config.extensions.xml) {
            Ok(FileFormat::Xml)
        } else {
            Err(DocGraphError::UnsupportedFormat(format!(
                "unknown extension '.{extension}'"
            )))
        }
    }
}

#[derive(Debug)]
pub struct LoadedFile {
    pub format: FileFormat,
    pub graph: Graph,
    pub root: EntityId,
    pub instances: BTreeMap<String, EntityId>,
    pub diagnostics: Vec<ReadDiagnostic>,
    pub schema_identifier: Option<String>,
    /// Parsed from `schema_identifier`, for migration decisions.
    pub schema_version: Option<f64>,
}

pub fn load_file(
    path: impl AsRef<Path>,
    catalog: Arc<Catalog>,
    config: &SerializerConfig,
) -> Result<LoadedFile, DocGraphError> {
    let path = path.as_ref();
    tracing::info!("[load_file] Loading {}", path.display());
    let (format, outcome) =
        read_any(path, catalog, config).map_err(|e| e.for_file(path, "load"))?;
    for diagnostic in &outcome.diagnostics {
        tracing::debug!("[load_file] {}: {}", path.display(), diagnostic);
    }
    let schema_version = outcome
        .schema_identifier
        .as_deref()
        .and_then(schema_version);
    Ok(LoadedFile {
        format,
        graph: outcome.graph,
        root: outcome.root,
        instances: outcome.instances,
        diagnostics: outcome.diagnostics,
        schema_identifier: outcome.schema_identifier,
        schema_version,
    })
}

fn read_any(
    path: &Path,
    catalog: Arc<Catalog>,
    config: &SerializerConfig,
) -> Result<(FileFormat, ReadOutcome), DocGraphError> {
    let format = FileFormat::detect(path, config)?;
    if format == FileFormat::Folder {
        if !path.is_dir() {
            return Err(DocGraphError::NotFound(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        return Ok((format, FolderSerializer::new(catalog, config).read_folder(path)?));
    }
    let mut input = BufReader::new(fs::File::open(path)?);
    let outcome = match format {
        FileFormat::Step => StepSerializer::new(catalog, config).read_object(&mut input)?,
        _ => XmlSerializer::new(catalog, config).read_object(&mut input)?,
    };
    Ok((format, outcome))
}

/// Write `graph` to `path`, replacing whatever is there only once the new content is complete.
pub fn save_file(
    path: impl AsRef<Path>,
    graph: &Graph,
    root: EntityId,
    config: &SerializerConfig,
) -> Result<(), DocGraphError> {
    let path = path.as_ref();
    tracing::info!("[save_file] Saving {}", path.display());
    write_any(path, graph, root, config).map_err(|e| e.for_file(path, "save"))
}

fn write_any(
    path: &Path,
    graph: &Graph,
    root: EntityId,
    config: &SerializerConfig,
) -> Result<(), DocGraphError> {
    let format = FileFormat::detect(path, config)?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let catalog = graph.catalog().clone();

    if format == FileFormat::Folder {
        let staging = tempfile::Builder::new()
            .prefix(".docgraph-")
            .tempdir_in(parent)?;
        FolderSerializer::new(catalog, config).write_folder(staging.path(), graph, root)?;
        // The staging guard's cleanup finds nothing left after the rename
        return replace_dir(staging.path(), path, parent, |from, to| fs::rename(from, to));
    }

    let mut staging = tempfile::NamedTempFile::new_in(parent)?;
    {
        let mut out = BufWriter::new(staging.as_file_mut());
        match format {
            FileFormat::Step => {
                StepSerializer::new(catalog, config).write_object(&mut out, graph, root)?
            }
            _ => XmlSerializer::new(catalog, config).write_object(&mut out, graph, root)?,
        }
        out.flush()?;
    }
    staging.persist(path)?;
    Ok(())
}

/// Move `staging` to `path`. An existing `path` is first moved aside into a sibling backup
/// directory and only removed once `staging` is in place; if that last rename fails the old
/// content is moved back.
fn replace_dir(
    staging: &Path,
    path: &Path,
    parent: &Path,
    rename: impl Fn(&Path, &Path) -> io::Result<()>,
) -> Result<(), DocGraphError> {
    if !path.exists() {
        rename(staging, path)?;
        return Ok(());
    }
    let backup = tempfile::Builder::new()
        .prefix(".docgraph-")
        .tempdir_in(parent)?;
    let previous = backup.path().join("previous");
    rename(path, &previous)?;
    if let Err(e) = rename(staging, path) {
        if let Err(restore) = rename(&previous, path) {
            let kept = backup.keep();
            tracing::error!(
                "[replace_dir] Could not restore {} ({}), previous content kept in {}",
                path.display(),
                restore,
                kept.display()
            );
        }
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::isomorphic,
        tests::{init_logging, sample_widget, widget_catalog},
    };

    #[test]
    fn test_detect_format() {
        let config = SerializerConfig::default();
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            FileFormat::detect(&dir.path().join("a.STP"), &config).unwrap(),
            FileFormat::Step
        );
        assert_eq!(
            FileFormat::detect(&dir.path().join("a.ifcdocxml"), &config).unwrap(),
            FileFormat::Xml
        );
        assert_eq!(
            FileFormat::detect(dir.path(), &config).unwrap(),
            FileFormat::Folder
        );
        assert_eq!(
            FileFormat::detect(&dir.path().join("tree"), &config).unwrap(),
            FileFormat::Folder
        );
        assert!(matches!(
            FileFormat::detect(&dir.path().join("a.json"), &config),
            Err(DocGraphError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_save_and_load_every_format() {
        init_logging();
        let catalog = Arc::new(widget_catalog());
        let config = SerializerConfig::default();
        let (g, root) = sample_widget(catalog.clone());
        let dir = tempfile::tempdir().unwrap();

        for name in ["model.step", "model.xml", "model"] {
            let path = dir.path().join(name);
            save_file(&path, &g, root, &config).unwrap();
            // Saving over an existing target replaces it
            save_file(&path, &g, root, &config).unwrap();
            let loaded = load_file(&path, catalog.clone(), &config).unwrap();
            assert!(loaded.diagnostics.is_empty(), "{name}: {:?}", loaded.diagnostics);
            assert!(isomorphic(&g, root, &loaded.graph, loaded.root), "{name}");
        }

        let step = load_file(dir.path().join("model.step"), catalog, &config).unwrap();
        assert_eq!(step.format, FileFormat::Step);
        assert_eq!(step.schema_version, Some(2.1));
    }

    #[test]
    fn test_saving_a_folder_replaces_stale_content() {
        let catalog = Arc::new(widget_catalog());
        let config = SerializerConfig::default();
        let (g, root) = sample_widget(catalog.clone());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model");

        save_file(&path, &g, root, &config).unwrap();
        fs::write(path.join("stale.txt"), "left over").unwrap();
        save_file(&path, &g, root, &config).unwrap();

        assert!(!path.join("stale.txt").exists());
        assert!(path.join("Widget.xml").is_file());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name.to_string_lossy().starts_with(".docgraph-"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
        let loaded = load_file(&path, catalog, &config).unwrap();
        assert!(isomorphic(&g, root, &loaded.graph, loaded.root));
    }

    #[test]
    fn test_failed_replace_keeps_previous_folder() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("model");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("Widget.xml"), "old").unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let staging = elsewhere.path().join("staging");
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("Widget.xml"), "new").unwrap();

        let result = replace_dir(&staging, &target, dir.path(), |from, to| {
            if from == staging.as_path() {
                Err(io::Error::other("device full"))
            } else {
                fs::rename(from, to)
            }
        });

        assert!(matches!(result, Err(DocGraphError::Io(_))), "{result:?}");
        assert_eq!(fs::read_to_string(target.join("Widget.xml")).unwrap(), "old");
        assert_eq!(fs::read_to_string(staging.join("Widget.xml")).unwrap(), "new");
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, ["model"]);
    }

    #[test]
    fn test_load_failure_names_the_file() {
        let catalog = Arc::new(widget_catalog());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.step");
        fs::write(&path, "ISO-10303-21;\nHEADER;\n").unwrap();

        let err = load_file(&path, catalog, &SerializerConfig::default()).unwrap_err();
        let DocGraphError::File {
            path: reported,
            operation,
            ..
        } = err
        else {
            panic!("expected a file error, got {err:?}");
        };
        assert!(reported.ends_with("broken.step"));
        assert_eq!(operation, "load");
    }
}
