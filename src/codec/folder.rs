//! Folder-tree encoding: the root document plus one directory per nested collection.
//!
//! ```text
//! <dir>/Widget.xml          root entity, nested collections and sidecars left out
//! <dir>/Notes.txt           sidecar text field
//! <dir>/Parts/g/G1/Gear.xml non-leaf item in bucket "g"
//! <dir>/Parts/p/P1/Part.xml
//! ```
//!
//! Every file of one tree shares a single identity store when written and a single instance
//! table and deferred queue when read, so `href`s may cross file boundaries in either direction.
//!
//! An entity gets a file of its own only once, under the first nested collection that lists
//! it. A collection that cannot be laid out completely as files (members filed elsewhere,
//! listed twice, or without a folder key) stays in its owner's document as `href`s, and its
//! directory only holds the files of the members it filed.

use std::{
    collections::HashSet,
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use walkdir::WalkDir;

use super::{
    text::parse_value,
    xml::{Item, XmlReader, XmlWriter},
    ReadDiagnostic, ReadOutcome,
};
use crate::{
    config::SerializerConfig,
    error::DocGraphError,
    graph::{EntityId, Graph, Value},
    schema::{Catalog, FieldId, FolderHint, Target, TypeId},
};

#[derive(Debug, Clone)]
pub struct FolderSerializer {
    catalog: Arc<Catalog>,
    config: SerializerConfig,
}

struct NestedField {
    field: FieldId,
    bucketed: bool,
    leaf: bool,
    items: Vec<EntityId>,
}

impl FolderSerializer {
    pub fn new(catalog: Arc<Catalog>, config: &SerializerConfig) -> Self {
        FolderSerializer {
            catalog,
            config: config.clone(),
        }
    }

    /// Register a prefix stripped from folder keys of `type_name` (and its subtypes) before
    /// picking the bucket directory.
    pub fn add_file_prefix(&mut self, type_name: impl Into<String>, prefix: impl Into<String>) {
        self.config
            .folder
            .file_prefixes
            .insert(type_name.into(), prefix.into());
    }

    pub fn write_folder(
        &self,
        dir: &Path,
        graph: &Graph,
        root: EntityId,
    ) -> Result<(), DocGraphError> {
        fs::create_dir_all(dir)?;
        let mut writer = XmlWriter::new(
            graph,
            self.config.xml.clone(),
            self.config.use_unique_id_references,
        );
        writer.discover(root)?;
        let mut filed = HashSet::new();
        self.write_node(&mut writer, graph, dir, root, true, &mut filed)
    }

    fn write_node(
        &self,
        writer: &mut XmlWriter<'_>,
        graph: &Graph,
        dir: &Path,
        obj: EntityId,
        is_root: bool,
        filed: &mut HashSet<EntityId>,
    ) -> Result<(), DocGraphError> {
        let catalog = graph.catalog();
        let ty = graph.type_of(obj)?;
        let mut nested = Vec::new();
        for field in catalog.forward_fields(ty) {
            let descriptor = catalog.field(field);
            match descriptor.folder_hint() {
                FolderHint::Nested { bucketed, leaf }
                    if descriptor.target().is_entity() && descriptor.is_collection() =>
                {
                    let items = graph.refs(obj, field);
                    let mut fresh = Vec::new();
                    for item in &items {
                        if folder_key(graph, *item).is_some()
                            && !writer.store().is_serialized(*item)
                            && filed.insert(*item)
                        {
                            fresh.push(*item);
                        }
                    }
                    if fresh.is_empty() {
                        continue;
                    }
                    let complete = fresh.len() == items.len();
                    for item in &fresh {
                        if !complete {
                            writer.store_mut().share(graph, *item);
                        }
                        // Referrers in this document see the items as already written
                        writer.store_mut().mark_serialized(graph, *item);
                    }
                    if complete {
                        writer.exclude(obj, field);
                    }
                    nested.push(NestedField {
                        field,
                        bucketed: *bucketed,
                        leaf: *leaf,
                        items: fresh,
                    });
                }
                FolderHint::Sidecar { extension } => {
                    let text = match graph.get(obj, field) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Binary(bytes)) => hex::encode_upper(bytes),
                        _ => continue,
                    };
                    let path = dir.join(format!("{}.{}", descriptor.name(), extension));
                    fs::write(&path, format!("{}\n", text.trim_end()))
                        .map_err(|e| DocGraphError::from(e).for_file(&path, "write"))?;
                    writer.exclude(obj, field);
                }
                _ => {}
            }
        }

        let file = dir.join(format!("{}.xml", catalog.type_name(ty)));
        write_document(writer, &file, obj, is_root)?;

        for NestedField {
            field,
            bucketed,
            leaf,
            items,
        } in nested
        {
            let field_dir = dir.join(catalog.field(field).name());
            for item in items {
                let Some(key) = folder_key(graph, item) else {
                    continue;
                };
                let file_key = sanitize_file_name(&key);
                let mut base = field_dir.clone();
                if bucketed {
                    base.push(self.bucket(graph, item, &key));
                }
                fs::create_dir_all(&base)?;
                writer.store_mut().unmark_serialized(graph, item);
                if leaf {
                    write_document(writer, &base.join(format!("{file_key}.xml")), item, false)?;
                } else {
                    let item_dir = base.join(&file_key);
                    fs::create_dir_all(&item_dir)?;
                    self.write_node(writer, graph, &item_dir, item, false, filed)?;
                }
            }
        }
        Ok(())
    }

    /// Lower-cased first character of the key, after stripping the type's configured prefix.
    fn bucket(&self, graph: &Graph, item: EntityId, key: &str) -> String {
        let catalog = graph.catalog();
        let mut cursor = graph.type_of(item).ok();
        let mut prefix = None;
        while let Some(ty) = cursor {
            if let Some(p) = self.config.folder.file_prefixes.get(catalog.type_name(ty)) {
                prefix = Some(p.as_str());
                break;
            }
            cursor = catalog.type_by_id(ty).base();
        }
        let stripped = prefix
            .and_then(|p| key.strip_prefix(p))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(key);
        stripped
            .chars()
            .next()
            .map(|c| sanitize_file_name(&c.to_lowercase().to_string()))
            .unwrap_or_else(|| "_".to_string())
    }

    pub fn read_folder(&self, dir: &Path) -> Result<ReadOutcome, DocGraphError> {
        let root_type = self.catalog.root_type();
        let mut reader = XmlReader::new(self.catalog.clone(), self.config.xml.clone());
        let root = self.read_node(&mut reader, dir, Some(root_type))?;
        let actual = reader.graph_mut().type_of(root)?;
        if !self.catalog.is_subtype_of(actual, root_type) {
            return Err(DocGraphError::Parse(format!(
                "folder root is a '{}', expected '{}'",
                self.catalog.type_name(actual),
                self.catalog.type_name(root_type)
            )));
        }
        Ok(reader.finish(root))
    }

    fn read_node(
        &self,
        reader: &mut XmlReader,
        dir: &Path,
        expected: Option<TypeId>,
    ) -> Result<EntityId, DocGraphError> {
        let file = self.node_document(dir)?;
        let obj = read_document(reader, &file, expected)?;
        self.read_children(reader, dir, obj)?;
        Ok(obj)
    }

    /// The `<Type>.xml` file of a node directory.
    fn node_document(&self, dir: &Path) -> Result<PathBuf, DocGraphError> {
        let documents: Vec<PathBuf> = sorted_entries(dir)?
            .into_iter()
            .filter(|p| p.is_file() && has_extension(p, "xml"))
            .collect();
        documents
            .iter()
            .find(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|stem| self.catalog.describe_type(stem))
                    .is_some_and(|t| t.is_entity())
            })
            .or_else(|| documents.first())
            .cloned()
            .ok_or_else(|| {
                DocGraphError::NotFound(format!("no entity document in {}", dir.display()))
            })
    }

    fn read_children(
        &self,
        reader: &mut XmlReader,
        dir: &Path,
        obj: EntityId,
    ) -> Result<(), DocGraphError> {
        let catalog = self.catalog.clone();
        let ty = reader.graph_mut().type_of(obj)?;
        for field in catalog.forward_fields(ty) {
            let descriptor = catalog.field(field);
            match descriptor.folder_hint() {
                FolderHint::Nested { bucketed, leaf } => {
                    let Target::Entity(item_type) = descriptor.target() else {
                        continue;
                    };
                    let field_dir = dir.join(descriptor.name());
                    if !field_dir.is_dir() {
                        continue;
                    }
                    // The owner's document already lists the members by href
                    let listed = reader
                        .graph()
                        .get(obj, field)
                        .is_some_and(|value| !value.is_empty());
                    let containers = if *bucketed {
                        sorted_entries(&field_dir)?
                            .into_iter()
                            .filter(|p| p.is_dir())
                            .collect()
                    } else {
                        vec![field_dir.clone()]
                    };
                    for container in containers {
                        for entry in sorted_entries(&container)? {
                            let item = if *leaf {
                                if !(entry.is_file() && has_extension(&entry, "xml")) {
                                    continue;
                                }
                                read_document(reader, &entry, Some(item_type))?
                            } else {
                                if !entry.is_dir() {
                                    continue;
                                }
                                self.read_node(reader, &entry, Some(item_type))?
                            };
                            if !listed {
                                let location = entry.display().to_string();
                                reader.assign_item(
                                    obj,
                                    field,
                                    Item::Value(Value::Ref(item)),
                                    &location,
                                );
                            }
                        }
                    }
                }
                FolderHint::Sidecar { extension } => {
                    let path = dir.join(format!("{}.{}", descriptor.name(), extension));
                    if !path.is_file() {
                        continue;
                    }
                    let text = fs::read_to_string(&path)
                        .map_err(|e| DocGraphError::from(e).for_file(&path, "read"))?;
                    let text = text
                        .strip_suffix("\r\n")
                        .or_else(|| text.strip_suffix('\n'))
                        .unwrap_or(&text);
                    let result = parse_value(&catalog, descriptor.target(), text)
                        .and_then(|value| reader.graph_mut().set(obj, field, value));
                    if let Err(e) = result {
                        reader.diagnose(ReadDiagnostic::warning(format!(
                            "{}: {e}",
                            path.display()
                        )));
                    }
                }
                FolderHint::None => {}
            }
        }
        Ok(())
    }
}

fn write_document(
    writer: &mut XmlWriter<'_>,
    file: &Path,
    obj: EntityId,
    with_detached: bool,
) -> Result<(), DocGraphError> {
    fs::File::create(file)
        .map_err(DocGraphError::from)
        .and_then(|f| {
            let mut out = BufWriter::new(f);
            writer.write_document(&mut out, obj, with_detached)?;
            out.flush()?;
            Ok(())
        })
        .map_err(|e| e.for_file(file, "write"))
}

fn read_document(
    reader: &mut XmlReader,
    file: &Path,
    expected: Option<TypeId>,
) -> Result<EntityId, DocGraphError> {
    fs::read_to_string(file)
        .map_err(DocGraphError::from)
        .and_then(|text| reader.read_document(&text, expected))
        .map_err(|e| e.for_file(file, "read"))
}

/// Text of the entity's folder-key field, if non-empty.
fn folder_key(graph: &Graph, obj: EntityId) -> Option<String> {
    let ty = graph.type_of(obj).ok()?;
    let field = graph.catalog().type_by_id(ty).folder_key()?;
    let text = match graph.get(obj, field)? {
        Value::String(s) | Value::Enum(s) => s.clone(),
        Value::Integer(n) => n.to_string(),
        Value::Guid(g) => g.to_string(),
        Value::Wrapped { value, .. } => value.as_str()?.to_string(),
        _ => return None,
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Replace characters that are not allowed in file names with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, DocGraphError> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map(|e| e.into_path()).map_err(DocGraphError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{diff, isomorphic},
        schema::{CatalogBuilder, EntityDef, FieldDef, Primitive},
        tests::{sample_widget, simple_widget, widget_catalog},
    };

    /// Shelves file their books under `Books` and again under `Picks`.
    fn shelf_catalog() -> Arc<Catalog> {
        let leaf = || FolderHint::Nested {
            bucketed: false,
            leaf: true,
        };
        Arc::new(
            CatalogBuilder::new("SHELF_1_0")
                .root("Shelf")
                .entity(
                    EntityDef::new("Shelf")
                        .field(FieldDef::new(0, "Name", Primitive::String).required())
                        .field(FieldDef::new(1, "Books", "Book").list().folder(leaf()))
                        .field(FieldDef::new(2, "Picks", "Book").list().folder(leaf())),
                )
                .entity(
                    EntityDef::new("Book")
                        .folder_key("Title")
                        .field(FieldDef::new(0, "Title", Primitive::String).required()),
                )
                .build()
                .unwrap(),
        )
    }

    fn shelf(catalog: Arc<Catalog>, titles: &[&str]) -> (Graph, EntityId, Vec<EntityId>) {
        let mut g = Graph::new(catalog);
        let shelf = g.create("Shelf").unwrap();
        g.set_field(shelf, "Name", "S1").unwrap();
        let books = titles
            .iter()
            .map(|title| {
                let book = g.create("Book").unwrap();
                g.set_field(book, "Title", *title).unwrap();
                book
            })
            .collect();
        (g, shelf, books)
    }

    fn file_names(dir: &Path) -> Vec<String> {
        sorted_entries(dir)
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a/b:c*"), "a_b_c_");
        assert_eq!(sanitize_file_name("Wall Type"), "Wall Type");
    }

    #[test]
    fn test_layout_and_round_trip() {
        let catalog = Arc::new(widget_catalog());
        let serializer = FolderSerializer::new(catalog.clone(), &SerializerConfig::default());
        let (g, root) = sample_widget(catalog);
        let dir = tempfile::tempdir().unwrap();

        serializer.write_folder(dir.path(), &g, root).unwrap();
        let root_doc = fs::read_to_string(dir.path().join("Widget.xml")).unwrap();
        assert!(!root_doc.contains("<Parts"), "{root_doc}");
        assert!(!root_doc.contains("<Notes"), "{root_doc}");
        assert!(root_doc.contains("href=\"P1\""), "{root_doc}");
        assert_eq!(
            fs::read_to_string(dir.path().join("Notes.txt")).unwrap(),
            "Line one\nLine two\n"
        );
        assert!(dir.path().join("Parts/g/G1/Gear.xml").is_file());
        let part_doc = fs::read_to_string(dir.path().join("Parts/p/P1/Part.xml")).unwrap();
        assert!(part_doc.contains("id=\"P1\""), "{part_doc}");

        let outcome = serializer.read_folder(dir.path()).unwrap();
        assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
        assert!(isomorphic(&g, root, &outcome.graph, outcome.root));
    }

    #[test]
    fn test_prefixes_pick_the_bucket() {
        let catalog = Arc::new(widget_catalog());
        let mut serializer = FolderSerializer::new(catalog.clone(), &SerializerConfig::default());
        serializer.add_file_prefix("Part", "P");
        let (g, root) = simple_widget(catalog);
        let dir = tempfile::tempdir().unwrap();

        serializer.write_folder(dir.path(), &g, root).unwrap();
        assert!(dir.path().join("Parts/1/P1/Part.xml").is_file());
        assert!(dir.path().join("Parts/2/P2/Part.xml").is_file());

        let outcome = serializer.read_folder(dir.path()).unwrap();
        assert!(isomorphic(&g, root, &outcome.graph, outcome.root));
    }

    #[test]
    fn test_item_listed_by_two_collections_is_filed_once() {
        let catalog = shelf_catalog();
        let serializer = FolderSerializer::new(catalog.clone(), &SerializerConfig::default());
        let (mut g, root, books) = shelf(catalog, &["A", "B", "C"]);
        g.add_field(root, "Books", books[0]).unwrap();
        g.add_field(root, "Books", books[1]).unwrap();
        g.add_field(root, "Picks", books[1]).unwrap();
        g.add_field(root, "Picks", books[2]).unwrap();
        let dir = tempfile::tempdir().unwrap();

        serializer.write_folder(dir.path(), &g, root).unwrap();
        assert_eq!(file_names(&dir.path().join("Books")), ["A.xml", "B.xml"]);
        assert_eq!(file_names(&dir.path().join("Picks")), ["C.xml"]);
        let root_doc = fs::read_to_string(dir.path().join("Shelf.xml")).unwrap();
        assert!(!root_doc.contains("<Books"), "{root_doc}");
        assert_eq!(root_doc.matches("href=").count(), 2, "{root_doc}");

        let outcome = serializer.read_folder(dir.path()).unwrap();
        assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
        assert_eq!(outcome.graph.len(), g.len());
        assert!(
            isomorphic(&g, root, &outcome.graph, outcome.root),
            "{:?}",
            diff(&g, root, &outcome.graph, outcome.root)
        );
    }

    #[test]
    fn test_repeated_list_entry_is_filed_once() {
        let catalog = shelf_catalog();
        let serializer = FolderSerializer::new(catalog.clone(), &SerializerConfig::default());
        let (mut g, root, books) = shelf(catalog, &["A", "B"]);
        for book in [books[0], books[1], books[0]] {
            g.add_field(root, "Books", book).unwrap();
        }
        let dir = tempfile::tempdir().unwrap();

        serializer.write_folder(dir.path(), &g, root).unwrap();
        assert_eq!(file_names(&dir.path().join("Books")), ["A.xml", "B.xml"]);
        let root_doc = fs::read_to_string(dir.path().join("Shelf.xml")).unwrap();
        assert_eq!(root_doc.matches("href=").count(), 3, "{root_doc}");

        let outcome = serializer.read_folder(dir.path()).unwrap();
        assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
        assert_eq!(outcome.graph.len(), g.len());
        let field = outcome.graph.field_id(outcome.root, "Books").unwrap();
        let read = outcome.graph.refs(outcome.root, field);
        assert_eq!(read.len(), 3);
        assert_eq!(read[0], read[2]);
        assert!(
            isomorphic(&g, root, &outcome.graph, outcome.root),
            "{:?}",
            diff(&g, root, &outcome.graph, outcome.root)
        );
    }
}
