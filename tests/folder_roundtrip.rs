//! Folder-tree encoding through the file-level API.
mod common;

use common::{init_logging, shop_catalog, shop_graph};
use docgraph_core::{
    codec::{load_file, save_file, FileFormat},
    config::SerializerConfig,
    graph::isomorphic,
};
use std::fs;

#[test_log::test]
fn test_folder_layout() {
    let catalog = shop_catalog();
    let (g, shop) = shop_graph(catalog);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("corner");

    save_file(&target, &g, shop, &SerializerConfig::default()).unwrap();

    let shop_doc = fs::read_to_string(target.join("Shop.xml")).unwrap();
    assert!(shop_doc.contains(r#"<Item xsi:nil="true" href="A100"/>"#), "{shop_doc}");
    assert!(!shop_doc.contains("<Items"), "{shop_doc}");
    assert!(!shop_doc.contains("<Blurb"), "{shop_doc}");
    assert_eq!(
        fs::read_to_string(target.join("Blurb.md")).unwrap(),
        "Open daily.\nClosed on holidays.\n"
    );

    let a_doc = fs::read_to_string(target.join("Items/a/A-100/Item.xml")).unwrap();
    assert!(a_doc.contains(r#"id="A100""#), "{a_doc}");
    assert!(a_doc.contains(r#"href="B200""#), "{a_doc}");
    let b_doc = fs::read_to_string(target.join("Items/b/B-200/Item.xml")).unwrap();
    assert!(b_doc.contains(r#"href="A100""#), "{b_doc}");

    // Nothing is left over from the staging directory
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec!["corner"]);
}

#[test_log::test]
fn test_folder_round_trip() {
    let catalog = shop_catalog();
    let config = SerializerConfig::default();
    let (g, shop) = shop_graph(catalog.clone());
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("corner");

    save_file(&target, &g, shop, &config).unwrap();
    let loaded = load_file(&target, catalog, &config).unwrap();
    assert_eq!(loaded.format, FileFormat::Folder);
    assert!(loaded.diagnostics.is_empty(), "{:?}", loaded.diagnostics);
    assert!(isomorphic(&g, shop, &loaded.graph, loaded.root));
    assert_eq!(loaded.schema_identifier, None);
}

#[test]
fn test_file_prefix_moves_items_between_buckets() {
    init_logging();
    let catalog = shop_catalog();
    let mut config = SerializerConfig::default();
    config
        .folder
        .file_prefixes
        .insert("Item".to_string(), "A-".to_string());
    let (g, shop) = shop_graph(catalog.clone());
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("corner");

    save_file(&target, &g, shop, &config).unwrap();
    assert!(target.join("Items/1/A-100/Item.xml").is_file());
    assert!(target.join("Items/b/B-200/Item.xml").is_file());

    let loaded = load_file(&target, catalog, &config).unwrap();
    assert!(isomorphic(&g, shop, &loaded.graph, loaded.root));
}

#[test]
fn test_convert_between_formats() {
    init_logging();
    let catalog = shop_catalog();
    let config = SerializerConfig::default();
    let (g, shop) = shop_graph(catalog.clone());
    let dir = tempfile::tempdir().unwrap();

    let step = dir.path().join("corner.step");
    save_file(&step, &g, shop, &config).unwrap();
    let from_step = load_file(&step, catalog.clone(), &config).unwrap();

    let folder = dir.path().join("tree");
    save_file(&folder, &from_step.graph, from_step.root, &config).unwrap();
    let from_folder = load_file(&folder, catalog.clone(), &config).unwrap();

    let xml = dir.path().join("corner.xml");
    save_file(&xml, &from_folder.graph, from_folder.root, &config).unwrap();
    let from_xml = load_file(&xml, catalog, &config).unwrap();

    assert!(isomorphic(&g, shop, &from_xml.graph, from_xml.root));
}
