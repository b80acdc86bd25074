//! STEP encoding of a cyclic graph: layout, round trip and recovery from broken input.
mod common;

use common::{chain_catalog, chain_graph, shop_catalog, shop_graph};
use docgraph_core::{
    codec::{ObjectSerializer, StepSerializer},
    config::SerializerConfig,
    graph::{isomorphic, Value},
    DocGraphError,
};

#[test_log::test]
fn test_shared_items_get_numbered_records() {
    let catalog = shop_catalog();
    let serializer = StepSerializer::new(catalog.clone(), &SerializerConfig::default());
    let (g, shop) = shop_graph(catalog);

    let text = serializer.write_string(&g, shop).unwrap();
    assert!(text.starts_with("ISO-10303-21;\nHEADER;\n"), "{text}");
    assert!(text.contains("FILE_SCHEMA(('SHOP_SCHEMA_1_2'));"), "{text}");
    assert!(text.contains("#1=SHOP('Corner',(#2,#3),#2,"), "{text}");
    assert!(text.contains("#2=ITEM('A-100',.SMALL.,1.5,(#3));"), "{text}");
    assert!(text.contains("#3=ITEM('B-200',$,20.,(#2));"), "{text}");
    assert!(text.ends_with("ENDSEC;\nEND-ISO-10303-21;\n"), "{text}");
}

#[test_log::test]
fn test_round_trip_is_stable() {
    let catalog = shop_catalog();
    let serializer = StepSerializer::new(catalog.clone(), &SerializerConfig::default());
    let (g, shop) = shop_graph(catalog);

    let text = serializer.write_string(&g, shop).unwrap();
    let outcome = serializer.read_object(&mut text.as_bytes()).unwrap();
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    assert!(isomorphic(&g, shop, &outcome.graph, outcome.root));
    assert_eq!(outcome.instances.len(), 3);
    assert_eq!(
        serializer.write_string(&outcome.graph, outcome.root).unwrap(),
        text
    );
}

const HAND_WRITTEN: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('hand written'),'2;1');
FILE_NAME('shop.step','',(''),(''),'','','');
FILE_SCHEMA(('SHOP_SCHEMA_1_0'));
ENDSEC;
DATA;
#1=SHOP('Corner',(#2,#3),#3,$);
#2=ITEM('A-100',.XL.,$,(#3,#9));
#3=ITEM('B-200',$,$,());
ENDSEC;
END-ISO-10303-21;
";

#[test_log::test]
fn test_forward_and_dangling_references() {
    let catalog = shop_catalog();
    let serializer = StepSerializer::new(catalog, &SerializerConfig::default());
    let outcome = serializer.read_str(HAND_WRITTEN).unwrap();
    let g = &outcome.graph;

    let a = outcome.instances["#2"];
    let b = outcome.instances["#3"];
    assert_eq!(g.get_field(outcome.root, "Featured"), Some(&Value::Ref(b)));
    assert_eq!(
        g.get_field(outcome.root, "Items"),
        Some(&Value::List(vec![Value::Ref(a), Value::Ref(b)]))
    );
    // The unresolved #9 leaves no hole behind
    assert_eq!(
        g.get_field(a, "Related"),
        Some(&Value::List(vec![Value::Ref(b)]))
    );
    assert_eq!(
        g.get_field(a, "Size"),
        Some(&Value::Enum("Large".to_string()))
    );
    // Inverses are rebuilt after reading
    assert_eq!(g.get_field(b, "Shop"), Some(&Value::Ref(outcome.root)));

    let dangling: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter_map(|d| d.as_dangling_reference())
        .collect();
    assert_eq!(dangling.len(), 1);
    assert_eq!(dangling[0].id, "#9");
    assert_eq!(dangling[0].field, "Related");

    assert_eq!(outcome.schema_identifier.as_deref(), Some("SHOP_SCHEMA_1_0"));
}

#[test_log::test]
fn test_unterminated_data_section_is_a_parse_error() {
    let catalog = shop_catalog();
    let serializer = StepSerializer::new(catalog, &SerializerConfig::default());
    let truncated = &HAND_WRITTEN[..HAND_WRITTEN.find("#2=").unwrap()];
    let err = serializer.read_str(truncated).unwrap_err();
    assert!(matches!(err, DocGraphError::Parse(_)), "{err:?}");
}

#[test_log::test]
fn test_long_reference_chain_is_split_into_records() {
    let catalog = chain_catalog();
    let serializer = StepSerializer::new(catalog.clone(), &SerializerConfig::default());
    let (g, chain) = chain_graph(catalog, 20_000);

    let text = serializer.write_string(&g, chain).unwrap();
    let widest = text
        .lines()
        .map(|line| line.matches("LINK(").count())
        .max()
        .unwrap();
    assert!(widest <= 64, "{widest} links on one line");
    assert!(text.lines().filter(|line| line.starts_with('#')).count() > 300);

    let outcome = serializer.read_str(&text).unwrap();
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    assert_eq!(outcome.graph.len(), g.len());
    assert!(isomorphic(&g, chain, &outcome.graph, outcome.root));
}
