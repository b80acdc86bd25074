//! Schema configuration overlays (`cnf:configuration` documents).
//!
//! An overlay adjusts the XML placement of individual attributes without touching the schema
//! definition itself:
//!
//! ```xml
//! <cnf:configuration xmlns:cnf="urn:iso10303-28:configuration" id="WIDGET_SCHEMA_2_1">
//!   <cnf:entity select="Widget">
//!     <cnf:attribute select="Notes" exp-attribute="double-tag"/>
//!     <cnf:attribute select="Blob" keep="false"/>
//!   </cnf:entity>
//! </cnf:configuration>
//! ```

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Reader, Writer,
};

use super::{types::XmlPlacement, Catalog};
use crate::error::DocGraphError;

pub const CNF_NAMESPACE: &str = "urn:iso10303-28:configuration";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaOverlay {
    pub schema_identifier: Option<String>,
    pub entities: Vec<EntityOverlay>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityOverlay {
    pub name: String,
    pub attributes: Vec<AttributeOverlay>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeOverlay {
    pub name: String,
    /// Declared with `cnf:inverse` rather than `cnf:attribute`.
    pub inverse: bool,
    pub placement: Option<XmlPlacement>,
    pub tagless: Option<bool>,
}

fn placement_from_cnf(exp_attribute: &str) -> Option<XmlPlacement> {
    match exp_attribute {
        "attribute-content" => Some(XmlPlacement::Content),
        "attribute-tag" => Some(XmlPlacement::Attribute),
        "double-tag" => Some(XmlPlacement::Element),
        other => {
            tracing::warn!("[SchemaOverlay] Ignoring unknown exp-attribute '{}'", other);
            None
        }
    }
}

fn placement_to_cnf(placement: XmlPlacement) -> Option<&'static str> {
    match placement {
        XmlPlacement::Content => Some("attribute-content"),
        XmlPlacement::Attribute => Some("attribute-tag"),
        XmlPlacement::Element => Some("double-tag"),
        XmlPlacement::Default | XmlPlacement::Hidden => None,
    }
}

impl SchemaOverlay {
    pub fn from_xml_str(input: &str) -> Result<Self, DocGraphError> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut overlay = SchemaOverlay::default();
        let mut current: Option<EntityOverlay> = None;
        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"configuration" => {
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.local_name().as_ref() == b"id" {
                            overlay.schema_identifier = Some(attr.unescape_value()?.into_owned());
                        }
                    }
                }
                Event::Start(e) if e.local_name().as_ref() == b"entity" => {
                    if let Some(done) = current.take() {
                        overlay.entities.push(done);
                    }
                    current = Some(EntityOverlay {
                        name: select_of(&e)?,
                        attributes: Vec::new(),
                    });
                }
                Event::Empty(e) if e.local_name().as_ref() == b"entity" => {
                    overlay.entities.push(EntityOverlay {
                        name: select_of(&e)?,
                        attributes: Vec::new(),
                    });
                }
                Event::Start(e) | Event::Empty(e)
                    if matches!(e.local_name().as_ref(), b"attribute" | b"inverse") =>
                {
                    let Some(entity) = current.as_mut() else {
                        return Err(DocGraphError::Parse(
                            "cnf attribute outside of a cnf:entity".to_string(),
                        ));
                    };
                    let mut attribute = AttributeOverlay {
                        name: String::new(),
                        inverse: e.local_name().as_ref() == b"inverse",
                        placement: None,
                        tagless: None,
                    };
                    let mut hidden = false;
                    for attr in e.attributes() {
                        let attr = attr?;
                        let value = attr.unescape_value()?;
                        match attr.key.local_name().as_ref() {
                            b"select" => attribute.name = value.into_owned(),
                            b"exp-attribute" => attribute.placement = placement_from_cnf(&value),
                            b"keep" => hidden = value == "false",
                            b"tagless" => attribute.tagless = Some(value == "true"),
                            _ => {}
                        }
                    }
                    if hidden {
                        attribute.placement = Some(XmlPlacement::Hidden);
                    }
                    entity.attributes.push(attribute);
                }
                Event::End(e) if e.local_name().as_ref() == b"entity" => {
                    if let Some(done) = current.take() {
                        overlay.entities.push(done);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(overlay)
    }

    pub fn to_xml_string(&self) -> Result<String, DocGraphError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("cnf:configuration");
        root.push_attribute(("xmlns:cnf", CNF_NAMESPACE));
        if let Some(id) = &self.schema_identifier {
            root.push_attribute(("id", id.as_str()));
        }
        writer.write_event(Event::Start(root))?;

        let mut option = BytesStart::new("cnf:option");
        option.push_attribute(("inheritance", "true"));
        option.push_attribute(("concrete-attribute", "attribute-content"));
        option.push_attribute(("entity-attribute", "double-tag"));
        writer.write_event(Event::Empty(option))?;

        for entity in self.entities.iter() {
            let mut start = BytesStart::new("cnf:entity");
            start.push_attribute(("select", entity.name.as_str()));
            if entity.attributes.is_empty() {
                writer.write_event(Event::Empty(start))?;
                continue;
            }
            writer.write_event(Event::Start(start))?;
            for attribute in entity.attributes.iter() {
                let tag = if attribute.inverse {
                    "cnf:inverse"
                } else {
                    "cnf:attribute"
                };
                let mut elem = BytesStart::new(tag);
                elem.push_attribute(("select", attribute.name.as_str()));
                match attribute.placement {
                    Some(XmlPlacement::Hidden) => elem.push_attribute(("keep", "false")),
                    Some(placement) => {
                        if let Some(cnf) = placement_to_cnf(placement) {
                            elem.push_attribute(("exp-attribute", cnf));
                        }
                    }
                    None => {}
                }
                if let Some(tagless) = attribute.tagless {
                    elem.push_attribute(("tagless", if tagless { "true" } else { "false" }));
                }
                writer.write_event(Event::Empty(elem))?;
            }
            writer.write_event(Event::End(BytesEnd::new("cnf:entity")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("cnf:configuration")))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| DocGraphError::Serialization(format!("overlay is not UTF-8: {e}")))
    }

    /// Every non-default placement declared in `catalog`, entities sorted by name.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut entities: Vec<EntityOverlay> = catalog
            .types()
            .filter(|t| t.is_entity())
            .filter_map(|t| {
                let attributes: Vec<AttributeOverlay> = catalog
                    .all_fields(t.id())
                    .into_iter()
                    .map(|f| catalog.field(f))
                    .filter(|f| f.declaring_type() == t.id())
                    .filter(|f| f.xml_placement() != XmlPlacement::Default || f.is_tagless())
                    .map(|f| AttributeOverlay {
                        name: f.name().to_string(),
                        inverse: f.is_inverse(),
                        placement: Some(f.xml_placement())
                            .filter(|p| *p != XmlPlacement::Default),
                        tagless: f.is_tagless().then_some(true),
                    })
                    .collect();
                (!attributes.is_empty()).then(|| EntityOverlay {
                    name: t.name().to_string(),
                    attributes,
                })
            })
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        SchemaOverlay {
            schema_identifier: Some(catalog.schema_identifier().to_string()),
            entities,
        }
    }
}

fn select_of(e: &BytesStart<'_>) -> Result<String, DocGraphError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"select" {
            return Ok(attr.unescape_value()?.into_owned());
        }
    }
    Err(DocGraphError::Parse(
        "cnf:entity without a select attribute".to_string(),
    ))
}

impl Catalog {
    /// A copy of this catalog with the overlay's placement and tagless overrides applied.
    ///
    /// Overrides apply to the field as declared, so they are seen by every subtype. Unknown
    /// entity or attribute names are skipped.
    pub fn with_overlay(&self, overlay: &SchemaOverlay) -> Result<Catalog, DocGraphError> {
        if let Some(id) = &overlay.schema_identifier {
            if id != self.schema_identifier() {
                tracing::warn!(
                    "[Catalog::with_overlay] Overlay for '{}' applied to schema '{}'",
                    id,
                    self.schema_identifier()
                );
            }
        }

        let mut catalog = self.clone();
        for entity in overlay.entities.iter() {
            let Some(ty) = self.describe_type(&entity.name) else {
                tracing::warn!(
                    "[Catalog::with_overlay] Skipping unknown entity '{}'",
                    entity.name
                );
                continue;
            };
            if !ty.is_entity() {
                return Err(DocGraphError::Schema(format!(
                    "overlay entity '{}' is not an entity type",
                    entity.name
                )));
            }
            for attribute in entity.attributes.iter() {
                let field = if attribute.inverse {
                    self.inverse_fields(ty.id())
                        .iter()
                        .copied()
                        .find(|f| self.field(*f).name() == attribute.name)
                } else {
                    self.field_by_name(ty.id(), &attribute.name)
                };
                let Some(field) = field else {
                    tracing::warn!(
                        "[Catalog::with_overlay] Skipping unknown attribute '{}.{}'",
                        entity.name,
                        attribute.name
                    );
                    continue;
                };
                let descriptor = &mut catalog.fields[field.index()];
                if let Some(placement) = attribute.placement {
                    descriptor.xml = placement;
                }
                if let Some(tagless) = attribute.tagless {
                    descriptor.tagless = tagless;
                }
            }
        }
        Ok(catalog)
    }
}
