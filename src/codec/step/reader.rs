//! Parameter parser and graph materialization for exchange-structure input.

use std::{collections::BTreeMap, sync::Arc};

use super::{header::StepHeader, lexer::Lexer, lexer::Token};
use crate::{
    codec::{DeferredRefs, ReadDiagnostic, ReadOutcome},
    error::DocGraphError,
    graph::{EntityId, Graph, Value},
    schema::{Catalog, FieldId, Target},
};

/// One parameter of a record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    /// `$`
    Null,
    /// `*`
    Omitted,
    Integer(i64),
    Real(f64),
    Str(String),
    Binary(String),
    Enum(String),
    Ref(u64),
    List(Vec<Param>),
    /// `NAME(args)`: an inline entity or a typed defined value
    Typed(String, Vec<Param>),
}

#[derive(Debug)]
pub(crate) enum RecordBody {
    Simple { type_name: String, params: Vec<Param> },
    /// `#n=(A(..)B(..));` multi-leaf instances, which the catalog cannot describe
    Complex(Vec<String>),
}

#[derive(Debug)]
pub(crate) struct Record {
    pub number: u64,
    pub body: RecordBody,
}

/// Deepest nesting of lists and typed parameters accepted inside one record.
const MAX_PARAM_NESTING: usize = 256;

pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    nesting: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(input),
            peeked: None,
            nesting: 0,
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> DocGraphError {
        DocGraphError::Parse(format!("line {}: {}", self.lexer.line(), message))
    }

    fn next(&mut self) -> Result<Option<Token>, DocGraphError> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>, DocGraphError> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn require(&mut self) -> Result<Token, DocGraphError> {
        self.next()?
            .ok_or_else(|| self.error("unexpected end of input"))
    }

    fn expect(&mut self, expected: Token) -> Result<(), DocGraphError> {
        let token = self.require()?;
        if token == expected {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, found {token:?}")))
        }
    }

    /// Consume `NAME;`.
    pub fn expect_keyword(&mut self, name: &str) -> Result<(), DocGraphError> {
        match self.require()? {
            Token::Keyword(word) if word.eq_ignore_ascii_case(name) => self.expect(Token::Semicolon),
            other => Err(self.error(format!("expected '{name}', found {other:?}"))),
        }
    }

    /// The next `NAME(params);` entry of the header, or `None` after `ENDSEC;`.
    pub fn header_entry(&mut self) -> Result<Option<(String, Vec<Param>)>, DocGraphError> {
        match self.require()? {
            Token::Keyword(word) if word.eq_ignore_ascii_case("ENDSEC") => {
                self.expect(Token::Semicolon)?;
                Ok(None)
            }
            Token::Keyword(word) => {
                let params = self.params()?;
                self.expect(Token::Semicolon)?;
                Ok(Some((word.to_uppercase(), params)))
            }
            other => Err(self.error(format!("expected a header entry, found {other:?}"))),
        }
    }

    /// Consume `DATA;` (section parameters, if any, are ignored).
    pub fn data_section(&mut self) -> Result<(), DocGraphError> {
        match self.require()? {
            Token::Keyword(word) if word.eq_ignore_ascii_case("DATA") => {
                if self.peek()? == Some(&Token::LParen) {
                    self.params()?;
                }
                self.expect(Token::Semicolon)
            }
            other => Err(self.error(format!("expected 'DATA', found {other:?}"))),
        }
    }

    /// The next `#n=...;` record, or `None` after `ENDSEC;`.
    pub fn record(&mut self) -> Result<Option<Record>, DocGraphError> {
        let number = match self.require()? {
            Token::Keyword(word) if word.eq_ignore_ascii_case("ENDSEC") => {
                self.expect(Token::Semicolon)?;
                return Ok(None);
            }
            Token::InstanceRef(number) => number,
            other => return Err(self.error(format!("expected a record, found {other:?}"))),
        };
        self.expect(Token::Equals)?;
        let body = match self.require()? {
            Token::Keyword(type_name) => RecordBody::Simple {
                type_name,
                params: self.params()?,
            },
            Token::LParen => {
                let mut leaves = Vec::new();
                loop {
                    match self.require()? {
                        Token::RParen => break,
                        Token::Keyword(name) => {
                            self.params()?;
                            leaves.push(name);
                        }
                        other => {
                            return Err(self.error(format!("malformed complex record: {other:?}")))
                        }
                    }
                }
                RecordBody::Complex(leaves)
            }
            other => return Err(self.error(format!("expected a type name, found {other:?}"))),
        };
        self.expect(Token::Semicolon)?;
        Ok(Some(Record { number, body }))
    }

    fn params(&mut self) -> Result<Vec<Param>, DocGraphError> {
        self.expect(Token::LParen)?;
        self.items()
    }

    /// Comma separated parameters up to and including the closing `)`.
    fn items(&mut self) -> Result<Vec<Param>, DocGraphError> {
        let mut items = Vec::new();
        if self.peek()? == Some(&Token::RParen) {
            self.next()?;
            return Ok(items);
        }
        loop {
            items.push(self.param()?);
            match self.require()? {
                Token::Comma => continue,
                Token::RParen => return Ok(items),
                other => return Err(self.error(format!("expected ',' or ')', found {other:?}"))),
            }
        }
    }

    fn param(&mut self) -> Result<Param, DocGraphError> {
        let param = match self.require()? {
            Token::Dollar => Param::Null,
            Token::Star => Param::Omitted,
            Token::Integer(n) => Param::Integer(n),
            Token::Real(n) => Param::Real(n),
            Token::Str(s) => Param::Str(s),
            Token::Binary(hex) => Param::Binary(hex),
            Token::Enum(name) => Param::Enum(name),
            Token::InstanceRef(n) => Param::Ref(n),
            Token::LParen => Param::List(self.nested(Self::items)?),
            Token::Keyword(name) => Param::Typed(name, self.nested(Self::params)?),
            other => return Err(self.error(format!("unexpected {other:?} in parameter list"))),
        };
        Ok(param)
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Vec<Param>, DocGraphError>,
    ) -> Result<Vec<Param>, DocGraphError> {
        if self.nesting >= MAX_PARAM_NESTING {
            return Err(self.error(format!(
                "parameters nested deeper than {MAX_PARAM_NESTING} levels"
            )));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }
}

/// Parse the whole document into its header and records.
pub(crate) fn parse_document(text: &str) -> Result<(StepHeader, Vec<Record>), DocGraphError> {
    let mut parser = Parser::new(text);
    parser.expect_keyword("ISO-10303-21")?;
    parser.expect_keyword("HEADER")?;
    let header = StepHeader::parse(&mut parser)?;
    parser.data_section()?;
    let mut records = Vec::new();
    while let Some(record) = parser.record()? {
        records.push(record);
    }
    // The END-ISO-10303-21 trailer is optional for lenient reading
    Ok((header, records))
}

enum Resolved {
    Value(Value),
    Forward(u64),
}

/// Materializes records into a graph, one record at a time in file order.
pub(crate) struct StepReader {
    catalog: Arc<Catalog>,
    graph: Graph,
    deferred: DeferredRefs,
    instances: BTreeMap<u64, EntityId>,
    diagnostics: Vec<ReadDiagnostic>,
    root: Option<EntityId>,
}

impl StepReader {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        StepReader {
            graph: Graph::new(catalog.clone()),
            catalog,
            deferred: DeferredRefs::new(),
            instances: BTreeMap::new(),
            diagnostics: Vec::new(),
            root: None,
        }
    }

    fn diagnose(&mut self, diagnostic: ReadDiagnostic) {
        tracing::warn!("[StepReader] {}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn read(mut self, text: &str) -> Result<ReadOutcome, DocGraphError> {
        let (header, records) = parse_document(text)?;
        let schema_identifier = header.schema_identifier().map(str::to_string);
        if let Some(id) = schema_identifier.as_deref() {
            if !id.eq_ignore_ascii_case(self.catalog.schema_identifier()) {
                self.diagnose(ReadDiagnostic::info(format!(
                    "file schema '{}' differs from catalog '{}'",
                    id,
                    self.catalog.schema_identifier()
                )));
            }
        }

        for record in records {
            self.materialize(record);
        }

        let root = self.root.ok_or_else(|| {
            DocGraphError::Parse(format!(
                "no instance of root type '{}'",
                self.catalog.type_name(self.catalog.root_type())
            ))
        })?;
        let StepReader {
            mut graph,
            deferred,
            instances,
            mut diagnostics,
            ..
        } = self;
        diagnostics.extend(deferred.finish(&mut graph));
        graph.rebuild_inverses();
        tracing::debug!(
            "[StepReader] Read {} entities ({} numbered), {} diagnostics",
            graph.len(),
            instances.len(),
            diagnostics.len()
        );
        Ok(ReadOutcome {
            graph,
            root,
            instances: instances
                .into_iter()
                .map(|(number, id)| (format!("#{number}"), id))
                .collect(),
            diagnostics,
            schema_identifier,
        })
    }

    fn materialize(&mut self, record: Record) {
        let location = format!("#{}", record.number);
        let (type_name, params) = match record.body {
            RecordBody::Simple { type_name, params } => (type_name, params),
            RecordBody::Complex(leaves) => {
                self.diagnose(ReadDiagnostic::unknown_type(leaves.join("+"), location));
                return;
            }
        };
        let Some(ty) = self
            .catalog
            .describe_type(&type_name)
            .filter(|t| t.is_entity())
            .map(|t| t.id())
        else {
            self.diagnose(ReadDiagnostic::unknown_type(type_name, location));
            return;
        };
        let id = match self.graph.create_typed(ty) {
            Ok(id) => id,
            Err(e) => {
                self.diagnose(ReadDiagnostic::warning(format!("{location}: {e}")));
                return;
            }
        };
        self.instances.insert(record.number, id);
        if self.root.is_none() && self.catalog.is_subtype_of(ty, self.catalog.root_type()) {
            self.root = Some(id);
        }
        self.assign_args(id, params, &location);
        self.deferred.dequeue(&location, id, &mut self.graph);
    }

    fn assign_args(&mut self, owner: EntityId, params: Vec<Param>, location: &str) {
        let catalog = self.catalog.clone();
        let Ok(ty) = self.graph.type_of(owner) else {
            return;
        };
        let slots = catalog.ordered_fields(ty);
        if params.len() != slots.len() {
            self.diagnose(ReadDiagnostic::warning(format!(
                "{location}: {} takes {} arguments, found {}",
                catalog.type_name(ty).to_uppercase(),
                slots.len(),
                params.len()
            )));
        }
        for (slot, param) in slots.iter().zip(params) {
            // Hidden slots carry `*`
            let Some(field) = slot else { continue };
            self.assign(owner, *field, param, location);
        }
    }

    fn assign(&mut self, owner: EntityId, field: FieldId, param: Param, location: &str) {
        let catalog = self.catalog.clone();
        let descriptor = catalog.field(field);
        let outcome = match param {
            Param::Null | Param::Omitted => Ok(()),
            Param::List(items) if descriptor.is_collection() => {
                for item in items {
                    self.add_item(owner, field, item, location);
                }
                Ok(())
            }
            _ if descriptor.is_collection() => Err(DocGraphError::Value(format!(
                "'{}' expects a list",
                descriptor.name()
            ))),
            param => match self.resolve(descriptor.target(), param, location) {
                Ok(Some(Resolved::Value(value))) => self.graph.set(owner, field, value),
                Ok(Some(Resolved::Forward(number))) => {
                    self.deferred
                        .queue(format!("#{number}"), owner, field, &mut self.graph);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            },
        };
        if let Err(e) = outcome {
            self.diagnose(ReadDiagnostic::warning(format!(
                "{location}: {}.{}: {e}",
                catalog.type_name(descriptor.declaring_type()),
                descriptor.name()
            )));
        }
    }

    fn add_item(&mut self, owner: EntityId, field: FieldId, item: Param, location: &str) {
        let target = self.catalog.field(field).target();
        let outcome = match self.resolve(target, item, location) {
            Ok(Some(Resolved::Value(value))) => self.graph.add(owner, field, value),
            Ok(Some(Resolved::Forward(number))) => {
                self.deferred
                    .queue(format!("#{number}"), owner, field, &mut self.graph);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            let name = self.catalog.field(field).name().to_string();
            self.diagnose(ReadDiagnostic::warning(format!("{location}: {name}: {e}")));
        }
    }

    /// Turn one parameter into a value, materializing inline entities on the way.
    fn resolve(
        &mut self,
        target: Target,
        param: Param,
        location: &str,
    ) -> Result<Option<Resolved>, DocGraphError> {
        let resolved = match param {
            Param::Null | Param::Omitted => return Ok(None),
            Param::Ref(number) => match self.instances.get(&number) {
                Some(id) => Resolved::Value(Value::Ref(*id)),
                None => Resolved::Forward(number),
            },
            Param::Typed(name, args) => {
                let Some(descriptor) = self.catalog.describe_type(&name) else {
                    self.diagnose(ReadDiagnostic::unknown_type(name, location));
                    return Ok(None);
                };
                let ty = descriptor.id();
                if descriptor.is_entity() {
                    let id = self.graph.create_typed(ty)?;
                    self.assign_args(id, args, location);
                    Resolved::Value(Value::Ref(id))
                } else {
                    let type_name = descriptor.name().to_string();
                    let inner = args.into_iter().next().unwrap_or(Param::Null);
                    match self.resolve(Target::Defined(ty), inner, location)? {
                        Some(Resolved::Value(value)) => {
                            Resolved::Value(Value::wrapped(type_name, value))
                        }
                        _ => return Ok(None),
                    }
                }
            }
            Param::List(_) => {
                return Err(DocGraphError::Value(
                    "nested lists are not supported".to_string(),
                ))
            }
            scalar => Resolved::Value(scalar_value(target, scalar)?),
        };
        Ok(Some(resolved))
    }
}

fn scalar_value(target: Target, param: Param) -> Result<Value, DocGraphError> {
    let value = match param {
        Param::Integer(n) => Value::Integer(n),
        Param::Real(n) => Value::Real(n),
        Param::Str(s) => Value::String(s),
        Param::Binary(hex) => {
            // The leading digit counts unused bits in the first octet
            let digits = hex.get(1..).unwrap_or_default();
            Value::Binary(hex::decode(digits)?)
        }
        Param::Enum(name) if matches!(target, Target::Enum(_)) => Value::Enum(name),
        Param::Enum(name) => match name.to_uppercase().as_str() {
            "T" => Value::Boolean(true),
            "F" => Value::Boolean(false),
            "U" => Value::Logical(None),
            _ => Value::Enum(name),
        },
        other => {
            return Err(DocGraphError::Value(format!(
                "{other:?} is not a scalar"
            )))
        }
    };
    Ok(value)
}
