use regex::Regex;
use std::io::Write;

use super::{
    lexer::encode_string,
    reader::{Param, Parser},
};
use crate::{config::StepOptions, error::DocGraphError};

/// Contents of the `HEADER` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepHeader {
    pub description: Vec<String>,
    pub implementation_level: String,
    pub name: String,
    pub time_stamp: String,
    pub author: Vec<String>,
    pub organization: Vec<String>,
    /// Generator name and version, e.g. `docgraph-core 0.1.0`
    pub preprocessor_version: String,
    pub originating_system: String,
    pub authorization: String,
    pub schema_identifiers: Vec<String>,
}

impl StepHeader {
    pub fn from_options(options: &StepOptions, schema_identifier: &str) -> Self {
        let preprocessor_version = if options.generator_version.is_empty() {
            options.generator.clone()
        } else {
            format!("{} {}", options.generator, options.generator_version)
        };
        StepHeader {
            description: options.description.clone(),
            implementation_level: options.implementation_level.clone(),
            name: options.name.clone(),
            time_stamp: options.time_stamp.clone(),
            author: vec![options.author.clone()],
            organization: vec![options.organization.clone()],
            preprocessor_version,
            originating_system: options.originating_system.clone(),
            authorization: options.authorization.clone(),
            schema_identifiers: vec![schema_identifier.to_string()],
        }
    }

    pub fn schema_identifier(&self) -> Option<&str> {
        self.schema_identifiers.first().map(String::as_str)
    }

    /// Version encoded at the end of the schema identifier: `IFCDOC_12_1` is `12.1`,
    /// `IFCDOC_11` is `11.0`.
    pub fn schema_version(&self) -> Option<f64> {
        self.schema_identifier().and_then(schema_version)
    }

    pub fn write(&self, out: &mut dyn Write) -> Result<(), DocGraphError> {
        writeln!(out, "ISO-10303-21;")?;
        writeln!(out, "HEADER;")?;
        writeln!(
            out,
            "FILE_DESCRIPTION({},{});",
            string_list(&self.description),
            encode_string(&self.implementation_level)
        )?;
        writeln!(
            out,
            "FILE_NAME({},{},{},{},{},{},{});",
            encode_string(&self.name),
            encode_string(&self.time_stamp),
            string_list(&self.author),
            string_list(&self.organization),
            encode_string(&self.preprocessor_version),
            encode_string(&self.originating_system),
            encode_string(&self.authorization)
        )?;
        writeln!(out, "FILE_SCHEMA({});", string_list(&self.schema_identifiers))?;
        writeln!(out, "ENDSEC;")?;
        Ok(())
    }

    /// Read header entries up to and including `ENDSEC;`. Unknown entries are ignored.
    pub(crate) fn parse(parser: &mut Parser<'_>) -> Result<Self, DocGraphError> {
        let mut header = StepHeader::default();
        while let Some((name, params)) = parser.header_entry()? {
            match name.as_str() {
                "FILE_DESCRIPTION" => {
                    header.description = strings_at(&params, 0);
                    header.implementation_level = string_at(&params, 1);
                }
                "FILE_NAME" => {
                    header.name = string_at(&params, 0);
                    header.time_stamp = string_at(&params, 1);
                    header.author = strings_at(&params, 2);
                    header.organization = strings_at(&params, 3);
                    header.preprocessor_version = string_at(&params, 4);
                    header.originating_system = string_at(&params, 5);
                    header.authorization = string_at(&params, 6);
                }
                "FILE_SCHEMA" => header.schema_identifiers = strings_at(&params, 0),
                other => tracing::debug!("[StepHeader] Ignoring header entry {}", other),
            }
        }
        Ok(header)
    }
}

pub fn schema_version(identifier: &str) -> Option<f64> {
    let pattern = Regex::new(r"_(\d+)(?:_(\d+))?$").ok()?;
    let captures = pattern.captures(identifier)?;
    let major: f64 = captures.get(1)?.as_str().parse().ok()?;
    let minor: f64 = captures
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0);
    Some(major + minor / 10.0)
}

fn string_list(items: &[String]) -> String {
    let inner: Vec<String> = items.iter().map(|s| encode_string(s)).collect();
    format!("({})", inner.join(","))
}

fn string_at(params: &[Param], idx: usize) -> String {
    match params.get(idx) {
        Some(Param::Str(s)) => s.clone(),
        _ => String::new(),
    }
}

fn strings_at(params: &[Param], idx: usize) -> Vec<String> {
    match params.get(idx) {
        Some(Param::List(items)) => items
            .iter()
            .filter_map(|p| match p {
                Param::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        Some(Param::Str(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_version() {
        assert_eq!(schema_version("IFCDOC_12_1"), Some(12.1));
        assert_eq!(schema_version("IFCDOC_11"), Some(11.0));
        assert_eq!(schema_version("WIDGET_SCHEMA_2_1"), Some(2.1));
        assert_eq!(schema_version("IFCDOC"), None);
    }

    #[test]
    fn test_header_round_trip() {
        let mut options = StepOptions::default();
        options.author = "A. Writer".to_string();
        options.generator = "widget-tool".to_string();
        options.generator_version = "1.2".to_string();
        let header = StepHeader::from_options(&options, "WIDGET_SCHEMA_2_1");

        let mut buffer = Vec::new();
        header.write(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("FILE_SCHEMA(('WIDGET_SCHEMA_2_1'));"));

        let mut parser = Parser::new(&text);
        parser.expect_keyword("ISO-10303-21").unwrap();
        parser.expect_keyword("HEADER").unwrap();
        let parsed = StepHeader::parse(&mut parser).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.preprocessor_version, "widget-tool 1.2");
        assert_eq!(parsed.schema_version(), Some(2.1));
    }
}
