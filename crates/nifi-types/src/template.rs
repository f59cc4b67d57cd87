//! Template artifacts
//!
//! A template is an XML export of a process group. It is uploaded under its
//! declared name and instantiated onto the canvas, where it materializes as a
//! new group carrying the declared group name.

use crate::ids::TemplateId;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Template parsing errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template is not valid XML: {0}")]
    Xml(String),

    #[error("Template is missing element <{0}>")]
    MissingElement(&'static str),

    #[error("Template is not UTF-8")]
    Encoding,

    #[error("Cannot read template: {0}")]
    Io(#[from] std::io::Error),
}

/// A template file ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateArtifact {
    /// Template name, the key used for replacement
    pub name: String,
    /// Name of the process group the template instantiates
    pub group_name: String,
    /// File name sent with the upload
    pub file_name: String,
    /// Raw XML
    pub bytes: Vec<u8>,
}

impl TemplateArtifact {
    /// Read and parse a template file
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "template.xml".to_string());
        Self::from_bytes(file_name, bytes)
    }

    /// Parse template XML, keeping the bytes for upload
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, TemplateError> {
        let (name, group_name) = {
            let text = std::str::from_utf8(&bytes).map_err(|_| TemplateError::Encoding)?;
            let doc = Document::parse(text).map_err(|e| TemplateError::Xml(e.to_string()))?;
            let root = doc.root_element();

            let name = child_text(root, "name").ok_or(TemplateError::MissingElement("name"))?;
            let group_name = child(root, "snippet")
                .and_then(|snippet| child(snippet, "processGroups"))
                .and_then(|group| child_text(group, "name"))
                .ok_or(TemplateError::MissingElement("snippet/processGroups/name"))?;
            (name, group_name)
        };

        Ok(Self {
            name,
            group_name,
            file_name: file_name.into(),
            bytes,
        })
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Template as listed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: TemplateId,
    pub name: String,
}

impl TemplateSummary {
    /// Parse the XML entity returned by a template upload
    pub fn from_upload_xml(xml: &str) -> Result<Self, TemplateError> {
        let doc = Document::parse(xml).map_err(|e| TemplateError::Xml(e.to_string()))?;
        let template = doc
            .descendants()
            .find(|n| n.has_tag_name("template"))
            .ok_or(TemplateError::MissingElement("template"))?;
        let id = child_text(template, "id").ok_or(TemplateError::MissingElement("template/id"))?;
        let name = child_text(template, "name").unwrap_or_default();
        Ok(Self {
            id: TemplateId::new(id),
            name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEntity {
    pub id: TemplateId,
    pub template: TemplateSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesEntity {
    #[serde(default)]
    pub templates: Vec<TemplateEntity>,
}

/// Canvas coordinates; cosmetic only
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantiateTemplateRequest {
    pub template_id: TemplateId,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl InstantiateTemplateRequest {
    pub fn new(template_id: TemplateId, origin: Position) -> Self {
        Self {
            template_id,
            origin_x: origin.x,
            origin_y: origin.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEMPLATE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<template encoding-version="1.0">
    <description></description>
    <groupId>4d908dd7-0157-1000-c1f3-366f70148660</groupId>
    <name>Friendbuy</name>
    <snippet>
        <processGroups>
            <id>9a2b1c44-0157-1000-0000-000000000000</id>
            <name>Friendbuy Ingest</name>
        </processGroups>
    </snippet>
</template>"#;

    #[test]
    fn test_parse_template_names() {
        let artifact =
            TemplateArtifact::from_bytes("Friendbuy.xml", TEMPLATE_XML.as_bytes().to_vec())
                .unwrap();
        assert_eq!(artifact.name, "Friendbuy");
        assert_eq!(artifact.group_name, "Friendbuy Ingest");
        assert_eq!(artifact.file_name, "Friendbuy.xml");
    }

    #[test]
    fn test_template_without_group_is_rejected() {
        let xml = "<template><name>Lonely</name><snippet/></template>";
        let err = TemplateArtifact::from_bytes("x.xml", xml.as_bytes().to_vec()).unwrap_err();
        assert!(matches!(err, TemplateError::MissingElement(_)));
    }

    #[test]
    fn test_load_reads_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Friendbuy.xml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(TEMPLATE_XML.as_bytes())
            .unwrap();
        let artifact = TemplateArtifact::load(&path).unwrap();
        assert_eq!(artifact.file_name, "Friendbuy.xml");
    }

    #[test]
    fn test_upload_response_id() {
        let xml = r#"<templateEntity><template><id>t-42</id><name>Friendbuy</name></template></templateEntity>"#;
        let summary = TemplateSummary::from_upload_xml(xml).unwrap();
        assert_eq!(summary.id.as_str(), "t-42");
        assert_eq!(summary.name, "Friendbuy");
    }
}
