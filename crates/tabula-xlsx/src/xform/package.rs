//! Package-level parts: relationships, content types and document
//! properties.

use chrono::{DateTime, NaiveDateTime};
use tabula_model::DocumentProperties;

use crate::sax::SaxNode;
use crate::xml_stream::XmlStream;
use crate::XlsxError;

use super::simple::StringXform;
use super::style::AttrLeaf;
use super::{ChildMap, Composite, ListXform, Xform};

pub const NS_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
pub const NS_DOC_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub mod rel_type {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const WORKSHEET: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
    pub const STYLES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
    pub const SHARED_STRINGS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
    pub const THEME: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
    pub const HYPERLINK: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
    pub const COMMENTS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
    pub const VML_DRAWING: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing";
    pub const CORE_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
    pub const EXTENDED_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
}

pub mod content_type {
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub const XML: &str = "application/xml";
    pub const VML: &str = "application/vnd.openxmlformats-officedocument.vmlDrawing";
    pub const WORKBOOK: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
    pub const WORKSHEET: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
    pub const STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
    pub const SHARED_STRINGS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
    pub const THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
    pub const COMMENTS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml";
    pub const CORE: &str = "application/vnd.openxmlformats-package.core-properties+xml";
    pub const APP: &str = "application/vnd.openxmlformats-officedocument.extended-properties+xml";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    /// `External` for hyperlinks and other targets outside the package.
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn new(id: impl Into<String>, rel_type: &str, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rel_type: rel_type.to_string(),
            target: target.into(),
            target_mode: None,
        }
    }

    pub fn external(id: impl Into<String>, rel_type: &str, target: impl Into<String>) -> Self {
        Self {
            target_mode: Some("External".to_string()),
            ..Self::new(id, rel_type, target)
        }
    }

    pub fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("external"))
    }
}

fn relationship_xform() -> AttrLeaf<Relationship> {
    AttrLeaf::new(
        "Relationship",
        |node| {
            Ok(Relationship {
                id: node.attr("Id").unwrap_or_default().to_string(),
                rel_type: node.attr("Type").unwrap_or_default().to_string(),
                target: node.attr("Target").unwrap_or_default().to_string(),
                target_mode: node.attr("TargetMode").map(str::to_string),
            })
        },
        |xml, rel| {
            xml.add_attribute("Id", &rel.id);
            xml.add_attribute("Type", &rel.rel_type);
            xml.add_attribute("Target", &rel.target);
            xml.add_attribute_opt("TargetMode", rel.target_mode.as_deref());
        },
    )
}

/// A `.rels` part.
pub struct RelationshipsXform {
    list: ListXform<AttrLeaf<Relationship>>,
}

impl Default for RelationshipsXform {
    fn default() -> Self {
        Self {
            list: ListXform::new("Relationships", relationship_xform()),
        }
    }
}

impl Xform for RelationshipsXform {
    type Model = Vec<Relationship>;

    fn tag(&self) -> &str {
        "Relationships"
    }

    fn render(&self, xml: &mut XmlStream, model: &Vec<Relationship>) {
        xml.open_xml();
        xml.open_node("Relationships");
        xml.add_attribute("xmlns", NS_RELATIONSHIPS);
        for rel in model {
            self.list.child().render(xml, rel);
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.list.parse_open(node)
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.list.parse_close(name)
    }

    fn take_model(&mut self) -> Option<Vec<Relationship>> {
        self.list.take_model()
    }

    fn reset(&mut self) {
        self.list.reset();
    }
}

/// Next free `rIdN` given the ids already used.
pub fn next_rel_id(rels: &[Relationship]) -> String {
    let max = rels
        .iter()
        .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

/// `[Content_Types].xml`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentTypes {
    /// `(extension, content type)`.
    pub defaults: Vec<(String, String)>,
    /// `(part name, content type)`; part names start with `/`.
    pub overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Defaults every package written here carries.
    pub fn standard() -> Self {
        Self {
            defaults: vec![
                ("rels".into(), content_type::RELATIONSHIPS.into()),
                ("xml".into(), content_type::XML.into()),
            ],
            overrides: Vec::new(),
        }
    }

    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        if !self.defaults.iter().any(|(e, _)| e == extension) {
            self.defaults
                .push((extension.to_string(), content_type.to_string()));
        }
    }

    pub fn add_override(&mut self, part: &str, content_type: &str) {
        let name = format!("/{}", part.trim_start_matches('/'));
        if !self.overrides.iter().any(|(p, _)| *p == name) {
            self.overrides.push((name, content_type.to_string()));
        }
    }

    /// Content type of `part`, by override and then by extension.
    pub fn content_type_of(&self, part: &str) -> Option<&str> {
        let name = format!("/{}", part.trim_start_matches('/'));
        if let Some((_, ct)) = self
            .overrides
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(&name))
        {
            return Some(ct);
        }
        let ext = name.rsplit_once('.')?.1;
        self.defaults
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, ct)| ct.as_str())
    }
}

#[derive(Default)]
pub struct ContentTypesXform {
    model: Option<ContentTypes>,
}

impl Xform for ContentTypesXform {
    type Model = ContentTypes;

    fn tag(&self) -> &str {
        "Types"
    }

    fn render(&self, xml: &mut XmlStream, model: &ContentTypes) {
        xml.open_xml();
        xml.open_node("Types");
        xml.add_attribute("xmlns", NS_CONTENT_TYPES);
        for (ext, ct) in &model.defaults {
            xml.leaf_node("Default", &[("Extension", ext), ("ContentType", ct)], None);
        }
        for (part, ct) in &model.overrides {
            xml.leaf_node("Override", &[("PartName", part), ("ContentType", ct)], None);
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        let Some(model) = self.model.as_mut() else {
            if node.name == "Types" {
                self.model = Some(ContentTypes::default());
                return Ok(true);
            }
            return Ok(false);
        };
        let ct = node.attr("ContentType").unwrap_or_default().to_string();
        match node.name.as_str() {
            "Default" => {
                if let Some(ext) = node.attr("Extension") {
                    model.defaults.push((ext.to_string(), ct));
                }
            }
            "Override" => {
                if let Some(part) = node.attr("PartName") {
                    model.overrides.push((part.to_string(), ct));
                }
            }
            _ => {}
        }
        Ok(true)
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        Ok(name != "Types")
    }

    fn take_model(&mut self) -> Option<ContentTypes> {
        self.model.take()
    }

    fn reset(&mut self) {
        self.model = None;
    }
}

/// `docProps/app.xml`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppModel {
    pub sheet_names: Vec<String>,
    pub company: Option<String>,
    pub manager: Option<String>,
}

pub struct AppXform {
    inner: Composite<AppModel>,
}

impl Default for AppXform {
    fn default() -> Self {
        let map = ChildMap::new()
            .with(StringXform::text("Company"), |m: &mut AppModel, v| {
                m.company = Some(v)
            })
            .with(StringXform::text("Manager"), |m: &mut AppModel, v| {
                m.manager = Some(v)
            });
        Self {
            inner: Composite::new("Properties", map),
        }
    }
}

impl Xform for AppXform {
    type Model = AppModel;

    fn tag(&self) -> &str {
        "Properties"
    }

    fn render(&self, xml: &mut XmlStream, model: &AppModel) {
        xml.open_xml();
        xml.open_node_with(
            "Properties",
            &[
                (
                    "xmlns",
                    "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties",
                ),
                (
                    "xmlns:vt",
                    "http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes",
                ),
            ],
        );
        xml.leaf_node("Application", &[], Some("Microsoft Excel"));
        xml.leaf_node("DocSecurity", &[], Some("0"));
        xml.leaf_node("ScaleCrop", &[], Some("false"));

        let count = model.sheet_names.len().to_string();
        xml.open_node("HeadingPairs");
        xml.open_node_with("vt:vector", &[("size", "2"), ("baseType", "variant")]);
        xml.open_node("vt:variant");
        xml.leaf_node("vt:lpstr", &[], Some("Worksheets"));
        xml.close_node();
        xml.open_node("vt:variant");
        xml.leaf_node("vt:i4", &[], Some(&count));
        xml.close_node();
        xml.close_node();
        xml.close_node();

        xml.open_node("TitlesOfParts");
        xml.open_node_with("vt:vector", &[("size", &count), ("baseType", "lpstr")]);
        for name in &model.sheet_names {
            xml.leaf_node("vt:lpstr", &[], Some(name));
        }
        xml.close_node();
        xml.close_node();

        if let Some(manager) = &model.manager {
            xml.leaf_node("Manager", &[], Some(manager));
        }
        xml.leaf_node("Company", &[], Some(model.company.as_deref().unwrap_or("")));
        xml.leaf_node("LinksUpToDate", &[], Some("false"));
        xml.leaf_node("SharedDoc", &[], Some("false"));
        xml.leaf_node("HyperlinksChanged", &[], Some("false"));
        xml.leaf_node("AppVersion", &[], Some("16.0300"));
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |_| AppModel::default())
    }

    fn parse_text(&mut self, text: &str) {
        self.inner.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn take_model(&mut self) -> Option<AppModel> {
        let mut model = self.inner.take_model()?;
        // An empty <Company/> is what we write for "no company".
        if model.company.as_deref() == Some("") {
            model.company = None;
        }
        Some(model)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

pub(crate) fn format_w3cdtf(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub(crate) fn parse_w3cdtf(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    let text = text.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// `docProps/core.xml`. Elements are matched by local name, so any prefix
/// binding for the Dublin Core namespaces is accepted.
pub struct CoreXform {
    inner: Composite<DocumentProperties>,
}

impl Default for CoreXform {
    fn default() -> Self {
        let map = ChildMap::new()
            .with(StringXform::text("creator"), |m: &mut DocumentProperties, v| {
                m.creator = Some(v)
            })
            .with(
                StringXform::text("lastModifiedBy"),
                |m: &mut DocumentProperties, v| m.last_modified_by = Some(v),
            )
            .with(StringXform::text("created"), |m: &mut DocumentProperties, v| {
                m.created = parse_w3cdtf(&v)
            })
            .with(StringXform::text("modified"), |m: &mut DocumentProperties, v| {
                m.modified = parse_w3cdtf(&v)
            })
            .with(StringXform::text("title"), |m: &mut DocumentProperties, v| {
                m.title = Some(v)
            })
            .with(StringXform::text("subject"), |m: &mut DocumentProperties, v| {
                m.subject = Some(v)
            })
            .with(StringXform::text("keywords"), |m: &mut DocumentProperties, v| {
                m.keywords = Some(v)
            })
            .with(
                StringXform::text("description"),
                |m: &mut DocumentProperties, v| m.description = Some(v),
            );
        Self {
            inner: Composite::new("coreProperties", map),
        }
    }
}

impl Xform for CoreXform {
    type Model = DocumentProperties;

    fn tag(&self) -> &str {
        "coreProperties"
    }

    fn render(&self, xml: &mut XmlStream, model: &DocumentProperties) {
        xml.open_xml();
        xml.open_node_with(
            "cp:coreProperties",
            &[
                (
                    "xmlns:cp",
                    "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
                ),
                ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
                ("xmlns:dcterms", "http://purl.org/dc/terms/"),
                ("xmlns:dcmitype", "http://purl.org/dc/dcmitype/"),
                ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ],
        );
        let text_fields = [
            ("dc:title", &model.title),
            ("dc:subject", &model.subject),
            ("dc:creator", &model.creator),
            ("cp:keywords", &model.keywords),
            ("dc:description", &model.description),
            ("cp:lastModifiedBy", &model.last_modified_by),
        ];
        for (tag, value) in text_fields {
            if let Some(value) = value {
                xml.leaf_node(tag, &[], Some(value));
            }
        }
        for (tag, value) in [("dcterms:created", &model.created), ("dcterms:modified", &model.modified)]
        {
            if let Some(value) = value {
                xml.leaf_node(
                    tag,
                    &[("xsi:type", "dcterms:W3CDTF")],
                    Some(&format_w3cdtf(value)),
                );
            }
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |_| DocumentProperties::default())
    }

    fn parse_text(&mut self, text: &str) {
        self.inner.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn take_model(&mut self) -> Option<DocumentProperties> {
        self.inner.take_model()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xform::parse_part;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn relationships_roundtrip() {
        let rels = vec![
            Relationship::new("rId1", rel_type::WORKSHEET, "worksheets/sheet1.xml"),
            Relationship::external("rId2", rel_type::HYPERLINK, "https://example.com/?a=1&b=2"),
        ];
        let xml = RelationshipsXform::default().to_xml(&rels);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(doc.root_element().children().filter(|n| n.is_element()).count(), 2);
        let parsed =
            parse_part(&mut RelationshipsXform::default(), xml.as_bytes(), "_rels/.rels").unwrap();
        assert_eq!(parsed, rels);
        assert!(parsed[1].is_external());
        assert_eq!(next_rel_id(&parsed), "rId3");
    }

    #[test]
    fn content_types_lookup() {
        let mut ct = ContentTypes::standard();
        ct.add_override("xl/workbook.xml", content_type::WORKBOOK);
        ct.add_override("/xl/workbook.xml", content_type::WORKBOOK);
        assert_eq!(ct.overrides.len(), 1);
        let xml = ContentTypesXform::default().to_xml(&ct);
        let parsed =
            parse_part(&mut ContentTypesXform::default(), xml.as_bytes(), "[Content_Types].xml")
                .unwrap();
        assert_eq!(parsed, ct);
        assert_eq!(parsed.content_type_of("xl/workbook.xml"), Some(content_type::WORKBOOK));
        assert_eq!(
            parsed.content_type_of("xl/_rels/workbook.xml.rels"),
            Some(content_type::RELATIONSHIPS)
        );
    }

    #[test]
    fn core_properties_roundtrip() {
        let created = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .unwrap();
        let props = DocumentProperties {
            creator: Some("Ada".into()),
            title: Some("Q1 & Q2".into()),
            created: Some(created),
            ..DocumentProperties::default()
        };
        let xml = CoreXform::default().to_xml(&props);
        assert!(xml.contains("<dcterms:created xsi:type=\"dcterms:W3CDTF\">2024-03-01T12:30:00Z"));
        let parsed = parse_part(&mut CoreXform::default(), xml.as_bytes(), "docProps/core.xml")
            .unwrap();
        assert_eq!(parsed, props);
    }

    #[test]
    fn app_properties_keep_company_and_manager() {
        let app = AppModel {
            sheet_names: vec!["Sheet1".into()],
            company: Some("Acme".into()),
            manager: None,
        };
        let xml = AppXform::default().to_xml(&app);
        let parsed =
            parse_part(&mut AppXform::default(), xml.as_bytes(), "docProps/app.xml").unwrap();
        assert_eq!(parsed.company.as_deref(), Some("Acme"));
        assert_eq!(parsed.manager, None);
    }
}
