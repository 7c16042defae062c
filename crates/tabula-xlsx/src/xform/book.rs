//! `xl/workbook.xml`: sheet list, views, defined names and the date system.

use tabula_model::{DefinedNameModel, SheetState};

use crate::sax::SaxNode;
use crate::xml_stream::XmlStream;
use crate::XlsxError;

use super::package::NS_DOC_RELATIONSHIPS;
use super::style::{AttrLeaf, NS_MAIN};
use super::{ChildMap, Composite, ListXform, Xform};

/// One `<sheet>` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    pub state: SheetState,
    pub rel_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkbookModel {
    pub date1904: bool,
    pub active_tab: u32,
    pub sheets: Vec<SheetEntry>,
    pub defined_names: Vec<DefinedNameModel>,
}

fn workbook_pr_xform() -> AttrLeaf<bool> {
    AttrLeaf::new(
        "workbookPr",
        |node| Ok(node.attr_bool("date1904").unwrap_or(false)),
        |xml, date1904| {
            if *date1904 {
                xml.add_attribute("date1904", "1");
            }
            xml.add_attribute("defaultThemeVersion", "164011");
        },
    )
}

fn workbook_view_xform() -> AttrLeaf<u32> {
    AttrLeaf::new(
        "workbookView",
        |node| Ok(node.attr_u32("activeTab").unwrap_or(0)),
        |xml, active| {
            xml.add_attribute("xWindow", "0");
            xml.add_attribute("yWindow", "0");
            xml.add_attribute("windowWidth", "12000");
            xml.add_attribute("windowHeight", "24000");
            if *active > 0 {
                xml.add_attribute_display("activeTab", active);
            }
        },
    )
}

fn sheet_entry_xform() -> AttrLeaf<SheetEntry> {
    AttrLeaf::new(
        "sheet",
        |node| {
            let name = node
                .attr("name")
                .ok_or_else(|| XlsxError::malformed("", "sheet without a name"))?;
            let rel_id = node
                .rel_id()
                .ok_or_else(|| XlsxError::malformed("", format!("sheet {name} has no r:id")))?;
            Ok(SheetEntry {
                name: name.to_string(),
                sheet_id: node.attr_u32("sheetId").unwrap_or(0),
                state: node.attr("state").map(SheetState::parse).unwrap_or_default(),
                rel_id: rel_id.to_string(),
            })
        },
        |xml, sheet| {
            xml.add_attribute("name", &sheet.name);
            xml.add_attribute_display("sheetId", sheet.sheet_id);
            if sheet.state != SheetState::Visible {
                xml.add_attribute("state", sheet.state.as_str());
            }
            xml.add_attribute("r:id", &sheet.rel_id);
        },
    )
}

/// `<definedName>`: attributes plus the definition as text.
#[derive(Default)]
pub struct DefinedNameXform {
    model: Option<DefinedNameModel>,
    text: String,
}

impl Xform for DefinedNameXform {
    type Model = DefinedNameModel;

    fn tag(&self) -> &str {
        "definedName"
    }

    fn render(&self, xml: &mut XmlStream, model: &DefinedNameModel) {
        xml.open_node("definedName");
        xml.add_attribute("name", &model.name);
        if let Some(id) = model.local_sheet_id {
            xml.add_attribute_display("localSheetId", id);
        }
        if model.hidden {
            xml.add_attribute("hidden", "1");
        }
        xml.write_text(&model.definition());
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if node.name != "definedName" {
            return Ok(false);
        }
        let name = node.attr("name").unwrap_or_default();
        let mut model = DefinedNameModel::from_definition(name, "");
        model.local_sheet_id = node.attr_u32("localSheetId");
        model.hidden = node.attr_bool("hidden").unwrap_or(false);
        self.model = Some(model);
        self.text.clear();
        Ok(true)
    }

    fn parse_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn parse_close(&mut self, _name: &str) -> Result<bool, XlsxError> {
        Ok(false)
    }

    fn take_model(&mut self) -> Option<DefinedNameModel> {
        let parsed = self.model.take()?;
        let text = std::mem::take(&mut self.text);
        let mut model = DefinedNameModel::from_definition(parsed.name, text.trim());
        model.local_sheet_id = parsed.local_sheet_id;
        model.hidden = parsed.hidden;
        Some(model)
    }

    fn reset(&mut self) {
        self.model = None;
        self.text.clear();
    }
}

pub struct WorkbookXform {
    inner: Composite<WorkbookModel>,
}

impl Default for WorkbookXform {
    fn default() -> Self {
        let map = ChildMap::new()
            .with(workbook_pr_xform(), |m: &mut WorkbookModel, v| m.date1904 = v)
            .with(
                ListXform::new("bookViews", workbook_view_xform()),
                |m: &mut WorkbookModel, v| m.active_tab = v.first().copied().unwrap_or(0),
            )
            .with(
                ListXform::new("sheets", sheet_entry_xform()),
                |m: &mut WorkbookModel, v| m.sheets = v,
            )
            .with(
                ListXform::new("definedNames", DefinedNameXform::default()),
                |m: &mut WorkbookModel, v| m.defined_names = v,
            );
        Self {
            inner: Composite::new("workbook", map),
        }
    }
}

impl Xform for WorkbookXform {
    type Model = WorkbookModel;

    fn tag(&self) -> &str {
        "workbook"
    }

    fn render(&self, xml: &mut XmlStream, model: &WorkbookModel) {
        xml.open_xml();
        xml.open_node("workbook");
        xml.add_attribute("xmlns", NS_MAIN);
        xml.add_attribute("xmlns:r", NS_DOC_RELATIONSHIPS);
        xml.leaf_node(
            "fileVersion",
            &[
                ("appName", "xl"),
                ("lastEdited", "7"),
                ("lowestEdited", "7"),
                ("rupBuild", "27328"),
            ],
            None,
        );
        workbook_pr_xform().render(xml, &model.date1904);
        ListXform::new("bookViews", workbook_view_xform()).render(xml, &vec![model.active_tab]);
        ListXform::new("sheets", sheet_entry_xform())
            .render_empty()
            .render(xml, &model.sheets);
        ListXform::new("definedNames", DefinedNameXform::default())
            .render(xml, &model.defined_names);
        xml.leaf_node("calcPr", &[("calcId", "191029")], None);
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |_| WorkbookModel::default())
    }

    fn parse_text(&mut self, text: &str) {
        self.inner.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn take_model(&mut self) -> Option<WorkbookModel> {
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
    use pretty_assertions::assert_eq;

    fn sample() -> WorkbookModel {
        let mut local = DefinedNameModel::from_definition("_xlnm.Print_Area", "'My Sheet'!$A$1:$B$2");
        local.local_sheet_id = Some(1);
        WorkbookModel {
            date1904: true,
            active_tab: 1,
            sheets: vec![
                SheetEntry {
                    name: "Data".into(),
                    sheet_id: 1,
                    state: SheetState::Visible,
                    rel_id: "rId1".into(),
                },
                SheetEntry {
                    name: "My Sheet".into(),
                    sheet_id: 2,
                    state: SheetState::Hidden,
                    rel_id: "rId2".into(),
                },
            ],
            defined_names: vec![
                DefinedNameModel::from_definition("Greeting", "Data!$A$1"),
                DefinedNameModel::from_definition("Rate", "0.05"),
                local,
            ],
        }
    }

    #[test]
    fn workbook_roundtrip() {
        let xml = WorkbookXform::default().to_xml(&sample());
        assert!(xml.contains(r#"<workbookPr date1904="1""#));
        assert!(xml.contains(r#"<sheet name="My Sheet" sheetId="2" state="hidden" r:id="rId2"/>"#));
        let parsed = parse_part(&mut WorkbookXform::default(), xml.as_bytes(), "xl/workbook.xml")
            .unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn constants_stay_verbatim() {
        let rate = DefinedNameModel::from_definition("Rate", "0.05");
        assert_eq!(rate.formula.as_deref(), Some("0.05"));
        let xml = DefinedNameXform::default().to_xml(&rate);
        assert_eq!(xml, r#"<definedName name="Rate">0.05</definedName>"#);
    }

    #[test]
    fn sheet_without_relationship_is_malformed() {
        let xml = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheets><sheet name="A" sheetId="1"/></sheets></workbook>"#;
        let err = parse_part(&mut WorkbookXform::default(), xml.as_bytes(), "xl/workbook.xml")
            .unwrap_err();
        assert!(matches!(err, XlsxError::Malformed { ref part, .. } if part == "xl/workbook.xml"));
    }
}
