//! Default `xl/theme/theme1.xml`, written when the workbook carries no theme
//! of its own. Loaded themes are kept verbatim.

use crate::xml_stream::XmlStream;

const NS_DRAWING: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

/// Office palette colors as `RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemePalette {
    pub dk1: u32,
    pub lt1: u32,
    pub dk2: u32,
    pub lt2: u32,
    pub accents: [u32; 6],
    pub hlink: u32,
    pub followed_hlink: u32,
}

impl Default for ThemePalette {
    fn default() -> Self {
        Self {
            dk1: 0x000000,
            lt1: 0xFFFFFF,
            dk2: 0x1F497D,
            lt2: 0xEEECE1,
            accents: [0x4F81BD, 0xC0504D, 0x9BBB59, 0x8064A2, 0x4BACC6, 0xF79646],
            hlink: 0x0000FF,
            followed_hlink: 0x800080,
        }
    }
}

fn srgb(xml: &mut XmlStream, tag: &str, rgb: u32) {
    xml.open_node(tag);
    xml.leaf_node("a:srgbClr", &[("val", format!("{rgb:06X}").as_str())], None);
    xml.close_node();
}

fn font_collection(xml: &mut XmlStream, tag: &str, latin: &str) {
    xml.open_node(tag);
    xml.leaf_node("a:latin", &[("typeface", latin)], None);
    xml.leaf_node("a:ea", &[("typeface", "")], None);
    xml.leaf_node("a:cs", &[("typeface", "")], None);
    xml.close_node();
}

fn scheme_fill(xml: &mut XmlStream) {
    xml.open_node("a:solidFill");
    xml.leaf_node("a:schemeClr", &[("val", "phClr")], None);
    xml.close_node();
}

/// Render a complete theme part around `palette`.
pub fn render_theme(palette: &ThemePalette) -> String {
    let mut xml = XmlStream::new();
    xml.open_xml();
    xml.open_node_with("a:theme", &[("xmlns:a", NS_DRAWING), ("name", "Office Theme")]);
    xml.open_node("a:themeElements");

    xml.open_node_with("a:clrScheme", &[("name", "Office")]);
    xml.open_node("a:dk1");
    xml.leaf_node(
        "a:sysClr",
        &[
            ("val", "windowText"),
            ("lastClr", format!("{:06X}", palette.dk1).as_str()),
        ],
        None,
    );
    xml.close_node();
    xml.open_node("a:lt1");
    xml.leaf_node(
        "a:sysClr",
        &[
            ("val", "window"),
            ("lastClr", format!("{:06X}", palette.lt1).as_str()),
        ],
        None,
    );
    xml.close_node();
    srgb(&mut xml, "a:dk2", palette.dk2);
    srgb(&mut xml, "a:lt2", palette.lt2);
    for (i, accent) in palette.accents.iter().enumerate() {
        srgb(&mut xml, &format!("a:accent{}", i + 1), *accent);
    }
    srgb(&mut xml, "a:hlink", palette.hlink);
    srgb(&mut xml, "a:folHlink", palette.followed_hlink);
    xml.close_node();

    xml.open_node_with("a:fontScheme", &[("name", "Office")]);
    font_collection(&mut xml, "a:majorFont", "Cambria");
    font_collection(&mut xml, "a:minorFont", "Calibri");
    xml.close_node();

    xml.open_node_with("a:fmtScheme", &[("name", "Office")]);
    xml.open_node("a:fillStyleLst");
    for _ in 0..3 {
        scheme_fill(&mut xml);
    }
    xml.close_node();
    xml.open_node("a:lnStyleLst");
    for width in ["9525", "25400", "38100"] {
        xml.open_node_with("a:ln", &[("w", width)]);
        scheme_fill(&mut xml);
        xml.close_node();
    }
    xml.close_node();
    xml.open_node("a:effectStyleLst");
    for _ in 0..3 {
        xml.open_node("a:effectStyle");
        xml.leaf_node("a:effectLst", &[], None);
        xml.close_node();
    }
    xml.close_node();
    xml.open_node("a:bgFillStyleLst");
    for _ in 0..3 {
        scheme_fill(&mut xml);
    }
    xml.close_node();
    xml.close_node();

    xml.close_node();
    xml.leaf_node("a:objectDefaults", &[], None);
    xml.leaf_node("a:extraClrSchemeLst", &[], None);
    xml.close_node();
    xml.into_string()
}

pub fn default_theme() -> String {
    render_theme(&ThemePalette::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_theme_is_well_formed_with_full_color_scheme() {
        let xml = default_theme();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let scheme = doc
            .descendants()
            .find(|n| n.has_tag_name((NS_DRAWING, "clrScheme")))
            .unwrap();
        assert_eq!(scheme.children().filter(|n| n.is_element()).count(), 12);
        let accent1 = scheme
            .children()
            .find(|n| n.has_tag_name((NS_DRAWING, "accent1")))
            .and_then(|n| n.first_element_child())
            .and_then(|n| n.attribute("val"));
        assert_eq!(accent1, Some("4F81BD"));
    }
}
