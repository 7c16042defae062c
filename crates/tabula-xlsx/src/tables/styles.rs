//! Cell format interning.
//!
//! Writing: model [`Style`]s are split into number format, font, fill and
//! border records, each deduplicated by its rendered markup, and the
//! resulting index tuple is interned as a `cellXfs` entry.
//!
//! Reading: `cellXfs` indices are mapped back to model styles and interned
//! into the workbook [`StyleTable`].

use std::collections::HashMap;

use tabula_model::{Border, Fill, Font, PatternType, Style, StyleTable, ValueKind};

use crate::xform::style::{
    BorderXform, DxfModel, DxfXform, FillXform, FontXform, NumFmt, StylesModel, StylesXform,
    XfModel, XfXform,
};
use crate::xform::Xform;
use crate::XlsxError;

/// First id available to custom number formats.
pub const FIRST_CUSTOM_NUM_FMT_ID: u32 = 164;

/// Number format used for date cells that carry no explicit format.
pub const DEFAULT_DATE_NUM_FMT_ID: u32 = 14;

const BUILTIN_NUM_FMTS: &[(u32, &str)] = &[
    (0, "General"),
    (1, "0"),
    (2, "0.00"),
    (3, "#,##0"),
    (4, "#,##0.00"),
    (9, "0%"),
    (10, "0.00%"),
    (11, "0.00E+00"),
    (12, "# ?/?"),
    (13, "# ??/??"),
    (14, "mm-dd-yy"),
    (15, "d-mmm-yy"),
    (16, "d-mmm"),
    (17, "mmm-yy"),
    (18, "h:mm AM/PM"),
    (19, "h:mm:ss AM/PM"),
    (20, "h:mm"),
    (21, "h:mm:ss"),
    (22, "m/d/yy h:mm"),
    (37, "#,##0 ;(#,##0)"),
    (38, "#,##0 ;[Red](#,##0)"),
    (39, "#,##0.00;(#,##0.00)"),
    (40, "#,##0.00;[Red](#,##0.00)"),
    (45, "mm:ss"),
    (46, "[h]:mm:ss"),
    (47, "mmss.0"),
    (48, "##0.0E+0"),
    (49, "@"),
];

pub fn builtin_num_fmt_code(id: u32) -> Option<&'static str> {
    BUILTIN_NUM_FMTS
        .iter()
        .find(|(i, _)| *i == id)
        .map(|(_, code)| *code)
}

pub fn builtin_num_fmt_id(code: &str) -> Option<u32> {
    BUILTIN_NUM_FMTS
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(id, _)| *id)
}

fn is_builtin_date_id(id: u32) -> bool {
    matches!(id, 14..=22 | 45..=47)
}

/// True when a format code renders a date or time: it contains a date/time
/// token outside quoted literals, escapes and bracketed colors/conditions.
pub fn is_date_format(code: &str) -> bool {
    // Only the first section decides.
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ';' => break,
            '"' => {
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut inner = String::new();
                for b in chars.by_ref() {
                    if b == ']' {
                        break;
                    }
                    inner.push(b);
                }
                // `[h]`, `[mm]`, `[ss]` are elapsed time.
                let lower = inner.to_ascii_lowercase();
                if !lower.is_empty() && lower.chars().all(|ch| matches!(ch, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            'y' | 'Y' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' | 'm' | 'M' => {
                // `General` and scientific `E+` contain none of these, but guard
                // against the word itself.
                return !code.eq_ignore_ascii_case("general");
            }
            _ => {}
        }
    }
    false
}

/// Append-only table deduplicated by canonical markup.
#[derive(Debug)]
struct Interned<T> {
    items: Vec<T>,
    index: HashMap<String, u32>,
}

impl<T> Default for Interned<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Interned<T> {
    fn add(&mut self, key: String, item: T) -> u32 {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = self.items.len() as u32;
        self.items.push(item);
        self.index.insert(key, id);
        id
    }

    /// Append keeping file order; duplicates keep their first index.
    fn push(&mut self, key: String, item: T) {
        let id = self.items.len() as u32;
        self.items.push(item);
        self.index.entry(key).or_insert(id);
    }

    fn get(&self, id: u32) -> Option<&T> {
        self.items.get(id as usize)
    }
}

/// Renderers whose output doubles as the dedup key.
struct Keys {
    font: FontXform,
    fill: FillXform,
    border: BorderXform,
    xf: XfXform,
    dxf: DxfXform,
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            font: FontXform::font(),
            fill: FillXform::default(),
            border: BorderXform::default(),
            xf: XfXform::default(),
            dxf: DxfXform::default(),
        }
    }
}

pub struct StyleManager {
    enabled: bool,
    keys: Keys,
    num_fmts: Vec<NumFmt>,
    num_fmt_ids: HashMap<String, u32>,
    next_num_fmt_id: u32,
    fonts: Interned<Font>,
    fills: Interned<Fill>,
    borders: Interned<Border>,
    xfs: Interned<XfModel>,
    dxfs: Interned<DxfModel>,
    /// `(model style id, value kind)` to xf index.
    ref_cache: HashMap<(u32, ValueKind), u32>,
    /// xf index to model style id.
    model_cache: HashMap<u32, u32>,
}

impl Default for StyleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleManager {
    /// Manager seeded with the records every styles part starts with.
    pub fn new() -> Self {
        let mut manager = Self::empty();
        manager.seed_defaults();
        manager
    }

    /// Manager that maps every style to the default format.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    fn empty() -> Self {
        Self {
            enabled: true,
            keys: Keys::default(),
            num_fmts: Vec::new(),
            num_fmt_ids: HashMap::new(),
            next_num_fmt_id: FIRST_CUSTOM_NUM_FMT_ID,
            fonts: Interned::default(),
            fills: Interned::default(),
            borders: Interned::default(),
            xfs: Interned::default(),
            dxfs: Interned::default(),
            ref_cache: HashMap::new(),
            model_cache: HashMap::new(),
        }
    }

    fn seed_defaults(&mut self) {
        self.add_font(&Font::default_font());
        self.add_fill(&Fill::default());
        self.add_fill(&Fill::Pattern {
            pattern: PatternType::Gray125,
            fg_color: None,
            bg_color: None,
        });
        self.add_border(&Border::default());
        self.add_xf(XfModel::default());
    }

    /// Manager over a parsed `styles.xml`, keeping every index as found.
    pub fn from_model(model: StylesModel) -> Self {
        let mut manager = Self::empty();
        for num_fmt in model.num_fmts {
            manager.num_fmt_ids.entry(num_fmt.code.clone()).or_insert(num_fmt.id);
            manager.next_num_fmt_id = manager.next_num_fmt_id.max(num_fmt.id.saturating_add(1));
            manager.num_fmts.push(num_fmt);
        }
        for font in model.fonts {
            let key = manager.keys.font.to_xml(&font);
            manager.fonts.push(key, font);
        }
        for fill in model.fills {
            let key = manager.keys.fill.to_xml(&fill);
            manager.fills.push(key, fill);
        }
        for border in model.borders {
            let key = manager.keys.border.to_xml(&border);
            manager.borders.push(key, border);
        }
        for xf in model.cell_xfs {
            let key = manager.keys.xf.to_xml(&xf);
            manager.xfs.push(key, xf);
        }
        for dxf in model.dxfs {
            let key = manager.keys.dxf.to_xml(&dxf);
            manager.dxfs.push(key, dxf);
        }
        if manager.xfs.items.is_empty() {
            manager.add_xf(XfModel::default());
        }
        manager
    }

    /// Stand-in used when a package has no styles part.
    pub fn fallback() -> Self {
        Self::new()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn add_font(&mut self, font: &Font) -> u32 {
        let key = self.keys.font.to_xml(font);
        self.fonts.add(key, font.clone())
    }

    fn add_fill(&mut self, fill: &Fill) -> u32 {
        let key = self.keys.fill.to_xml(fill);
        self.fills.add(key, fill.clone())
    }

    fn add_border(&mut self, border: &Border) -> u32 {
        let key = self.keys.border.to_xml(border);
        self.borders.add(key, border.clone())
    }

    fn add_xf(&mut self, xf: XfModel) -> u32 {
        let key = self.keys.xf.to_xml(&xf);
        self.xfs.add(key, xf)
    }

    /// Id for a number format code: built-in ids below 164, custom codes
    /// allocated from 164 upwards.
    pub fn add_num_fmt(&mut self, code: &str) -> u32 {
        if let Some(id) = builtin_num_fmt_id(code) {
            return id;
        }
        if let Some(id) = self.num_fmt_ids.get(code) {
            return *id;
        }
        let id = self.next_num_fmt_id;
        self.next_num_fmt_id += 1;
        self.num_fmt_ids.insert(code.to_string(), id);
        self.num_fmts.push(NumFmt {
            id,
            code: code.to_string(),
        });
        id
    }

    pub fn num_fmt_code(&self, id: u32) -> Option<&str> {
        self.num_fmts
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.code.as_str())
            .or_else(|| builtin_num_fmt_code(id))
    }

    /// Intern `style` and return its `cellXfs` index. A value without a
    /// number format gets the default for its kind (dates use id 14).
    pub fn add_style_model(&mut self, style: &Style, kind: ValueKind) -> u32 {
        if !self.enabled {
            return 0;
        }
        let num_fmt_id = match &style.num_fmt {
            Some(code) => self.add_num_fmt(code),
            None if kind == ValueKind::Date => DEFAULT_DATE_NUM_FMT_ID,
            None => 0,
        };
        let font_id = style.font.as_ref().map_or(0, |f| self.add_font(f));
        let fill_id = style.fill.as_ref().map_or(0, |f| self.add_fill(f));
        let border_id = style.border.as_ref().map_or(0, |b| self.add_border(b));
        self.add_xf(XfModel {
            num_fmt_id,
            font_id,
            fill_id,
            border_id,
            alignment: style.alignment.clone(),
            protection: style.protection.clone(),
        })
    }

    /// [`Self::add_style_model`] memoized by the style's id in the model
    /// table, so a style shared by many cells is interned once per kind.
    pub fn add_style_ref(&mut self, style_id: u32, style: &Style, kind: ValueKind) -> u32 {
        if let Some(xf) = self.ref_cache.get(&(style_id, kind)) {
            return *xf;
        }
        let xf = self.add_style_model(style, kind);
        self.ref_cache.insert((style_id, kind), xf);
        xf
    }

    /// Model style for a `cellXfs` index. Component index 0 means "file
    /// default" and maps to `None`.
    pub fn get_style_model(&self, xf_id: u32) -> Result<Style, XlsxError> {
        let xf = self.xfs.get(xf_id).ok_or(XlsxError::UnknownStyleId(xf_id))?;
        let num_fmt = match xf.num_fmt_id {
            0 => None,
            id => {
                let code = self.num_fmt_code(id);
                if code.is_none() {
                    log::warn!("cell format {xf_id} refers to unknown number format {id}");
                }
                code.map(str::to_string)
            }
        };
        let component = |id: u32| (id != 0).then_some(id);
        Ok(Style {
            num_fmt,
            font: component(xf.font_id).and_then(|id| self.fonts.get(id).cloned()),
            fill: component(xf.fill_id).and_then(|id| self.fills.get(id).cloned()),
            border: component(xf.border_id).and_then(|id| self.borders.get(id).cloned()),
            alignment: xf.alignment.clone(),
            protection: xf.protection.clone(),
        })
    }

    /// Workbook style id for a `cellXfs` index, interning into `table`.
    pub fn model_style_id(&mut self, xf_id: u32, table: &mut StyleTable) -> Result<u32, XlsxError> {
        if let Some(id) = self.model_cache.get(&xf_id) {
            return Ok(*id);
        }
        let style = self.get_style_model(xf_id)?;
        let id = if style.is_default() {
            0
        } else {
            table.intern(style)
        };
        self.model_cache.insert(xf_id, id);
        Ok(id)
    }

    /// True when numbers in cells with this format are dates.
    pub fn is_date_xf(&self, xf_id: u32) -> bool {
        let Some(xf) = self.xfs.get(xf_id) else {
            return false;
        };
        if is_builtin_date_id(xf.num_fmt_id) {
            return true;
        }
        xf.num_fmt_id >= FIRST_CUSTOM_NUM_FMT_ID
            && self.num_fmt_code(xf.num_fmt_id).is_some_and(is_date_format)
    }

    /// Intern a differential style. Only its number format touches the main
    /// tables.
    pub fn add_dxf_style(&mut self, style: &Style) -> u32 {
        let num_fmt = style.num_fmt.as_ref().map(|code| NumFmt {
            id: self.add_num_fmt(code),
            code: code.clone(),
        });
        let dxf = DxfModel {
            font: style.font.clone(),
            num_fmt,
            fill: style.fill.clone(),
            alignment: style.alignment.clone(),
            protection: style.protection.clone(),
            border: style.border.clone(),
        };
        let key = self.keys.dxf.to_xml(&dxf);
        self.dxfs.add(key, dxf)
    }

    pub fn get_dxf_style(&self, id: u32) -> Option<Style> {
        let dxf = self.dxfs.get(id)?;
        Some(Style {
            num_fmt: dxf.num_fmt.as_ref().map(|f| f.code.clone()),
            font: dxf.font.clone(),
            fill: dxf.fill.clone(),
            border: dxf.border.clone(),
            alignment: dxf.alignment.clone(),
            protection: dxf.protection.clone(),
        })
    }

    pub fn xf_count(&self) -> usize {
        self.xfs.items.len()
    }

    pub fn model(&self) -> StylesModel {
        if !self.enabled {
            return StyleManager::new().model_inner();
        }
        self.model_inner()
    }

    fn model_inner(&self) -> StylesModel {
        let mut num_fmts = self.num_fmts.clone();
        num_fmts.sort_by_key(|f| f.id);
        StylesModel {
            num_fmts,
            fonts: self.fonts.items.clone(),
            fills: self.fills.items.clone(),
            borders: self.borders.items.clone(),
            cell_xfs: self.xfs.items.clone(),
            dxfs: self.dxfs.items.clone(),
        }
    }

    /// `xl/styles.xml`.
    pub fn to_xml(&self) -> String {
        StylesXform::default().to_xml(&self.model())
    }
}
