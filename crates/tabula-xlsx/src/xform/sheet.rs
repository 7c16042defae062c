//! Worksheet vocabulary: cells, rows, columns, merges, hyperlinks and the
//! `worksheet` root.

use chrono::NaiveDateTime;
use ordered_float::OrderedFloat;
use tabula_model::{
    Cell, CellRef, CellValue, ColumnDef, Comment, ErrorValue, Formula, FormulaResult, Hyperlink,
    PageMargins, Range, Row, SheetState, SheetView, Style, ValueKind, Worksheet, MAX_COLS,
    MAX_ROWS,
};

use crate::sax::SaxNode;
use crate::xml_stream::{format_number, XmlStream};
use crate::XlsxError;

use super::comments::CommentModel;
use super::package::{rel_type, Relationship, NS_DOC_RELATIONSHIPS};
use super::simple::StringXform;
use super::strings::{SharedString, SharedStringXform};
use super::style::{AttrLeaf, NS_MAIN};
use super::{ChildMap, Composite, ListXform, PrepareContext, ReconcileContext, Xform};

/// Value of the `t` attribute of a cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CellType {
    #[default]
    Number,
    SharedString,
    InlineString,
    FormulaString,
    Boolean,
    Error,
    Date,
}

impl CellType {
    pub fn parse(s: &str) -> Self {
        match s {
            "s" => CellType::SharedString,
            "inlineStr" => CellType::InlineString,
            "str" => CellType::FormulaString,
            "b" => CellType::Boolean,
            "e" => CellType::Error,
            "d" => CellType::Date,
            _ => CellType::Number,
        }
    }

    /// Attribute value, `None` for numbers (the default).
    pub fn as_attr(self) -> Option<&'static str> {
        match self {
            CellType::Number => None,
            CellType::SharedString => Some("s"),
            CellType::InlineString => Some("inlineStr"),
            CellType::FormulaString => Some("str"),
            CellType::Boolean => Some("b"),
            CellType::Error => Some("e"),
            CellType::Date => Some("d"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormulaKind {
    #[default]
    Normal,
    Shared,
    Array,
}

/// The `<f>` element of a cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormulaModel {
    pub text: String,
    pub kind: FormulaKind,
    /// `si`: shared formula group.
    pub shared_index: Option<u32>,
    /// `ref`: cells covered by a shared or array formula master.
    pub range: Option<Range>,
}

/// One cell, carrying both the model value and its file-side encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct CellModel {
    pub address: CellRef,
    pub value: CellValue,
    /// Workbook style id.
    pub style_id: u32,
    pub comment: Option<Comment>,
    /// `s`: index into `cellXfs`.
    pub xf_id: u32,
    pub cell_type: CellType,
    /// Text of `<v>`.
    pub raw_value: Option<String>,
    pub formula: Option<FormulaModel>,
    /// `<is>` of an inline string cell.
    pub inline: Option<SharedString>,
}

impl Default for CellModel {
    fn default() -> Self {
        Self {
            address: CellRef::new(1, 1),
            value: CellValue::Empty,
            style_id: 0,
            comment: None,
            xf_id: 0,
            cell_type: CellType::Number,
            raw_value: None,
            formula: None,
            inline: None,
        }
    }
}

impl CellModel {
    pub fn from_cell(address: CellRef, cell: &Cell) -> Self {
        Self {
            address,
            value: cell.value.clone(),
            style_id: cell.style_id,
            comment: cell.comment.clone(),
            ..Self::default()
        }
    }

    pub fn into_cell(self) -> Cell {
        Cell {
            value: self.value,
            style_id: self.style_id,
            comment: self.comment,
        }
    }
}

fn parse_ref(text: &str) -> Result<Range, XlsxError> {
    Range::from_a1(text).map_err(|_| XlsxError::InvalidAddress(text.to_string()))
}

fn serialize_date(ctx: &PrepareContext<'_>, value: NaiveDateTime) -> String {
    format_number(ctx.date_system.to_serial(value))
}

fn serialize_number(n: f64) -> Option<String> {
    n.is_finite().then(|| n.to_string())
}

fn parse_iso_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CellChild {
    None,
    Value,
    Formula,
    Inline,
}

/// `<c>`.
pub struct CellXform {
    model: Option<CellModel>,
    default_address: CellRef,
    child: CellChild,
    inline: SharedStringXform,
    skip_depth: usize,
}

impl Default for CellXform {
    fn default() -> Self {
        Self {
            model: None,
            default_address: CellRef::new(1, 1),
            child: CellChild::None,
            inline: SharedStringXform::new("is"),
            skip_depth: 0,
        }
    }
}

impl CellXform {
    /// Address used when the next cell has no `r` attribute.
    pub fn set_default_address(&mut self, address: CellRef) {
        self.default_address = address;
    }

    fn prepare_string(
        model: &mut CellModel,
        ctx: &mut PrepareContext<'_>,
        value: SharedString,
    ) {
        match ctx.shared_strings.as_deref_mut() {
            Some(table) => {
                let id = match &value {
                    SharedString::Text(text) => table.add(text),
                    SharedString::Rich(rich) => table.add_rich_text(rich),
                };
                model.cell_type = CellType::SharedString;
                model.raw_value = Some(id.to_string());
            }
            None => {
                model.cell_type = CellType::InlineString;
                model.inline = Some(value);
            }
        }
    }

    fn prepare_result(model: &mut CellModel, ctx: &PrepareContext<'_>, result: &FormulaResult) {
        let (cell_type, raw) = match result {
            FormulaResult::Number(n) => match serialize_number(*n) {
                Some(raw) => (CellType::Number, raw),
                None => (CellType::Error, ErrorValue::Num.as_str().to_string()),
            },
            FormulaResult::String(s) => (CellType::FormulaString, s.clone()),
            FormulaResult::Boolean(b) => (CellType::Boolean, if *b { "1" } else { "0" }.into()),
            FormulaResult::Error(e) => (CellType::Error, e.as_str().to_string()),
            FormulaResult::Date(d) => (CellType::Number, serialize_date(ctx, *d)),
        };
        model.cell_type = cell_type;
        model.raw_value = Some(raw);
    }
}

impl Xform for CellXform {
    type Model = CellModel;

    fn tag(&self) -> &str {
        "c"
    }

    fn prepare(
        &mut self,
        model: &mut CellModel,
        ctx: &mut PrepareContext<'_>,
    ) -> Result<(), XlsxError> {
        let style = match model.style_id {
            0 => None,
            id => Some(
                ctx.model_styles
                    .get(id)
                    .ok_or(XlsxError::UnknownStyleId(id))?,
            ),
        };
        let default_style = Style::default();
        model.xf_id = ctx.styles.add_style_ref(
            model.style_id,
            style.unwrap_or(&default_style),
            model.value.kind(),
        );

        model.cell_type = CellType::Number;
        model.raw_value = None;
        model.formula = None;
        model.inline = None;
        match model.value.clone() {
            CellValue::Empty | CellValue::Merge(_) => {}
            CellValue::Number(n) => match serialize_number(n) {
                Some(raw) => model.raw_value = Some(raw),
                None => {
                    model.cell_type = CellType::Error;
                    model.raw_value = Some(ErrorValue::Num.as_str().to_string());
                }
            },
            CellValue::String(s) => Self::prepare_string(model, ctx, SharedString::Text(s)),
            CellValue::RichText(rich) => {
                Self::prepare_string(model, ctx, SharedString::from_rich_text(&rich))
            }
            CellValue::Date(d) => model.raw_value = Some(serialize_date(ctx, d)),
            CellValue::Boolean(b) => {
                model.cell_type = CellType::Boolean;
                model.raw_value = Some(if b { "1" } else { "0" }.to_string());
            }
            CellValue::Error(e) => {
                model.cell_type = CellType::Error;
                model.raw_value = Some(e.as_str().to_string());
            }
            CellValue::Hyperlink(link) => {
                ctx.hyperlinks.push(HyperlinkModel::for_cell(model.address, &link));
                Self::prepare_string(model, ctx, SharedString::Text(link.text));
            }
            CellValue::Formula(formula) => {
                let mut f = FormulaModel {
                    text: formula.formula.clone(),
                    ..FormulaModel::default()
                };
                if let Some(range) = formula.shared_range {
                    let index = ctx.shared_formulas.len() as u32;
                    ctx.shared_formulas.insert(model.address, index);
                    f.kind = FormulaKind::Shared;
                    f.shared_index = Some(index);
                    f.range = Some(range);
                }
                if let Some(result) = &formula.result {
                    Self::prepare_result(model, ctx, result);
                }
                model.formula = Some(f);
            }
            CellValue::SharedFormula { master, result } => {
                match ctx.shared_formulas.get(&master) {
                    Some(index) => {
                        model.formula = Some(FormulaModel {
                            kind: FormulaKind::Shared,
                            shared_index: Some(*index),
                            ..FormulaModel::default()
                        });
                    }
                    None => log::warn!(
                        "cell {} refers to shared formula master {} which is not a shared formula",
                        model.address,
                        master
                    ),
                }
                if let Some(result) = &result {
                    Self::prepare_result(model, ctx, result);
                }
            }
        }
        Ok(())
    }

    fn render(&self, xml: &mut XmlStream, model: &CellModel) {
        xml.open_node("c");
        xml.add_attribute("r", &model.address.to_a1());
        if model.xf_id != 0 {
            xml.add_attribute_display("s", model.xf_id);
        }
        xml.add_attribute_opt("t", model.cell_type.as_attr());
        if let Some(f) = &model.formula {
            xml.open_node("f");
            match f.kind {
                FormulaKind::Normal => {}
                FormulaKind::Shared => xml.add_attribute("t", "shared"),
                FormulaKind::Array => xml.add_attribute("t", "array"),
            }
            if let Some(range) = &f.range {
                xml.add_attribute("ref", &range.to_string());
            }
            if let Some(si) = f.shared_index {
                xml.add_attribute_display("si", si);
            }
            if !f.text.is_empty() {
                xml.write_text(&f.text);
            }
            xml.close_node();
        }
        if let Some(inline) = &model.inline {
            self.inline.render(xml, inline);
        } else if let Some(raw) = &model.raw_value {
            xml.leaf_node("v", &[], Some(raw));
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return Ok(true);
        }
        if self.child == CellChild::Inline {
            if !self.inline.parse_open(node)? {
                self.skip_depth = 1;
            }
            return Ok(true);
        }
        let Some(model) = self.model.as_mut() else {
            if node.name != "c" {
                return Ok(false);
            }
            let address = match node.attr("r") {
                Some(r) => {
                    CellRef::from_a1(r).map_err(|_| XlsxError::InvalidAddress(r.to_string()))?
                }
                None => self.default_address,
            };
            self.model = Some(CellModel {
                address,
                xf_id: node.attr_u32("s").unwrap_or(0),
                cell_type: node.attr("t").map(CellType::parse).unwrap_or_default(),
                ..CellModel::default()
            });
            return Ok(true);
        };
        match node.name.as_str() {
            "v" => {
                model.raw_value = Some(String::new());
                self.child = CellChild::Value;
            }
            "f" => {
                let kind = match node.attr("t") {
                    Some("shared") => FormulaKind::Shared,
                    Some("array") => FormulaKind::Array,
                    _ => FormulaKind::Normal,
                };
                let range = match node.attr("ref") {
                    Some(r) => Some(parse_ref(r)?),
                    None => None,
                };
                model.formula = Some(FormulaModel {
                    text: String::new(),
                    kind,
                    shared_index: node.attr_u32("si"),
                    range,
                });
                self.child = CellChild::Formula;
            }
            "is" => {
                self.inline.parse_open(node)?;
                self.child = CellChild::Inline;
            }
            _ => self.skip_depth = 1,
        }
        Ok(true)
    }

    fn parse_text(&mut self, text: &str) {
        if self.skip_depth > 0 {
            return;
        }
        let Some(model) = self.model.as_mut() else {
            return;
        };
        match self.child {
            CellChild::Value => {
                if let Some(raw) = model.raw_value.as_mut() {
                    raw.push_str(text);
                }
            }
            CellChild::Formula => {
                if let Some(f) = model.formula.as_mut() {
                    f.text.push_str(text);
                }
            }
            CellChild::Inline => self.inline.parse_text(text),
            CellChild::None => {}
        }
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(true);
        }
        match self.child {
            CellChild::Inline => {
                if !self.inline.parse_close(name)? {
                    if let Some(model) = self.model.as_mut() {
                        model.inline = self.inline.take_model();
                    }
                    self.child = CellChild::None;
                }
                Ok(true)
            }
            CellChild::Value | CellChild::Formula => {
                self.child = CellChild::None;
                Ok(true)
            }
            CellChild::None => Ok(name != "c"),
        }
    }

    fn reconcile(
        &mut self,
        model: &mut CellModel,
        ctx: &mut ReconcileContext<'_>,
    ) -> Result<(), XlsxError> {
        model.style_id = ctx.styles.model_style_id(model.xf_id, ctx.model_styles)?;
        let raw = model.raw_value.as_deref().unwrap_or("");

        let plain = match model.cell_type {
            CellType::SharedString => {
                let index: u32 = raw
                    .trim()
                    .parse()
                    .map_err(|_| XlsxError::malformed("", format!("bad string index {raw:?}")))?;
                match ctx.shared_strings {
                    Some(strings) => match strings.get(index as usize) {
                        Some(SharedString::Text(text)) => CellValue::String(text.clone()),
                        Some(SharedString::Rich(rich)) => CellValue::RichText(rich.clone()),
                        None => return Err(XlsxError::UnknownSharedString(index)),
                    },
                    None => CellValue::Number(index as f64),
                }
            }
            CellType::InlineString => match model.inline.take() {
                Some(SharedString::Text(text)) => CellValue::String(text),
                Some(SharedString::Rich(rich)) => CellValue::RichText(rich),
                None => CellValue::String(raw.to_string()),
            },
            CellType::FormulaString => CellValue::String(raw.to_string()),
            CellType::Boolean => CellValue::Boolean(crate::sax::parse_xml_bool(raw)),
            CellType::Error => match ErrorValue::parse(raw) {
                Some(e) => CellValue::Error(e),
                None => CellValue::String(raw.to_string()),
            },
            CellType::Date => parse_iso_date(raw).map_or(CellValue::Empty, CellValue::Date),
            CellType::Number if raw.trim().is_empty() => CellValue::Empty,
            CellType::Number => {
                let n: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| XlsxError::malformed("", format!("bad number {raw:?}")))?;
                match ctx.styles.is_date_xf(model.xf_id) {
                    true => ctx
                        .date_system
                        .from_serial(n)
                        .map_or(CellValue::Number(n), CellValue::Date),
                    false => CellValue::Number(n),
                }
            }
        };

        let Some(formula) = model.formula.take() else {
            model.value = plain;
            return Ok(());
        };
        let result = match plain {
            CellValue::Empty => None,
            CellValue::Number(n) => Some(FormulaResult::Number(n)),
            CellValue::String(s) => Some(FormulaResult::String(s)),
            CellValue::RichText(r) => Some(FormulaResult::String(r.plain_text())),
            CellValue::Boolean(b) => Some(FormulaResult::Boolean(b)),
            CellValue::Error(e) => Some(FormulaResult::Error(e)),
            CellValue::Date(d) => Some(FormulaResult::Date(d)),
            _ => None,
        };
        let dependent = formula.kind == FormulaKind::Shared && formula.text.trim().is_empty();
        model.value = match (dependent, formula.shared_index) {
            (true, Some(si)) => match ctx.shared_formulas.get(&si) {
                Some(master) => CellValue::SharedFormula {
                    master: *master,
                    result,
                },
                None => {
                    log::warn!(
                        "cell {} uses unknown shared formula {si}",
                        model.address
                    );
                    result.map_or(CellValue::Empty, formula_result_value)
                }
            },
            _ => {
                let mut f = Formula::new(formula.text);
                f.result = result;
                if formula.kind == FormulaKind::Shared {
                    if let Some(si) = formula.shared_index {
                        ctx.shared_formulas.insert(si, model.address);
                    }
                    f.shared_range = formula.range;
                }
                CellValue::Formula(f)
            }
        };
        Ok(())
    }

    fn take_model(&mut self) -> Option<CellModel> {
        self.child = CellChild::None;
        self.model.take()
    }

    fn reset(&mut self) {
        self.model = None;
        self.child = CellChild::None;
        self.skip_depth = 0;
        self.inline.reset();
    }
}

fn formula_result_value(result: FormulaResult) -> CellValue {
    match result {
        FormulaResult::Number(n) => CellValue::Number(n),
        FormulaResult::String(s) => CellValue::String(s),
        FormulaResult::Boolean(b) => CellValue::Boolean(b),
        FormulaResult::Error(e) => CellValue::Error(e),
        FormulaResult::Date(d) => CellValue::Date(d),
    }
}

/// `<row>` and its cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowModel {
    pub number: u32,
    pub cells: Vec<CellModel>,
    pub height: Option<f64>,
    pub hidden: bool,
    pub outline_level: u8,
    /// Workbook style id of the row format.
    pub style_id: u32,
    /// `s` when `customFormat` is set.
    pub xf_id: Option<u32>,
}

impl RowModel {
    /// Row `number` of a worksheet. Blank cells are left out.
    pub fn from_row(number: u32, row: &Row) -> Self {
        Self {
            number,
            cells: row
                .iter()
                .filter(|(_, c)| !c.is_blank())
                .map(|(col, c)| CellModel::from_cell(CellRef::new(number, col), c))
                .collect(),
            height: row.height.map(|h| h.0),
            hidden: row.hidden,
            outline_level: row.outline_level,
            style_id: row.style_id,
            xf_id: None,
        }
    }

    pub fn into_row(self) -> Row {
        let mut row = Row {
            height: self.height.map(OrderedFloat),
            hidden: self.hidden,
            outline_level: self.outline_level,
            style_id: self.style_id,
            ..Row::default()
        };
        for cell in self.cells {
            let col = cell.address.col;
            *row.get_or_create(col) = cell.into_cell();
        }
        row
    }

    fn span(&self) -> Option<(u32, u32)> {
        let lo = self.cells.iter().map(|c| c.address.col).min()?;
        let hi = self.cells.iter().map(|c| c.address.col).max()?;
        Some((lo, hi))
    }
}

pub struct RowXform {
    max_cols: Option<usize>,
    cell: CellXform,
    model: Option<RowModel>,
    in_cell: bool,
    skip_depth: usize,
    last_row: u32,
    next_col: u32,
}

impl RowXform {
    pub fn new(max_cols: Option<usize>) -> Self {
        Self {
            max_cols,
            cell: CellXform::default(),
            model: None,
            in_cell: false,
            skip_depth: 0,
            last_row: 0,
            next_col: 1,
        }
    }
}

impl Xform for RowXform {
    type Model = RowModel;

    fn tag(&self) -> &str {
        "row"
    }

    fn prepare(
        &mut self,
        model: &mut RowModel,
        ctx: &mut PrepareContext<'_>,
    ) -> Result<(), XlsxError> {
        model.xf_id = match model.style_id {
            0 => None,
            id => {
                let style = ctx
                    .model_styles
                    .get(id)
                    .ok_or(XlsxError::UnknownStyleId(id))?;
                Some(ctx.styles.add_style_ref(id, style, ValueKind::Empty)).filter(|xf| *xf != 0)
            }
        };
        for cell in &mut model.cells {
            self.cell.prepare(cell, ctx)?;
        }
        Ok(())
    }

    fn render(&self, xml: &mut XmlStream, model: &RowModel) {
        xml.open_node("row");
        xml.add_attribute_display("r", model.number);
        if let Some((lo, hi)) = model.span() {
            xml.add_attribute("spans", &format!("{lo}:{hi}"));
        }
        if let Some(xf) = model.xf_id {
            xml.add_attribute_display("s", xf);
            xml.add_attribute("customFormat", "1");
        }
        if let Some(height) = model.height {
            xml.add_attribute("ht", &format_number(height));
            xml.add_attribute("customHeight", "1");
        }
        if model.hidden {
            xml.add_attribute("hidden", "1");
        }
        if model.outline_level > 0 {
            xml.add_attribute_display("outlineLevel", model.outline_level);
        }
        for cell in &model.cells {
            self.cell.render(xml, cell);
        }
        xml.close_node();
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return Ok(true);
        }
        if self.in_cell {
            if !self.cell.parse_open(node)? {
                self.skip_depth = 1;
            }
            return Ok(true);
        }
        let Some(model) = self.model.as_mut() else {
            if node.name != "row" {
                return Ok(false);
            }
            let number = node.attr_u32("r").unwrap_or(self.last_row + 1);
            if number == 0 || number > MAX_ROWS {
                return Err(XlsxError::malformed(
                    "",
                    format!("row number {number} outside 1..={MAX_ROWS}"),
                ));
            }
            self.last_row = number;
            self.next_col = 1;
            let custom_format = node.attr_bool("customFormat").unwrap_or(false);
            self.model = Some(RowModel {
                number,
                height: node
                    .attr_bool("customHeight")
                    .unwrap_or(false)
                    .then(|| node.attr_f64("ht"))
                    .flatten(),
                hidden: node.attr_bool("hidden").unwrap_or(false),
                outline_level: node
                    .attr_u32("outlineLevel")
                    .map_or(0, |l| l.min(7) as u8),
                xf_id: node.attr_u32("s").filter(|_| custom_format),
                ..RowModel::default()
            });
            return Ok(true);
        };
        if node.name != "c" {
            self.skip_depth = 1;
            return Ok(true);
        }
        if let Some(max) = self.max_cols {
            if model.cells.len() >= max {
                return Err(XlsxError::ColumnLimitExceeded { max });
            }
        }
        if self.next_col > MAX_COLS {
            return Err(XlsxError::malformed(
                "",
                format!("row {} has a cell past column {MAX_COLS}", model.number),
            ));
        }
        self.cell
            .set_default_address(CellRef::new(model.number, self.next_col));
        self.in_cell = self.cell.parse_open(node)?;
        if !self.in_cell {
            self.skip_depth = 1;
        }
        Ok(true)
    }

    fn parse_text(&mut self, text: &str) {
        if self.in_cell && self.skip_depth == 0 {
            self.cell.parse_text(text);
        }
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return Ok(true);
        }
        if self.in_cell {
            if !self.cell.parse_close(name)? {
                self.in_cell = false;
                if let (Some(model), Some(cell)) = (self.model.as_mut(), self.cell.take_model()) {
                    if cell.address.row != model.number {
                        return Err(XlsxError::malformed(
                            "",
                            format!("cell {} inside row {}", cell.address, model.number),
                        ));
                    }
                    self.next_col = cell.address.col + 1;
                    model.cells.push(cell);
                }
            }
            return Ok(true);
        }
        Ok(name != "row")
    }

    fn reconcile(
        &mut self,
        model: &mut RowModel,
        ctx: &mut ReconcileContext<'_>,
    ) -> Result<(), XlsxError> {
        if let Some(xf) = model.xf_id {
            model.style_id = ctx.styles.model_style_id(xf, ctx.model_styles)?;
        }
        for cell in &mut model.cells {
            self.cell.reconcile(cell, ctx)?;
        }
        Ok(())
    }

    fn take_model(&mut self) -> Option<RowModel> {
        self.model.take()
    }

    fn reset(&mut self) {
        self.model = None;
        self.in_cell = false;
        self.skip_depth = 0;
        self.last_row = 0;
        self.next_col = 1;
        self.cell.reset();
    }
}

/// A `<col>` record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColModel {
    pub def: ColumnDef,
    pub xf_id: u32,
}

/// `<col>`, a leaf carrying a style reference.
pub struct ColXform {
    leaf: AttrLeaf<ColModel>,
}

impl Default for ColXform {
    fn default() -> Self {
        Self {
            leaf: AttrLeaf::new(
                "col",
                |node| {
                    Ok(ColModel {
                        def: ColumnDef {
                            min: node.attr_u32("min").unwrap_or(1),
                            max: node.attr_u32("max").unwrap_or(1),
                            width: node.attr_f64("width").map(OrderedFloat),
                            hidden: node.attr_bool("hidden").unwrap_or(false),
                            best_fit: node.attr_bool("bestFit").unwrap_or(false),
                            outline_level: node
                                .attr_u32("outlineLevel")
                                .map_or(0, |l| l.min(7) as u8),
                            style_id: 0,
                        },
                        xf_id: node.attr_u32("style").unwrap_or(0),
                    })
                },
                |xml, col| {
                    let def = &col.def;
                    xml.add_attribute_display("min", def.min);
                    xml.add_attribute_display("max", def.max);
                    if let Some(width) = def.width {
                        xml.add_attribute("width", &format_number(width.0));
                        xml.add_attribute("customWidth", "1");
                    }
                    if col.xf_id != 0 {
                        xml.add_attribute_display("style", col.xf_id);
                    }
                    if def.hidden {
                        xml.add_attribute("hidden", "1");
                    }
                    if def.best_fit {
                        xml.add_attribute("bestFit", "1");
                    }
                    if def.outline_level > 0 {
                        xml.add_attribute_display("outlineLevel", def.outline_level);
                    }
                },
            ),
        }
    }
}

impl Xform for ColXform {
    type Model = ColModel;

    fn tag(&self) -> &str {
        "col"
    }

    fn prepare(
        &mut self,
        model: &mut ColModel,
        ctx: &mut PrepareContext<'_>,
    ) -> Result<(), XlsxError> {
        model.xf_id = match model.def.style_id {
            0 => 0,
            id => {
                let style = ctx
                    .model_styles
                    .get(id)
                    .ok_or(XlsxError::UnknownStyleId(id))?;
                ctx.styles.add_style_ref(id, style, ValueKind::Empty)
            }
        };
        Ok(())
    }

    fn render(&self, xml: &mut XmlStream, model: &ColModel) {
        self.leaf.render(xml, model);
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.leaf.parse_open(node)
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.leaf.parse_close(name)
    }

    fn reconcile(
        &mut self,
        model: &mut ColModel,
        ctx: &mut ReconcileContext<'_>,
    ) -> Result<(), XlsxError> {
        model.def.style_id = ctx.styles.model_style_id(model.xf_id, ctx.model_styles)?;
        Ok(())
    }

    fn take_model(&mut self) -> Option<ColModel> {
        self.leaf.take_model()
    }

    fn reset(&mut self) {
        self.leaf.reset();
    }
}

pub type MergeCellXform = AttrLeaf<Range>;

pub fn merge_cell_xform() -> MergeCellXform {
    AttrLeaf::new(
        "mergeCell",
        |node| parse_ref(node.attr("ref").unwrap_or_default()),
        |xml, range| xml.add_attribute("ref", &range.to_string()),
    )
}

pub type DimensionXform = AttrLeaf<Range>;

pub fn dimension_xform() -> DimensionXform {
    AttrLeaf::new(
        "dimension",
        |node| parse_ref(node.attr("ref").unwrap_or("A1")),
        |xml, range| xml.add_attribute("ref", &range.to_string()),
    )
}

/// `<hyperlink>`: an external target through a relationship, or a
/// `location` inside the workbook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HyperlinkModel {
    pub address: CellRef,
    pub rel_id: Option<String>,
    /// Resolved external target.
    pub target: Option<String>,
    pub location: Option<String>,
    pub tooltip: Option<String>,
    pub display: Option<String>,
}

impl HyperlinkModel {
    /// Targets starting with `#` point inside the workbook.
    pub fn for_cell(address: CellRef, link: &Hyperlink) -> Self {
        let (target, location) = match link.target.strip_prefix('#') {
            Some(location) => (None, Some(location.to_string())),
            None => (Some(link.target.clone()), None),
        };
        Self {
            address,
            rel_id: None,
            target,
            location,
            tooltip: link.tooltip.clone(),
            display: None,
        }
    }

    /// Target as stored on a model hyperlink cell.
    pub fn model_target(&self) -> Option<String> {
        match (&self.target, &self.location) {
            (Some(target), _) => Some(target.clone()),
            (None, Some(location)) => Some(format!("#{location}")),
            (None, None) => None,
        }
    }
}

pub type HyperlinkXform = AttrLeaf<HyperlinkModel>;

pub fn hyperlink_xform() -> HyperlinkXform {
    AttrLeaf::new(
        "hyperlink",
        |node| {
            let reference = node.attr("ref").unwrap_or_default();
            Ok(HyperlinkModel {
                address: parse_ref(reference)?.start,
                rel_id: node.rel_id().map(str::to_string),
                target: None,
                location: node.attr("location").map(str::to_string),
                tooltip: node.attr("tooltip").map(str::to_string),
                display: node.attr("display").map(str::to_string),
            })
        },
        |xml, link| {
            xml.add_attribute("ref", &link.address.to_a1());
            xml.add_attribute_opt("r:id", link.rel_id.as_deref());
            xml.add_attribute_opt("location", link.location.as_deref());
            xml.add_attribute_opt("tooltip", link.tooltip.as_deref());
            xml.add_attribute_opt("display", link.display.as_deref());
        },
    )
}

pub type SheetViewXform = AttrLeaf<SheetView>;

pub fn sheet_view_xform() -> SheetViewXform {
    AttrLeaf::new(
        "sheetView",
        |node| {
            Ok(SheetView {
                tab_selected: node.attr_bool("tabSelected").unwrap_or(false),
                show_grid_lines: node.attr_bool("showGridLines").unwrap_or(true),
                zoom_scale: node.attr_u32("zoomScale"),
                right_to_left: node.attr_bool("rightToLeft").unwrap_or(false),
            })
        },
        |xml, view| {
            if view.tab_selected {
                xml.add_attribute("tabSelected", "1");
            }
            if !view.show_grid_lines {
                xml.add_attribute("showGridLines", "0");
            }
            if view.right_to_left {
                xml.add_attribute("rightToLeft", "1");
            }
            if let Some(zoom) = view.zoom_scale {
                xml.add_attribute_display("zoomScale", zoom);
            }
            xml.add_attribute("workbookViewId", "0");
        },
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct SheetFormatModel {
    pub default_row_height: f64,
    pub custom_height: bool,
    pub outline_level_row: u8,
    pub outline_level_col: u8,
}

impl Default for SheetFormatModel {
    fn default() -> Self {
        Self {
            default_row_height: 15.0,
            custom_height: false,
            outline_level_row: 0,
            outline_level_col: 0,
        }
    }
}

pub type SheetFormatPrXform = AttrLeaf<SheetFormatModel>;

pub fn sheet_format_xform() -> SheetFormatPrXform {
    AttrLeaf::new(
        "sheetFormatPr",
        |node| {
            Ok(SheetFormatModel {
                default_row_height: node.attr_f64("defaultRowHeight").unwrap_or(15.0),
                custom_height: node.attr_bool("customHeight").unwrap_or(false),
                outline_level_row: node.attr_u32("outlineLevelRow").map_or(0, |l| l.min(7) as u8),
                outline_level_col: node.attr_u32("outlineLevelCol").map_or(0, |l| l.min(7) as u8),
            })
        },
        |xml, f| {
            xml.add_attribute("defaultRowHeight", &format_number(f.default_row_height));
            if f.custom_height {
                xml.add_attribute("customHeight", "1");
            }
            if f.outline_level_row > 0 {
                xml.add_attribute_display("outlineLevelRow", f.outline_level_row);
            }
            if f.outline_level_col > 0 {
                xml.add_attribute_display("outlineLevelCol", f.outline_level_col);
            }
        },
    )
}

pub type PageMarginsXform = AttrLeaf<PageMargins>;

pub fn page_margins_xform() -> PageMarginsXform {
    AttrLeaf::new(
        "pageMargins",
        |node| {
            let defaults = PageMargins::default();
            let read = |key: &str, default: OrderedFloat<f64>| {
                node.attr_f64(key).map_or(default, OrderedFloat)
            };
            Ok(PageMargins {
                left: read("left", defaults.left),
                right: read("right", defaults.right),
                top: read("top", defaults.top),
                bottom: read("bottom", defaults.bottom),
                header: read("header", defaults.header),
                footer: read("footer", defaults.footer),
            })
        },
        |xml, m| {
            for (key, value) in [
                ("left", m.left),
                ("right", m.right),
                ("top", m.top),
                ("bottom", m.bottom),
                ("header", m.header),
                ("footer", m.footer),
            ] {
                xml.add_attribute(key, &format_number(value.0));
            }
        },
    )
}

/// One worksheet part plus the package data that travels with it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorksheetModel {
    /// 1-based position, used for part names.
    pub id: u32,
    pub name: String,
    pub state: SheetState,
    pub dimension: Option<Range>,
    pub views: Vec<SheetView>,
    pub format: Option<SheetFormatModel>,
    pub cols: Vec<ColModel>,
    pub rows: Vec<RowModel>,
    pub merges: Vec<Range>,
    pub hyperlinks: Vec<HyperlinkModel>,
    pub page_margins: Option<PageMargins>,
    /// Relationship id of the comments' VML drawing.
    pub legacy_drawing: Option<String>,
    pub rels: Vec<Relationship>,
    pub comments: Vec<CommentModel>,
}

impl WorksheetModel {
    pub fn from_worksheet(sheet: &Worksheet, id: u32) -> Self {
        let mut comments = Vec::new();
        let rows = sheet
            .rows()
            .filter_map(|(n, row)| {
                for (col, cell) in row.iter() {
                    if let Some(comment) = &cell.comment {
                        comments.push(CommentModel {
                            address: CellRef::new(n, col),
                            comment: comment.clone(),
                        });
                    }
                }
                let model = RowModel::from_row(n, row);
                (!model.cells.is_empty() || row.has_properties()).then_some(model)
            })
            .collect();
        Self {
            id,
            name: sheet.name.clone(),
            state: sheet.state,
            dimension: sheet.dimensions(),
            views: vec![sheet.view.clone()],
            format: Some(SheetFormatModel {
                default_row_height: sheet.default_row_height.map_or(15.0, |h| h.0),
                custom_height: sheet.default_row_height.is_some(),
                outline_level_row: sheet
                    .rows()
                    .map(|(_, r)| r.outline_level)
                    .max()
                    .unwrap_or(0),
                outline_level_col: sheet
                    .columns()
                    .iter()
                    .map(|c| c.outline_level)
                    .max()
                    .unwrap_or(0),
            }),
            cols: sheet
                .columns()
                .iter()
                .map(|def| ColModel {
                    def: def.clone(),
                    xf_id: 0,
                })
                .collect(),
            rows,
            merges: sheet.merges().to_vec(),
            hyperlinks: Vec::new(),
            page_margins: Some(sheet.page_margins.clone().unwrap_or_default()),
            legacy_drawing: None,
            rels: Vec::new(),
            comments,
        }
    }

    /// Rebuild the model worksheet once the parsed model is reconciled.
    pub fn into_worksheet(self) -> Result<Worksheet, XlsxError> {
        let mut sheet = Worksheet::new(self.name);
        sheet.state = self.state;
        if let Some(view) = self.views.into_iter().next() {
            sheet.view = view;
        }
        sheet.page_margins = self.page_margins;
        if let Some(format) = self.format.filter(|f| f.custom_height) {
            sheet.default_row_height = Some(OrderedFloat(format.default_row_height));
        }
        for col in self.cols {
            sheet.set_column(col.def);
        }
        for row in self.rows {
            let number = row.number;
            *sheet.row_mut(number) = row.into_row();
        }
        for range in self.merges {
            sheet.merge_cells_without_style(range)?;
        }
        for link in self.hyperlinks {
            let Some(target) = link.model_target() else {
                continue;
            };
            let cell = sheet.cell_mut(link.address);
            let text = match &cell.value {
                CellValue::String(s) => s.clone(),
                CellValue::RichText(r) => r.plain_text(),
                CellValue::Empty => link.display.clone().unwrap_or_else(|| target.clone()),
                other => {
                    log::debug!(
                        "hyperlink on {} kept off a {:?} cell",
                        link.address,
                        other.kind()
                    );
                    continue;
                }
            };
            cell.value = CellValue::Hyperlink(Hyperlink {
                text,
                target,
                tooltip: link.tooltip,
            });
        }
        for c in self.comments {
            sheet.set_comment(c.address, Some(c.comment));
        }
        Ok(sheet)
    }

    /// Number the sheet relationships: external hyperlinks first, then the
    /// comments part and its drawing.
    pub fn assign_relationships(&mut self) {
        self.rels.clear();
        for link in &mut self.hyperlinks {
            if let Some(target) = &link.target {
                let id = format!("rId{}", self.rels.len() + 1);
                self.rels
                    .push(Relationship::external(&id, rel_type::HYPERLINK, target));
                link.rel_id = Some(id);
            }
        }
        self.legacy_drawing = None;
        if let Some((comments, vml)) = self.comments_rel_targets() {
            let id = format!("rId{}", self.rels.len() + 1);
            self.rels
                .push(Relationship::new(id, rel_type::COMMENTS, comments));
            let id = format!("rId{}", self.rels.len() + 1);
            self.rels
                .push(Relationship::new(&id, rel_type::VML_DRAWING, vml));
            self.legacy_drawing = Some(id);
        }
    }

    /// Relationships that point at the comments part and its VML drawing.
    pub fn comments_rel_targets(&self) -> Option<(String, String)> {
        (!self.comments.is_empty()).then(|| {
            (
                format!("../comments{}.xml", self.id),
                format!("../drawings/vmlDrawing{}.vml", self.id),
            )
        })
    }
}

fn row_limit(max: usize) -> XlsxError {
    XlsxError::RowLimitExceeded { max }
}

/// `<worksheet>`.
pub struct WorksheetXform {
    inner: Composite<WorksheetModel>,
    rows: RowXform,
    cols: ColXform,
}

impl WorksheetXform {
    pub fn new(max_rows: Option<usize>, max_cols: Option<usize>) -> Self {
        let map = ChildMap::new()
            .with(dimension_xform(), |m: &mut WorksheetModel, v| {
                m.dimension = Some(v)
            })
            .with(
                ListXform::new("sheetViews", sheet_view_xform()),
                |m: &mut WorksheetModel, v| m.views = v,
            )
            .with(sheet_format_xform(), |m: &mut WorksheetModel, v| {
                m.format = Some(v)
            })
            .with(
                ListXform::new("cols", ColXform::default()),
                |m: &mut WorksheetModel, v| m.cols = v,
            )
            .with(
                ListXform::new("sheetData", RowXform::new(max_cols)).with_max(max_rows, row_limit),
                |m: &mut WorksheetModel, v| m.rows = v,
            )
            .with(
                ListXform::new("mergeCells", merge_cell_xform()),
                |m: &mut WorksheetModel, v| m.merges = v,
            )
            .with(
                ListXform::new("hyperlinks", hyperlink_xform()),
                |m: &mut WorksheetModel, v| m.hyperlinks = v,
            )
            .with(page_margins_xform(), |m: &mut WorksheetModel, v| {
                m.page_margins = Some(v)
            })
            .with(
                StringXform::attr("legacyDrawing", "r:id"),
                |m: &mut WorksheetModel, v| m.legacy_drawing = Some(v),
            );
        Self {
            inner: Composite::new("worksheet", map),
            rows: RowXform::new(max_cols),
            cols: ColXform::default(),
        }
    }
}

impl WorksheetXform {
    /// Everything up to and including the `<sheetData>` start tag.
    pub(crate) fn render_head(xml: &mut XmlStream, model: &WorksheetModel) {
        xml.open_xml();
        xml.open_node("worksheet");
        xml.add_attribute("xmlns", NS_MAIN);
        xml.add_attribute("xmlns:r", NS_DOC_RELATIONSHIPS);

        if let Some(dimension) = &model.dimension {
            dimension_xform().render(xml, dimension);
        }
        ListXform::new("sheetViews", sheet_view_xform()).render(xml, &model.views);
        if let Some(format) = &model.format {
            sheet_format_xform().render(xml, format);
        }
        ListXform::new("cols", ColXform::default()).render(xml, &model.cols);
        xml.open_node("sheetData");
    }

    /// Closes `<sheetData>` and writes the records that follow the cells.
    pub(crate) fn render_tail(xml: &mut XmlStream, model: &WorksheetModel) {
        xml.close_node();
        ListXform::new("mergeCells", merge_cell_xform())
            .with_count()
            .render(xml, &model.merges);
        ListXform::new("hyperlinks", hyperlink_xform()).render(xml, &model.hyperlinks);
        if let Some(margins) = &model.page_margins {
            page_margins_xform().render(xml, margins);
        }
        if let Some(id) = &model.legacy_drawing {
            xml.leaf_node("legacyDrawing", &[("r:id", id.as_str())], None);
        }
        xml.close_node();
    }
}

impl Default for WorksheetXform {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl Xform for WorksheetXform {
    type Model = WorksheetModel;

    fn tag(&self) -> &str {
        "worksheet"
    }

    fn prepare(
        &mut self,
        model: &mut WorksheetModel,
        ctx: &mut PrepareContext<'_>,
    ) -> Result<(), XlsxError> {
        ctx.shared_formulas.clear();
        ctx.hyperlinks.clear();
        for col in &mut model.cols {
            self.cols.prepare(col, ctx)?;
        }
        for row in &mut model.rows {
            self.rows.prepare(row, ctx)?;
        }

        model.hyperlinks = std::mem::take(&mut ctx.hyperlinks);
        model.assign_relationships();
        Ok(())
    }

    fn render(&self, xml: &mut XmlStream, model: &WorksheetModel) {
        Self::render_head(xml, model);
        for row in &model.rows {
            self.rows.render(xml, row);
        }
        Self::render_tail(xml, model);
    }

    fn parse_open(&mut self, node: &SaxNode) -> Result<bool, XlsxError> {
        self.inner.parse_open(node, |_| WorksheetModel::default())
    }

    fn parse_text(&mut self, text: &str) {
        self.inner.parse_text(text);
    }

    fn parse_close(&mut self, name: &str) -> Result<bool, XlsxError> {
        self.inner.parse_close(name)
    }

    fn reconcile(
        &mut self,
        model: &mut WorksheetModel,
        ctx: &mut ReconcileContext<'_>,
    ) -> Result<(), XlsxError> {
        ctx.shared_formulas.clear();
        for col in &mut model.cols {
            self.cols.reconcile(col, ctx)?;
        }
        for row in &mut model.rows {
            self.rows.reconcile(row, ctx)?;
        }
        for link in &mut model.hyperlinks {
            let Some(rel_id) = &link.rel_id else {
                continue;
            };
            match ctx.hyperlink_targets.get(rel_id) {
                Some(target) => link.target = Some(target.clone()),
                None => log::warn!(
                    "hyperlink on {} refers to missing relationship {rel_id}",
                    link.address
                ),
            }
        }
        Ok(())
    }

    fn take_model(&mut self) -> Option<WorksheetModel> {
        self.inner.take_model()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}
