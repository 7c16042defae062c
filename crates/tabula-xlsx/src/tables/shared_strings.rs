use std::collections::HashMap;

use tabula_model::RichText;

use crate::xform::strings::{SharedString, SharedStringXform, SharedStringsModel};
use crate::xform::Xform;

/// Deduplicating string table behind `xl/sharedStrings.xml`.
///
/// Entries are keyed by their canonical `<si>` markup, so two rich texts
/// with the same runs share one index.
pub struct SharedStringTable {
    values: Vec<SharedString>,
    index: HashMap<String, u32>,
    total_refs: u32,
    item: SharedStringXform,
}

impl Default for SharedStringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStringTable {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            index: HashMap::new(),
            total_refs: 0,
            item: SharedStringXform::new("si"),
        }
    }

    /// Table loaded from a parsed part. Reference counts start at zero.
    pub fn from_values(values: Vec<SharedString>) -> Self {
        let mut table = Self::new();
        for value in values {
            let key = table.item.to_xml(&value);
            let id = table.values.len() as u32;
            table.index.entry(key).or_insert(id);
            table.values.push(value);
        }
        table
    }

    pub fn add(&mut self, text: &str) -> u32 {
        self.add_value(SharedString::Text(text.to_string()))
    }

    pub fn add_rich_text(&mut self, rich: &RichText) -> u32 {
        self.add_value(SharedString::from_rich_text(rich))
    }

    fn add_value(&mut self, value: SharedString) -> u32 {
        self.total_refs += 1;
        let key = self.item.to_xml(&value);
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = self.values.len() as u32;
        self.values.push(value);
        self.index.insert(key, id);
        id
    }

    /// Number of unique entries.
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Number of `add` calls, i.e. cells referring to the table.
    pub fn total_refs(&self) -> u32 {
        self.total_refs
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&SharedString> {
        self.values.get(index as usize)
    }

    pub fn values(&self) -> &[SharedString] {
        &self.values
    }

    pub fn model(&self) -> SharedStringsModel {
        SharedStringsModel {
            count: self.total_refs,
            values: self.values.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_model::{Font, RichTextRun};

    #[test]
    fn identical_content_shares_an_index() {
        let mut sst = SharedStringTable::new();
        assert_eq!(sst.add("a"), 0);
        assert_eq!(sst.add("b"), 1);
        assert_eq!(sst.add("a"), 0);
        assert_eq!(sst.count(), 2);
        assert_eq!(sst.total_refs(), 3);
        assert_eq!(sst.get(1), Some(&SharedString::Text("b".into())));
    }

    #[test]
    fn plain_rich_text_collapses_to_text() {
        let mut sst = SharedStringTable::new();
        let id = sst.add("x");
        assert_eq!(sst.add_rich_text(&RichText::from("x")), id);

        let bold = RichText::new(vec![RichTextRun::styled(
            "x",
            Font {
                bold: true,
                ..Font::default()
            },
        )]);
        let rich_id = sst.add_rich_text(&bold);
        assert_ne!(rich_id, id);
        assert_eq!(sst.add_rich_text(&bold.clone()), rich_id);
    }

    #[test]
    fn model_reports_refs_and_unique_values() {
        let mut sst = SharedStringTable::from_values(vec![SharedString::Text("k".into())]);
        sst.add("k");
        sst.add("new");
        let model = sst.model();
        assert_eq!(model.count, 2);
        assert_eq!(model.values.len(), 2);
    }
}
