//! Raw line-item projection
//!
//! Freezes the selected table into an ordered list of raw items. The count
//! produced here is the count every later stage must preserve.

use serde::{Deserialize, Serialize};

use crate::keywords::{classify_header, HeaderGroup};
use crate::table::TableCandidate;

/// One cell of a raw item, tagged with its column header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawField {
    pub header: String,
    pub value: String,
}

/// One data row of the selected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    /// 0-based position in the table.
    pub index: usize,
    /// Source page, when the table lies on a single page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub fields: Vec<RawField>,
}

impl RawItem {
    /// First non-empty value whose header belongs to `group`.
    pub fn value_for(&self, group: HeaderGroup) -> Option<&str> {
        self.values_for(group).into_iter().next()
    }

    /// Every non-empty value whose header belongs to `group`, in column order.
    pub fn values_for(&self, group: HeaderGroup) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| !f.value.is_empty() && classify_header(&f.header).contains(group))
            .map(|f| f.value.as_str())
            .collect()
    }

    /// `Header: "value"` pairs of the non-empty cells, joined with ` | `.
    pub fn text(&self) -> String {
        self.fields
            .iter()
            .filter(|f| !f.value.is_empty())
            .map(|f| format!("{}: {:?}", f.header, f.value))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Project every data row of `table` into a [`RawItem`], in order.
///
/// Empty headers are named `column N` (1-based). The result always holds
/// exactly `table.row_count` items.
pub fn extract_line_items_from_table(table: &TableCandidate) -> Vec<RawItem> {
    let headers: Vec<String> = table
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if h.trim().is_empty() {
                format!("column {}", i + 1)
            } else {
                h.trim().to_string()
            }
        })
        .collect();

    let page = (table.page_range.start == table.page_range.end).then_some(table.page_range.start);

    table
        .rows
        .iter()
        .enumerate()
        .map(|(index, row)| RawItem {
            index,
            page,
            fields: headers
                .iter()
                .zip(row.iter())
                .map(|(header, value)| RawField {
                    header: header.clone(),
                    value: value.trim().to_string(),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::PageRange;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn sample() -> TableCandidate {
        TableCandidate::new(
            PageRange { start: 2, end: 3 },
            strings(&["Item", "Description", "Qty", ""]),
            vec![
                strings(&["1", "Elbow 90 LR", "4", "note"]),
                strings(&["2", "Tee equal", "", ""]),
                strings(&["", "", "", ""]),
            ],
        )
    }

    #[test]
    fn test_one_item_per_row_in_order() {
        let table = sample();
        let items = extract_line_items_from_table(&table);

        assert_eq!(items.len(), table.row_count);
        assert_eq!(
            items.iter().map(|i| i.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(items[0].fields[1].value, "Elbow 90 LR");
        assert_eq!(items[0].page, None);
    }

    #[test]
    fn test_empty_headers_are_named_by_position() {
        let items = extract_line_items_from_table(&sample());
        assert_eq!(items[0].fields[3].header, "column 4");
    }

    #[test]
    fn test_values_by_group() {
        let items = extract_line_items_from_table(&sample());
        assert_eq!(items[0].value_for(HeaderGroup::Quantity), Some("4"));
        assert_eq!(items[1].value_for(HeaderGroup::Quantity), None);
        assert_eq!(items[1].value_for(HeaderGroup::Description), Some("Tee equal"));
    }

    #[test]
    fn test_text_skips_empty_cells() {
        let items = extract_line_items_from_table(&sample());
        assert_eq!(items[1].text(), r#"Item: "2" | Description: "Tee equal""#);
        assert_eq!(items[2].text(), "");
    }

    #[test]
    fn test_single_page_table_tags_page() {
        let table = TableCandidate::new(
            PageRange::single(7),
            strings(&["Item", "Qty"]),
            vec![strings(&["1", "2"])],
        );
        let items = extract_line_items_from_table(&table);
        assert_eq!(items[0].page, Some(7));
    }
}
