//! Multi-page table grouping and merging
//!
//! Layout services report a table split across a page break as separate
//! fragments. Fragments on consecutive pages whose header signatures agree
//! (or whose continuation carries no header at all) are grouped and merged
//! into one canonical table, preserving row order exactly.

use serde::Serialize;

use crate::keywords::normalize_header;
use crate::table::{fit_width, TableCandidate};

/// Related fragments plus their canonical merged table.
#[derive(Debug, Clone, Serialize)]
pub struct TableGroup {
    members: Vec<TableCandidate>,
    merged: TableCandidate,
}

impl TableGroup {
    pub fn new(first: TableCandidate) -> Self {
        TableGroup {
            merged: first.clone(),
            members: vec![first],
        }
    }

    /// Add a fragment and recompute the merged table.
    pub fn push(&mut self, member: TableCandidate) {
        self.members.push(member);
        if let Some(merged) = merge_line_item_tables(&self.members) {
            self.merged = merged;
        }
    }

    pub fn members(&self) -> &[TableCandidate] {
        &self.members
    }

    pub fn merged(&self) -> &TableCandidate {
        &self.merged
    }

    pub fn into_merged(self) -> TableCandidate {
        self.merged
    }

    fn last_member(&self) -> &TableCandidate {
        // A group is never empty: it is built from its first member.
        &self.members[self.members.len() - 1]
    }
}

/// Decide whether `b` continues `a` on the next page.
pub fn are_tables_related(a: &TableCandidate, b: &TableCandidate) -> bool {
    if b.page_range.start != a.page_range.end + 1 {
        return false;
    }

    if a.signature.matches(&b.signature) {
        return a.column_count == b.column_count || first_row_repeats_header(b, &a.headers);
    }

    // Continuation fragment whose first row is data, not a header.
    a.header_detected && !b.header_detected && a.column_count == b.column_count
}

/// Group candidates into runs of related fragments in one page-ordered pass.
///
/// Each candidate extends the most recent group it continues, so other
/// tables on the same page (title blocks, revision tables) do not break a
/// run across a page break.
pub fn group_related_line_item_tables(mut candidates: Vec<TableCandidate>) -> Vec<TableGroup> {
    candidates.sort_by_key(|c| c.page_range.start);

    let mut groups: Vec<TableGroup> = Vec::new();
    for candidate in candidates {
        let open = groups
            .iter()
            .rposition(|group| are_tables_related(group.last_member(), &candidate));
        match open {
            Some(index) => groups[index].push(candidate),
            None => groups.push(TableGroup::new(candidate)),
        }
    }
    groups
}

/// Merge related fragments into one table.
///
/// The first fragment's headers win. Rows are concatenated in fragment
/// order; a boundary row repeating the header is dropped and a headerless
/// fragment's first row is kept as data. Fragments of a different width are
/// padded or truncated to the first fragment's width with a warning.
pub fn merge_line_item_tables(members: &[TableCandidate]) -> Option<TableCandidate> {
    let (first, rest) = members.split_first()?;
    let width = first.column_count;

    let mut rows = first.rows.clone();
    let mut warnings = first.warnings.clone();
    let mut pages = first.page_range;

    for fragment in rest {
        let mut fragment_rows = Vec::with_capacity(fragment.rows.len() + 1);
        if !fragment.header_detected && !same_cells(&fragment.headers, &first.headers) {
            fragment_rows.push(fragment.headers.clone());
        }
        fragment_rows.extend(fragment.rows.iter().cloned());

        if fragment_rows
            .first()
            .is_some_and(|row| same_cells(row, &first.headers))
        {
            fragment_rows.remove(0);
            warnings.push(format!(
                "page {}: repeated header row dropped",
                fragment.page_range
            ));
        }

        if fragment.column_count != width {
            warnings.push(format!(
                "page {}: {} columns reshaped to {width}",
                fragment.page_range, fragment.column_count
            ));
        }

        warnings.extend(fragment.warnings.iter().cloned());
        rows.extend(fragment_rows.into_iter().map(|row| fit_width(row, width)));
        pages = pages.union(fragment.page_range);
    }

    Some(TableCandidate::new(pages, first.headers.clone(), rows).with_warnings(warnings))
}

fn first_row_repeats_header(table: &TableCandidate, headers: &[String]) -> bool {
    table
        .rows
        .first()
        .is_some_and(|row| same_cells(row, headers))
}

/// Compare rows by normalized text, ignoring trailing empty cells.
fn same_cells(a: &[String], b: &[String]) -> bool {
    let normalize = |cells: &[String]| -> Vec<String> {
        let mut out: Vec<String> = cells.iter().map(|c| normalize_header(c)).collect();
        while out.last().is_some_and(|c| c.is_empty()) {
            out.pop();
        }
        out
    };
    let a = normalize(a);
    !a.is_empty() && a == normalize(b)
}
