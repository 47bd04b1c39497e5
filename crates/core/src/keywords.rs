//! Header classification
//!
//! Headers are normalized and matched against a versioned keyword table.
//! Classification is deliberately kept apart from scoring so the keyword
//! lists can evolve without touching the weights in [`crate::scoring`].

use std::fmt;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Bumped whenever a keyword list changes.
pub const KEYWORD_TABLE_VERSION: u32 = 3;

/// Semantic group a table header can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderGroup {
    Item,
    Description,
    Quantity,
    Unit,
    Material,
    Dimension,
    Revision,
    Approval,
}

impl HeaderGroup {
    pub const ALL: [HeaderGroup; 8] = [
        HeaderGroup::Item,
        HeaderGroup::Description,
        HeaderGroup::Quantity,
        HeaderGroup::Unit,
        HeaderGroup::Material,
        HeaderGroup::Dimension,
        HeaderGroup::Revision,
        HeaderGroup::Approval,
    ];

    /// Groups counted towards the multi-group bonus.
    pub const CORE: [HeaderGroup; 5] = [
        HeaderGroup::Item,
        HeaderGroup::Description,
        HeaderGroup::Quantity,
        HeaderGroup::Material,
        HeaderGroup::Dimension,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HeaderGroup::Item => "item",
            HeaderGroup::Description => "description",
            HeaderGroup::Quantity => "quantity",
            HeaderGroup::Unit => "unit",
            HeaderGroup::Material => "material",
            HeaderGroup::Dimension => "dimension",
            HeaderGroup::Revision => "revision",
            HeaderGroup::Approval => "approval",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for HeaderGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of groups matched by a single header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GroupSet(u8);

impl GroupSet {
    pub fn empty() -> Self {
        GroupSet(0)
    }

    pub fn insert(&mut self, group: HeaderGroup) {
        self.0 |= group.bit();
    }

    pub fn contains(&self, group: HeaderGroup) -> bool {
        self.0 & group.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: GroupSet) -> GroupSet {
        GroupSet(self.0 | other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = HeaderGroup> + '_ {
        HeaderGroup::ALL.into_iter().filter(|g| self.contains(*g))
    }
}

impl FromIterator<HeaderGroup> for GroupSet {
    fn from_iter<T: IntoIterator<Item = HeaderGroup>>(iter: T) -> Self {
        let mut set = GroupSet::empty();
        for group in iter {
            set.insert(group);
        }
        set
    }
}

impl Serialize for GroupSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for GroupSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let groups = Vec::<HeaderGroup>::deserialize(deserializer)?;
        Ok(groups.into_iter().collect())
    }
}

/// Auxiliary fields that can absorb a mis-assigned quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanionField {
    Weight,
    Length,
    Area,
}

/// Keyword lists, one per header group. Keywords are written already
/// normalized (see [`normalize_header`]); multi-word keywords match as a
/// contiguous token run.
pub struct KeywordTable {
    pub version: u32,
    groups: &'static [(HeaderGroup, &'static [&'static str])],
    companions: &'static [(CompanionField, &'static [&'static str])],
}

pub const KEYWORDS: KeywordTable = KeywordTable {
    version: KEYWORD_TABLE_VERSION,
    groups: &[
        (
            HeaderGroup::Item,
            &[
                "item", "item no", "line", "line no", "ln", "pos", "position", "s no", "sl no",
                "sr no", "sno", "slno", "srno", "serial", "mark",
            ],
        ),
        (
            HeaderGroup::Description,
            &[
                "description",
                "desc",
                "detail",
                "details",
                "particulars",
                "component",
                "commodity",
                "product",
                "article",
            ],
        ),
        (
            HeaderGroup::Quantity,
            &[
                "qty", "quantity", "quan", "qnty", "qtty", "nos", "pcs", "count", "no of",
                "number of",
            ],
        ),
        (HeaderGroup::Unit, &["unit", "units", "uom", "u m", "um"]),
        (
            HeaderGroup::Material,
            &[
                "material",
                "matl",
                "mat",
                "spec",
                "specs",
                "specification",
                "grade",
                "class",
                "rating",
                "moc",
                "standard",
                "std",
                "astm",
            ],
        ),
        (
            HeaderGroup::Dimension,
            &[
                "size",
                "sizes",
                "dia",
                "diameter",
                "nps",
                "nb",
                "dn",
                "od",
                "thk",
                "thickness",
                "sch",
                "schedule",
                "length",
                "width",
                "dimension",
                "dimensions",
                "dim",
            ],
        ),
        (
            HeaderGroup::Revision,
            &[
                "rev",
                "revision",
                "date",
                "version",
                "ver",
                "issue",
                "amendment",
                "amdt",
            ],
        ),
        (
            HeaderGroup::Approval,
            &[
                "prepared",
                "checked",
                "approved",
                "reviewed",
                "verified",
                "signature",
                "sign",
                "signed",
                "drawn",
                "designed",
                "by",
            ],
        ),
    ],
    companions: &[
        (
            CompanionField::Weight,
            &["weight", "wt", "kg", "kgs", "mass", "net weight", "gross weight"],
        ),
        (
            CompanionField::Length,
            &["length", "len", "lg", "mtr", "meters", "metres", "running meter"],
        ),
        (CompanionField::Area, &["area", "m2", "sqm", "sq m"]),
    ],
};

impl KeywordTable {
    /// Classify one header into zero or more groups.
    pub fn classify(&self, header: &str) -> GroupSet {
        let tokens = tokens(header);
        self.groups
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| contains_phrase(&tokens, k)))
            .map(|(group, _)| *group)
            .collect()
    }

    /// Identify a header naming a weight, length or area field.
    pub fn companion(&self, header: &str) -> Option<CompanionField> {
        let tokens = tokens(header);
        self.companions
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| contains_phrase(&tokens, k)))
            .map(|(field, _)| *field)
    }
}

/// Normalize a header for matching: NFKC, lowercase, punctuation to spaces,
/// whitespace collapsed, and trailing digits split off letter tokens so that
/// `Size1` reads as `size 1`.
pub fn normalize_header(header: &str) -> String {
    let folded: String = header
        .nfkc()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded
        .split_whitespace()
        .flat_map(split_trailing_digits)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify a header with the built-in keyword table.
pub fn classify_header(header: &str) -> GroupSet {
    KEYWORDS.classify(header)
}

/// Companion field named by a header, if any.
pub fn companion_field(header: &str) -> Option<CompanionField> {
    KEYWORDS.companion(header)
}

fn split_trailing_digits(token: &str) -> Vec<String> {
    let digits = token.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits == token.chars().count() {
        return vec![token.to_string()];
    }
    let split = token.len() - digits;
    vec![token[..split].to_string(), token[split..].to_string()]
}

fn tokens(header: &str) -> Vec<String> {
    normalize_header(header)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split(' ').collect();
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(t, n)| t == n))
}

/// Order-preserving representation of a table's header groups, used to
/// recognise the same table continuing across a page break.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub groups: Vec<GroupSet>,
    pub normalized: Vec<String>,
}

impl Signature {
    pub fn of(headers: &[String]) -> Self {
        Signature {
            groups: headers.iter().map(|h| classify_header(h)).collect(),
            normalized: headers.iter().map(|h| normalize_header(h)).collect(),
        }
    }

    /// True when at least one column classified into a group.
    pub fn is_classified(&self) -> bool {
        self.groups.iter().any(|g| !g.is_empty())
    }

    /// Union of all groups across the columns.
    pub fn present(&self) -> GroupSet {
        self.groups
            .iter()
            .fold(GroupSet::empty(), |acc, g| acc.union(*g))
    }

    /// Group signatures must agree; fully unclassified headers fall back to
    /// comparing their normalized text. Trailing blank columns are ignored.
    pub fn matches(&self, other: &Signature) -> bool {
        let (groups, normalized) = self.trimmed();
        let (other_groups, other_normalized) = other.trimmed();
        match (self.is_classified(), other.is_classified()) {
            (true, true) => groups == other_groups,
            (false, false) => normalized == other_normalized,
            _ => false,
        }
    }

    fn trimmed(&self) -> (&[GroupSet], &[String]) {
        let len = self
            .normalized
            .iter()
            .rposition(|h| !h.is_empty())
            .map_or(0, |last| last + 1)
            .max(self.groups.iter().rposition(|g| !g.is_empty()).map_or(0, |last| last + 1));
        (
            &self.groups[..len.min(self.groups.len())],
            &self.normalized[..len.min(self.normalized.len())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(header: &str) -> Vec<HeaderGroup> {
        classify_header(header).iter().collect()
    }

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_header("Qty."), "qty");
        assert_eq!(normalize_header("  U/M "), "u m");
        assert_eq!(normalize_header("Prepared-By"), "prepared by");
    }

    #[test]
    fn test_normalize_splits_numbered_columns() {
        assert_eq!(normalize_header("Size1"), "size 1");
        assert_eq!(normalize_header("SIZE 2"), "size 2");
        assert_eq!(normalize_header("2024"), "2024");
    }

    #[test]
    fn test_normalize_folds_fullwidth_characters() {
        assert_eq!(normalize_header("ＱＴＹ"), "qty");
    }

    #[test]
    fn test_classify_line_item_headers() {
        assert_eq!(groups("Item"), vec![HeaderGroup::Item]);
        assert_eq!(groups("Detail"), vec![HeaderGroup::Description]);
        assert_eq!(groups("Pipe Spec"), vec![HeaderGroup::Material]);
        assert_eq!(groups("Qty."), vec![HeaderGroup::Quantity]);
        assert_eq!(groups("Unit"), vec![HeaderGroup::Unit]);
        assert_eq!(groups("Size1"), vec![HeaderGroup::Dimension]);
        assert!(groups("Notes").is_empty());
    }

    #[test]
    fn test_classify_audit_headers() {
        assert_eq!(groups("Rev"), vec![HeaderGroup::Revision]);
        assert_eq!(groups("Date"), vec![HeaderGroup::Revision]);
        assert_eq!(groups("Checked By"), vec![HeaderGroup::Approval]);
    }

    #[test]
    fn test_header_can_match_several_groups() {
        assert_eq!(
            groups("Item Description"),
            vec![HeaderGroup::Item, HeaderGroup::Description]
        );
    }

    #[test]
    fn test_drawing_number_is_not_an_item_column() {
        assert!(!classify_header("Drawing No").contains(HeaderGroup::Item));
    }

    #[test]
    fn test_companion_fields() {
        assert_eq!(companion_field("Weight (kg)"), Some(CompanionField::Weight));
        assert_eq!(companion_field("Unit Wt"), Some(CompanionField::Weight));
        assert_eq!(companion_field("Length"), Some(CompanionField::Length));
        assert_eq!(companion_field("Qty"), None);
    }

    #[test]
    fn test_signature_tolerates_spelling_drift() {
        let a = Signature::of(&["Item".into(), "Qty".into(), "Description".into()]);
        let b = Signature::of(&["ITEM".into(), "Qty.".into(), "Desc".into()]);
        assert!(a.matches(&b));
    }

    #[test]
    fn test_signature_order_matters() {
        let a = Signature::of(&["Item".into(), "Qty".into()]);
        let b = Signature::of(&["Qty".into(), "Item".into()]);
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_unclassified_signatures_compare_text() {
        let a = Signature::of(&["Foo".into(), "Bar".into()]);
        let b = Signature::of(&["foo".into(), "bar.".into()]);
        let c = Signature::of(&["Baz".into(), "Bar".into()]);
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_group_set_serializes_as_list() {
        let set: GroupSet = [HeaderGroup::Item, HeaderGroup::Quantity].into_iter().collect();
        assert_eq!(
            serde_json::to_string(&set).unwrap_or_default(),
            r#"["item","quantity"]"#
        );
    }
}
