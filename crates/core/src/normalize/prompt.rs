use std::fmt::Write;

use super::types::DocumentContext;
use crate::line_items::RawItem;

/// System preamble for every normalization call.
pub const NORMALIZATION_PREAMBLE: &str = "\
You normalize procurement line items extracted from engineering documents \
(RFQs, material take-offs, purchase orders).

Your job is normalization only:
- convert units and split quantities from weights and lengths;
- extract the material specification (grade, standard, rating) from the text;
- keep sizes exactly as written.

You must never add, remove, merge, split or reorder line items. Return one \
output item per input item, in the same order, each carrying the raw_index \
of the input item it came from. Reply with JSON only.";

const OUTPUT_CONTRACT: &str = r#"{
  "document_understanding": { "document_type": string, "summary": string },
  "metadata": { "project": string|null, "document_number": string|null, "revision": string|null },
  "items": [
    {
      "raw_index": integer,
      "description": string|null,
      "material_spec": string|null,
      "quantity": integer|null,
      "unit": string|null,
      "size": string|null,
      "weight_kg": number|null,
      "length_m": number|null,
      "area_m2": number|null,
      "remarks": string|null
    }
  ],
  "extraction_notes": string,
  "confidence": number between 0 and 1
}"#;

/// Build the user prompt for the first normalization call.
pub fn build_normalization_prompt(
    items: &[RawItem],
    context: &DocumentContext,
    max_context_chars: usize,
) -> String {
    let mut prompt = String::new();
    write_context(&mut prompt, context, max_context_chars);
    write_items(&mut prompt, items);
    write_contract(&mut prompt, items.len());
    prompt
}

/// Build the prompt for the single repair call after a count mismatch.
pub fn build_repair_prompt(
    items: &[RawItem],
    context: &DocumentContext,
    received: usize,
    max_context_chars: usize,
) -> String {
    let expected = items.len();
    let mut prompt = format!(
        "Your previous answer contained {received} items, but the document has exactly \
         {expected} raw line items. The item count is fixed: produce exactly {expected} \
         items, one for each numbered raw item below, and do not merge, split, drop or \
         invent rows. Rows that look empty or repeated still get their own output item.\n\n"
    );
    write_context(&mut prompt, context, max_context_chars);
    write_items(&mut prompt, items);
    write_contract(&mut prompt, expected);
    prompt
}

/// At most `max_chars` characters of `text`, marking the cut.
pub fn trim_context(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n[... truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

fn write_context(prompt: &mut String, context: &DocumentContext, max_context_chars: usize) {
    prompt.push_str("## Document\n");
    if let Some(source) = &context.source {
        let _ = writeln!(prompt, "Source: {source}");
    }
    if let Some(pages) = context.page_range {
        let _ = writeln!(prompt, "Pages: {pages}");
    }
    let text = trim_context(&context.text, max_context_chars);
    if !text.is_empty() {
        let _ = writeln!(prompt, "Text excerpt:\n<<<\n{text}\n>>>");
    }
    prompt.push('\n');
}

fn write_items(prompt: &mut String, items: &[RawItem]) {
    let _ = writeln!(
        prompt,
        "## Raw line items ({} items, immutable list)",
        items.len()
    );
    for item in items {
        let text = item.text();
        if text.is_empty() {
            let _ = writeln!(prompt, "[{}] (empty row)", item.index);
        } else {
            let _ = writeln!(prompt, "[{}] {text}", item.index);
        }
    }
    prompt.push('\n');
}

fn write_contract(prompt: &mut String, expected: usize) {
    let _ = writeln!(
        prompt,
        "## Output\nReturn exactly {expected} items. Set raw_index to the number in brackets. \
         A quantity is a piece count (EA, PCS, SET); weights go to weight_kg, lengths to \
         length_m and areas to area_m2. Respond with a single JSON object of this shape:\n\
         {OUTPUT_CONTRACT}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_items::RawField;
    use crate::table::PageRange;

    fn item(index: usize, fields: &[(&str, &str)]) -> RawItem {
        RawItem {
            index,
            page: None,
            fields: fields
                .iter()
                .map(|(h, v)| RawField {
                    header: h.to_string(),
                    value: v.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_prompt_lists_items_and_count() {
        let items = vec![
            item(0, &[("Item", "1"), ("Detail", "Elbow 90")]),
            item(1, &[("Item", ""), ("Detail", "")]),
        ];
        let context = DocumentContext {
            source: Some("mto.pdf".into()),
            page_range: Some(PageRange { start: 2, end: 3 }),
            text: "MATERIAL TAKE-OFF".into(),
        };

        let prompt = build_normalization_prompt(&items, &context, 4000);

        assert!(prompt.contains("[0] Item: \"1\" | Detail: \"Elbow 90\""));
        assert!(prompt.contains("[1] (empty row)"));
        assert!(prompt.contains("Return exactly 2 items"));
        assert!(prompt.contains("Pages: 2-3"));
        assert!(prompt.contains("MATERIAL TAKE-OFF"));
    }

    #[test]
    fn test_repair_prompt_states_both_counts() {
        let items = vec![item(0, &[("Qty", "2")]); 3];
        let prompt = build_repair_prompt(&items, &DocumentContext::default(), 2, 100);
        assert!(prompt.starts_with("Your previous answer contained 2 items"));
        assert!(prompt.contains("exactly 3 raw line items"));
        assert!(!prompt.contains("Text excerpt"));
    }

    #[test]
    fn test_context_is_trimmed_on_char_boundary() {
        assert_eq!(trim_context("ábcdé", 3), "ábc\n[... truncated]");
        assert_eq!(trim_context("  short ", 10), "short");
    }
}
