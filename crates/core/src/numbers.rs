//! Lenient numeric parsing for OCR'd cells.
//!
//! Procurement documents mix `1,234.5` and `1.234,5` conventions, and OCR
//! tends to leave stray spaces inside numbers. These helpers accept both
//! conventions and report which decimal separator was used so callers can
//! tell a piece count from a European-formatted weight.

/// Decimal separator detected in a numeric cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalSeparator {
    Dot,
    Comma,
}

/// Work out which character (if any) acts as the decimal separator.
///
/// Returns `None` when the cell has no fractional part.
pub fn decimal_separator(cell: &str) -> Option<DecimalSeparator> {
    let compact: String = cell.chars().filter(|c| !c.is_whitespace()).collect();
    let last_dot = compact.rfind('.');
    let last_comma = compact.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            if comma > dot {
                Some(DecimalSeparator::Comma)
            } else {
                Some(DecimalSeparator::Dot)
            }
        }
        (None, Some(comma)) => {
            let commas = compact.matches(',').count();
            let digits_after = compact[comma + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .count();
            // A single comma followed by exactly three digits reads as a
            // thousands separator ("1,250").
            if commas == 1 && digits_after != 3 && digits_after > 0 {
                Some(DecimalSeparator::Comma)
            } else {
                None
            }
        }
        (Some(_), None) => {
            if compact.matches('.').count() == 1 {
                Some(DecimalSeparator::Dot)
            } else {
                None
            }
        }
        (None, None) => None,
    }
}

/// True when the cell writes its fraction with a comma (`12,5`, `1.234,50`).
pub fn uses_decimal_comma(cell: &str) -> bool {
    parse_number(cell).is_some() && decimal_separator(cell) == Some(DecimalSeparator::Comma)
}

/// Parse a numeric cell, accepting thousands separators and either decimal
/// convention. Returns `None` for anything that is not purely a number.
pub fn parse_number(cell: &str) -> Option<f64> {
    let compact: String = cell
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if compact.is_empty() || !compact.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match decimal_separator(&compact) {
        Some(DecimalSeparator::Comma) => compact.replace('.', "").replace(',', "."),
        Some(DecimalSeparator::Dot) => compact.replace(',', ""),
        None => compact.replace([',', '.'], ""),
    };

    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// True when the cell parses as a number.
pub fn is_numeric(cell: &str) -> bool {
    parse_number(cell).is_some()
}
