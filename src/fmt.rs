/// Format integer cents as a dollar amount with thousands separators: $1,234.56
pub fn money(cents: i64) -> String {
    let negative = cents < 0;
    let abs = cents.unsigned_abs();
    let int_part = (abs / 100).to_string();
    let dec_part = abs % 100;

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("-${with_commas}.{dec_part:02}")
    } else {
        format!("${with_commas}.{dec_part:02}")
    }
}

/// Parse a bank-feed amount string into integer cents.
/// Accepts commas, quotes, a currency symbol, and parenthesized negatives.
pub fn parse_amount_cents(raw: &str) -> Option<i64> {
    let s = raw.replace(',', "").replace('"', "").replace('$', "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return parse_amount_cents(inner).map(|c| -c);
    }
    let negative = s.starts_with('-');
    let s = s.trim_start_matches(['-', '+']);

    let (int_part, dec_part) = match s.split_once('.') {
        Some((i, d)) => (i, d),
        None => (s, ""),
    };
    let dollars: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    // Normalize the fraction to exactly two digits
    let mut dec = dec_part.to_string();
    if dec.len() > 2 || dec.chars().any(|c| !c.is_ascii_digit()) {
        return None;
    }
    while dec.len() < 2 {
        dec.push('0');
    }
    let cents_frac: i64 = dec.parse().ok()?;
    let total = dollars * 100 + cents_frac;
    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(123456), "$1,234.56");
        assert_eq!(money(-50000), "-$500.00");
        assert_eq!(money(0), "$0.00");
        assert_eq!(money(100000099), "$1,000,000.99");
        assert_eq!(money(4210), "$42.10");
        assert_eq!(money(5), "$0.05");
    }

    #[test]
    fn test_parse_amount_cents() {
        assert_eq!(parse_amount_cents("1,234.56"), Some(123456));
        assert_eq!(parse_amount_cents("\"500.00\""), Some(50000));
        assert_eq!(parse_amount_cents("  -42.50  "), Some(-4250));
        assert_eq!(parse_amount_cents("0"), Some(0));
        assert_eq!(parse_amount_cents("54.3"), Some(5430));
        assert_eq!(parse_amount_cents("not_a_number"), None);
        assert_eq!(parse_amount_cents(""), None);
    }

    #[test]
    fn test_parse_amount_parenthesized_negatives() {
        assert_eq!(parse_amount_cents("(500.00)"), Some(-50000));
        assert_eq!(parse_amount_cents("(1,234.56)"), Some(-123456));
        assert_eq!(parse_amount_cents("\"(50.00)\""), Some(-5000));
    }

    #[test]
    fn test_parse_amount_currency_symbol() {
        assert_eq!(parse_amount_cents("$1,234.56"), Some(123456));
        assert_eq!(parse_amount_cents("-$50.00"), Some(-5000));
    }

    #[test]
    fn test_parse_rejects_excess_precision() {
        assert_eq!(parse_amount_cents("1.234"), None);
    }
}
