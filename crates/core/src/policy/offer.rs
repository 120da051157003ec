//! Extraction of price signals from free-form buyer text.
//!
//! Buyers write amounts in many shapes: `80000`, `80.000`, `Rp 80.000`,
//! `80rb`, `80 ribu`, `1jt`. The negotiation branches compare exact integer
//! rupiah, so everything here stays in integer arithmetic.

pub fn extract_offer(text: &str) -> Option<i64> {
    let tokens = tokenize(&normalize_text(text));
    let mut offer = None;

    let mut index = 0;
    while index < tokens.len() {
        let token = &tokens[index];
        if let Some(amount) = parse_money_token(token) {
            // A bare number followed by a standalone multiplier word:
            // "80 ribu" -> 80_000.
            if is_plain_number(token) {
                if let Some(multiplier) =
                    tokens.get(index + 1).and_then(|next| word_multiplier(next))
                {
                    offer = amount.checked_mul(multiplier).or(offer);
                    index += 2;
                    continue;
                }
            }
            offer = Some(amount);
        }
        index += 1;
    }

    offer
}

/// True when the buyer asks for a flat best price without naming an amount.
pub fn is_best_price_query(text: &str) -> bool {
    let normalized = normalize_text(text);
    if normalized.contains("harga pas")
        || normalized.contains("harga net")
        || normalized.contains("best price")
        || normalized.contains("paling murah")
    {
        return true;
    }

    tokenize(&normalized)
        .iter()
        .any(|token| matches!(token.as_str(), "net" | "nett" | "netnya" | "nettnya"))
}

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || character == '.' {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_matches('.').to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_plain_number(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|character| character.is_ascii_digit())
}

fn word_multiplier(token: &str) -> Option<i64> {
    match token {
        "rb" | "ribu" => Some(1_000),
        "jt" | "juta" => Some(1_000_000),
        _ => None,
    }
}

fn parse_money_token(token: &str) -> Option<i64> {
    let trimmed = token.strip_prefix("rp").unwrap_or(token);
    if trimmed.is_empty() {
        return None;
    }

    let (number_part, multiplier) = if let Some(prefix) = strip_suffix_any(trimmed, &["ribu", "rb"])
    {
        (prefix, 1_000)
    } else if let Some(prefix) = strip_suffix_any(trimmed, &["juta", "jt"]) {
        (prefix, 1_000_000)
    } else if let Some(prefix) = trimmed.strip_suffix('k') {
        (prefix, 1_000)
    } else {
        (trimmed, 1)
    };

    let digits = collapse_thousands_separators(number_part)?;
    let amount = digits.parse::<i64>().ok()?;
    amount.checked_mul(multiplier)
}

fn strip_suffix_any<'a>(token: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes.iter().find_map(|suffix| token.strip_suffix(suffix))
}

/// Accepts `80000` and dotted groupings like `80.000` or `1.250.000`;
/// anything else (decimals, stray dots) is not a price token.
fn collapse_thousands_separators(token: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    if !token.contains('.') {
        return is_plain_number(token).then(|| token.to_string());
    }

    let mut groups = token.split('.');
    let head = groups.next()?;
    if head.is_empty() || head.len() > 3 || !is_plain_number(head) {
        return None;
    }

    let mut digits = head.to_string();
    for group in groups {
        if group.len() != 3 || !is_plain_number(group) {
            return None;
        }
        digits.push_str(group);
    }
    Some(digits)
}

#[cfg(test)]
mod tests {
    use super::{extract_offer, is_best_price_query};

    #[test]
    fn extracts_bare_amounts() {
        assert_eq!(extract_offer("mau 50000"), Some(50_000));
        assert_eq!(extract_offer("80000 deal ga"), Some(80_000));
    }

    #[test]
    fn extracts_formatted_and_suffixed_amounts() {
        struct Case {
            text: &'static str,
            expected: Option<i64>,
        }

        let cases = vec![
            Case { text: "boleh Rp 80.000?", expected: Some(80_000) },
            Case { text: "80rb gimana bang", expected: Some(80_000) },
            Case { text: "80 ribu deh", expected: Some(80_000) },
            Case { text: "kalau 1jt?", expected: Some(1_000_000) },
            Case { text: "1.250.000 bisa?", expected: Some(1_250_000) },
            Case { text: "75k aja ya", expected: Some(75_000) },
            Case { text: "rp50.000 cukup?", expected: Some(50_000) },
            Case { text: "barangnya bagus ga?", expected: None },
            Case { text: "net berapa?", expected: None },
        ];

        for case in cases {
            assert_eq!(extract_offer(case.text), case.expected, "text: {}", case.text);
        }
    }

    #[test]
    fn later_amounts_supersede_earlier_ones() {
        assert_eq!(extract_offer("tadi 50000, sekarang 60000 deh"), Some(60_000));
    }

    #[test]
    fn malformed_groupings_are_not_prices() {
        assert_eq!(extract_offer("kode 12.34 ya"), None);
        assert_eq!(extract_offer("harga 1.2.3"), None);
    }

    #[test]
    fn detects_best_price_queries() {
        assert!(is_best_price_query("net berapa?"));
        assert!(is_best_price_query("netnya berapa bos"));
        assert!(is_best_price_query("harga pas nya dong"));
        assert!(is_best_price_query("best price please"));
        assert!(!is_best_price_query("ada internet di sini?"));
        assert!(!is_best_price_query("mau 50000"));
    }
}
