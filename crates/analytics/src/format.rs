//! Text helpers for guidance titles and messages.

/// Whole-dollar amount with thousands separators, e.g. `$12,345`.
pub fn currency(amount: f64) -> String {
    let rounded = amount.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}")
}

pub fn percent(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}%")
}

/// `"1 campaign"` / `"3 campaigns"`.
pub fn plural(count: impl Into<f64>, noun: &str) -> String {
    let count = count.into();
    let suffix = if (count - 1.0).abs() < f64::EPSILON { "" } else { "s" };
    if count.fract() == 0.0 {
        format!("{count:.0} {noun}{suffix}")
    } else {
        format!("{count:.1} {noun}{suffix}")
    }
}

/// Compact email count, e.g. `12.5k`.
pub fn compact(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}k", value / 1_000.0)
    } else {
        format!("{value:.0}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_grouping() {
        assert_eq!(currency(0.0), "$0");
        assert_eq!(currency(999.4), "$999");
        assert_eq!(currency(1234.5), "$1,235");
        assert_eq!(currency(1_234_567.0), "$1,234,567");
        assert_eq!(currency(-2500.0), "-$2,500");
    }

    #[test]
    fn test_plural_and_compact() {
        assert_eq!(plural(1, "campaign"), "1 campaign");
        assert_eq!(plural(3, "campaign"), "3 campaigns");
        assert_eq!(plural(2.5, "week"), "2.5 weeks");
        assert_eq!(compact(12_500.0), "12.5k");
        assert_eq!(compact(950.0), "950");
    }
}
