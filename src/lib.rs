#![deny(rust_2018_idioms)]

use rust_decimal::Decimal;

pub mod layout;
pub use layout::function::build_layout;

pub mod config;
pub mod sink;
pub mod table;

/// The amount of digits in a normalized taxpayer identifier.
pub const CPF_LEN: usize = 11;

/// A normalized taxpayer identifier (CPF), always exactly [`CPF_LEN`] ASCII digits.
///
/// It can only be obtained through [`normalize_cpf()`], which makes it safe to compare
/// identifiers of both input tables byte by byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cpf(String);

impl Cpf {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cpf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip everything but ASCII digits from `raw` and left-pad what remains with zeros to [`CPF_LEN`] digits.
///
/// Returns `None` if there is no digit at all, or if there are more than [`CPF_LEN`] of them.
pub fn normalize_cpf(raw: &str) -> Option<Cpf> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() || digits.len() > CPF_LEN {
        return None;
    }
    Some(Cpf(format!("{digits:0>width$}", width = CPF_LEN)))
}

/// Parse amounts as typed into payment spreadsheets, like `-25.50`, `1.234,56`, `1,234.56` or `R$ 8,75`.
///
/// Whichever of `.` and `,` comes last is the decimal separator, the other one is taken as thousands separator.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };
    let text = text.strip_prefix("R$").unwrap_or(text).trim_start();
    let decimal_comma = text.rfind(',') > text.rfind('.');
    let number: String = text
        .chars()
        .filter_map(|c| match c {
            ',' if decimal_comma => Some('.'),
            '.' if decimal_comma => None,
            ',' => None,
            c => Some(c),
        })
        .collect();
    let amount: Decimal = number.parse().ok()?;
    Some(if negative { -amount } else { amount })
}
