use rust_decimal::Decimal;

use crate::table::Table;
use crate::Cpf;

/// The canonical name of the payments column holding the taxpayer identifier.
pub const CPF_COLUMN: &str = "cpf";
/// The canonical name of the payments column holding the amount.
pub const AMOUNT_COLUMN: &str = "valor";
/// The amount of leading master list columns that are used.
pub const MASTER_COLUMNS: usize = 5;
/// The value of the payment type column, the same for every record.
pub const PAYMENT_KIND: &str = "1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("The {0} table was not provided")]
    MissingInput(&'static str),
    #[error(
        "Required column(s) {} not found in the payments table - expected 'cpf' (from '{cpf_source}') and 'valor' (from '{amount_source}')",
        .missing.join(", ")
    )]
    MissingColumns {
        missing: Vec<&'static str>,
        cpf_source: String,
        amount_source: String,
    },
    #[error("The master list needs at least {} columns, but has only {actual}", MASTER_COLUMNS)]
    MasterTooNarrow { actual: usize },
    #[error("Amount '{value}' of the payment in line {line} is not a number")]
    InvalidAmount { line: usize, value: String },
    #[error("None of the payment identifiers was found in the master list")]
    EmptyResult,
    #[error("The sum of the amounts paid to {cpf} is too large")]
    AmountOverflow { cpf: Cpf },
    #[error("The total value of the layout is too large")]
    TotalOverflow,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Options {
    /// The payments column to rename to `cpf`.
    pub cpf_column: String,
    /// The payments column to rename to `valor`.
    pub amount_column: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            cpf_column: "CPF/CNPJ".into(),
            amount_column: "Valor categoria/centro de custo".into(),
        }
    }
}

/// A row of the master list with a valid identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRecord {
    pub agency: String,
    pub account: String,
    pub account_digit: String,
    pub name: String,
    pub cpf: Cpf,
}

/// A row of the payments table with a valid identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub cpf: Cpf,
    /// The signed amount, `None` if the cell was empty.
    pub amount: Option<Decimal>,
    /// The index into the rows of the payments table this record was created from.
    pub row: usize,
}

/// The sum of the absolute amounts of all payments to one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedPayment {
    pub cpf: Cpf,
    pub amount: Decimal,
}

/// One line of the bank payment layout, with fields in column order A to G.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub agency: String,
    /// Zero-padded to 5 digits.
    pub account: String,
    /// Zero-padded to 1 digit.
    pub account_digit: String,
    /// Upper-cased and trimmed.
    pub name: String,
    pub cpf: Cpf,
    /// Always [`PAYMENT_KIND`].
    pub kind: &'static str,
    /// Rounded to 2 decimal places.
    pub amount: Decimal,
}

/// Payments whose identifier is not part of the master list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unmatched {
    /// Distinct identifiers in order of first appearance.
    pub identifiers: Vec<Cpf>,
    /// The unaltered payment rows, with the header of the payments table.
    pub rows: Table,
}

impl Unmatched {
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// The layout, one record per identifier found in both tables.
    pub records: Vec<OutputRecord>,
    pub unmatched: Unmatched,
    /// The sum of all amounts in `records`.
    pub total: Decimal,
}

/// Sum absolute amounts per identifier, keeping identifiers in order of first appearance.
///
/// Refunds and other negative amounts thus add to the payment instead of offsetting it.
pub fn aggregate(payments: &[PaymentRecord]) -> Result<Vec<AggregatedPayment>, Error> {
    let mut index_by_cpf = std::collections::HashMap::<&Cpf, usize>::new();
    let mut out = Vec::<AggregatedPayment>::new();
    for payment in payments {
        let amount = payment.amount.map(|a| a.abs()).unwrap_or_default();
        match index_by_cpf.get(&payment.cpf) {
            Some(&idx) => {
                let sum = &mut out[idx].amount;
                *sum = sum
                    .checked_add(amount)
                    .ok_or_else(|| Error::AmountOverflow {
                        cpf: payment.cpf.clone(),
                    })?;
            }
            None => {
                index_by_cpf.insert(&payment.cpf, out.len());
                out.push(AggregatedPayment {
                    cpf: payment.cpf.clone(),
                    amount,
                });
            }
        }
    }
    Ok(out)
}

/// Zero-fill `value` from the left to `width` characters, keeping a leading sign in front.
pub fn zero_pad(value: &str, width: usize) -> String {
    let (sign, digits) = match value.chars().next() {
        Some(sign @ ('-' | '+')) => (Some(sign), &value[1..]),
        _ => (None, value),
    };
    let len = value.chars().count();
    let mut out = String::with_capacity(width.max(len));
    out.extend(sign);
    out.extend(std::iter::repeat('0').take(width.saturating_sub(len)));
    out.push_str(digits);
    out
}

pub(crate) mod function {
    use std::collections::{HashMap, HashSet};

    use rust_decimal::Decimal;

    use crate::layout::{
        aggregate, zero_pad, Error, MasterRecord, Options, Outcome, OutputRecord, PaymentRecord,
        Unmatched, AMOUNT_COLUMN, CPF_COLUMN, MASTER_COLUMNS, PAYMENT_KIND,
    };
    use crate::table::{Cell, Table};
    use crate::Cpf;

    /// Join `payments` to the `master` list by taxpayer identifier and produce the payment layout.
    ///
    /// Human-readable progress is appended to `progress`, on success as well as on error.
    pub fn build_layout(
        master: Option<&Table>,
        payments: Option<&Table>,
        Options {
            cpf_column,
            amount_column,
        }: &Options,
        progress: &mut Vec<String>,
    ) -> Result<Outcome, Error> {
        let master = master.ok_or(Error::MissingInput("master"))?;
        let payments = payments.ok_or(Error::MissingInput("payments"))?;

        progress.push("Processing started".into());
        progress.push(format!(
            "Master list loaded: {} rows, {} columns",
            master.rows.len(),
            master.width()
        ));
        progress.push(format!(
            "Payments loaded: {} rows, {} columns",
            payments.rows.len(),
            payments.width()
        ));

        let (cpf_index, amount_index) = payment_columns(payments, cpf_column, amount_column)?;
        if master.width() < MASTER_COLUMNS {
            return Err(Error::MasterTooNarrow {
                actual: master.width(),
            });
        }

        let payment_records = payment_records(payments, cpf_index, amount_index)?;
        let master_records: Vec<_> = master
            .rows
            .iter()
            .enumerate()
            .filter_map(|(idx, row)| {
                let record = master_record(row);
                if record.is_none() {
                    log::debug!("Dropping master list row {} without valid identifier", idx + 1);
                }
                record
            })
            .collect();
        progress.push(format!("Payments: {} valid", payment_records.len()));
        progress.push(format!("Master list: {} valid", master_records.len()));

        let unmatched = unmatched(payments, &payment_records, &master_records);
        progress.push(format!(
            "Identifiers not found in master list: {}",
            unmatched.identifiers.len()
        ));
        if !unmatched.is_empty() {
            progress.push(format!(
                "{} payment rows not found in master list",
                unmatched.rows.rows.len()
            ));
        }

        let amount_by_cpf: HashMap<_, _> = aggregate(&payment_records)?
            .into_iter()
            .map(|payment| (payment.cpf, payment.amount))
            .collect();
        let joined = join(&master_records, &amount_by_cpf);
        if joined.is_empty() {
            return Err(Error::EmptyResult);
        }

        let records: Vec<_> = joined.into_iter().map(render).collect();
        let total = records
            .iter()
            .try_fold(Decimal::ZERO, |total, record| total.checked_add(record.amount))
            .ok_or(Error::TotalOverflow)?;
        progress.push(format!(
            "Layout built: {} records, total value {total:.2}",
            records.len()
        ));
        Ok(Outcome {
            records,
            unmatched,
            total,
        })
    }

    /// Return the indices of the identifier and amount columns after renaming the source columns.
    fn payment_columns(
        payments: &Table,
        cpf_column: &str,
        amount_column: &str,
    ) -> Result<(usize, usize), Error> {
        let renamed = |source: &str, canonical: &str| {
            payments
                .headers
                .as_ref()?
                .iter()
                .position(|name| name == source || name == canonical)
        };
        match (
            renamed(cpf_column, CPF_COLUMN),
            renamed(amount_column, AMOUNT_COLUMN),
        ) {
            (Some(cpf), Some(amount)) => Ok((cpf, amount)),
            (cpf, amount) => Err(Error::MissingColumns {
                missing: [(cpf, CPF_COLUMN), (amount, AMOUNT_COLUMN)]
                    .into_iter()
                    .filter_map(|(idx, name)| idx.is_none().then_some(name))
                    .collect(),
                cpf_source: cpf_column.to_owned(),
                amount_source: amount_column.to_owned(),
            }),
        }
    }

    fn payment_records(
        payments: &Table,
        cpf_index: usize,
        amount_index: usize,
    ) -> Result<Vec<PaymentRecord>, Error> {
        let mut out = Vec::new();
        for (row_idx, row) in payments.rows.iter().enumerate() {
            let Some(cpf) = Table::cell(row, cpf_index).to_cpf() else {
                log::debug!(
                    "Dropping payment in line {} without valid identifier",
                    line_of(row_idx)
                );
                continue;
            };
            let amount = match Table::cell(row, amount_index) {
                Cell::Empty => None,
                Cell::Number(n) if n.is_nan() => None,
                cell => {
                    let value = cell.to_string();
                    Some(
                        crate::parse_amount(&value).ok_or_else(|| Error::InvalidAmount {
                            line: line_of(row_idx),
                            value,
                        })?,
                    )
                }
            };
            out.push(PaymentRecord {
                cpf,
                amount,
                row: row_idx,
            });
        }
        Ok(out)
    }

    /// The line in the payments source, counting the header as first line.
    fn line_of(row_idx: usize) -> usize {
        row_idx + 2
    }

    fn master_record(row: &[Cell]) -> Option<MasterRecord> {
        let cpf = Table::cell(row, 4).to_cpf()?;
        let text = |column| Table::cell(row, column).to_string();
        Some(MasterRecord {
            agency: text(0),
            account: text(1),
            account_digit: text(2),
            name: text(3),
            cpf,
        })
    }

    fn unmatched(
        payments: &Table,
        payment_records: &[PaymentRecord],
        master_records: &[MasterRecord],
    ) -> Unmatched {
        let known: HashSet<&Cpf> = master_records.iter().map(|record| &record.cpf).collect();
        let mut seen = HashSet::new();
        let mut out = Unmatched {
            identifiers: Vec::new(),
            rows: Table {
                headers: payments.headers.clone(),
                rows: Vec::new(),
            },
        };
        for payment in payment_records
            .iter()
            .filter(|payment| !known.contains(&payment.cpf))
        {
            if seen.insert(&payment.cpf) {
                out.identifiers.push(payment.cpf.clone());
            }
            out.rows.rows.push(payments.rows[payment.row].clone());
        }
        out
    }

    /// Inner-join master records to the aggregated amounts, one entry per identifier in master list order.
    ///
    /// Duplicate master records for an identifier fill in columns that are still empty, the first value wins.
    fn join(
        master_records: &[MasterRecord],
        amount_by_cpf: &HashMap<Cpf, Decimal>,
    ) -> Vec<(MasterRecord, Decimal)> {
        let mut index_by_cpf = HashMap::<&Cpf, usize>::new();
        let mut out = Vec::<(MasterRecord, Decimal)>::new();
        for record in master_records {
            let Some(amount) = amount_by_cpf.get(&record.cpf) else {
                continue;
            };
            match index_by_cpf.get(&record.cpf) {
                Some(&idx) => {
                    log::warn!(
                        "Master list contains identifier {} more than once, using the first values",
                        record.cpf
                    );
                    let kept = &mut out[idx].0;
                    for (first, duplicate) in [
                        (&mut kept.agency, &record.agency),
                        (&mut kept.account, &record.account),
                        (&mut kept.account_digit, &record.account_digit),
                        (&mut kept.name, &record.name),
                    ] {
                        if first.is_empty() {
                            first.clone_from(duplicate);
                        }
                    }
                }
                None => {
                    index_by_cpf.insert(&record.cpf, out.len());
                    out.push((record.clone(), *amount));
                }
            }
        }
        out
    }

    fn render((record, amount): (MasterRecord, Decimal)) -> OutputRecord {
        OutputRecord {
            agency: record.agency,
            account: zero_pad(&record.account, 5),
            account_digit: zero_pad(&record.account_digit, 1),
            name: record.name.trim().to_uppercase(),
            cpf: record.cpf,
            kind: PAYMENT_KIND,
            amount: amount.round_dp(2),
        }
    }
}
