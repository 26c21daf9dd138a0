//! Rendering the layout and the unmatched payments as spreadsheet or CSV files.
//!
//! Files are rendered into memory first so that nothing is written unless all outputs could be produced.
use std::path::{Path, PathBuf};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::layout::OutputRecord;
use crate::table::{Cell, Table};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("Cannot use '{0}' as delimiter")]
    InvalidDelimiter(char),
    #[error("Could not write output file at '{}'", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not format the date stamp of the output file name")]
    DateStamp(#[from] time::error::Format),
    #[error("Amount {0} cannot be stored as spreadsheet number")]
    Amount(Decimal),
}

/// The kind of file to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Xlsx,
    Csv,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Xlsx => "xlsx",
            Format::Csv => "csv",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Options {
    pub format: Format,
    /// The delimiter of CSV output.
    pub delimiter: char,
    /// The name of the single sheet in spreadsheet output.
    pub sheet_name: String,
    /// The number format of the amount column in spreadsheet output.
    pub amount_format: String,
    /// The file name of the layout, without date stamp and extension.
    pub layout_name: String,
    /// The file name of the unmatched payments, without date stamp and extension.
    pub unmatched_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            format: Format::Xlsx,
            delimiter: ',',
            sheet_name: "Sheet1".into(),
            amount_format: "#,##0.00".into(),
            layout_name: "layout_itau".into(),
            unmatched_name: "unmatched_payments".into(),
        }
    }
}

/// Return `<base>_<YYYYMMDD>.<extension>`.
pub fn file_name(base: &str, date: time::Date, format: Format) -> Result<String, Error> {
    static STAMP: &[time::format_description::FormatItem<'static>] =
        time::macros::format_description!("[year][month][day]");
    Ok(format!(
        "{base}_{}.{}",
        date.format(STAMP)?,
        format.extension()
    ))
}

/// Render `records` without header line, amounts with 2 decimal places.
pub fn layout_bytes(records: &[OutputRecord], options: &Options) -> Result<Vec<u8>, Error> {
    match options.format {
        Format::Csv => {
            let mut out = csv_writer(options.delimiter)?;
            for record in records {
                let amount = format!("{:.2}", record.amount);
                out.write_record([
                    record.agency.as_str(),
                    record.account.as_str(),
                    record.account_digit.as_str(),
                    record.name.as_str(),
                    record.cpf.as_str(),
                    record.kind,
                    amount.as_str(),
                ])?;
            }
            csv_bytes(out)
        }
        Format::Xlsx => {
            let mut workbook = rust_xlsxwriter::Workbook::new();
            let sheet = workbook.add_worksheet().set_name(&options.sheet_name)?;
            let amount_format =
                rust_xlsxwriter::Format::new().set_num_format(&options.amount_format);
            for (row, record) in (0u32..).zip(records) {
                sheet.write_string(row, 0, &record.agency)?;
                sheet.write_string(row, 1, &record.account)?;
                sheet.write_string(row, 2, &record.account_digit)?;
                sheet.write_string(row, 3, &record.name)?;
                sheet.write_string(row, 4, record.cpf.as_str())?;
                sheet.write_string(row, 5, record.kind)?;
                let amount = record
                    .amount
                    .to_f64()
                    .ok_or(Error::Amount(record.amount))?;
                sheet.write_number_with_format(row, 6, amount, &amount_format)?;
            }
            Ok(workbook.save_to_buffer()?)
        }
    }
}

/// Render `table`, with its header line if it has one.
pub fn table_bytes(table: &Table, options: &Options) -> Result<Vec<u8>, Error> {
    match options.format {
        Format::Csv => {
            let mut out = csv_writer(options.delimiter)?;
            if let Some(headers) = &table.headers {
                out.write_record(headers)?;
            }
            for row in &table.rows {
                out.write_record(row.iter().map(ToString::to_string))?;
            }
            csv_bytes(out)
        }
        Format::Xlsx => {
            let mut workbook = rust_xlsxwriter::Workbook::new();
            let sheet = workbook.add_worksheet().set_name(&options.sheet_name)?;
            let mut row = 0u32;
            if let Some(headers) = &table.headers {
                for (column, header) in (0u16..).zip(headers) {
                    sheet.write_string(row, column, header)?;
                }
                row += 1;
            }
            for cells in &table.rows {
                for (column, cell) in (0u16..).zip(cells) {
                    match cell {
                        Cell::Empty => {}
                        Cell::Text(text) => {
                            sheet.write_string(row, column, text)?;
                        }
                        Cell::Number(n) => {
                            sheet.write_number(row, column, *n)?;
                        }
                    }
                }
                row += 1;
            }
            Ok(workbook.save_to_buffer()?)
        }
    }
}

fn csv_writer(delimiter: char) -> Result<csv::Writer<Vec<u8>>, Error> {
    let delimiter = delimiter
        .try_into()
        .map_err(|_| Error::InvalidDelimiter(delimiter))?;
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(Vec::new()))
}

fn csv_bytes(out: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, Error> {
    out.into_inner()
        .map_err(|err| Error::Csv(err.into_error().into()))
}

/// Write rendered `data` to `path` in one go.
pub fn write_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    std::fs::write(path, data).map_err(|err| Error::Write {
        path: path.to_owned(),
        source: err,
    })
}
