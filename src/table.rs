//! Raw tabular data as it comes out of a CSV file or the first sheet of a spreadsheet.
use std::path::{Path, PathBuf};

use crate::{normalize_cpf, Cpf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("Cannot use '{0}' as delimiter")]
    InvalidDelimiter(char),
    #[error("Could not read from CSV file at '{}'", path.display())]
    ReadCsv {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not open spreadsheet at '{}'", path.display())]
    OpenSpreadsheet {
        path: PathBuf,
        source: calamine::Error,
    },
    #[error("Spreadsheet at '{}' does not contain any sheet", path.display())]
    NoSheet { path: PathBuf },
    #[error("Could not read sheet '{sheet}' of spreadsheet at '{}'", path.display())]
    ReadSheet {
        path: PathBuf,
        sheet: String,
        source: calamine::Error,
    },
}

/// A single value of a table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Return the normalized taxpayer identifier in this cell, or `None` if there is none or it is invalid.
    pub fn to_cpf(&self) -> Option<Cpf> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) if n.is_nan() => None,
            cell => normalize_cpf(&cell.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_owned())
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(text) => f.write_str(text),
            // integers are shown without decimals, the way they were typed into the sheet
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Rows of cells, with an optional header line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// The names of the columns, if the source had a header line.
    pub headers: Option<Vec<String>>,
    /// All non-empty rows, which may have differing lengths.
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// The amount of columns, as determined by the widest row or the header.
    pub fn width(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(self.headers.as_ref().map(Vec::len))
            .max()
            .unwrap_or_default()
    }

    /// Return the cell of `row` at `column`, or an empty cell if the row is too short.
    pub fn cell(row: &[Cell], column: usize) -> &Cell {
        row.get(column).unwrap_or(&Cell::Empty)
    }
}

/// Load the table at `path`, reading `.csv` and `.txt` files as CSV with the given `delimiter`
/// and anything else as spreadsheet.
pub fn load(path: &Path, has_headers: bool, delimiter: char) -> Result<Table, Error> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("txt")
        });
    if is_csv {
        let file = std::fs::File::open(path).map_err(|err| Error::ReadCsv {
            path: path.to_owned(),
            source: err,
        })?;
        read_csv(std::io::BufReader::new(file), has_headers, delimiter)
    } else {
        read_spreadsheet(path, has_headers)
    }
}

/// Read CSV data from `input`, taking the first line as header if `has_headers` is set.
pub fn read_csv(
    input: impl std::io::Read,
    has_headers: bool,
    delimiter: char,
) -> Result<Table, Error> {
    let delimiter = delimiter
        .try_into()
        .map_err(|_| Error::InvalidDelimiter(delimiter))?;
    let mut csv = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(input);

    let headers = if has_headers {
        Some(csv.headers()?.iter().map(ToOwned::to_owned).collect())
    } else {
        None
    };
    let mut rows = Vec::new();
    let mut record = csv::StringRecord::new();
    while csv.read_record(&mut record)? {
        let row: Vec<Cell> = record.iter().map(Cell::from).collect();
        if !row.iter().all(Cell::is_empty) {
            rows.push(row);
        }
    }
    Ok(Table { headers, rows })
}

/// Read the first sheet of the spreadsheet at `path` (xlsx, xls, xlsb or ods), taking the first
/// non-empty row as header if `has_headers` is set.
pub fn read_spreadsheet(path: &Path, has_headers: bool) -> Result<Table, Error> {
    use calamine::Reader;

    let mut workbook =
        calamine::open_workbook_auto(path).map_err(|err| Error::OpenSpreadsheet {
            path: path.to_owned(),
            source: err,
        })?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::NoSheet {
            path: path.to_owned(),
        })?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|err| Error::ReadSheet {
            path: path.to_owned(),
            sheet: sheet.clone(),
            source: err,
        })?;

    // data may not begin at A1, but positions are absolute
    let first_column = range.start().map_or(0, |(_row, column)| column as usize);
    let mut rows = range
        .rows()
        .map(|row| {
            std::iter::repeat(Cell::Empty)
                .take(first_column)
                .chain(row.iter().map(to_cell))
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.iter().all(Cell::is_empty));

    let headers = if has_headers {
        Some(
            rows.next()
                .unwrap_or_default()
                .iter()
                .map(ToString::to_string)
                .collect(),
        )
    } else {
        None
    };
    Ok(Table {
        headers,
        rows: rows.collect(),
    })
}

fn to_cell(data: &calamine::Data) -> Cell {
    use calamine::Data;
    match data {
        Data::Empty => Cell::Empty,
        Data::String(text) => Cell::from(text.as_str()),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.into()),
        Data::Error(err) => Cell::Text(format!("#{err:?}")),
        Data::DateTime(date_time) => Cell::Number(date_time.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => Cell::from(text.as_str()),
    }
}
