use crate::options::Args;
use anyhow::Context;
use clap::Parser;
use paylayout::sink;
use std::path::Path;

mod options {
    use std::path::PathBuf;

    #[derive(Debug, clap::Parser)]
    #[clap(
        name = "paylayout",
        about = "Turn a payment batch and an employee master list into a bank payment layout",
        version
    )]
    pub struct Args {
        /// The employee master list, a spreadsheet or CSV file without header line.
        ///
        /// Columns are agency, account, account digit, name and taxpayer identifier (CPF), in that order.
        #[clap(long, short = 'm')]
        pub master: Option<PathBuf>,
        /// The payment batch, a spreadsheet or CSV file with header line.
        #[clap(long, short = 'p')]
        pub payments: Option<PathBuf>,
        /// The directory to write the layout and the unmatched payments into.
        #[clap(long, short = 'o', default_value = ".")]
        pub output_dir: PathBuf,
        /// A RON file with the configuration to use instead of the defaults.
        #[clap(long, short = 'c')]
        pub config: Option<PathBuf>,
        /// The payments column holding the taxpayer identifier.
        #[clap(long)]
        pub cpf_column: Option<String>,
        /// The payments column holding the amount.
        #[clap(long)]
        pub amount_column: Option<String>,
        /// The kind of output files to write.
        #[clap(long, short = 'f', value_enum)]
        pub format: Option<Format>,
        /// The date to stamp output file names with, like 2024-01-31. Defaults to today.
        #[clap(long, short = 'd', value_parser = parse_date)]
        pub date: Option<time::Date>,
        /// Also write the payments whose identifier isn't part of the master list, if there are any.
        #[clap(long, short = 'u')]
        pub export_unmatched: bool,
        /// Log details about dropped rows.
        #[clap(long, short = 'v')]
        pub verbose: bool,
    }

    #[derive(Debug, Clone, Copy, clap::ValueEnum)]
    pub enum Format {
        Xlsx,
        Csv,
    }

    impl From<Format> for paylayout::sink::Format {
        fn from(value: Format) -> Self {
            match value {
                Format::Xlsx => paylayout::sink::Format::Xlsx,
                Format::Csv => paylayout::sink::Format::Csv,
            }
        }
    }

    fn parse_date(date: &str) -> Result<time::Date, time::error::Parse> {
        static FORMAT: &[time::format_description::FormatItem<'static>] =
            time::macros::format_description!("[year]-[month]-[day]");
        time::Date::parse(date, FORMAT)
    }
}

fn main() -> anyhow::Result<()> {
    let args = options::Args::parse();
    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .parse_default_env()
        .init();

    let Args {
        master,
        payments,
        output_dir,
        config,
        cpf_column,
        amount_column,
        format,
        date,
        export_unmatched,
        verbose: _,
    } = args;
    let mut config = match config {
        Some(path) => paylayout::config::load(&path)
            .with_context(|| format!("Could not load configuration at '{}'", path.display()))?,
        None => Default::default(),
    };
    if let Some(cpf_column) = cpf_column {
        config.payments.cpf_column = cpf_column;
    }
    if let Some(amount_column) = amount_column {
        config.payments.amount_column = amount_column;
    }
    if let Some(format) = format {
        config.output.format = format.into();
    }

    let master = load(master.as_deref(), false, config.delimiter)?;
    let payments = load(payments.as_deref(), true, config.delimiter)?;
    let mut progress = Vec::new();
    let outcome = paylayout::build_layout(
        master.as_ref(),
        payments.as_ref(),
        &config.payments,
        &mut progress,
    );
    for line in progress {
        eprintln!("{line}");
    }
    let outcome = outcome?;

    let date = date.unwrap_or_else(|| {
        time::OffsetDateTime::now_local()
            .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
            .date()
    });
    let output = &config.output;
    let layout_path = output_dir.join(sink::file_name(&output.layout_name, date, output.format)?);
    let layout = sink::layout_bytes(&outcome.records, output).context("Could not render layout")?;
    let unmatched = if export_unmatched && !outcome.unmatched.is_empty() {
        let path = output_dir.join(sink::file_name(&output.unmatched_name, date, output.format)?);
        let data = sink::table_bytes(&outcome.unmatched.rows, output)
            .context("Could not render unmatched payments")?;
        Some((path, data))
    } else {
        None
    };

    sink::write_file(&layout_path, &layout)?;
    eprintln!("Layout written to '{}'", layout_path.display());
    if let Some((path, data)) = unmatched {
        if let Err(err) = sink::write_file(&path, &data) {
            std::fs::remove_file(&layout_path).ok();
            return Err(err.into());
        }
        eprintln!("Unmatched payments written to '{}'", path.display());
    }
    Ok(())
}

fn load(
    path: Option<&Path>,
    has_headers: bool,
    delimiter: char,
) -> anyhow::Result<Option<paylayout::table::Table>> {
    path.map(|p| {
        paylayout::table::load(p, has_headers, delimiter)
            .with_context(|| format!("Could not read table from '{}'", p.display()))
    })
    .transpose()
}
