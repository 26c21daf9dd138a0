//! Configuration of a run, usually read from a RON file.
use std::path::Path;

use crate::{layout, sink};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to open configuration file for reading")]
    Open(#[from] std::io::Error),
    #[error("Could not decode the configuration")]
    Decode(#[from] ron::de::SpannedError),
}

/// Everything that can be configured, with defaults for the Itaú payment layout.
///
/// ```ron
/// Config(
///     delimiter: ';',
///     payments: (cpf_column: "CPF", amount_column: "Valor"),
///     output: (format: csv),
/// )
/// ```
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// The delimiter of CSV input files.
    pub delimiter: char,
    pub payments: layout::Options,
    pub output: sink::Options,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            delimiter: ',',
            payments: Default::default(),
            output: Default::default(),
        }
    }
}

/// Read the configuration at `path`; fields it doesn't mention keep their default.
pub fn load(path: &Path) -> Result<Config, Error> {
    Ok(ron::de::from_reader(std::fs::File::open(path)?)?)
}
