//! File-level import errors
//!
//! Row-level validation problems are never errors: they are stored as data on
//! the row. Everything here aborts processing of one batch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    /// The binary is not a readable spreadsheet
    #[error("Arquivo inválido: {0}")]
    Parse(String),

    #[error("Cabeçalho não encontrado")]
    MissingHeader,

    /// One line per missing mandatory column
    #[error("{0}")]
    HeaderValidation(String),

    #[error("Erro ao consultar fluxos: {0}")]
    ReferenceData(#[source] anyhow::Error),

    #[error("Erro ao salvar importação: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Formato de arquivo inválido: {0}")]
    UnsupportedFileType(String),

    #[error("Arquivo não inserido.")]
    EmptyUpload,

    #[error("Lote {0} não encontrado")]
    BatchNotFound(i64),
}

impl From<calamine::Error> for ImportError {
    fn from(e: calamine::Error) -> Self {
        ImportError::Parse(e.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(e: csv::Error) -> Self {
        ImportError::Parse(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for ImportError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        ImportError::Parse(e.to_string())
    }
}
