//! Command-line Error Types

use derive_more::{Display, Error};

pub type Result<T> = std::result::Result<T, exn::Exn<ErrorKind>>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not read the ramp-up model catalog")]
    Models,
    #[display("unknown ramp-up model: {_0}")]
    UnknownModel(#[error(not(source))] String),
    #[display("ramp-up model '{_0}' cannot remove dynamic difficulty")]
    NotARemover(#[error(not(source))] String),
    #[display("difficulty engine unavailable")]
    Engine,
    #[display("nothing to process")]
    NoWork,
    #[display("batch failed")]
    Batch,
}
