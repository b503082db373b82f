use thiserror::Error;

pub type FdResult<T> = Result<T, FdError>;

#[derive(Error, Debug)]
pub enum FdError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid function id: {raw}")]
    InvalidFunctionId { raw: u32 },
}
