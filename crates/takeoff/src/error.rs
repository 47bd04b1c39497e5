use takeoff_core::error::ExtractionError;

#[derive(thiserror::Error, Debug, serde::Deserialize, serde::Serialize)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("No line items found: {0}")]
    NoLineItems(String),

    #[error("Layout analysis failed: {0}")]
    LayoutFailure(String),

    #[error("Model output still malformed after {attempts} attempt(s): {message}")]
    MalformedModelOutput { attempts: u32, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<ExtractionError> for Error {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::NoLineItemTable { .. } => Error::NoLineItems(err.to_string()),
            ExtractionError::InvalidPageRange(_) | ExtractionError::ZeroPageBudget => {
                Error::InvalidConfig(err.to_string())
            }
        }
    }
}
