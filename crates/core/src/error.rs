#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("Workflow template error: {0}")]
    Template(String),
}
