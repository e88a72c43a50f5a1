use uuid::Uuid;

pub use crate::error::IdError;

/// Produces volume IDs. IDs never repeat for the lifetime of the process.
pub trait IdSource: Send + Sync + 'static {
  fn generate(&self) -> Result<String, IdError>;
}

/// Random version 4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSource;

impl IdSource for UuidSource {
  fn generate(&self) -> Result<String, IdError> {
    Ok(Uuid::new_v4().to_string())
  }
}

impl<F> IdSource for F
where
  F: Fn() -> Result<String, IdError> + Send + Sync + 'static,
{
  fn generate(&self) -> Result<String, IdError> {
    self()
  }
}
