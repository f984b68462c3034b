use tessera_core::{AppError, LifecycleError, RegistryError};

/// Plugin host failure.
#[derive(Debug)]
pub enum LoaderError {
    /// No artifact with this name exists in the plugin directory.
    ArtifactNotFound(String),
    /// The name is rejected by the include/exclude filter.
    Filtered(String),
    /// The dynamic library could not be opened.
    Open { path: String, message: String },
    /// The artifact does not export the plugin entry symbol.
    Symbol { path: String, message: String },
    Lifecycle(LifecycleError),
    Registry(RegistryError),
}

impl std::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderError::ArtifactNotFound(name) => write!(f, "plugin artifact '{name}' not found"),
            LoaderError::Filtered(name) => {
                write!(f, "plugin '{name}' is excluded by configuration")
            }
            LoaderError::Open { path, message } => {
                write!(f, "failed to open plugin '{path}': {message}")
            }
            LoaderError::Symbol { path, message } => {
                write!(f, "plugin '{path}' has no usable entry symbol: {message}")
            }
            LoaderError::Lifecycle(err) => err.fmt(f),
            LoaderError::Registry(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for LoaderError {}

impl From<LifecycleError> for LoaderError {
    fn from(err: LifecycleError) -> Self {
        LoaderError::Lifecycle(err)
    }
}

impl From<RegistryError> for LoaderError {
    fn from(err: RegistryError) -> Self {
        LoaderError::Registry(err)
    }
}

impl From<LoaderError> for AppError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::ArtifactNotFound(_) => AppError::not_found(err.to_string()),
            LoaderError::Filtered(_) => AppError::bad_request(err.to_string()),
            LoaderError::Open { .. } | LoaderError::Symbol { .. } => {
                AppError::internal(err.to_string())
            }
            LoaderError::Lifecycle(inner) => inner.into(),
            LoaderError::Registry(inner) => inner.into(),
        }
    }
}
