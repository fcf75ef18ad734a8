use crate::config::types::{Result, SnipboxError};
use crate::judge::adapter::LanguageAdapter;
use crate::judge::languages::python::PythonAdapter;
use std::sync::Arc;

/// The one language this service executes.
pub const SUPPORTED_LANGUAGE: &str = "python";

/// Match a boundary language value case-insensitively against the supported
/// language. The error message names the offending value verbatim.
pub fn canonical_language(language: &str) -> Result<&'static str> {
    if language.eq_ignore_ascii_case(SUPPORTED_LANGUAGE) {
        Ok(SUPPORTED_LANGUAGE)
    } else {
        Err(SnipboxError::Validation(format!(
            "Language {} not supported. Only Python is supported.",
            language
        )))
    }
}

pub fn adapter_for(language: &str) -> Result<Arc<dyn LanguageAdapter>> {
    match canonical_language(language)? {
        SUPPORTED_LANGUAGE => Ok(Arc::new(PythonAdapter)),
        other => Err(SnipboxError::Config(format!(
            "no adapter registered for language: {other}"
        ))),
    }
}
