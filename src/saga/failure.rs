//! Turns collaborator and validation errors into user-facing failure records.

use crate::domain::FailedRecord;
use crate::error::{DomainError, GatewayError};
use crate::ports::Translator;

pub const DEFAULT_EXCEPTIONS: &str = "default_exceptions";

/// Where a failure came from. Gateway failures may carry a provider message
/// worth keeping when no translation exists.
#[derive(Debug, Clone, Copy)]
pub enum FailureSource<'a> {
    Gateway(&'a GatewayError),
    Domain(&'a DomainError),
}

pub fn failed_record(translator: &dyn Translator, source: FailureSource<'_>) -> FailedRecord {
    match source {
        FailureSource::Gateway(error) => {
            let code = error.code();
            let message = translator.translate(DEFAULT_EXCEPTIONS, code, &[]);
            match error {
                GatewayError::Rejected { message: provider, .. } if message == code => {
                    FailedRecord::new(code, provider.clone())
                }
                _ => FailedRecord::new(code, message),
            }
        }
        FailureSource::Domain(error) => {
            let code = error.code();
            FailedRecord::new(code, translator.translate(DEFAULT_EXCEPTIONS, code, &[]))
        }
    }
}

pub fn gateway_failure(translator: &dyn Translator, error: &GatewayError) -> FailedRecord {
    failed_record(translator, FailureSource::Gateway(error))
}

pub fn domain_failure(translator: &dyn Translator, error: &DomainError) -> FailedRecord {
    failed_record(translator, FailureSource::Domain(error))
}
