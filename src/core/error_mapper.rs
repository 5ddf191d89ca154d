//! Classification of transport faults into [`ErrorKind`]s.
//!
//! Host applications can register their own mappings keyed by concrete error
//! type. A registered type matches when it appears anywhere in the fault's
//! `source()` chain, so an interceptor may wrap its own error with
//! [`TransportError::other`] and still be classified precisely. Custom
//! mappings are consulted before the built-in rules.
use std::{error::Error as StdError, io, sync::Arc};

use crate::core::error::{ErrorKind, TransportError};

type Classifier = Arc<dyn Fn(&(dyn StdError + 'static)) -> Option<ErrorKind> + Send + Sync>;

/// Maps faults to error kinds. Cheap to clone.
#[derive(Clone, Default)]
pub struct ErrorMapper {
    custom: Arc<[Classifier]>,
}

impl ErrorMapper {
    /// A mapper with only the built-in rules.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ErrorMapperBuilder {
        ErrorMapperBuilder::default()
    }

    /// Classify a fault.
    pub fn map(&self, fault: &TransportError) -> ErrorKind {
        for cause in error_chain(fault) {
            if let Some(kind) = self.custom.iter().find_map(|classify| classify(cause)) {
                return kind;
            }
        }

        match fault {
            TransportError::Canceled => ErrorKind::Canceled,
            TransportError::TimedOut { .. } => ErrorKind::Timeout,
            TransportError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            TransportError::Connect { .. } => ErrorKind::ConnectionFailed,
            _ if error_chain(fault).any(is_connection_fault) => ErrorKind::ConnectionFailed,
            _ => ErrorKind::UnknownDispatchError,
        }
    }
}

impl std::fmt::Debug for ErrorMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorMapper")
            .field("custom_mappings", &self.custom.len())
            .finish()
    }
}

/// Registers custom mappings before falling back to the built-ins.
#[derive(Default)]
pub struct ErrorMapperBuilder {
    custom: Vec<Classifier>,
}

impl ErrorMapperBuilder {
    /// Map every fault of type `E` to `kind`.
    pub fn map<E>(self, kind: ErrorKind) -> Self
    where
        E: StdError + 'static,
    {
        self.map_with::<E, _>(move |_| kind)
    }

    /// Map faults of type `E` with a function of the concrete error.
    pub fn map_with<E, F>(mut self, classify: F) -> Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> ErrorKind + Send + Sync + 'static,
    {
        self.custom.push(Arc::new(move |cause: &(dyn StdError + 'static)| {
            cause.downcast_ref::<E>().map(&classify)
        }));
        self
    }

    pub fn build(self) -> ErrorMapper {
        ErrorMapper {
            custom: self.custom.into(),
        }
    }
}

fn error_chain(fault: &TransportError) -> impl Iterator<Item = &(dyn StdError + 'static)> {
    std::iter::successors(Some(fault as &(dyn StdError + 'static)), |&cause| cause.source())
}

fn is_connection_fault(cause: &(dyn StdError + 'static)) -> bool {
    cause.downcast_ref::<io::Error>().is_some_and(|io_error| {
        matches!(
            io_error.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::AddrNotAvailable
        )
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use thiserror::Error;

    use super::*;
    use crate::core::error::CircuitOpenError;

    #[derive(Error, Debug)]
    #[error("quota exhausted upstream")]
    struct QuotaExhausted;

    #[derive(Error, Debug)]
    #[error("some other failure")]
    struct SomethingElse;

    #[test]
    fn test_unknown_fault_is_unknown_dispatch_error() {
        let mapper = ErrorMapper::new();
        let kind = mapper.map(&TransportError::other(SomethingElse));
        assert_eq!(kind, ErrorKind::UnknownDispatchError);
    }

    #[test]
    fn test_builtin_classification() {
        let mapper = ErrorMapper::new();

        assert_eq!(mapper.map(&TransportError::Canceled), ErrorKind::Canceled);
        assert_eq!(
            mapper.map(&TransportError::TimedOut {
                after: Duration::from_secs(1)
            }),
            ErrorKind::Timeout
        );
        assert_eq!(
            mapper.map(&TransportError::CircuitOpen(CircuitOpenError {
                route: "/users".to_string()
            })),
            ErrorKind::CircuitOpen
        );
        assert_eq!(
            mapper.map(&TransportError::connect(io::Error::other("dns failure"))),
            ErrorKind::ConnectionFailed
        );
    }

    #[test]
    fn test_io_connection_fault_in_source_chain() {
        let mapper = ErrorMapper::new();
        let fault = TransportError::other(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert_eq!(mapper.map(&fault), ErrorKind::ConnectionFailed);

        let fault = TransportError::other(io::Error::new(io::ErrorKind::InvalidData, "garbage"));
        assert_eq!(mapper.map(&fault), ErrorKind::UnknownDispatchError);
    }

    #[test]
    fn test_custom_mapping_wins_over_builtin() {
        let mapper = ErrorMapper::builder()
            .map::<QuotaExhausted>(ErrorKind::CircuitOpen)
            .map_with::<io::Error, _>(|e| match e.kind() {
                io::ErrorKind::TimedOut => ErrorKind::Timeout,
                _ => ErrorKind::UnknownDispatchError,
            })
            .build();

        assert_eq!(
            mapper.map(&TransportError::other(QuotaExhausted)),
            ErrorKind::CircuitOpen
        );
        // A connect error would be ConnectionFailed by default; the io::Error
        // mapping sees it first.
        let fault = TransportError::connect(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(mapper.map(&fault), ErrorKind::Timeout);
        // Unmatched faults fall back to the built-ins.
        assert_eq!(mapper.map(&TransportError::Canceled), ErrorKind::Canceled);
    }
}
