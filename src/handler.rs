//! Arity-tagged message handlers.
//!
//! A handler's arity is fixed when the subscription is built, so dispatch
//! never has to inspect a callable's signature.

use crate::error::BrokerError;
use crate::types::Payload;
use std::any::{type_name, Any};
use std::fmt;

/// Boxed error returned by a failing handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler invocation produces once normalized.
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Return types accepted from handler closures.
///
/// Implemented for `()` (infallible handlers) and for `Result<(), E>`.
pub trait HandlerOutput {
    fn into_result(self) -> HandlerResult;
}

impl HandlerOutput for () {
    fn into_result(self) -> HandlerResult {
        Ok(())
    }
}

impl<E> HandlerOutput for std::result::Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_result(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

type NullaryFn = dyn Fn() -> HandlerResult + Send + Sync;
type UnaryFn = dyn Fn(Option<Payload<'_>>) -> HandlerResult + Send + Sync;

/// A subscription callback, tagged by arity.
pub enum Handler {
    /// Takes no argument; any published payload is ignored.
    Nullary(Box<NullaryFn>),
    /// Takes the published payload, or `None` for a topic-only publish.
    Unary(Box<UnaryFn>),
}

impl Handler {
    pub fn nullary<F, R>(handler: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        Handler::Nullary(Box::new(move || handler().into_result()))
    }

    pub fn unary<F, R>(handler: F) -> Self
    where
        F: Fn(Option<Payload<'_>>) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        Handler::Unary(Box::new(move |payload: Option<Payload<'_>>| {
            handler(payload).into_result()
        }))
    }

    /// A handler that receives the payload as a [`Payload`] view. Pair with a
    /// type filter so it is only reached by publishes that carry a payload.
    pub fn dynamic<F, R>(handler: F) -> Self
    where
        F: Fn(Payload<'_>) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        Handler::unary(move |payload: Option<Payload<'_>>| -> HandlerResult {
            let payload = payload.ok_or(BrokerError::MissingPayload {
                expected: "dynamic",
            })?;
            handler(payload).into_result()
        })
    }

    /// A handler that receives the payload as `&T`, directly or through a
    /// declared supertype.
    pub fn typed<T, F, R>(handler: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        Handler::unary(move |payload: Option<Payload<'_>>| -> HandlerResult {
            let payload = payload.ok_or(BrokerError::MissingPayload {
                expected: type_name::<T>(),
            })?;
            let value = payload
                .downcast_ref::<T>()
                .ok_or_else(|| BrokerError::PayloadMismatch {
                    expected: type_name::<T>(),
                    found: payload.message_type().name(),
                })?;
            handler(value).into_result()
        })
    }

    pub fn arity(&self) -> usize {
        match self {
            Handler::Nullary(_) => 0,
            Handler::Unary(_) => 1,
        }
    }

    /// Invoke with the published payload, passing it only to unary handlers.
    pub(crate) fn call(&self, payload: Option<Payload<'_>>) -> HandlerResult {
        match self {
            Handler::Nullary(f) => f(),
            Handler::Unary(f) => f(payload),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Nullary(_) => f.write_str("Handler::Nullary"),
            Handler::Unary(_) => f.write_str("Handler::Unary"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageType;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_nullary_ignores_payload() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let handler = Handler::nullary(move || *counter.lock() += 1);

        let ty = MessageType::of::<i32>();
        let value = 7i32;
        handler.call(Some(Payload::new(&value, &ty))).unwrap();
        handler.call(None).unwrap();

        assert_eq!(handler.arity(), 0);
        assert_eq!(*calls.lock(), 2);
    }

    #[test]
    fn test_typed_receives_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = Handler::typed(move |s: &String| sink.lock().push(s.clone()));

        let ty = MessageType::of::<String>();
        let value = "hello".to_string();
        handler.call(Some(Payload::new(&value, &ty))).unwrap();

        assert_eq!(handler.arity(), 1);
        assert_eq!(*seen.lock(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_typed_rejects_mislabelled_payload() {
        let handler = Handler::typed(|_: &i32| ());

        // Published under the i32 token but actually a string
        let ty = MessageType::of::<i32>();
        let value = "not a number".to_string();
        let err = handler.call(Some(Payload::new(&value, &ty))).unwrap_err();

        let err = err.downcast::<BrokerError>().unwrap();
        assert!(matches!(*err, BrokerError::PayloadMismatch { .. }));
    }

    #[test]
    fn test_typed_without_payload_fails() {
        let handler = Handler::typed(|_: &i32| ());
        let err = handler.call(None).unwrap_err();
        assert!(err.to_string().contains("i32"));
    }

    #[test]
    fn test_fallible_handler_error_is_returned() {
        let handler = Handler::nullary(|| -> Result<(), String> { Err("boom".to_string()) });
        let err = handler.call(None).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
