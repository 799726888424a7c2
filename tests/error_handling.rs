//! Error handling and edge case tests.

use msgbus::{Broker, BrokerError, Handler, MessageType, Owner, TopicMatcher};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

fn buffer() -> Arc<Mutex<String>> {
    Arc::new(Mutex::new(String::new()))
}

// --- Subscribe Errors ---

#[test]
fn test_invalid_pattern_rejected_at_subscribe() {
    let broker = Broker::new();

    let result = broker.subscribe_signal_pattern(Owner::anonymous(), "(unclosed", || ());
    assert!(matches!(result, Err(BrokerError::InvalidPattern(_))));

    let result = broker.subscribe_pattern(Owner::anonymous(), "[z-a]", |_: &i32| ());
    assert!(matches!(result, Err(BrokerError::InvalidPattern(_))));

    // Nothing was registered
    assert_eq!(broker.subscription_count(), 0);
}

// --- Handler Failures ---

#[test]
fn test_handler_error_aborts_remaining_deliveries() {
    let broker = Broker::new();
    let out = buffer();

    let sink = Arc::clone(&out);
    broker.subscribe_signal(Owner::anonymous(), "t", move || sink.lock().push('1'));
    let failing = broker.subscribe_signal(Owner::anonymous(), "t", || -> Result<(), String> {
        Err("handler exploded".to_string())
    });
    let sink = Arc::clone(&out);
    broker.subscribe_signal(Owner::anonymous(), "t", move || sink.lock().push('3'));

    let err = broker.publish("t").unwrap_err();
    match &err {
        BrokerError::Handler { subscription, source } => {
            assert_eq!(*subscription, failing.id());
            assert_eq!(source.to_string(), "handler exploded");
        }
        other => panic!("Expected Handler error, got {:?}", other),
    }

    // Earlier handler ran, later one did not
    assert_eq!(*out.lock(), "1");

    // The failure is per call; removing the culprit restores delivery
    failing.unsubscribe();
    broker.publish("t").unwrap();
    assert_eq!(*out.lock(), "113");
}

#[test]
fn test_typed_handler_error_propagates() {
    let broker = Broker::new();

    broker.subscribe_topic(Owner::anonymous(), "n", |n: &i32| {
        if *n < 0 {
            Err(format!("negative: {n}"))
        } else {
            Ok(())
        }
    });

    broker.publish_object_to("n", &1i32).unwrap();
    let err = broker.publish_object_to("n", &-1i32).unwrap_err();
    assert!(err.to_string().contains("negative: -1"));
}

#[test]
fn test_handler_panic_leaves_broker_usable() {
    let broker = Broker::new();
    let out = buffer();

    broker.subscribe_signal(Owner::anonymous(), "boom", || -> () {
        panic!("handler panicked")
    });
    let sink = Arc::clone(&out);
    broker.subscribe_signal(Owner::anonymous(), "ok", move || sink.lock().push('k'));

    let result = panic::catch_unwind(AssertUnwindSafe(|| broker.publish("boom")));
    assert!(result.is_err());

    // The registry lock was not held while the handler ran
    broker.publish("ok").unwrap();
    assert_eq!(*out.lock(), "k");
    assert_eq!(broker.subscription_count(), 2);
}

// --- Payload Mismatches ---

#[test]
fn test_mislabelled_payload_is_reported() {
    let broker = Broker::new();
    broker.subscribe_type(Owner::anonymous(), |_: &i32| ());

    // Published under the i32 token, but the value is a string
    let value = "not a number".to_string();
    let err = broker
        .publish_typed(None, &MessageType::of::<i32>(), &value)
        .unwrap_err();

    let BrokerError::Handler { source, .. } = err else {
        panic!("Expected Handler error");
    };
    let inner = source.downcast::<BrokerError>().unwrap();
    assert!(matches!(
        *inner,
        BrokerError::PayloadMismatch {
            expected: "i32",
            ..
        }
    ));
}

#[test]
fn test_untyped_unary_handler_sees_missing_payload() {
    let broker = Broker::new();
    let out = buffer();

    // Raw subscription: one-argument handler, no type filter
    let sink = Arc::clone(&out);
    broker.subscribe(
        Owner::anonymous(),
        "t",
        None,
        Handler::unary(move |payload| {
            let shown = match payload {
                Some(p) => p.message_type().name().to_string(),
                None => "none".to_string(),
            };
            sink.lock().push_str(&format!("[{shown}]"));
        }),
    );

    broker.publish("t").unwrap();
    broker.publish_object_to("t", &1u8).unwrap();
    assert_eq!(*out.lock(), "[none][u8]");

    // A typed handler without a type filter fails on a topic-only publish
    broker.subscribe(Owner::anonymous(), "t", None, Handler::typed(|_: &u8| ()));
    let err = broker.publish("t").unwrap_err();
    let BrokerError::Handler { source, .. } = err else {
        panic!("Expected Handler error");
    };
    assert!(matches!(
        *source.downcast::<BrokerError>().unwrap(),
        BrokerError::MissingPayload { expected: "u8" }
    ));
}

// --- Edge Cases ---

#[test]
fn test_publish_with_no_subscribers() {
    let broker = Broker::new();
    broker.publish("nobody").unwrap();
    broker.publish_object(&42u64).unwrap();
    broker.publish_message(None, None).unwrap();
}

#[test]
fn test_bare_publish_reaches_only_catch_all() {
    let broker = Broker::new();
    let out = buffer();

    let sink = Arc::clone(&out);
    broker.subscribe(
        Owner::anonymous(),
        TopicMatcher::Any,
        None,
        Handler::nullary(move || sink.lock().push('*')),
    );
    broker.subscribe_signal(Owner::anonymous(), "t", || -> () {
        panic!("named topic must not match")
    });
    broker
        .subscribe_signal_pattern(Owner::anonymous(), ".*", || -> () {
            panic!("pattern needs a topic")
        })
        .unwrap();

    broker.publish_message(None, None).unwrap();
    assert_eq!(*out.lock(), "*");
}

#[test]
fn test_empty_topic_is_a_topic() {
    let broker = Broker::new();
    let out = buffer();

    let sink = Arc::clone(&out);
    broker.subscribe_signal(Owner::anonymous(), "", move || sink.lock().push('e'));

    broker.publish("").unwrap();
    broker.publish_message(None, None).unwrap();
    assert_eq!(*out.lock(), "e");
}
