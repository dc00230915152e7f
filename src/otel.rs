// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for RabbitMQ
//!
//! This module propagates trace context through RabbitMQ message headers: it
//! extracts the parent context of every delivery before the handler runs, and
//! injects the current context into messages a handler publishes.

use lapin::types::{AMQPValue, FieldTable, ShortString};
use opentelemetry::{
    propagation::{Extractor, Injector},
    trace::{Span, SpanKind, TraceContextExt, Tracer},
    Context,
};
use std::{borrow::Cow, collections::BTreeMap};
use tracing::error;

/// An adapter for injecting and extracting OpenTelemetry context from RabbitMQ headers.
pub(crate) struct RabbitMQTracePropagator<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> RabbitMQTracePropagator<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for RabbitMQTracePropagator<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

impl Extractor for RabbitMQTracePropagator<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("Error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Creates a consumer span for a delivery, parented on the context carried in
/// its headers.
///
/// # Returns
/// The context holding the new span, for propagation into published
/// messages, and the span itself.
pub(crate) fn new_span<T: Tracer>(headers: &FieldTable, tracer: &T, name: &str) -> (Context, T::Span) {
    let ctx = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&RabbitMQTracePropagator::new(
            &mut headers.inner().clone(),
        ))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    let ctx = ctx.with_remote_span_context(span.span_context().clone());
    (ctx, span)
}

/// Writes `ctx` into outgoing message headers.
pub(crate) fn inject(ctx: &Context, headers: &mut BTreeMap<ShortString, AMQPValue>) {
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut RabbitMQTracePropagator::new(headers))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::LongString;
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_sdk::{propagation::TraceContextPropagator, trace::SdkTracerProvider};

    #[test]
    fn propagator_round_trips_string_headers() {
        let mut headers = BTreeMap::new();
        let mut propagator = RabbitMQTracePropagator::new(&mut headers);

        propagator.set("TraceParent", "00-abc-def-01".to_owned());

        assert_eq!(propagator.get("traceparent"), Some("00-abc-def-01"));
        assert_eq!(propagator.keys(), vec!["traceparent"]);
    }

    #[test]
    fn published_context_carries_the_consumer_span() {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
        let provider = SdkTracerProvider::builder().build();
        let tracer = provider.tracer("otel-test");

        let (ctx, span) = new_span(&FieldTable::default(), &tracer, "orders");
        let mut headers = BTreeMap::new();
        inject(&ctx, &mut headers);

        let trace_id = span.span_context().trace_id().to_string();
        let span_id = span.span_context().span_id().to_string();
        match headers.get("traceparent") {
            Some(AMQPValue::LongString(value)) => {
                let value = String::from_utf8_lossy(value.as_bytes()).to_string();
                assert!(value.contains(&trace_id));
                assert!(value.contains(&span_id));
            }
            other => panic!("unexpected traceparent header: {:?}", other),
        }
    }

    #[test]
    fn non_string_headers_are_ignored() {
        let mut headers = BTreeMap::new();
        headers.insert(ShortString::from("count"), AMQPValue::LongInt(3));
        headers.insert(
            ShortString::from("name"),
            AMQPValue::LongString(LongString::from("orders")),
        );
        let propagator = RabbitMQTracePropagator::new(&mut headers);

        assert_eq!(propagator.get("count"), None);
        assert_eq!(propagator.get("name"), Some("orders"));
    }
}
