// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Outbound Messages
//!
//! Handlers publish follow-up messages through their proxy. This module defines
//! the [`PublishMessage`] value handed to the broker and the conversion of
//! handler-supplied header values into AMQP field values.

use lapin::{
    types::{
        AMQPValue, FieldTable, LongInt, LongLongInt, LongString, LongUInt, ShortInt, ShortString,
    },
    BasicProperties,
};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// A header value attached to a published message.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    ShortString(String),
    LongString(String),
    Int(i16),
    LongInt(i32),
    LongLongInt(i64),
    LongUint(u32),
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::LongString(value.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::LongString(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::LongLongInt(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<HeaderValue> for AMQPValue {
    fn from(value: HeaderValue) -> Self {
        match value {
            HeaderValue::Bool(v) => AMQPValue::Boolean(v),
            HeaderValue::ShortString(v) => AMQPValue::ShortString(ShortString::from(v)),
            HeaderValue::LongString(v) => AMQPValue::LongString(LongString::from(v)),
            HeaderValue::Int(v) => AMQPValue::ShortInt(ShortInt::from(v)),
            HeaderValue::LongInt(v) => AMQPValue::LongInt(LongInt::from(v)),
            HeaderValue::LongLongInt(v) => AMQPValue::LongLongInt(LongLongInt::from(v)),
            HeaderValue::LongUint(v) => AMQPValue::LongUInt(LongUInt::from(v)),
        }
    }
}

/// A message to be published to an exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishMessage {
    pub exchange: String,
    pub routing_key: String,
    pub headers: BTreeMap<ShortString, AMQPValue>,
    pub body: Vec<u8>,
}

impl PublishMessage {
    /// Creates a message addressed to `exchange` with `routing_key`.
    pub fn new(exchange: &str, routing_key: &str, body: &[u8]) -> PublishMessage {
        PublishMessage {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            headers: BTreeMap::default(),
            body: body.to_vec(),
        }
    }

    /// Adds every header from `headers`, replacing existing keys.
    pub fn with_headers(mut self, headers: HashMap<String, HeaderValue>) -> Self {
        for (key, value) in headers {
            self.headers.insert(ShortString::from(key), value.into());
        }
        self
    }

    /// Adds a single header.
    pub fn header(mut self, key: &str, value: HeaderValue) -> Self {
        self.headers.insert(ShortString::from(key), value.into());
        self
    }

    /// Builds the AMQP properties sent with the message.
    ///
    /// Every published message gets a fresh `message_id`.
    pub fn properties(&self) -> BasicProperties {
        BasicProperties::default()
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(FieldTable::from(self.headers.clone()))
    }
}
