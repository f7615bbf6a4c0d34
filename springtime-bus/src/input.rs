//! Input data used to create messages.

use fxhash::FxHashMap;
use serde_json::Value;

/// Name of the attribute holding an identifier generated for the current request.
pub const GENERATED_ID: &str = "generated_id";

/// Source data for [messages](crate::message::Message), usually extracted from an HTTP request:
/// named attributes (e.g. route parameters) and the request data (e.g. a parsed body).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Input {
    attributes: FxHashMap<String, Value>,
    data: Value,
}

impl Input {
    pub fn new(data: Value) -> Self {
        Self {
            attributes: Default::default(),
            data,
        }
    }

    /// Adds an attribute, replacing any previous one with the same name.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Stores an identifier generated for the message being created.
    pub fn with_generated_id(self, id: impl Into<String>) -> Self {
        self.with_attribute(GENERATED_ID, id.into())
    }

    #[inline]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    #[inline]
    pub fn attributes(&self) -> &FxHashMap<String, Value> {
        &self.attributes
    }

    #[inline]
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn generated_id(&self) -> Option<&str> {
        self.attribute(GENERATED_ID).and_then(Value::as_str)
    }

    /// Looks a value up in the attributes first and then in the data object.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attribute(name).or_else(|| self.data.get(name))
    }

    /// String version of [Input::get].
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }
}
