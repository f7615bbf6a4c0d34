//! Bus actions used by route handlers - submitting commands and queries created from requests.

use crate::http::error::HttpError;
use crate::http::{HttpRequest, ParsedBody, RouteParams};
use derivative::Derivative;
use serde_json::{Map, Value};
use springtime_bus::bus::ServiceBus;
use springtime_bus::error::BusError;
use springtime_bus::input::Input;
use springtime_bus::message::MessageCreator;
use std::sync::Arc;

pub type MessageCreatorPtr = Arc<dyn MessageCreator + Send + Sync>;

/// Builds message [Input] from a request: route parameters become attributes, the parsed body (or
/// an empty object) becomes the data.
pub fn request_input(request: &HttpRequest) -> Input {
    let data = request
        .extensions()
        .get::<ParsedBody>()
        .map(|body| body.0.clone())
        .unwrap_or_else(|| Value::Object(Map::new()));

    let params = request.extensions().get::<RouteParams>();
    params
        .into_iter()
        .flat_map(|params| params.0.iter())
        .fold(Input::new(data), |input, (name, value)| {
            input.with_attribute(name.clone(), value.clone())
        })
}

/// Write action - creates a command and submits it to the command bus.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ExecuteCommand {
    #[derivative(Debug = "ignore")]
    bus: Arc<ServiceBus>,
    #[derivative(Debug = "ignore")]
    creator: MessageCreatorPtr,
    command: String,
}

impl ExecuteCommand {
    pub fn new(bus: Arc<ServiceBus>, creator: MessageCreatorPtr, command: impl Into<String>) -> Self {
        Self {
            bus,
            creator,
            command: command.into(),
        }
    }

    #[inline]
    pub fn command(&self) -> &str {
        &self.command
    }

    pub async fn execute(&self, input: &Input) -> Result<(), HttpError> {
        let message = self.creator.create(&self.command, input)?;
        self.bus.handle(message).await?;
        Ok(())
    }
}

/// Read action - creates a query, submits it to the query bus and returns the read model.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ExecuteQuery {
    #[derivative(Debug = "ignore")]
    bus: Arc<ServiceBus>,
    #[derivative(Debug = "ignore")]
    creator: MessageCreatorPtr,
    query: String,
}

impl ExecuteQuery {
    pub fn new(bus: Arc<ServiceBus>, creator: MessageCreatorPtr, query: impl Into<String>) -> Self {
        Self {
            bus,
            creator,
            query: query.into(),
        }
    }

    #[inline]
    pub fn query(&self) -> &str {
        &self.query
    }

    pub async fn fetch(&self, input: &Input) -> Result<Value, HttpError> {
        let message = self.creator.create(&self.query, input)?;
        self.bus
            .handle(message)
            .await?
            .into_value()
            .map_err(|source| {
                HttpError::Bus(BusError::Conversion {
                    message: self.query.clone(),
                    source,
                })
            })
    }
}
