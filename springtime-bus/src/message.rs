//! Messages travelling through buses and their creation from [Input].

use crate::error::BusError;
use crate::input::Input;
use crate::ErrorPtr;
use derivative::Derivative;
use fxhash::FxHashMap;
use std::any::Any;
use std::fmt::{Debug, Formatter};

/// A command or a query. The name identifies the message type and is used to find the handler;
/// the payload is an arbitrary value, which handlers downcast to the concrete type they expect.
pub struct Message {
    name: String,
    payload: Box<dyn Any + Send + Sync>,
}

impl Message {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, payload: T) -> Self {
        Self::from_boxed(name, Box::new(payload))
    }

    pub fn from_boxed(name: impl Into<String>, payload: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the payload if it is of type `T`.
    #[inline]
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    /// Consumes the message and returns the payload, or the message itself on type mismatch.
    pub fn into_payload<T: Any>(self) -> Result<T, Self> {
        let Self { name, payload } = self;
        payload
            .downcast()
            .map(|payload| *payload)
            .map_err(|payload| Self { name, payload })
    }
}

impl Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Types which can be created from request [Input].
pub trait FromInput: Sized {
    fn from_input(input: &Input) -> Result<Self, ErrorPtr>;
}

/// Creates messages of a given type from [Input]. The primary creator of an application is used by
/// all bus actions bound to routes.
pub trait MessageCreator {
    fn create(&self, message_type: &str, input: &Input) -> Result<Message, BusError>;
}

type MessageConstructor = fn(&Input) -> Result<Box<dyn Any + Send + Sync>, ErrorPtr>;

fn construct<T: FromInput + Send + Sync + 'static>(
    input: &Input,
) -> Result<Box<dyn Any + Send + Sync>, ErrorPtr> {
    T::from_input(input).map(|message| Box::new(message) as Box<dyn Any + Send + Sync>)
}

/// Default [MessageCreator] - a registry of [FromInput] constructors keyed by message type.
#[derive(Derivative, Clone, Default)]
#[derivative(Debug)]
pub struct NamedConstructor {
    #[derivative(Debug = "ignore")]
    constructors: FxHashMap<String, MessageConstructor>,
}

impl NamedConstructor {
    /// Registers `T` as the payload type of messages named `message_type`. Registering the same
    /// name again replaces the previous constructor.
    pub fn register<T: FromInput + Send + Sync + 'static>(
        &mut self,
        message_type: impl Into<String>,
    ) -> &mut Self {
        self.constructors
            .insert(message_type.into(), construct::<T> as MessageConstructor);
        self
    }

    #[inline]
    pub fn is_registered(&self, message_type: &str) -> bool {
        self.constructors.contains_key(message_type)
    }
}

impl MessageCreator for NamedConstructor {
    fn create(&self, message_type: &str, input: &Input) -> Result<Message, BusError> {
        let constructor = self
            .constructors
            .get(message_type)
            .ok_or_else(|| BusError::UnknownMessage(message_type.to_string()))?;

        constructor(input)
            .map(|payload| Message::from_boxed(message_type, payload))
            .map_err(|source| BusError::InvalidInput {
                message: message_type.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::BusError;
    use crate::input::Input;
    use crate::message::{FromInput, Message, MessageCreator, NamedConstructor};
    use crate::ErrorPtr;
    use serde_json::json;
    use std::io::{Error, ErrorKind};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct CreateThing {
        name: String,
    }

    impl FromInput for CreateThing {
        fn from_input(input: &Input) -> Result<Self, ErrorPtr> {
            input
                .get_str("name")
                .map(|name| CreateThing {
                    name: name.to_string(),
                })
                .ok_or_else(|| Arc::new(Error::new(ErrorKind::InvalidData, "no name")) as ErrorPtr)
        }
    }

    #[test]
    fn should_create_registered_message() {
        let mut creator = NamedConstructor::default();
        creator.register::<CreateThing>("CreateThing");

        let message = creator
            .create("CreateThing", &Input::new(json!({"name": "John"})))
            .unwrap();

        assert_eq!(message.name(), "CreateThing");
        assert_eq!(
            message.payload::<CreateThing>(),
            Some(&CreateThing {
                name: "John".to_string()
            })
        );
    }

    #[test]
    fn should_reject_unknown_message() {
        let creator = NamedConstructor::default();

        assert!(matches!(
            creator.create("Unknown", &Input::default()).unwrap_err(),
            BusError::UnknownMessage(name) if name == "Unknown"
        ));
    }

    #[test]
    fn should_report_invalid_input() {
        let mut creator = NamedConstructor::default();
        creator.register::<CreateThing>("CreateThing");

        assert!(matches!(
            creator.create("CreateThing", &Input::default()).unwrap_err(),
            BusError::InvalidInput { .. }
        ));
    }

    #[test]
    fn should_return_message_on_payload_mismatch() {
        let message = Message::new("Test", 5_u8);
        let message = message.into_payload::<String>().unwrap_err();

        assert_eq!(message.into_payload::<u8>().unwrap(), 5);
    }
}
