//! CQRS application assembly for *Springtime*.
//!
//! An application is described by *declarations* of its components - routes, HTTP middleware, bus
//! middleware, bus handlers and content formatters - attached to services living in a
//! [Container](container::Container). The [ApplicationAssembler](assembly::ApplicationAssembler)
//! validates the declarations and turns them into an immutable
//! [ApplicationGraph](graph::ApplicationGraph): a router with one request handler per route, a
//! priority-ordered middleware pipeline, a command bus and a query bus, and content negotiation.
//!
//! Routes map HTTP requests to bus messages by their *behavior*:
//!
//! * `fetch` - executes a query and returns the result (`200`)
//! * `create` - executes a command and points to the created resource (`201` + `Location`)
//! * `create_fetch` - same as `create`, but also returns the created resource
//! * `execute` - executes a command (`204`)
//! * `execute_fetch` - executes a command and returns the result of a query (`200`)
//! * `none` - the request is passed to the declaring service itself
//!
//! Asynchronous `create` and `execute` routes respond with `202` instead.
//!
//! Nothing gets constructed during assembly. All components are registered as service definitions
//! and constructed on first use, so user services (handlers, middleware, formatters) only need to
//! be registered before an application gets assembled, not before the components depending on
//! them.
//!
//! ### Configuration
//!
//! Assembly is configured with [AssemblyConfig](config::AssemblyConfig), which can be loaded from
//! `springtime.json` and the environment - see [config] for details.

pub mod assembly;
pub mod config;
pub mod container;
pub mod declaration;
pub mod defaults;
pub mod error;
pub mod graph;
pub mod http;
pub mod identifier;
pub mod validation;
