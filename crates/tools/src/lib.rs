//! Tool declaration and invocation layer for toolpipe.
//!
//! Tools are declared as `(name, description, schema, body)` tuples and held
//! in a `ToolRegistry`. The schema is an explicit per-parameter declaration
//! (type tag, required flag, description) from which the wire-level JSON
//! Schema is derived once at registration time. Invocation normalizes every
//! return value into the standard tool envelope and converts body failures
//! into `{isError: true, ...}` envelopes instead of letting them propagate.

pub mod demo;
pub mod registry;
pub mod schema;
pub mod tool;

pub use demo::demo_registry;
pub use registry::{RegistryError, ToolRegistry};
pub use schema::{ParamSpec, ParamType, ToolSchema};
pub use tool::{
    error_envelope, normalize_result, ContentItem, ToolBody, ToolDefinition, ToolEnvelope,
    ToolSpec,
};
