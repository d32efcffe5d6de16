pub mod bindings;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod filters;
pub mod helpers;
pub mod invoke;
pub mod lock;
pub mod render;
pub mod runtime_value;

pub use error::{DiagnosticError, InvokeError, RenderError, RuntimeError, StoreError};
pub use executor::{RenderState, Rendered, execute_program};
pub use helpers::{CallSite, Helpers};
pub use invoke::{Invocation, RenderOutcome, Store, TemplateRef};
pub use lock::{RenderGuard, RenderLocks};
pub use render::{Renderer, render};
pub use runtime_value::RuntimeValue;
