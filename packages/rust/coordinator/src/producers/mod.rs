//! Built-in producer kinds.
//!
//! Each `[[producers]]` entry in the configuration maps onto one of these by
//! its `kind`. Real content generators live outside this workspace and plug in
//! through the same [`Producer`](crate::Producer) trait.

mod guard;
mod json_file;
mod template;

pub use guard::GuardProducer;
pub use json_file::JsonFileProducer;
pub use template::TemplateProducer;
