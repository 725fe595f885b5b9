//! nodeflow core
//!
//! Config tree, per-invocation parameters, tag sets, and the template
//! variable resolution engine that turns templates into provider requests.

pub mod config;
pub mod error;
pub mod outputs;
pub mod params;
pub mod resolve;
pub mod tags;
pub mod template;
pub mod value;

pub use config::{ConfigTree, SubnetDefinition};
pub use error::{CoreError, Result};
pub use outputs::OutputCache;
pub use params::{ParamStore, normalize_name};
pub use resolve::{Resolver, normalize_keys, qualify_name, snake_case};
pub use tags::{LowerTag, TagSet};
pub use template::{
    DNS_CLASS, DirTemplateSource, NODE_CLASS, Template, TemplateCache, TemplateSource,
};
pub use value::{Mapping, Scalar, Value};
