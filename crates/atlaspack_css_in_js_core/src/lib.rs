pub mod assemble;
pub mod ast;
pub mod atomize;
pub mod autofix;
pub mod config;
pub mod css_value;
pub mod declaration;
pub mod error;
pub mod evaluate;
pub mod hash;
pub mod lower;
pub mod registry;
pub mod scope;
pub mod value;

pub use assemble::{
  CompiledSite, StyleArtifacts, compile_module, compile_modules, compile_program, compile_site,
  merge_class_names,
};
pub use autofix::to_call_arguments;
pub use config::CssInJsCoreConfig;
pub use error::CoreError;
pub use evaluate::Evaluator;
pub use lower::{parse_module, parse_module_with_config, parse_typescript_module};
pub use registry::{AtomicRule, StyleRegistry};
pub use scope::ScopeTree;
pub use value::ResolvedValue;
