//! Entry points the rewriting driver calls: compile a site or a whole module
//! and get back class names, sheet text and runtime bindings.

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;

use crate::ast::{Program, Span, StyleSite, StyleSiteKind};
use crate::atomize::{RuntimeFragment, atomize};
use crate::config::CssInJsCoreConfig;
use crate::declaration::StyleParser;
use crate::error::CoreError;
use crate::evaluate::Evaluator;
use crate::lower::parse_module_with_config;
use crate::registry::{StyleRegistry, class_group};
use crate::scope::{BindingKind, ScopeTree};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleArtifacts {
  /// Classes in authored order.
  pub class_names: Vec<String>,
  /// Rule text this site added to the registry.
  pub sheet_entries: Vec<String>,
  /// Custom property name to the source producing its value.
  pub runtime_vars: IndexMap<String, String>,
  pub runtime_fragments: Vec<RuntimeFragment>,
  /// Classes of this site already registered for a different rule. The sheet
  /// keeps the first rule, so these render wrong and the build should report
  /// them.
  pub collisions: Vec<String>,
}

impl StyleArtifacts {
  /// The `className` value after same-group overrides.
  pub fn class_name(&self) -> String {
    merge_class_names(&self.class_names)
  }

  /// Object literal source for the runtime `style` attribute, if any value is
  /// only known at runtime.
  pub fn style_attribute(&self) -> Option<String> {
    if self.runtime_vars.is_empty() {
      return None;
    }
    let entries: Vec<String> = self
      .runtime_vars
      .iter()
      .map(|(name, source)| format!("\"{}\": {}", name, source))
      .collect();
    Some(format!("{{ {} }}", entries.join(", ")))
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledSite {
  pub kind: StyleSiteKind,
  pub span: Span,
  pub artifacts: StyleArtifacts,
}

/// Compiles one site. Module level bindings are evaluated from scratch; use
/// [`compile_program`] to share that work between the sites of a module.
pub fn compile_site<'p>(
  scopes: &ScopeTree<'p>,
  site: &'p StyleSite,
  registry: &StyleRegistry,
  config: &CssInJsCoreConfig,
) -> StyleArtifacts {
  let mut evaluator = Evaluator::new(scopes, config);
  compile_with(&mut evaluator, site, registry)
}

fn compile_with<'p>(
  evaluator: &mut Evaluator<'_, 'p>,
  site: &'p StyleSite,
  registry: &StyleRegistry,
) -> StyleArtifacts {
  let _span = tracing::trace_span!("compile_site", kind = ?site.kind).entered();
  let config = evaluator.config();

  let rule = StyleParser::new(evaluator).parse_args(&site.args);
  let atomized = atomize(&rule, config);

  let mut artifacts = StyleArtifacts::default();
  for atomic in atomized.rules {
    // Repeats stay so the last declaration of a property wins the merge.
    artifacts.class_names.push(atomic.class_name.clone());
    let css = atomic.css();
    match registry.insert(atomic) {
      Ok(true) => artifacts.sheet_entries.push(css),
      Ok(false) => {}
      Err(error) => artifacts.collisions.push(error.to_string()),
    }
  }
  artifacts.runtime_vars = atomized
    .runtime_vars
    .into_iter()
    .map(|variable| (variable.var_name, variable.source))
    .collect();
  artifacts.runtime_fragments = atomized.fragments;
  artifacts
}

/// Compiles every style site of an already lowered module, in source order.
/// Sites whose helper or `styled` name is shadowed by a local binding are
/// skipped.
pub fn compile_program(
  program: &Program,
  registry: &StyleRegistry,
  config: &CssInJsCoreConfig,
) -> Vec<CompiledSite> {
  let scopes = ScopeTree::build(program);
  let mut evaluator = Evaluator::new(&scopes, config);
  let mut sites = Vec::with_capacity(program.sites.len());
  for site in &program.sites {
    if !is_library_site(&evaluator, site) {
      continue;
    }
    sites.push(CompiledSite {
      kind: site.kind.clone(),
      span: site.span,
      artifacts: compile_with(&mut evaluator, site, registry),
    });
  }
  sites
}

pub fn compile_module(
  code: &str,
  registry: &StyleRegistry,
  config: &CssInJsCoreConfig,
) -> Result<Vec<CompiledSite>, CoreError> {
  let _span = tracing::trace_span!("compile_module", len = code.len()).entered();
  let program = parse_module_with_config(code, config)?;
  let sites = compile_program(&program, registry, config);
  tracing::debug!(sites = sites.len(), registered = registry.len(), "Compiled module");
  Ok(sites)
}

fn is_library_site(evaluator: &Evaluator<'_, '_>, site: &StyleSite) -> bool {
  let Some(callee) = &site.callee else {
    return true;
  };
  let library = match site.kind {
    StyleSiteKind::Css => evaluator.is_style_helper(callee),
    _ => match evaluator.scopes().lookup(&callee.name, callee.scope) {
      Some(binding) => binding.kind == BindingKind::Import,
      None => true,
    },
  };
  if !library {
    tracing::trace!(name = %callee.name, "Skipping site with a locally bound callee");
  }
  library
}

/// Compiles modules in parallel against one registry. Results keep the order
/// of `modules`.
pub fn compile_modules(
  modules: &[&str],
  registry: &StyleRegistry,
  config: &CssInJsCoreConfig,
) -> Vec<Result<Vec<CompiledSite>, CoreError>> {
  modules
    .par_iter()
    .map(|code| compile_module(code, registry, config))
    .collect()
}

/// Joins class names the way the runtime does: a later atomic class replaces
/// an earlier one from the same group, other names pass through.
pub fn merge_class_names<S: AsRef<str>>(names: &[S]) -> String {
  let mut merged: IndexMap<&str, &str> = IndexMap::new();
  for name in names.iter().flat_map(|names| names.as_ref().split_whitespace()) {
    let key = if is_atomic_class(name) {
      class_group(name)
    } else {
      name
    };
    merged.insert(key, name);
  }
  merged.into_values().collect::<Vec<_>>().join(" ")
}

fn is_atomic_class(name: &str) -> bool {
  name.len() == 9
    && name.starts_with('_')
    && name[1..].chars().all(|ch| ch.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn compile(code: &str) -> Vec<CompiledSite> {
    let registry = StyleRegistry::new();
    compile_module(code, &registry, &CssInJsCoreConfig::default()).unwrap()
  }

  #[test]
  fn compiles_a_css_call() {
    let sites = compile("const size = 12; css({ fontSize: size, color: 'blue' });");
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].kind, StyleSiteKind::Css);
    assert_eq!(
      sites[0].artifacts.class_names,
      vec!["_1wyb1fwx".to_string(), "_syaz13q2".to_string()]
    );
    assert_eq!(
      sites[0].artifacts.sheet_entries,
      vec![
        "._1wyb1fwx{font-size:12px}".to_string(),
        "._syaz13q2{color:blue}".to_string()
      ]
    );
    assert_eq!(sites[0].artifacts.style_attribute(), None);
  }

  #[test]
  fn shares_entries_between_sites() {
    let sites = compile("css({ color: 'blue' }); css`color: blue;`;");
    assert_eq!(sites[0].artifacts.class_names, sites[1].artifacts.class_names);
    assert_eq!(sites[0].artifacts.sheet_entries.len(), 1);
    assert!(sites[1].artifacts.sheet_entries.is_empty());
  }

  #[test]
  fn runtime_values_fill_the_style_attribute() {
    let sites = compile("css({ color: props.color });");
    let artifacts = &sites[0].artifacts;
    let var_name = artifacts
      .runtime_vars
      .keys()
      .next()
      .cloned()
      .unwrap_or_default();
    assert!(var_name.starts_with("--_color-"));
    assert_eq!(
      artifacts.style_attribute(),
      Some(format!("{{ \"{}\": props.color }}", var_name))
    );
    assert_eq!(
      artifacts.sheet_entries[0],
      format!("._syaz{}{{color:var({})}}", &artifacts.class_names[0][5..], var_name)
    );
  }

  #[test]
  fn reports_class_name_collisions() {
    let registry = StyleRegistry::new();
    registry
      .insert(crate::registry::AtomicRule {
        class_name: "_syaz13q2".into(),
        selector: "._syaz13q2".into(),
        at_rules: Vec::new(),
        declaration: "color:teal".into(),
      })
      .unwrap();

    let sites =
      compile_module("css({ color: 'blue' });", &registry, &CssInJsCoreConfig::default()).unwrap();
    let artifacts = &sites[0].artifacts;
    assert_eq!(artifacts.class_names, vec!["_syaz13q2".to_string()]);
    assert!(artifacts.sheet_entries.is_empty());
    assert_eq!(artifacts.collisions.len(), 1);
    assert!(artifacts.collisions[0].contains("color:blue"));
    assert_eq!(registry.style_sheet(&CssInJsCoreConfig::default()), "._syaz13q2{color:teal}");
  }

  #[test]
  fn merges_class_groups() {
    assert_eq!(
      merge_class_names(&["_syaz13q2 _1e0c1ule", "custom _syaz5scu"]),
      "_syaz5scu _1e0c1ule custom"
    );
    assert_eq!(merge_class_names(&["a", "b a"]), "a b");
  }

  #[test]
  fn serializes_camel_case() {
    let artifacts = StyleArtifacts {
      class_names: vec!["_syaz13q2".into()],
      ..StyleArtifacts::default()
    };
    let json = serde_json::to_value(&artifacts).unwrap();
    assert_eq!(json["classNames"][0], "_syaz13q2");
    assert!(json.get("runtimeVars").is_some());
  }

  #[test]
  fn parse_errors_surface() {
    let registry = StyleRegistry::new();
    assert!(matches!(
      compile_module("const = ;", &registry, &CssInJsCoreConfig::default()),
      Err(CoreError::Parse { .. })
    ));
  }
}
