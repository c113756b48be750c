use crate::error::GrammarError;
use crate::grammar::definition::{
    ContextReference, GrammarDefinition, MatchPattern, MetaPattern, PopAction, RawContextPattern,
};
use editor_display::{ScopeId, ScopeRegistry, ScopeSelector};
use onig::Regex;
use regex::Regex as RustRegex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub(crate) type ContextId = usize;

/// A compiled YAML grammar.
///
/// Contexts (named and inline) live in one table; every context carries its pattern list
/// already flattened, with includes expanded and the `prototype` context prepended.
pub struct YamlGrammar {
    name: Option<String>,
    scope_name: String,
    file_types: Vec<String>,
    first_line_match: Option<Regex>,
    injection_selector: Option<ScopeSelector>,
    registry: Arc<ScopeRegistry>,
    pub(crate) root: ScopeId,
    pub(crate) main: ContextId,
    pub(crate) contexts: Vec<CompiledContext>,
    pub(crate) patterns: Vec<CompiledMatch>,
}

impl fmt::Debug for YamlGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YamlGrammar")
            .field("scope_name", &self.scope_name)
            .field("contexts", &self.contexts.len())
            .field("patterns", &self.patterns.len())
            .field("scopes", &self.registry.len())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct CompiledContext {
    pub(crate) name: String,
    pub(crate) meta_scope: Vec<ScopeId>,
    pub(crate) meta_content_scope: Vec<ScopeId>,
    pub(crate) patterns: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct CompiledMatch {
    pub(crate) regex: Regex,
    pub(crate) document_start_only: bool,
    pub(crate) scope: Vec<ScopeId>,
    pub(crate) captures: Vec<(usize, Vec<ScopeId>)>,
    pub(crate) action: MatchAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MatchAction {
    None,
    Pop(usize),
    Push(Vec<ContextId>),
    Set(Vec<ContextId>),
}

impl YamlGrammar {
    /// Parse and compile a grammar from YAML.
    pub fn from_yaml(source: &str) -> Result<Self, GrammarError> {
        let definition: GrammarDefinition = serde_yaml::from_str(source)?;
        Self::compile(definition)
    }

    /// Compile a parsed definition.
    pub fn compile(definition: GrammarDefinition) -> Result<Self, GrammarError> {
        let variable_refs = RustRegex::new(r"\{\{([A-Za-z0-9_]+)\}\}")?;
        let variables = realize_variables(&definition.variables, &variable_refs)?;

        let mut registry = ScopeRegistry::new();
        let root = registry.register(&definition.scope);

        let mut compiler = Compiler {
            variables,
            variable_refs,
            registry,
            names: HashMap::new(),
            contexts: Vec::new(),
            patterns: Vec::new(),
        };

        for name in definition.contexts.keys() {
            let id = compiler.contexts.len();
            compiler.names.insert(name.clone(), id);
            compiler.contexts.push(PendingContext::named(name));
        }
        let main = *compiler
            .names
            .get("main")
            .ok_or(GrammarError::MissingField("contexts.main"))?;
        for (name, patterns) in &definition.contexts {
            let id = compiler.names[name];
            compiler.compile_context(id, patterns)?;
        }

        let first_line_match = definition
            .first_line_match
            .as_deref()
            .map(|source| compiler.compile_regex(source))
            .transpose()?;

        let contexts = compiler.flatten_contexts()?;
        tracing::debug!(
            scope = %definition.scope,
            contexts = contexts.len(),
            patterns = compiler.patterns.len(),
            "grammar compiled"
        );

        Ok(Self {
            name: definition.name,
            scope_name: definition.scope,
            file_types: definition.file_types,
            first_line_match,
            injection_selector: definition
                .injection_selector
                .as_deref()
                .map(ScopeSelector::parse),
            registry: compiler.registry.into_shared(),
            root,
            main,
            contexts,
            patterns: compiler.patterns,
        })
    }

    /// Human-readable name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Root scope name.
    pub fn scope(&self) -> &str {
        &self.scope_name
    }

    /// File extensions associated with this grammar.
    pub fn file_types(&self) -> &[String] {
        &self.file_types
    }

    /// Returns true if `line` matches the grammar's `first_line_match`.
    pub fn matches_first_line(&self, line: &str) -> bool {
        self.first_line_match
            .as_ref()
            .is_some_and(|regex| regex.find(line).is_some())
    }

    /// Name of a context, for diagnostics.
    pub fn context_name(&self, id: usize) -> Option<&str> {
        self.contexts.get(id).map(|c| c.name.as_str())
    }

    pub(crate) fn registry_handle(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    pub(crate) fn injection(&self) -> Option<&ScopeSelector> {
        self.injection_selector.as_ref()
    }
}

enum Entry {
    Match(usize),
    Include(String),
}

struct PendingContext {
    name: String,
    meta_scope: Vec<ScopeId>,
    meta_content_scope: Vec<ScopeId>,
    include_prototype: bool,
    entries: Vec<Entry>,
}

impl PendingContext {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            meta_scope: Vec::new(),
            meta_content_scope: Vec::new(),
            include_prototype: true,
            entries: Vec::new(),
        }
    }
}

struct Compiler {
    variables: HashMap<String, String>,
    variable_refs: RustRegex,
    registry: ScopeRegistry,
    names: HashMap<String, ContextId>,
    contexts: Vec<PendingContext>,
    patterns: Vec<CompiledMatch>,
}

impl Compiler {
    fn compile_context(
        &mut self,
        id: ContextId,
        patterns: &[RawContextPattern],
    ) -> Result<(), GrammarError> {
        let mut meta = MetaPattern::default();
        let mut entries = Vec::new();
        let mut in_meta = true;

        for pattern in patterns {
            match pattern {
                RawContextPattern::Meta(m) if in_meta => {
                    if m.meta_scope.is_some() {
                        meta.meta_scope = m.meta_scope.clone();
                    }
                    if m.meta_content_scope.is_some() {
                        meta.meta_content_scope = m.meta_content_scope.clone();
                    }
                    if m.meta_include_prototype.is_some() {
                        meta.meta_include_prototype = m.meta_include_prototype;
                    }
                }
                RawContextPattern::Meta(_) => {
                    return Err(GrammarError::Unsupported(
                        "meta patterns must be listed first in a context",
                    ));
                }
                RawContextPattern::Match(m) => {
                    in_meta = false;
                    let index = self.compile_match(id, m)?;
                    entries.push(Entry::Match(index));
                }
                RawContextPattern::Include(i) => {
                    in_meta = false;
                    entries.push(Entry::Include(normalize_include(&i.include)));
                }
            }
        }

        let meta_scope = self.register_scopes(meta.meta_scope.as_deref());
        let meta_content_scope = self.register_scopes(meta.meta_content_scope.as_deref());
        let context = &mut self.contexts[id];
        context.meta_scope = meta_scope;
        context.meta_content_scope = meta_content_scope;
        context.include_prototype = meta.meta_include_prototype.unwrap_or(true);
        context.entries = entries;
        Ok(())
    }

    fn compile_match(&mut self, owner: ContextId, pattern: &MatchPattern) -> Result<usize, GrammarError> {
        let source = substitute_variables(&pattern.regex, &self.variables, &self.variable_refs)?;
        let regex = self.compile_regex(&source)?;

        let pop = match pattern.pop {
            None | Some(PopAction::Bool(false)) => 0,
            Some(PopAction::Bool(true)) => 1,
            Some(PopAction::Count(n)) => n,
        };
        let action = match (&pattern.push, &pattern.set) {
            (Some(_), Some(_)) => {
                return Err(GrammarError::Unsupported("push and set on one pattern"));
            }
            (Some(_), None) | (None, Some(_)) if pop > 0 => {
                return Err(GrammarError::Unsupported("pop combined with push or set"));
            }
            (Some(push), None) => MatchAction::Push(self.resolve_reference(owner, push)?),
            (None, Some(set)) => MatchAction::Set(self.resolve_reference(owner, set)?),
            (None, None) if pop > 0 => MatchAction::Pop(pop),
            (None, None) => MatchAction::None,
        };

        let scope = self.register_scopes(pattern.scope.as_deref());
        let mut captures: Vec<(usize, Vec<ScopeId>)> = pattern
            .captures
            .iter()
            .map(|(group, scope)| (*group as usize, self.register_scopes(Some(scope))))
            .filter(|(_, scopes)| !scopes.is_empty())
            .collect();
        captures.sort_by_key(|(group, _)| *group);

        self.patterns.push(CompiledMatch {
            regex,
            document_start_only: source.starts_with("\\A"),
            scope,
            captures,
            action,
        });
        Ok(self.patterns.len() - 1)
    }

    fn resolve_reference(
        &mut self,
        owner: ContextId,
        reference: &ContextReference,
    ) -> Result<Vec<ContextId>, GrammarError> {
        match reference {
            ContextReference::Name(name) => Ok(vec![self.lookup(name)?]),
            ContextReference::Names(names) => names.iter().map(|n| self.lookup(n)).collect(),
            ContextReference::Inline(patterns) => {
                let id = self.contexts.len();
                let name = format!("{}/inline-{id}", self.contexts[owner].name);
                self.contexts.push(PendingContext::named(&name));
                self.compile_context(id, patterns)?;
                Ok(vec![id])
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<ContextId, GrammarError> {
        let name = normalize_include(name);
        self.names
            .get(&name)
            .copied()
            .ok_or(GrammarError::UnknownContext(name))
    }

    fn compile_regex(&self, source: &str) -> Result<Regex, GrammarError> {
        Regex::new(source).map_err(|e| GrammarError::RegexCompile {
            pattern: source.to_string(),
            message: e.to_string(),
        })
    }

    fn register_scopes(&mut self, scopes: Option<&str>) -> Vec<ScopeId> {
        let Some(scopes) = scopes else {
            return Vec::new();
        };
        scopes
            .split_whitespace()
            .map(|s| self.registry.register(s))
            .collect()
    }

    fn flatten_contexts(&self) -> Result<Vec<CompiledContext>, GrammarError> {
        let prototype = self.names.get("prototype").copied();
        let mut memo: HashMap<ContextId, Vec<usize>> = HashMap::new();
        let mut out = Vec::with_capacity(self.contexts.len());

        for (id, context) in self.contexts.iter().enumerate() {
            let mut patterns = Vec::new();
            if let Some(prototype) = prototype
                && context.include_prototype
                && id != prototype
            {
                patterns.extend(self.flatten(prototype, &mut memo, &mut HashSet::new())?);
            }
            patterns.extend(self.flatten(id, &mut memo, &mut HashSet::new())?);
            out.push(CompiledContext {
                name: context.name.clone(),
                meta_scope: context.meta_scope.clone(),
                meta_content_scope: context.meta_content_scope.clone(),
                patterns,
            });
        }
        Ok(out)
    }

    fn flatten(
        &self,
        id: ContextId,
        memo: &mut HashMap<ContextId, Vec<usize>>,
        visiting: &mut HashSet<ContextId>,
    ) -> Result<Vec<usize>, GrammarError> {
        if let Some(cached) = memo.get(&id) {
            return Ok(cached.clone());
        }
        if !visiting.insert(id) {
            return Err(GrammarError::IncludeCycle(self.contexts[id].name.clone()));
        }

        let mut out = Vec::new();
        for entry in &self.contexts[id].entries {
            match entry {
                Entry::Match(index) => out.push(*index),
                Entry::Include(name) => {
                    let target = self
                        .names
                        .get(name)
                        .copied()
                        .ok_or_else(|| GrammarError::UnknownContext(name.clone()))?;
                    out.extend(self.flatten(target, memo, visiting)?);
                }
            }
        }

        visiting.remove(&id);
        memo.insert(id, out.clone());
        Ok(out)
    }
}

fn normalize_include(name: &str) -> String {
    match name {
        "$self" | "$base" => "main".to_string(),
        other => other.trim_start_matches('#').to_string(),
    }
}

fn realize_variables(
    vars: &HashMap<String, String>,
    refs: &RustRegex,
) -> Result<HashMap<String, String>, GrammarError> {
    let mut realized = HashMap::new();
    let mut visiting = HashSet::<String>::new();

    for key in vars.keys() {
        realize_one_variable(key, vars, refs, &mut realized, &mut visiting)?;
    }

    Ok(realized)
}

fn realize_one_variable(
    key: &str,
    vars: &HashMap<String, String>,
    refs: &RustRegex,
    realized: &mut HashMap<String, String>,
    visiting: &mut HashSet<String>,
) -> Result<String, GrammarError> {
    if let Some(val) = realized.get(key) {
        return Ok(val.clone());
    }
    if !visiting.insert(key.to_string()) {
        return Err(GrammarError::CircularVariableReference(key.to_string()));
    }

    let raw = vars
        .get(key)
        .ok_or_else(|| GrammarError::UnknownVariable(key.to_string()))?;

    let mut out = String::new();
    let mut last = 0usize;
    for (start, end, name) in variable_refs(raw, refs) {
        out.push_str(&raw[last..start]);
        out.push_str(&realize_one_variable(&name, vars, refs, realized, visiting)?);
        last = end;
    }
    out.push_str(&raw[last..]);

    visiting.remove(key);
    realized.insert(key.to_string(), out.clone());
    Ok(out)
}

fn substitute_variables(
    text: &str,
    vars: &HashMap<String, String>,
    refs: &RustRegex,
) -> Result<String, GrammarError> {
    let mut out = String::new();
    let mut last = 0usize;
    for (start, end, name) in variable_refs(text, refs) {
        out.push_str(&text[last..start]);
        let value = vars
            .get(&name)
            .ok_or_else(|| GrammarError::UnknownVariable(name.clone()))?;
        out.push_str(value);
        last = end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

// Only `{{[A-Za-z0-9_]+}}` is a variable; any other `{{` stays literal.
fn variable_refs(text: &str, refs: &RustRegex) -> Vec<(usize, usize, String)> {
    refs.captures_iter(text)
        .filter_map(|cap| {
            let m = cap.get(0)?;
            let name = cap.get(1)?.as_str().to_string();
            Some((m.start(), m.end(), name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variables_expand_recursively() {
        let refs = RustRegex::new(r"\{\{([A-Za-z0-9_]+)\}\}").unwrap();
        let vars = HashMap::from([
            ("ident".to_string(), "[a-z]+".to_string()),
            ("call".to_string(), "{{ident}}\\(".to_string()),
        ]);
        let realized = realize_variables(&vars, &refs).unwrap();
        assert_eq!(realized["call"], "[a-z]+\\(");
        assert_eq!(substitute_variables("x{{call}}{{ literal}}", &realized, &refs).unwrap(), "x[a-z]+\\({{ literal}}");
    }

    #[test]
    fn test_circular_variables_are_rejected() {
        let refs = RustRegex::new(r"\{\{([A-Za-z0-9_]+)\}\}").unwrap();
        let vars = HashMap::from([
            ("a".to_string(), "{{b}}".to_string()),
            ("b".to_string(), "{{a}}".to_string()),
        ]);
        assert!(matches!(
            realize_variables(&vars, &refs),
            Err(GrammarError::CircularVariableReference(_))
        ));
    }

    #[test]
    fn test_includes_are_flattened_with_prototype_first() {
        let grammar = YamlGrammar::from_yaml(
            r#"
scope: source.test
contexts:
  prototype:
    - match: '#'
      scope: comment.test
  main:
    - match: a
    - include: other
  other:
    - meta_include_prototype: false
    - match: b
"#,
        )
        .unwrap();
        let main = &grammar.contexts[grammar.main];
        assert_eq!(main.patterns.len(), 3);
        let other = grammar
            .contexts
            .iter()
            .find(|c| c.name == "other")
            .unwrap();
        assert_eq!(other.patterns.len(), 1);
    }

    #[test]
    fn test_include_cycles_are_rejected() {
        let result = YamlGrammar::from_yaml(
            r#"
scope: source.test
contexts:
  main:
    - include: a
  a:
    - include: main
"#,
        );
        assert!(matches!(result, Err(GrammarError::IncludeCycle(_))));
    }

    #[test]
    fn test_bad_regex_is_a_load_error() {
        let result = YamlGrammar::from_yaml(
            r#"
scope: source.test
contexts:
  main:
    - match: '(unclosed'
"#,
        );
        assert!(matches!(result, Err(GrammarError::RegexCompile { .. })));
    }
}
