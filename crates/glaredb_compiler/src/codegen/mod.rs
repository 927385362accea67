pub mod function_builder;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::ast::{Expr, FieldDecl, Identifier, Type};
use crate::config::CompilerConfig;

/// Prefix of generated pipeline function names, followed by the pipeline
/// index.
pub(crate) const PIPELINE_PREFIX: &str = "pipeline";

/// If the name is one only a pipeline may use.
fn is_pipeline_name(name: &str) -> bool {
    match name.strip_prefix(PIPELINE_PREFIX) {
        Some(index) => !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Shared context for compiling all pipelines of a single query.
///
/// All identifiers in the generated program must be allocated through the
/// context. Pipelines and translators only ever hold a shared reference to
/// this.
#[derive(Debug)]
pub struct CodeGen {
    config: CompilerConfig,
    registry: Mutex<IdentifierRegistry>,
    /// Name of the struct holding all query state.
    state_type: Identifier,
    /// Name of the parameter pointing to the query state in every generated
    /// function.
    state_param: Identifier,
}

#[derive(Debug, Default)]
struct IdentifierRegistry {
    /// Every identifier handed out, keyed by name.
    identifiers: HashMap<String, Identifier>,
    /// Next suffix to try per base name when minting fresh identifiers.
    suffixes: HashMap<String, usize>,
}

impl IdentifierRegistry {
    fn intern(&mut self, name: &str) -> Identifier {
        if let Some(ident) = self.identifiers.get(name) {
            return ident.clone();
        }
        let ident = Identifier::new(name);
        self.identifiers.insert(name.to_string(), ident.clone());
        ident
    }

    /// Fresh identifiers never take a pipeline function name, even one that
    /// hasn't been interned yet.
    fn fresh(&mut self, base: &str) -> Identifier {
        if !self.identifiers.contains_key(base) && !is_pipeline_name(base) {
            return self.intern(base);
        }

        let mut suffix = self.suffixes.get(base).copied().unwrap_or(1);
        loop {
            let candidate = format!("{base}_{suffix}");
            suffix += 1;
            if !self.identifiers.contains_key(candidate.as_str()) {
                self.suffixes.insert(base.to_string(), suffix);
                return self.intern(&candidate);
            }
        }
    }
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl CodeGen {
    pub fn new(config: CompilerConfig) -> Self {
        let mut registry = IdentifierRegistry::default();
        let state_type = registry.intern("State");
        let state_param = registry.intern("state");

        CodeGen {
            config,
            registry: Mutex::new(registry),
            state_type,
            state_param,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Get the identifier for exactly this name.
    ///
    /// Requesting the same name multiple times returns equal identifiers.
    pub fn identifier(&self, name: &str) -> Identifier {
        self.registry.lock().intern(name)
    }

    /// Allocate an identifier that hasn't been handed out before.
    ///
    /// The first request for a base name returns the base name itself, later
    /// requests get a numeric suffix. Names of the form `pipeline<index>` are
    /// reserved for pipeline functions and are always suffixed.
    pub fn new_identifier(&self, base: &str) -> Identifier {
        self.registry.lock().fresh(base)
    }

    /// Number of distinct identifiers allocated so far.
    pub fn num_identifiers(&self) -> usize {
        self.registry.lock().identifiers.len()
    }

    pub fn state_type(&self) -> &Identifier {
        &self.state_type
    }

    pub fn state_param(&self) -> &Identifier {
        &self.state_param
    }

    /// Parameters shared by every pipeline function, setup, and teardown.
    pub fn pipeline_params(&self) -> Vec<FieldDecl> {
        vec![FieldDecl::new(
            &self.state_param,
            Type::pointer_to(Type::named(&self.state_type)),
        )]
    }

    /// Expression accessing a field on the query state, `state.field`.
    pub fn state_field(&self, field: &Identifier) -> Expr {
        Expr::ident(&self.state_param).field(field)
    }

    /// Pointer to a field on the query state, `&state.field`.
    pub fn state_field_ptr(&self, field: &Identifier) -> Expr {
        self.state_field(field).address_of()
    }
}
