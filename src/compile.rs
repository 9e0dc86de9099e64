//! Binding of parsed syntax trees into a design compilation: definition
//! lookup, top-module resolution, and the semantic checks the driver
//! reports on.
use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::{
    diag::{DiagCode, Diagnostic},
    options::CompilationOptions,
    syntax::{Definition, DefinitionKind, SyntaxTree},
};

struct DefInfo {
    definition: Definition,
    is_library: bool,
}

pub struct Compilation {
    options: CompilationOptions,
    definitions: HashMap<String, DefInfo>,
    order: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    tops: Vec<String>,
}

impl Compilation {
    pub fn new(options: CompilationOptions) -> Self {
        Self {
            options,
            definitions: HashMap::new(),
            order: Vec::new(),
            diagnostics: Vec::new(),
            tops: Vec::new(),
        }
    }

    /// Binds a tree's definitions into the compilation. Redefinition of a
    /// name keeps the first definition and diagnoses the second.
    pub fn add_tree(&mut self, tree: &SyntaxTree) {
        for def in &tree.definitions {
            if self.definitions.contains_key(&def.name) {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagCode::DuplicateDefinition,
                        format!("duplicate definition of '{}'", def.name),
                    )
                    .at(def.location),
                );
                continue;
            }
            self.order.push(def.name.clone());
            self.definitions.insert(
                def.name.clone(),
                DefInfo {
                    definition: def.clone(),
                    is_library: tree.is_library,
                },
            );
        }
    }

    /// Names instantiated somewhere but defined nowhere. The driver uses
    /// this to pull in missing modules from the library search path before
    /// elaborating.
    pub fn missing_module_names(&self) -> Vec<String> {
        self.order
            .iter()
            .flat_map(|name| &self.definitions[name].definition.instantiations)
            .map(|inst| &inst.definition)
            .filter(|name| !self.definitions.contains_key(*name))
            .unique()
            .cloned()
            .collect()
    }

    /// Resolves top modules and runs the semantic checks. Top modules are
    /// the modules of the main unit that nothing instantiates; library
    /// modules never become tops on their own.
    pub fn elaborate(&mut self) {
        let instantiated = self.reachable_instantiated_names();

        if self.options.top_modules.is_empty() {
            self.tops = self
                .order
                .iter()
                .filter(|name| {
                    let info = &self.definitions[*name];
                    info.definition.kind == DefinitionKind::Module
                        && !info.is_library
                        && !instantiated.contains(*name)
                })
                .cloned()
                .collect();
        } else {
            self.tops = Vec::new();
            for name in self.options.top_modules.clone() {
                if self.definitions.contains_key(&name) {
                    self.tops.push(name);
                } else {
                    self.diagnostics.push(Diagnostic::new(
                        DiagCode::UnknownModule,
                        format!("unknown top module '{}'", name),
                    ));
                }
            }
        }

        if self.tops.is_empty() && !self.options.lint_mode && !self.definitions.is_empty() {
            self.diagnostics.push(Diagnostic::new(
                DiagCode::NoTopModules,
                "no top-level modules found in design".to_owned(),
            ));
        }

        for name in self.tops.clone() {
            self.check_instance_depth(&name, 1, &mut HashSet::new());
        }

        let reachable = self.reachable_definitions();
        for name in &self.order.clone() {
            let info = &self.definitions[name];
            if info.is_library && !reachable.contains(name) {
                if info.definition.kind == DefinitionKind::Module
                    && !self.options.suppress_unused
                {
                    self.diagnostics.push(
                        Diagnostic::new(
                            DiagCode::UnusedDefinition,
                            format!("definition '{}' is unused", name),
                        )
                        .at(info.definition.location),
                    );
                }
                continue;
            }

            for inst in &info.definition.instantiations {
                if !self.definitions.contains_key(&inst.definition)
                    && !self.options.ignore_unknown_modules
                {
                    self.diagnostics.push(
                        Diagnostic::new(
                            DiagCode::UnknownModule,
                            format!("unknown module '{}'", inst.definition),
                        )
                        .at(inst.location),
                    );
                }
            }
            for &at in &info.definition.enum_conversions {
                if !self.options.relax_enum_conversions {
                    self.diagnostics.push(
                        Diagnostic::new(
                            DiagCode::ImplicitConvert,
                            "implicit conversion from integral value to enum type".to_owned(),
                        )
                        .at(at),
                    );
                }
            }
        }

        for over in &self.options.param_overrides {
            log::debug!("parameter override: {}", over);
        }
    }

    /// Modules reachable from the main (non-library) definitions, i.e.
    /// everything that would actually elaborate.
    fn reachable_definitions(&self) -> HashSet<String> {
        let mut pending: Vec<String> = self
            .order
            .iter()
            .filter(|name| !self.definitions[*name].is_library)
            .cloned()
            .collect();
        let mut seen: HashSet<String> = pending.iter().cloned().collect();
        while let Some(name) = pending.pop() {
            for inst in &self.definitions[&name].definition.instantiations {
                if self.definitions.contains_key(&inst.definition)
                    && seen.insert(inst.definition.clone())
                {
                    pending.push(inst.definition.clone());
                }
            }
        }
        seen
    }

    fn reachable_instantiated_names(&self) -> HashSet<String> {
        let reachable = self.reachable_definitions();
        let mut instantiated = HashSet::new();
        for name in &self.order {
            if !reachable.contains(name) {
                continue;
            }
            for inst in &self.definitions[name].definition.instantiations {
                if self.definitions.contains_key(&inst.definition) {
                    instantiated.insert(inst.definition.clone());
                }
            }
        }
        instantiated
    }

    fn check_instance_depth(&mut self, name: &str, depth: usize, path: &mut HashSet<String>) {
        if depth > self.options.max_instance_depth {
            self.diagnostics.push(Diagnostic::new(
                DiagCode::MaxInstanceDepthExceeded,
                format!(
                    "design hierarchy exceeds maximum depth of {}",
                    self.options.max_instance_depth
                ),
            ));
            return;
        }
        if !path.insert(name.to_owned()) {
            // Instantiation cycle; the depth limit would also catch it,
            // but there is no point recursing further.
            self.diagnostics.push(Diagnostic::new(
                DiagCode::MaxInstanceDepthExceeded,
                format!("instantiation of '{}' is recursive", name),
            ));
            return;
        }
        let children: Vec<String> = match self.definitions.get(name) {
            Some(info) => info
                .definition
                .instantiations
                .iter()
                .map(|inst| inst.definition.clone())
                .collect(),
            None => Vec::new(),
        };
        for child in children {
            if self.definitions.contains_key(&child) {
                self.check_instance_depth(&child, depth + 1, path);
            }
        }
        path.remove(name);
    }

    pub fn top_modules(&self) -> &[String] {
        &self.tops
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}
