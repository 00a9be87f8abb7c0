//! Generic resolution: concrete-argument validation against declared
//! parameters and their backing interfaces, and the rewriting of generic
//! types to concrete types along call chains.

use super::{ClsRef, ContextAnalyzer};
use crate::ast::{ClassId, ExprId, ExprKind};
use vela_core::{SourceLoc, Type, TypeKind};

impl ContextAnalyzer {
    // =========================================================================
    // Concrete mappings
    // =========================================================================

    /// A declared use `Type<A,B,…>` must match the class's generic count
    /// and each argument must satisfy its backing interface.
    pub(crate) fn validate_declared_generics(
        &mut self,
        ty: &Type,
        loc: &SourceLoc,
        context: ClassId,
    ) {
        let Some(cls) = self.get_program_library_class(&ty.name) else {
            return;
        };

        let declared = match &cls {
            ClsRef::Program(cid) => self.program.classes[cid.0].generics.len(),
            ClsRef::Library(name) => self
                .linker
                .search_class(name, &self.program.uses)
                .map_or(0, |c| c.generics.len()),
        };

        if declared != ty.generics.len() {
            self.error(loc, "Concrete and generic size mismatch");
            return;
        }

        let mut resolved = ty.clone();
        for generic in &mut resolved.generics {
            self.resolve_class_enum_type(generic, context);
        }
        self.validate_generic_concrete_mapping(&resolved.generics, &cls, loc);
    }

    /// Check each concrete argument against the corresponding parameter's
    /// backing interface.
    pub(crate) fn validate_generic_concrete_mapping(
        &mut self,
        concrete_types: &[Type],
        cls: &ClsRef,
        loc: &SourceLoc,
    ) {
        let backings: Vec<Option<Type>> = match cls {
            ClsRef::Program(cid) => self.program.classes[cid.0]
                .generics
                .iter()
                .map(|g| g.backing.clone())
                .collect(),
            ClsRef::Library(name) => match self.linker.search_class(name, &self.program.uses) {
                Some(lib) => lib.generics.iter().map(|(_, b)| b.clone()).collect(),
                None => return,
            },
        };

        if backings.len() != concrete_types.len() {
            self.error(loc, "Concrete and generic size mismatch");
            return;
        }

        for (concrete, backing) in concrete_types.iter().zip(backings) {
            let Some(mut backing) = backing else {
                continue;
            };
            if let Some(context) = self.current_class {
                self.resolve_class_enum_type(&mut backing, context);
            }
            self.validate_generic_backing(concrete, &backing.name, loc);
        }
    }

    /// A concrete argument satisfies a backing interface when it is the
    /// backing class itself or casts down to it.
    pub(crate) fn validate_generic_backing(
        &mut self,
        concrete: &Type,
        backing_name: &str,
        loc: &SourceLoc,
    ) {
        // generic parameters of the current class satisfy a backing they
        // re-declare
        if let Some(cid) = self.current_class {
            if let Some(generic) = self.program.classes[cid.0].generic(&concrete.name) {
                match &generic.backing {
                    Some(backing) if backing.name == backing_name => return,
                    _ => {}
                }
            }
        }

        // primitive concrete arguments check through their holder classes
        let concrete_name = match crate::library::holder_class_for(concrete.kind) {
            Some(holder) => holder.to_string(),
            None => concrete.name.clone(),
        };

        let Some(concrete_cls) = self.get_program_library_class(&concrete_name) else {
            self.error(
                loc,
                format!(
                    "Concrete class '{}' is incompatible with backing class/interface '{}'",
                    concrete.name.replace('#', "->"),
                    backing_name.replace('#', "->")
                ),
            );
            return;
        };

        if self.cls_ref_name(&concrete_cls) == backing_name
            || self.valid_down_cast(backing_name, &concrete_cls)
        {
            return;
        }

        self.error(
            loc,
            format!(
                "Concrete class '{}' is incompatible with backing class/interface '{}'",
                concrete.name.replace('#', "->"),
                backing_name.replace('#', "->")
            ),
        );
    }

    // =========================================================================
    // Concrete types at call sites
    // =========================================================================

    /// The concrete generic arguments in force at a call site: explicit
    /// `Class<A,B>` arguments first, then the receiver variable's declared
    /// generics.
    pub(crate) fn concrete_types_for_call(&self, eid: ExprId) -> Vec<Type> {
        let ExprKind::MethodCall(data) = &self.program.exprs[eid.0].kind else {
            return Vec::new();
        };
        if !data.concrete_types.is_empty() {
            return data.concrete_types.clone();
        }
        if let Some(entry) = data.entry {
            return self.symbols.entry(entry).ty.generics.clone();
        }
        Vec::new()
    }

    // =========================================================================
    // Generic-to-concrete rewriting
    // =========================================================================

    /// Rewrite a candidate type that names a generic parameter of `cls`
    /// into the concrete type the call site supplies. Function types map
    /// their parameters and return recursively. Types that name no generic
    /// parameter come back unchanged.
    pub(crate) fn resolve_generic_type(
        &mut self,
        candidate: &Type,
        eid: ExprId,
        cls: &ClsRef,
        is_rtrn: bool,
    ) -> Type {
        let has_generics = match cls {
            ClsRef::Program(cid) => self.program.classes[cid.0].has_generics(),
            ClsRef::Library(name) => self
                .linker
                .search_class(name, &self.program.uses)
                .is_some_and(|c| c.has_generics()),
        };
        if !has_generics {
            return candidate.clone();
        }

        if candidate.kind == TypeKind::Func {
            let params: Vec<Type> = candidate
                .func_params
                .iter()
                .map(|p| self.resolve_generic_type(p, eid, cls, false))
                .collect();
            let ret = candidate
                .func_return
                .as_deref()
                .map(|r| self.resolve_generic_type(r, eid, cls, false))
                .unwrap_or_else(Type::nil);
            return Type::func(params, ret).with_dimension(candidate.dimension);
        }

        if candidate.kind != TypeKind::Class {
            return candidate.clone();
        }

        let index = match cls {
            ClsRef::Program(cid) => self.program.classes[cid.0].generic_index(&candidate.name),
            ClsRef::Library(name) => self
                .linker
                .search_class(name, &self.program.uses)
                .and_then(|c| c.generic_index(&candidate.name)),
        };

        let Some(index) = index else {
            return candidate.clone();
        };

        let concrete_types = self.concrete_types_for_call(eid);
        let Some(concrete) = concrete_types.get(index) else {
            if is_rtrn {
                let loc = self.expr_loc(eid);
                self.error(&loc, "Concrete to generic size mismatch");
            }
            return candidate.clone();
        };

        let mut resolved = concrete.clone();
        resolved.dimension += candidate.dimension;
        resolved
    }
}
