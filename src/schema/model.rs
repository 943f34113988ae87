use std::sync::atomic::{AtomicU64, Ordering};

use arcstr::ArcStr;
use fnv::FnvHashMap;

use super::meta::{MetaType, ObjectMeta};

static NEXT_SCHEMA_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// An executable schema: the registry of named types plus the root
/// operation types.
///
/// Schemas are read-only once built and may be shared across requests; each
/// one carries a process-unique `identity` so caches keyed on a schema
/// survive hot swaps correctly.
#[derive(Debug)]
pub struct Schema {
    types: FnvHashMap<ArcStr, MetaType>,
    query_type_name: ArcStr,
    mutation_type_name: Option<ArcStr>,
    subscription_type_name: Option<ArcStr>,
    identity: u64,
}

impl Schema {
    /// Starts building a [`Schema`] with the given query root type name.
    pub fn build(query_type_name: impl Into<ArcStr>) -> SchemaBuilder {
        SchemaBuilder {
            types: FnvHashMap::default(),
            query_type_name: query_type_name.into(),
            mutation_type_name: None,
            subscription_type_name: None,
        }
    }

    /// Process-unique identity of this schema instance.
    pub fn identity(&self) -> u64 {
        self.identity
    }

    /// Looks up a named type.
    pub fn concrete_type_by_name(&self, name: &str) -> Option<&MetaType> {
        self.types.get(name)
    }

    /// Looks up a named object type.
    pub fn object_type_by_name(&self, name: &str) -> Option<&ObjectMeta> {
        match self.types.get(name) {
            Some(MetaType::Object(o)) => Some(o),
            _ => None,
        }
    }

    /// Name of the query root type.
    pub fn query_type_name(&self) -> &ArcStr {
        &self.query_type_name
    }

    /// Name of the mutation root type, if mutations are supported.
    pub fn mutation_type_name(&self) -> Option<&ArcStr> {
        self.mutation_type_name.as_ref()
    }

    /// Name of the subscription root type, if subscriptions are supported.
    pub fn subscription_type_name(&self) -> Option<&ArcStr> {
        self.subscription_type_name.as_ref()
    }

    /// Is `type_name` the query root type?
    pub fn is_query_type(&self, type_name: &str) -> bool {
        self.query_type_name == type_name
    }

    /// The concrete object types an abstract type can resolve to.
    ///
    /// Objects resolve to themselves.
    pub fn possible_types(&self, t: &MetaType) -> Vec<&ObjectMeta> {
        match t {
            MetaType::Object(o) => self.object_type_by_name(&o.name).into_iter().collect(),
            MetaType::Union(u) => u
                .of_type_names
                .iter()
                .filter_map(|n| self.object_type_by_name(n))
                .collect(),
            MetaType::Interface(i) => self
                .types
                .values()
                .filter_map(|t| match t {
                    MetaType::Object(o) if o.interface_names.contains(&i.name) => Some(o),
                    _ => None,
                })
                .collect(),
            MetaType::Scalar(_) | MetaType::Enum(_) => vec![],
        }
    }

    /// Names of the concrete object types a named composite type can
    /// resolve to.
    pub fn possible_type_names(&self, type_name: &str) -> Vec<ArcStr> {
        self.concrete_type_by_name(type_name)
            .map(|t| self.possible_types(t).iter().map(|o| o.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Does a value of concrete `object_type` satisfy the fragment type
    /// `condition`?
    pub fn fragment_applies(&self, object_type: &str, condition: &str) -> bool {
        if object_type == condition {
            return true;
        }
        match self.concrete_type_by_name(condition) {
            Some(abstract_type) if abstract_type.is_abstract() => self
                .possible_types(abstract_type)
                .iter()
                .any(|o| o.name == object_type),
            _ => false,
        }
    }

    /// Is `sub_type_name` a (named) subtype of `super_type_name`?
    pub fn is_named_subtype(&self, sub_type_name: &str, super_type_name: &str) -> bool {
        if sub_type_name == super_type_name {
            return true;
        }
        match (
            self.concrete_type_by_name(sub_type_name),
            self.concrete_type_by_name(super_type_name),
        ) {
            (Some(sub), Some(sup)) if sup.is_abstract() => self
                .possible_types(sup)
                .iter()
                .any(|o| o.name == *sub.name()),
            _ => false,
        }
    }
}

/// Incremental [`Schema`] construction.
pub struct SchemaBuilder {
    types: FnvHashMap<ArcStr, MetaType>,
    query_type_name: ArcStr,
    mutation_type_name: Option<ArcStr>,
    subscription_type_name: Option<ArcStr>,
}

impl SchemaBuilder {
    /// Registers a type.
    #[must_use]
    pub fn with_type(mut self, meta: impl Into<MetaType>) -> SchemaBuilder {
        let meta = meta.into();
        self.types.insert(meta.name().clone(), meta);
        self
    }

    /// Sets the mutation root type name.
    #[must_use]
    pub fn with_mutation(mut self, name: impl Into<ArcStr>) -> SchemaBuilder {
        self.mutation_type_name = Some(name.into());
        self
    }

    /// Sets the subscription root type name.
    #[must_use]
    pub fn with_subscription(mut self, name: impl Into<ArcStr>) -> SchemaBuilder {
        self.subscription_type_name = Some(name.into());
        self
    }

    /// Finishes the build.
    ///
    /// # Panics
    ///
    /// If a declared root operation type is not registered as an object
    /// type. This is a schema construction bug, not a request-time error.
    pub fn finish(self) -> Schema {
        let schema = Schema {
            types: self.types,
            query_type_name: self.query_type_name,
            mutation_type_name: self.mutation_type_name,
            subscription_type_name: self.subscription_type_name,
            identity: NEXT_SCHEMA_IDENTITY.fetch_add(1, Ordering::Relaxed),
        };
        assert!(
            schema.object_type_by_name(&schema.query_type_name).is_some(),
            "query root type {:?} is not a registered object type",
            schema.query_type_name.as_str(),
        );
        for root in [&schema.mutation_type_name, &schema.subscription_type_name]
            .into_iter()
            .flatten()
        {
            assert!(
                schema.object_type_by_name(root).is_some(),
                "root operation type {:?} is not a registered object type",
                root.as_str(),
            );
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use arcstr::literal;

    use crate::{
        ast::Type,
        schema::meta::{Field, InterfaceMeta, ObjectMeta, ScalarMeta, UnionMeta},
    };

    use super::Schema;

    fn sample() -> Schema {
        Schema::build("Query")
            .with_type(ScalarMeta {
                name: literal!("String"),
            })
            .with_type(ObjectMeta {
                name: literal!("Query"),
                fields: vec![Field::new("pet", Type::Named(literal!("Pet")))],
                interface_names: vec![],
            })
            .with_type(InterfaceMeta {
                name: literal!("Named"),
                fields: vec![Field::new("name", Type::Named(literal!("String")))],
            })
            .with_type(ObjectMeta {
                name: literal!("Dog"),
                fields: vec![Field::new("name", Type::Named(literal!("String")))],
                interface_names: vec![literal!("Named")],
            })
            .with_type(ObjectMeta {
                name: literal!("Cat"),
                fields: vec![Field::new("name", Type::Named(literal!("String")))],
                interface_names: vec![],
            })
            .with_type(UnionMeta {
                name: literal!("Pet"),
                of_type_names: vec![literal!("Dog"), literal!("Cat")],
            })
            .finish()
    }

    #[test]
    fn possible_types_of_union_and_interface() {
        let schema = sample();
        assert_eq!(schema.possible_type_names("Pet").len(), 2);
        assert_eq!(schema.possible_type_names("Named"), vec!["Dog"]);
        assert_eq!(schema.possible_type_names("Dog"), vec!["Dog"]);
    }

    #[test]
    fn fragment_applicability() {
        let schema = sample();
        assert!(schema.fragment_applies("Dog", "Dog"));
        assert!(schema.fragment_applies("Dog", "Named"));
        assert!(schema.fragment_applies("Dog", "Pet"));
        assert!(!schema.fragment_applies("Cat", "Named"));
    }

    #[test]
    fn identity_is_unique_per_instance() {
        assert_ne!(sample().identity(), sample().identity());
    }
}
