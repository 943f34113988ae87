//! Metadata for the types a schema is made of.

use arcstr::ArcStr;

use crate::ast::Type;

/// An argument declared on a schema field.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    /// Name of the argument.
    pub name: ArcStr,
    /// Declared type of the argument.
    pub arg_type: Type,
}

impl Argument {
    /// Builds a new [`Argument`] of the given `name` and `arg_type`.
    pub fn new(name: impl Into<ArcStr>, arg_type: Type) -> Argument {
        Argument {
            name: name.into(),
            arg_type,
        }
    }
}

/// A field declared on an object or interface type.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Name of the field.
    pub name: ArcStr,
    /// Declared arguments.
    pub arguments: Vec<Argument>,
    /// Declared result type.
    pub field_type: Type,
}

impl Field {
    /// Builds a new [`Field`] of the given `name` and `field_type`.
    pub fn new(name: impl Into<ArcStr>, field_type: Type) -> Field {
        Field {
            name: name.into(),
            arguments: Vec::new(),
            field_type,
        }
    }

    /// Adds an `argument` to this [`Field`].
    #[must_use]
    pub fn argument(mut self, argument: Argument) -> Field {
        self.arguments.push(argument);
        self
    }
}

/// Scalar type metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarMeta {
    /// Name of the scalar.
    pub name: ArcStr,
}

/// Enum type metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumMeta {
    /// Name of the enum.
    pub name: ArcStr,
    /// Declared enum values.
    pub values: Vec<ArcStr>,
}

/// Object type metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectMeta {
    /// Name of the object type.
    pub name: ArcStr,
    /// Declared fields.
    pub fields: Vec<Field>,
    /// Names of the interfaces the type implements.
    pub interface_names: Vec<ArcStr>,
}

/// Interface type metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceMeta {
    /// Name of the interface.
    pub name: ArcStr,
    /// Declared fields.
    pub fields: Vec<Field>,
}

/// Union type metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct UnionMeta {
    /// Name of the union.
    pub name: ArcStr,
    /// Names of the member object types.
    pub of_type_names: Vec<ArcStr>,
}

/// Metadata of a named schema type.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaType {
    /// Scalar type.
    Scalar(ScalarMeta),
    /// Enum type.
    Enum(EnumMeta),
    /// Object type.
    Object(ObjectMeta),
    /// Interface type.
    Interface(InterfaceMeta),
    /// Union type.
    Union(UnionMeta),
}

impl MetaType {
    /// Name of the described type.
    pub fn name(&self) -> &ArcStr {
        match self {
            MetaType::Scalar(ScalarMeta { name, .. })
            | MetaType::Enum(EnumMeta { name, .. })
            | MetaType::Object(ObjectMeta { name, .. })
            | MetaType::Interface(InterfaceMeta { name, .. })
            | MetaType::Union(UnionMeta { name, .. }) => name,
        }
    }

    /// Can selection sets be applied to this type?
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            MetaType::Object(_) | MetaType::Interface(_) | MetaType::Union(_),
        )
    }

    /// Does this type have concrete member types determined at runtime?
    pub fn is_abstract(&self) -> bool {
        matches!(self, MetaType::Interface(_) | MetaType::Union(_))
    }

    /// Is this a response leaf?
    pub fn is_leaf(&self) -> bool {
        matches!(self, MetaType::Scalar(_) | MetaType::Enum(_))
    }

    /// Looks up a declared field by name. Only objects and interfaces carry
    /// fields.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        match self {
            MetaType::Object(ObjectMeta { fields, .. })
            | MetaType::Interface(InterfaceMeta { fields, .. }) => {
                fields.iter().find(|f| f.name == name)
            }
            _ => None,
        }
    }
}

impl From<ScalarMeta> for MetaType {
    fn from(s: ScalarMeta) -> MetaType {
        MetaType::Scalar(s)
    }
}

impl From<EnumMeta> for MetaType {
    fn from(e: EnumMeta) -> MetaType {
        MetaType::Enum(e)
    }
}

impl From<ObjectMeta> for MetaType {
    fn from(o: ObjectMeta) -> MetaType {
        MetaType::Object(o)
    }
}

impl From<InterfaceMeta> for MetaType {
    fn from(i: InterfaceMeta) -> MetaType {
        MetaType::Interface(i)
    }
}

impl From<UnionMeta> for MetaType {
    fn from(u: UnionMeta) -> MetaType {
        MetaType::Union(u)
    }
}
