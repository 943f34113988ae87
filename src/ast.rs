//! Validated operation syntax trees, as handed to the engine.
//!
//! The engine does not parse documents itself; callers hand it an already
//! parsed and validated [`Document`]. All nodes own their data (names are
//! cheaply-cloned [`ArcStr`]s) so that query plans derived from a document
//! can be cached and shared across requests.

use std::{fmt, slice, vec};

use arcstr::ArcStr;

use crate::value::ScalarValue;

/// A reference to a line and column in an input source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy)]
pub struct SourcePosition {
    index: usize,
    line: usize,
    col: usize,
}

impl SourcePosition {
    #[doc(hidden)]
    pub fn new(index: usize, line: usize, col: usize) -> SourcePosition {
        SourcePosition { index, line, col }
    }

    /// The position of the first character in an input source.
    pub fn new_origin() -> SourcePosition {
        SourcePosition {
            index: 0,
            line: 0,
            col: 0,
        }
    }

    /// The 0-based index of the character in the input source.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The 0-based line of the character in the input source.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The 0-based column of the character in the input source.
    pub fn column(&self) -> usize {
        self.col
    }
}

/// A range of characters in the input source, starting at the character
/// pointed by the `start` field and ending just before the `end` marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub struct Span {
    /// Start position of the span.
    pub start: SourcePosition,

    /// First source position _after_ the span.
    pub end: SourcePosition,
}

impl Span {
    #[doc(hidden)]
    pub fn new(start: SourcePosition, end: SourcePosition) -> Span {
        Span { start, end }
    }

    #[doc(hidden)]
    pub fn zero_width(pos: SourcePosition) -> Span {
        Span::new(pos, pos)
    }

    #[doc(hidden)]
    pub fn unlocated() -> Span {
        Span::new(SourcePosition::new_origin(), SourcePosition::new_origin())
    }
}

/// Wraps items with start and end markers in the input source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub struct Spanning<T> {
    /// The wrapped item.
    pub item: T,

    /// The span.
    pub span: Span,
}

impl<T> Spanning<T> {
    #[doc(hidden)]
    pub fn new(span: Span, item: T) -> Spanning<T> {
        Spanning { item, span }
    }

    /// Wraps an `item` that carries no source location.
    pub fn unlocated(item: T) -> Spanning<T> {
        Spanning::new(Span::unlocated(), item)
    }

    #[doc(hidden)]
    pub fn start(&self) -> &SourcePosition {
        &self.span.start
    }

    /// Modify the contents of the spanned item.
    pub fn map<O, F: FnOnce(T) -> O>(self, f: F) -> Spanning<O> {
        Spanning::new(self.span, f(self.item))
    }
}

/// Type literal in a syntax tree.
///
/// Carries no semantic information and might refer to types that don't
/// exist.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// `null`able named type, e.g. `String`.
    Named(ArcStr),
    /// `null`able list type, e.g. `[String]`.
    ///
    /// The list itself is `null`able, the containing [`Type`] might be not.
    List(Box<Type>),
    /// Non-`null` named type, e.g. `String!`.
    NonNullNamed(ArcStr),
    /// Non-`null` list type, e.g. `[String]!`.
    NonNullList(Box<Type>),
}

impl Type {
    /// Returns the name of this named [`Type`].
    ///
    /// Only applies to named types; lists will return [`None`].
    pub fn name(&self) -> Option<&str> {
        match self {
            Type::Named(n) | Type::NonNullNamed(n) => Some(n),
            Type::List(_) | Type::NonNullList(_) => None,
        }
    }

    /// Returns the innermost name of this [`Type`] by unpacking lists.
    ///
    /// All [`Type`] literals contain exactly one name.
    pub fn innermost_name(&self) -> &str {
        match self {
            Type::Named(n) | Type::NonNullNamed(n) => n,
            Type::List(l) | Type::NonNullList(l) => l.innermost_name(),
        }
    }

    /// Indicates whether this [`Type`] can only represent non-`null` values.
    pub fn is_non_null(&self) -> bool {
        matches!(self, Type::NonNullNamed(_) | Type::NonNullList(_))
    }

    /// Strips one non-`null` layer, if there is any.
    pub fn nullable(&self) -> Type {
        match self {
            Type::NonNullNamed(n) => Type::Named(n.clone()),
            Type::NonNullList(l) => Type::List(l.clone()),
            t => t.clone(),
        }
    }

    /// Borrows the element type of this list [`Type`], if it is one.
    pub fn list_inner(&self) -> Option<&Type> {
        match self {
            Type::List(l) | Type::NonNullList(l) => Some(l),
            Type::Named(_) | Type::NonNullNamed(_) => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Named(n) => write!(f, "{n}"),
            Type::NonNullNamed(n) => write!(f, "{n}!"),
            Type::List(t) => write!(f, "[{t}]"),
            Type::NonNullList(t) => write!(f, "[{t}]!"),
        }
    }
}

/// A JSON-like value passed into the query execution, either out-of-band or
/// in-band as default variable values. These are _not_ constant and might
/// contain variables.
///
/// List and object variants are _spanned_: they contain a reference to their
/// position in the source file, if available.
#[derive(Clone, Debug, PartialEq)]
pub enum InputValue {
    /// Explicit `null`.
    Null,
    /// Scalar literal.
    Scalar(ScalarValue),
    /// Enum literal, kept as its name.
    Enum(String),
    /// Variable reference, e.g. `$id`.
    Variable(String),
    /// List literal.
    List(Vec<Spanning<InputValue>>),
    /// Input object literal.
    Object(Vec<(Spanning<String>, Spanning<InputValue>)>),
}

/// The map of variables used for substitution during query execution.
pub type Variables = fnv::FnvHashMap<String, InputValue>;

impl InputValue {
    /// Construct a `null` value.
    pub fn null() -> InputValue {
        InputValue::Null
    }

    /// Construct a scalar value.
    pub fn scalar<T: Into<ScalarValue>>(v: T) -> InputValue {
        InputValue::Scalar(v.into())
    }

    /// Construct an enum value.
    pub fn enum_value<T: AsRef<str>>(s: T) -> InputValue {
        InputValue::Enum(s.as_ref().into())
    }

    /// Construct a variable reference.
    pub fn variable<T: AsRef<str>>(v: T) -> InputValue {
        InputValue::Variable(v.as_ref().into())
    }

    /// Construct an unlocated list.
    pub fn list(l: Vec<InputValue>) -> InputValue {
        InputValue::List(l.into_iter().map(Spanning::unlocated).collect())
    }

    /// Construct an unlocated object.
    pub fn object<K: AsRef<str>, I: IntoIterator<Item = (K, InputValue)>>(o: I) -> InputValue {
        InputValue::Object(
            o.into_iter()
                .map(|(k, v)| {
                    (
                        Spanning::unlocated(k.as_ref().into()),
                        Spanning::unlocated(v),
                    )
                })
                .collect(),
        )
    }

    /// Resolves all variables of this [`InputValue`] to their actual
    /// `values`.
    ///
    /// If a variable is not present in the `values`:
    /// - Returns [`None`] in case this is an [`InputValue::Variable`].
    /// - Skips the field in case of an [`InputValue::Object`] field.
    /// - Replaces with an [`InputValue::Null`] in case of an
    ///   [`InputValue::List`] element.
    #[must_use]
    pub fn into_const(self, values: &Variables) -> Option<InputValue> {
        match self {
            InputValue::Variable(v) => values.get(&v).cloned(),
            InputValue::List(l) => Some(InputValue::List(
                l.into_iter()
                    .map(|s| s.map(|v| v.into_const(values).unwrap_or_else(InputValue::null)))
                    .collect(),
            )),
            InputValue::Object(o) => Some(InputValue::Object(
                o.into_iter()
                    .filter_map(|(sk, sv)| {
                        let span = sv.span;
                        sv.item
                            .into_const(values)
                            .map(|v| (sk, Spanning::new(span, v)))
                    })
                    .collect(),
            )),
            v => Some(v),
        }
    }

    /// Does the value represent a `null`?
    pub fn is_null(&self) -> bool {
        matches!(self, InputValue::Null)
    }

    /// View the underlying scalar value, if present.
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            InputValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// View the underlying boolean, if present.
    pub fn as_boolean(&self) -> Option<bool> {
        self.as_scalar().and_then(ScalarValue::as_boolean)
    }

    /// Recursively finds all referenced variables.
    pub fn referenced_variables(&self) -> Vec<&str> {
        match self {
            InputValue::Variable(name) => vec![name.as_str()],
            InputValue::List(l) => l
                .iter()
                .flat_map(|v| v.item.referenced_variables())
                .collect(),
            InputValue::Object(o) => o
                .iter()
                .flat_map(|(_, v)| v.item.referenced_variables())
                .collect(),
            _ => vec![],
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Null => write!(f, "null"),
            InputValue::Scalar(s) => write!(f, "{s}"),
            InputValue::Enum(v) => write!(f, "{v}"),
            InputValue::Variable(v) => write!(f, "${v}"),
            InputValue::List(v) => {
                write!(f, "[")?;
                for (i, spanning) in v.iter().enumerate() {
                    spanning.item.fmt(f)?;
                    if i < v.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, "]")
            }
            InputValue::Object(o) => {
                write!(f, "{{")?;
                for (i, (k, v)) in o.iter().enumerate() {
                    write!(f, "{}: ", k.item)?;
                    v.item.fmt(f)?;
                    if i < o.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

/// A single variable declared in an operation's signature.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableDefinition {
    /// Declared type of the variable.
    pub var_type: Spanning<Type>,
    /// Default value to use when the request supplies none.
    pub default_value: Option<Spanning<InputValue>>,
}

/// Argument list of a field or a directive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArgumentsNode {
    #[doc(hidden)]
    pub items: Vec<(Spanning<ArcStr>, Spanning<InputValue>)>,
}

impl ArgumentsNode {
    #[doc(hidden)]
    pub fn into_iter(self) -> vec::IntoIter<(Spanning<ArcStr>, Spanning<InputValue>)> {
        self.items.into_iter()
    }

    #[doc(hidden)]
    pub fn iter(&self) -> slice::Iter<'_, (Spanning<ArcStr>, Spanning<InputValue>)> {
        self.items.iter()
    }

    #[doc(hidden)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[doc(hidden)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up the first argument with the given name.
    pub fn get(&self, key: &str) -> Option<&Spanning<InputValue>> {
        self.items
            .iter()
            .filter(|(k, _)| k.item == key)
            .map(|(_, v)| v)
            .next()
    }
}

/// Variable declarations of an operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariablesDefinition {
    #[doc(hidden)]
    pub items: Vec<(Spanning<ArcStr>, VariableDefinition)>,
}

impl VariablesDefinition {
    #[doc(hidden)]
    pub fn iter(&self) -> slice::Iter<'_, (Spanning<ArcStr>, VariableDefinition)> {
        self.items.iter()
    }
}

/// A field selection.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Response alias, if any.
    pub alias: Option<Spanning<ArcStr>>,
    /// Name of the field in the schema.
    pub name: Spanning<ArcStr>,
    /// Supplied arguments.
    pub arguments: Option<Spanning<ArgumentsNode>>,
    /// Directives applied to this selection.
    pub directives: Option<Vec<Spanning<Directive>>>,
    /// Sub-selections, present for composite-typed fields.
    pub selection_set: Option<Vec<Selection>>,
}

impl Field {
    /// The key under which this field appears in the response: alias if
    /// present, name otherwise.
    pub fn response_key(&self) -> &ArcStr {
        self.alias.as_ref().map(|a| &a.item).unwrap_or(&self.name.item)
    }
}

/// A `...name` fragment spread selection.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentSpread {
    /// Name of the spread fragment.
    pub name: Spanning<ArcStr>,
    /// Directives applied to this spread.
    pub directives: Option<Vec<Spanning<Directive>>>,
}

/// An `... on Type { }` inline fragment selection.
#[derive(Clone, Debug, PartialEq)]
pub struct InlineFragment {
    /// Type condition, if any.
    pub type_condition: Option<Spanning<ArcStr>>,
    /// Directives applied to this fragment.
    pub directives: Option<Vec<Spanning<Directive>>>,
    /// Selections of the fragment.
    pub selection_set: Vec<Selection>,
}

/// Entry in a GraphQL selection set.
///
/// One of the three variants of a selection that exist in GraphQL: a field,
/// a fragment spread, or an inline fragment.
///
/// ```text
/// {
///   field(withArg: 123) { subField }
///   ...fragmentSpread
///   ...on User {
///     inlineFragmentField
///   }
/// }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// Field selection.
    Field(Spanning<Field>),
    /// Fragment spread selection.
    FragmentSpread(Spanning<FragmentSpread>),
    /// Inline fragment selection.
    InlineFragment(Spanning<InlineFragment>),
}

/// A directive applied to a selection, e.g. `@include(if: $flag)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    /// Name of the directive.
    pub name: Spanning<ArcStr>,
    /// Supplied arguments.
    pub arguments: Option<Spanning<ArgumentsNode>>,
}

/// Kind of an executable operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationType {
    /// Read-only fetch.
    Query,
    /// Write followed by a fetch, with serial top-level semantics.
    Mutation,
    /// Long-lived event fetch; executed here as a single resolution pass.
    Subscription,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        })
    }
}

/// An executable operation definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    /// Kind of the operation.
    pub operation_type: OperationType,
    /// Operation name, if any.
    pub name: Option<Spanning<ArcStr>>,
    /// Declared variables.
    pub variables_definition: Option<Spanning<VariablesDefinition>>,
    /// Directives applied to the operation.
    pub directives: Option<Vec<Spanning<Directive>>>,
    /// Top-level selections.
    pub selection_set: Vec<Selection>,
}

/// A named fragment definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    /// Name of the fragment.
    pub name: Spanning<ArcStr>,
    /// Type the fragment applies to.
    pub type_condition: Spanning<ArcStr>,
    /// Directives applied to the definition.
    pub directives: Option<Vec<Spanning<Directive>>>,
    /// Selections of the fragment.
    pub selection_set: Vec<Selection>,
}

/// A definition in an executable document.
#[derive(Clone, Debug, PartialEq)]
pub enum Definition {
    /// Operation definition.
    Operation(Spanning<Operation>),
    /// Fragment definition.
    Fragment(Spanning<Fragment>),
}

/// A validated executable document: the engine's input.
pub type Document = [Definition];

/// Owned variant of [`Document`].
pub type OwnedDocument = Vec<Definition>;

#[cfg(test)]
mod input_value_tests {
    use super::{InputValue, Variables};

    #[test]
    fn display() {
        assert_eq!(InputValue::null().to_string(), "null");
        assert_eq!(InputValue::scalar(123).to_string(), "123");
        assert_eq!(InputValue::scalar("FOO").to_string(), "\"FOO\"");
        assert_eq!(InputValue::enum_value("BAR").to_string(), "BAR");
        assert_eq!(InputValue::variable("baz").to_string(), "$baz");
        assert_eq!(
            InputValue::list(vec![InputValue::scalar(1), InputValue::scalar(2)]).to_string(),
            "[1, 2]",
        );
        assert_eq!(
            InputValue::object(vec![
                ("foo", InputValue::scalar(1)),
                ("bar", InputValue::scalar(2)),
            ])
            .to_string(),
            "{foo: 1, bar: 2}",
        );
    }

    #[test]
    fn into_const_substitutes_variables() {
        let mut vars = Variables::default();
        vars.insert("id".into(), InputValue::scalar(42));

        let v = InputValue::object(vec![
            ("id", InputValue::variable("id")),
            ("missing", InputValue::variable("nope")),
        ]);
        let folded = v.into_const(&vars).unwrap();

        assert_eq!(
            folded,
            InputValue::object(vec![("id", InputValue::scalar(42))]),
        );
        assert!(InputValue::variable("nope").into_const(&vars).is_none());
    }

    #[test]
    fn referenced_variables_recurses() {
        let v = InputValue::list(vec![
            InputValue::variable("a"),
            InputValue::object(vec![("k", InputValue::variable("b"))]),
        ]);
        assert_eq!(v.referenced_variables(), vec!["a", "b"]);
    }
}
