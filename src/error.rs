//! Error types used across the engine.
//!
//! Two layers exist. [`EngineError`] is the internal, cheaply clonable error
//! that travels inside [`Eventual`](crate::eventual::Eventual)s between the
//! resolution and completion pipelines. [`GraphQLError`] is the
//! response-shaped error that ends up in the `errors` list of an execution
//! result.

use std::fmt;

use derive_more::Display;
use serde::Serialize;

use crate::{
    ast::SourcePosition,
    value::Value,
};

/// One step in a response path: an object key or a list index.
#[derive(Clone, Debug, Display, Eq, Ord, PartialEq, PartialOrd)]
pub enum PathSegment {
    /// Response key of a field.
    Key(String),
    /// Index of a list element.
    Index(usize),
}

impl Serialize for PathSegment {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PathSegment::Key(k) => serializer.serialize_str(k),
            PathSegment::Index(i) => serializer.serialize_u64(*i as u64),
        }
    }
}

/// Error produced while resolving a field.
///
/// Field errors are represented by a human-readable error message and an
/// optional [`Value`] with additional information, surfaced under the
/// `extensions` key of the response error.
///
/// They can be converted from any type implementing [`fmt::Display`], which
/// makes error chaining with the `?` operator a breeze inside resolvers.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    message: String,
    extensions: Value,
}

impl<T: fmt::Display> From<T> for FieldError {
    fn from(e: T) -> FieldError {
        FieldError {
            message: e.to_string(),
            extensions: Value::Null,
        }
    }
}

impl FieldError {
    /// Construct a new [`FieldError`] with additional data.
    ///
    /// The `extensions` value is attached to the `"extensions"` field of the
    /// response error. [`Value::Null`] attaches nothing.
    #[must_use]
    pub fn new<T: fmt::Display>(e: T, extensions: Value) -> FieldError {
        FieldError {
            message: e.to_string(),
            extensions,
        }
    }

    /// Returns the `"message"` field of this [`FieldError`].
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the `"extensions"` field of this [`FieldError`].
    #[must_use]
    pub fn extensions(&self) -> &Value {
        &self.extensions
    }
}

/// The result of resolving the value of a field of type `T`.
pub type FieldResult<T> = Result<T, FieldError>;

/// Internal error representation carried through the resolution pipeline.
///
/// Errors are values here, not panics: a failed field parks its
/// [`EngineError`] in the owning result cell, and completion decides whether
/// it nullifies the field, bubbles, or fails the whole operation.
#[derive(Clone, Debug, Display, PartialEq)]
pub enum EngineError {
    /// Anything thrown or surfaced from a data fetcher, decorated with the
    /// failing field's path and source location.
    #[display("{}", error.message())]
    FieldFetching {
        /// The underlying resolver error.
        error: FieldError,
        /// Response path of the failing field.
        path: Vec<PathSegment>,
        /// Source location of the failing field.
        location: Option<SourcePosition>,
    },

    /// An access checker denied or failed.
    #[display("{}", error.message())]
    AccessCheck {
        /// The checker-produced error.
        error: FieldError,
        /// Response path of the gated field.
        path: Vec<PathSegment>,
        /// Source location of the gated field.
        location: Option<SourcePosition>,
    },

    /// A concrete type could not be determined for an abstract-typed value.
    #[display("{message}")]
    TypeResolution {
        /// What went wrong.
        message: String,
    },

    /// A variable resolver failed; fatal for the enclosing child plan.
    #[display("resolution of variable ${variable} failed: {message}")]
    VariableResolution {
        /// Variable being resolved.
        variable: String,
        /// What went wrong.
        message: String,
    },

    /// Query planning failed.
    #[display("query planning failed: {message}")]
    Plan {
        /// What went wrong.
        message: String,
    },

    /// A bug or precondition violation inside the engine.
    #[display("internal engine error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },

    /// The request scope was cancelled before the work finished.
    #[display("request scope cancelled")]
    Cancelled,
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Wraps a resolver error with the field position it failed at.
    pub fn field_fetching(
        error: impl Into<FieldError>,
        path: Vec<PathSegment>,
        location: Option<SourcePosition>,
    ) -> EngineError {
        EngineError::FieldFetching {
            error: error.into(),
            path,
            location,
        }
    }

    /// Constructs an internal engine error.
    pub fn internal(message: impl Into<String>) -> EngineError {
        EngineError::Internal {
            message: message.into(),
        }
    }

    /// Is this the cancellation marker?
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }

    /// The response path recorded on this error, if any.
    pub fn path(&self) -> Option<&[PathSegment]> {
        match self {
            EngineError::FieldFetching { path, .. } | EngineError::AccessCheck { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }

    /// The source location recorded on this error, if any.
    pub fn location(&self) -> Option<SourcePosition> {
        match self {
            EngineError::FieldFetching { location, .. }
            | EngineError::AccessCheck { location, .. } => *location,
            _ => None,
        }
    }

    /// The extensions value attached to the underlying [`FieldError`].
    pub fn extensions(&self) -> &Value {
        match self {
            EngineError::FieldFetching { error, .. } | EngineError::AccessCheck { error, .. } => {
                error.extensions()
            }
            _ => &Value::Null,
        }
    }
}

/// A line-column pair in a response error, 1-based as GraphQL requires.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Location {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

impl From<SourcePosition> for Location {
    fn from(pos: SourcePosition) -> Location {
        Location {
            line: pos.line() + 1,
            column: pos.column() + 1,
        }
    }
}

/// An error entry of an execution result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphQLError {
    /// Human-readable description of the failure.
    pub message: String,

    /// Source locations of the failing selections.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// Response path of the failing field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    /// Additional resolver-supplied information.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub extensions: Value,
}

impl GraphQLError {
    /// Construct an error with a bare message.
    pub fn new(message: impl Into<String>) -> GraphQLError {
        GraphQLError {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: Value::Null,
        }
    }

    /// Attaches a response path.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> GraphQLError {
        self.path = Some(path);
        self
    }

    /// Attaches a source location.
    #[must_use]
    pub fn at(mut self, location: SourcePosition) -> GraphQLError {
        self.locations = vec![location.into()];
        self
    }

    /// Attaches an extensions value.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Value) -> GraphQLError {
        self.extensions = extensions;
        self
    }

    /// Builds the response error for an [`EngineError`], falling back to the
    /// supplied position for errors that carry none of their own.
    pub fn from_engine_error(
        error: &EngineError,
        fallback_path: &[PathSegment],
        fallback_location: Option<SourcePosition>,
    ) -> GraphQLError {
        let path = error
            .path()
            .map(<[PathSegment]>::to_vec)
            .unwrap_or_else(|| fallback_path.to_vec());
        let location = error.location().or(fallback_location);
        let mut out = GraphQLError::new(error.to_string())
            .with_path(path)
            .with_extensions(error.extensions().clone());
        if let Some(location) = location {
            out = out.at(location);
        }
        out
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GraphQLError {}

#[cfg(test)]
mod tests {
    use crate::ast::SourcePosition;

    use super::{EngineError, GraphQLError, PathSegment};

    #[test]
    fn path_segments_serialize_as_mixed_array() {
        let path = vec![
            PathSegment::Key("xs".into()),
            PathSegment::Index(2),
        ];
        assert_eq!(serde_json::to_string(&path).unwrap(), r#"["xs",2]"#);
    }

    #[test]
    fn engine_error_becomes_response_error() {
        let err = EngineError::field_fetching(
            "boom",
            vec![PathSegment::Key("a".into())],
            Some(SourcePosition::new(4, 0, 4)),
        );
        let gql = GraphQLError::from_engine_error(&err, &[], None);
        assert_eq!(gql.message, "boom");
        assert_eq!(gql.path, Some(vec![PathSegment::Key("a".into())]));
        assert_eq!(gql.locations[0].line, 1);
        assert_eq!(gql.locations[0].column, 5);
    }

    #[test]
    fn fallback_position_is_used_when_absent() {
        let err = EngineError::internal("bug");
        let gql = GraphQLError::from_engine_error(
            &err,
            &[PathSegment::Key("f".into())],
            None,
        );
        assert_eq!(gql.path, Some(vec![PathSegment::Key("f".into())]));
        assert!(gql.locations.is_empty());
    }
}
