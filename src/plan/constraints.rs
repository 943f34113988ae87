//! Conditions under which a planned selection applies.
//!
//! A [`Constraints`] value is a normalized conjunction of directive
//! conditions and a set of allowed concrete types. Plan building composes
//! them structurally; collection solves them against the request variables
//! and the concrete runtime type.

use std::sync::Arc;

use arcstr::ArcStr;
use fnv::FnvHashSet;

use crate::ast::{Directive, Spanning, Variables};

use super::PlanError;

/// Outcome of solving [`Constraints`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// The selection applies.
    Keep,
    /// The selection is omitted.
    Drop,
}

/// A boolean input of a conditional directive: a literal or a variable
/// reference.
#[derive(Clone, Debug, PartialEq)]
pub enum BoolInput {
    /// Literal condition.
    Const(bool),
    /// Condition read from a variable at solve time. An unbound variable
    /// reads as `false`.
    Variable(ArcStr),
}

impl BoolInput {
    fn eval(&self, variables: &Variables) -> bool {
        match self {
            BoolInput::Const(b) => *b,
            BoolInput::Variable(name) => variables
                .get(name.as_str())
                .and_then(|v| v.as_boolean())
                .unwrap_or(false),
        }
    }

    fn is_const(&self) -> bool {
        matches!(self, BoolInput::Const(_))
    }
}

/// One conditional directive attached to a selection.
#[derive(Clone, Debug, PartialEq)]
pub enum DirectiveCondition {
    /// `@skip(if: ...)`: drop when the condition holds.
    Skip(BoolInput),
    /// `@include(if: ...)`: drop unless the condition holds.
    Include(BoolInput),
}

impl DirectiveCondition {
    fn drops(&self, variables: &Variables) -> bool {
        match self {
            DirectiveCondition::Skip(c) => c.eval(variables),
            DirectiveCondition::Include(c) => !c.eval(variables),
        }
    }

    fn is_const(&self) -> bool {
        match self {
            DirectiveCondition::Skip(c) | DirectiveCondition::Include(c) => c.is_const(),
        }
    }
}

/// Composable applicability conditions of a planned selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Constraints {
    directives: Vec<DirectiveCondition>,
    /// `None` means unconstrained: any concrete type is allowed.
    allowed_types: Option<Arc<FnvHashSet<ArcStr>>>,
}

impl Constraints {
    /// Unconstrained: always keeps.
    pub fn none() -> Constraints {
        Constraints::default()
    }

    /// Adds the conditional directives of a selection.
    ///
    /// Only `@skip` and `@include` contribute conditions; other directives
    /// are transparent to planning.
    pub fn with_directives(
        &self,
        directives: Option<&[Spanning<Directive>]>,
    ) -> Result<Constraints, PlanError> {
        let mut out = self.clone();
        for directive in directives.unwrap_or_default() {
            let d = &directive.item;
            let negate = match d.name.item.as_str() {
                "skip" => false,
                "include" => true,
                _ => continue,
            };
            let condition = d
                .arguments
                .as_ref()
                .and_then(|args| args.item.get("if"))
                .ok_or_else(|| PlanError::MalformedDirective {
                    name: d.name.item.to_string(),
                })?;
            let input = match &condition.item {
                crate::ast::InputValue::Scalar(s) => BoolInput::Const(
                    s.as_boolean()
                        .ok_or_else(|| PlanError::MalformedDirective {
                            name: d.name.item.to_string(),
                        })?,
                ),
                crate::ast::InputValue::Variable(v) => BoolInput::Variable(v.as_str().into()),
                _ => {
                    return Err(PlanError::MalformedDirective {
                        name: d.name.item.to_string(),
                    });
                }
            };
            out.directives.push(if negate {
                DirectiveCondition::Include(input)
            } else {
                DirectiveCondition::Skip(input)
            });
        }
        Ok(out)
    }

    /// Intersects the allowed concrete types with `types`.
    #[must_use]
    pub fn narrow_types<I: IntoIterator<Item = ArcStr>>(&self, types: I) -> Constraints {
        let narrowed: FnvHashSet<ArcStr> = match &self.allowed_types {
            None => types.into_iter().collect(),
            Some(existing) => types
                .into_iter()
                .filter(|t| existing.contains(t))
                .collect(),
        };
        Constraints {
            directives: self.directives.clone(),
            allowed_types: Some(Arc::new(narrowed)),
        }
    }

    /// Conjunction of two constraint sets.
    #[must_use]
    pub fn and(&self, other: &Constraints) -> Constraints {
        let mut out = self.clone();
        out.directives.extend(other.directives.iter().cloned());
        out.allowed_types = match (&self.allowed_types, &other.allowed_types) {
            (None, None) => None,
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (Some(a), Some(b)) => Some(Arc::new(a.intersection(b).cloned().collect())),
        };
        out
    }

    /// Solves against the request `variables` and, when known, the concrete
    /// runtime type.
    pub fn solve(&self, variables: &Variables, concrete_type: Option<&str>) -> Disposition {
        if self.directives.iter().any(|d| d.drops(variables)) {
            return Disposition::Drop;
        }
        match (&self.allowed_types, concrete_type) {
            (Some(allowed), Some(t)) if !allowed.iter().any(|a| a == t) => Disposition::Drop,
            (Some(allowed), None) if allowed.is_empty() => Disposition::Drop,
            _ => Disposition::Keep,
        }
    }

    /// Solves with plan-time knowledge only.
    ///
    /// Returns `None` when the outcome depends on request variables or the
    /// concrete runtime type.
    pub fn solve_static(&self) -> Option<Disposition> {
        let empty = Variables::default();
        if self
            .directives
            .iter()
            .any(|d| d.is_const() && d.drops(&empty))
        {
            return Some(Disposition::Drop);
        }
        if let Some(allowed) = &self.allowed_types {
            if allowed.is_empty() {
                return Some(Disposition::Drop);
            }
        }
        if self.directives.iter().all(DirectiveCondition::is_const) {
            Some(Disposition::Keep)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{InputValue, Variables};

    use super::{BoolInput, Constraints, DirectiveCondition, Disposition};

    fn with(directives: Vec<DirectiveCondition>) -> Constraints {
        let mut c = Constraints::none();
        c.directives = directives;
        c
    }

    #[test]
    fn static_skip_drops() {
        let c = with(vec![DirectiveCondition::Skip(BoolInput::Const(true))]);
        assert_eq!(c.solve_static(), Some(Disposition::Drop));
    }

    #[test]
    fn variable_conditions_defer_to_solve_time() {
        let c = with(vec![DirectiveCondition::Include(BoolInput::Variable(
            "flag".into(),
        ))]);
        assert_eq!(c.solve_static(), None);

        let mut vars = Variables::default();
        vars.insert("flag".into(), InputValue::scalar(true));
        assert_eq!(c.solve(&vars, None), Disposition::Keep);

        vars.insert("flag".into(), InputValue::scalar(false));
        assert_eq!(c.solve(&vars, None), Disposition::Drop);
    }

    #[test]
    fn narrowing_restricts_concrete_types() {
        let c = Constraints::none().narrow_types(vec!["Dog".into(), "Cat".into()]);
        let vars = Variables::default();
        assert_eq!(c.solve(&vars, Some("Dog")), Disposition::Keep);
        assert_eq!(c.solve(&vars, Some("Fish")), Disposition::Drop);

        let narrowed = c.narrow_types(vec!["Cat".into()]);
        assert_eq!(narrowed.solve(&vars, Some("Dog")), Disposition::Drop);
    }

    #[test]
    fn empty_intersection_drops_statically() {
        let c = Constraints::none()
            .narrow_types(vec!["Dog".into()])
            .narrow_types(vec!["Cat".into()]);
        assert_eq!(c.solve_static(), Some(Disposition::Drop));
    }
}
