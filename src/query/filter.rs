use crate::protocol::{Literal, ODataVersion};

/// Comparison operators of the `$filter` grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl ComparisonOp {
    fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Ne => "ne",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Ge => "ge",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Le => "le",
        }
    }
}

/// A `$filter` expression tree.
///
/// This covers field comparisons and boolean combinators, which is the shape
/// the request layer needs. Anything beyond that can be passed through with
/// [`FilterExpression::raw`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Compare {
        field: String,
        op: ComparisonOp,
        value: Literal,
    },
    And(Box<FilterExpression>, Box<FilterExpression>),
    Or(Box<FilterExpression>, Box<FilterExpression>),
    Not(Box<FilterExpression>),
    Raw(String),
}

impl FilterExpression {
    pub fn compare(field: impl Into<String>, op: ComparisonOp, value: impl Into<Literal>) -> Self {
        FilterExpression::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, ComparisonOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, ComparisonOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, ComparisonOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, ComparisonOp::Ge, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, ComparisonOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, ComparisonOp::Le, value)
    }

    /// An opaque filter fragment emitted verbatim (still subject to URI
    /// encoding later).
    pub fn raw(expression: impl Into<String>) -> Self {
        FilterExpression::Raw(expression.into())
    }

    pub fn and(self, other: FilterExpression) -> Self {
        FilterExpression::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: FilterExpression) -> Self {
        FilterExpression::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        FilterExpression::Not(Box::new(self))
    }

    /// Renders the expression, parenthesizing combinator operands.
    pub fn render(&self, version: ODataVersion) -> String {
        match self {
            FilterExpression::Compare { field, op, value } => {
                format!("{field} {} {}", op.as_str(), value.render(version))
            }
            FilterExpression::And(left, right) => {
                format!("({} and {})", left.render(version), right.render(version))
            }
            FilterExpression::Or(left, right) => {
                format!("({} or {})", left.render(version), right.render(version))
            }
            FilterExpression::Not(inner) => format!("not ({})", inner.render(version)),
            FilterExpression::Raw(expression) => expression.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_comparison() {
        let filter = FilterExpression::eq("Name", "tester");
        assert_eq!(filter.render(ODataVersion::V4), "Name eq 'tester'");
    }

    #[test]
    fn test_combinators_parenthesize() {
        let filter = FilterExpression::eq("Name", "tester")
            .and(FilterExpression::gt("Age", 18))
            .or(FilterExpression::eq("Admin", true).not());
        assert_eq!(
            filter.render(ODataVersion::V4),
            "((Name eq 'tester' and Age gt 18) or not (Admin eq true))"
        );
    }

    #[test]
    fn test_literal_follows_dialect() {
        let filter = FilterExpression::eq("Id", uuid::Uuid::nil());
        assert_eq!(
            filter.render(ODataVersion::V2),
            "Id eq guid'00000000-0000-0000-0000-000000000000'"
        );
    }
}
