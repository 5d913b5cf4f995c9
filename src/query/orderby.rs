use std::fmt;

/// Sort direction of an `$orderby` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Ascending => f.write_str("asc"),
            Order::Descending => f.write_str("desc"),
        }
    }
}

/// An ordered chain of `$orderby` terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBy {
    terms: Vec<(String, Order)>,
}

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.terms.push((field.into(), Order::Ascending));
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.terms.push((field.into(), Order::Descending));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn render(&self) -> String {
        self.terms
            .iter()
            .map(|(field, order)| format!("{field} {order}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_in_order() {
        let order = OrderBy::new().asc("Name").desc("CreatedAt");
        assert_eq!(order.render(), "Name asc,CreatedAt desc");
    }
}
