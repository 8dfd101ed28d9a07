//! Query string builder.
//!
//! Keys are unique (setting a key again replaces the previous value) and
//! absent optional values are omitted entirely rather than sent as empty
//! strings.

/// Ordered list of query pairs with unique keys.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Create an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key to a value, replacing any previous value for the key.
    pub fn set(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        let key = key.into();
        let value = value.to_string();
        if let Some(pair) = self.pairs.iter_mut().find(|(k, _)| *k == key) {
            pair.1 = value;
        } else {
            self.pairs.push((key, value));
        }
        self
    }

    /// Set a key only when the value is present.
    pub fn set_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// Whether any pairs have been set.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The pairs in insertion order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_order() {
        let q = Query::new().set("page", 2).set("limit", 20);
        assert_eq!(
            q.pairs(),
            &[
                ("page".to_string(), "2".to_string()),
                ("limit".to_string(), "20".to_string())
            ]
        );
    }

    #[test]
    fn test_set_replaces_existing_key() {
        let q = Query::new().set("page", 1).set("page", 3);
        assert_eq!(q.pairs(), &[("page".to_string(), "3".to_string())]);
    }

    #[test]
    fn test_absent_values_are_omitted() {
        let q = Query::new()
            .set_opt("category", Some("shoes"))
            .set_opt::<String>("seller", None);
        assert_eq!(q.pairs().len(), 1);
        assert_eq!(q.pairs()[0].0, "category");
    }
}
