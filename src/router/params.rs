//! Captured path parameters.

/// One captured parameter: `:id` → `("id", "42")`, `*path` → `("path", "a/b.png")`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteParam {
    pub key: String,
    pub value: String,
}

/// Parameters in left-to-right capture order.
///
/// Names are unique per route by construction; lookups return the first
/// match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(Vec<RouteParam>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|p| p.key == key).map(|p| p.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteParam> {
        self.0.iter()
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub(crate) fn push(&mut self, key: &str, value: impl Into<String>) {
        self.0.push(RouteParam { key: key.to_owned(), value: value.into() });
    }

    /// Drops a speculative capture when the match backtracks.
    pub(crate) fn pop(&mut self) {
        self.0.pop();
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a RouteParam;
    type IntoIter = std::slice::Iter<'a, RouteParam>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
