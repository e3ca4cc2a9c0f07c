#![forbid(unsafe_code)]

//! The attribute statement surface exposed to the SP.
//!
//! Attribute values are `Option<String>`: `None` is an explicit
//! `xsi:nil="true"` value, distinct from an empty string.

/// Attributes extracted from the signed assertion, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, Vec<Option<String>>)>,
}

impl Attributes {
    /// Append values under a name, merging with an existing entry of the
    /// same name.
    pub(crate) fn add(&mut self, name: &str, values: Vec<Option<String>>) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(n, _)| n == name) {
            existing.extend(values);
        } else {
            self.entries.push((name.to_owned(), values));
        }
    }

    /// Whether a name was seen before. Used for the duplicated-attribute
    /// check, which fires before values are merged.
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// All values for an attribute, by exact name.
    pub fn multi(&self, name: &str) -> Option<&[Option<String>]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// All values for an attribute, ignoring ASCII case in the name. IdPs
    /// are inconsistent about attribute-name casing; the first entry that
    /// matches case-insensitively wins.
    pub fn multi_ignore_case(&self, name: &str) -> Option<&[Option<String>]> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// The first value for an attribute; `None` when the attribute is
    /// absent or its first value is nil.
    pub fn single(&self, name: &str) -> Option<&str> {
        self.multi(name)?.first()?.as_deref()
    }

    /// Case-insensitive variant of [`single`](Self::single).
    pub fn single_ignore_case(&self, name: &str) -> Option<&str> {
        self.multi_ignore_case(name)?.first()?.as_deref()
    }

    /// Attribute names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Iterate over `(name, values)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<String>])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
