use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered map from header name to one or more header values.
pub type HeaderValuesMap = IndexMap<String, HeaderValues>;

/// Value(s) stored for a single header name.
///
/// Serializes as either a JSON string or a JSON array of strings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderValues {
  /// Header that has been set exactly once.
  Single(String),
  /// Header that has been set more than once, in insertion order.
  Multi(Vec<String>),
}

impl HeaderValues {
  /// Append another value, promoting a [`Single`](HeaderValues::Single) value to
  /// [`Multi`](HeaderValues::Multi).
  pub fn push(&mut self, value: String) {
    match self {
      HeaderValues::Single(existing) => {
        let first = std::mem::take(existing);
        *self = HeaderValues::Multi(vec![first, value]);
      }
      HeaderValues::Multi(values) => values.push(value),
    }
  }

  /// Return the value if exactly one has been set.
  pub fn as_single(&self) -> Option<&str> {
    match self {
      HeaderValues::Single(value) => Some(value),
      HeaderValues::Multi(_) => None,
    }
  }

  /// Iterate over every value in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = &str> {
    let values: &[String] = match self {
      HeaderValues::Single(value) => std::slice::from_ref(value),
      HeaderValues::Multi(values) => values,
    };
    values.iter().map(String::as_str)
  }
}

impl From<String> for HeaderValues {
  fn from(value: String) -> Self {
    HeaderValues::Single(value)
  }
}

impl From<&str> for HeaderValues {
  fn from(value: &str) -> Self {
    HeaderValues::Single(value.to_owned())
  }
}

impl From<Vec<String>> for HeaderValues {
  fn from(values: Vec<String>) -> Self {
    HeaderValues::Multi(values)
  }
}

/// Insert `value` for `name`, or append it to the values already stored for `name`.
///
/// The first write stores a single value. The second write for the same name promotes it to an
/// ordered sequence, and every later write appends to that sequence.
pub fn append_header(headers: &mut HeaderValuesMap, name: String, value: String) {
  match headers.entry(name) {
    Entry::Occupied(mut entry) => entry.get_mut().push(value),
    Entry::Vacant(entry) => {
      entry.insert(HeaderValues::Single(value));
    }
  }
}

/// Case-insensitive header lookup.
pub(crate) fn find_header<'a>(headers: &'a HeaderValuesMap, name: &str) -> Option<&'a HeaderValues> {
  headers.get(name).or_else(|| {
    headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value)
  })
}
