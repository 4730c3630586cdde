// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/**
Names a data representation, e.g. `"image"` or `"context2d"`.

Identifiers are opaque; two identifiers are the same type exactly when their strings are equal.
Cloning is cheap.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataType(Arc<str>);

impl DataType {
    pub fn new(name: &str) -> Self {
        DataType(Arc::from(name))
    }

    /**
    Identifier for a list holding values of several types.

    Inner identifiers are deduplicated and sorted, so the result does not depend on the order
    the list was built in: `array_of([b, a, b])` is `"Array [a,b]"`.
    */
    pub fn array_of<I>(inner: I) -> Self
    where
        I: IntoIterator<Item = DataType>,
    {
        let mut types: Vec<DataType> = inner.into_iter().collect();
        types.sort();
        types.dedup();
        let joined = types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",");
        DataType::new(&format!("Array [{joined}]"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataType {
    fn from(value: &str) -> Self {
        DataType::new(value)
    }
}

impl From<String> for DataType {
    fn from(value: String) -> Self {
        DataType(Arc::from(value))
    }
}

impl PartialEq<str> for DataType {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for DataType {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}
