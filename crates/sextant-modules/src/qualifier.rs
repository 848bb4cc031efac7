//! Dotted module names

use serde::{Deserialize, Serialize};

/// A dotted module name, e.g. `pkg.sub.mod`.
///
/// The empty qualifier is the root namespace; package index files collapse
/// to their parent package's qualifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Qualifier(String);

impl Qualifier {
    /// The root namespace
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted name
    pub fn from_dotted(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Join name parts with dots
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            parts
                .into_iter()
                .map(|part| part.as_ref().to_owned())
                .collect::<Vec<_>>()
                .join("."),
        )
    }

    /// Whether this is the root namespace
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The dotted representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name parts, outermost first; empty for the root
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|part| !part.is_empty())
    }

    /// The enclosing namespace; `None` for the root
    pub fn parent(&self) -> Option<Qualifier> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('.') {
            Some(split) => Self(self.0[..split].to_owned()),
            None => Self::root(),
        })
    }

    /// Proper ancestors from the parent up to and including the root
    pub fn ancestors(&self) -> impl Iterator<Item = Qualifier> {
        std::iter::successors(self.parent(), Qualifier::parent)
    }
}

impl std::fmt::Display for Qualifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts() {
        let qualifier = Qualifier::from_dotted("a.b.c");
        assert_eq!(qualifier.parts().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(Qualifier::root().parts().next().is_none());
    }

    #[test]
    fn test_parent_chain() {
        let qualifier = Qualifier::from_dotted("a.b.c");
        assert_eq!(qualifier.parent(), Some(Qualifier::from_dotted("a.b")));
        assert_eq!(
            Qualifier::from_dotted("a").parent(),
            Some(Qualifier::root())
        );
        assert_eq!(Qualifier::root().parent(), None);
    }

    #[test]
    fn test_ancestors() {
        let ancestors: Vec<_> = Qualifier::from_dotted("a.b.c").ancestors().collect();
        assert_eq!(
            ancestors,
            vec![
                Qualifier::from_dotted("a.b"),
                Qualifier::from_dotted("a"),
                Qualifier::root(),
            ]
        );
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            Qualifier::from_parts(["pkg", "mod"]),
            Qualifier::from_dotted("pkg.mod")
        );
        assert!(Qualifier::from_parts(Vec::<&str>::new()).is_root());
    }
}
