//! Paths addressing a node in a value tree or one of its shadow trees.
//!
//! A path is parsed once from its dot form (`"roles.0.name"`) into segments,
//! so tree walks never split strings. Numeric segments become indices and a
//! lone `*` becomes a wildcard that matches any array index.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A single segment in a path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Seg {
    /// Object key.
    Key(String),
    /// Array index. Against an object it addresses the key with the same digits.
    Index(usize),
    /// `*`: any array index.
    Wildcard,
}

impl Seg {
    /// Parses one segment of the dot form.
    pub fn parse(raw: &str) -> Self {
        if raw == "*" {
            return Seg::Wildcard;
        }
        // "01" stays a key so that formatting the path gives back the same text.
        let canonical = raw.len() == 1 || !raw.starts_with('0');
        if canonical && !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = raw.parse() {
                return Seg::Index(index);
            }
        }
        Seg::Key(raw.to_owned())
    }

    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Index(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Seg::Wildcard)
    }

    /// The key this segment addresses inside an object.
    pub fn object_key(&self) -> String {
        match self {
            Seg::Key(k) => k.clone(),
            Seg::Index(i) => i.to_string(),
            Seg::Wildcard => "*".to_owned(),
        }
    }

    /// Segment equality where a wildcard matches any index.
    pub fn matches(&self, other: &Seg) -> bool {
        match (self, other) {
            (Seg::Wildcard, Seg::Index(_) | Seg::Wildcard)
            | (Seg::Index(_), Seg::Wildcard) => true,
            _ => self == other,
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => f.write_str(k),
            Seg::Index(i) => write!(f, "{i}"),
            Seg::Wildcard => f.write_str("*"),
        }
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A complete path. The empty path is the root of the tree.
///
/// ```
/// use floem_form::Path;
///
/// let path = Path::root().key("roles").index(0);
/// assert_eq!(path, Path::parse("roles.0"));
/// assert_eq!(path.to_string(), "roles.0");
/// ```
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Path(SmallVec<[Seg; 4]>);

impl Path {
    #[inline]
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Parses the dot form. The empty string is the root.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::root();
        }
        Self(raw.split('.').map(Seg::parse).collect())
    }

    pub fn from_segments(segments: impl IntoIterator<Item = Seg>) -> Self {
        Self(segments.into_iter().collect())
    }

    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    #[inline]
    pub fn wildcard(mut self) -> Self {
        self.0.push(Seg::Wildcard);
        self
    }

    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    /// Returns a new path with `seg` appended.
    pub fn child(&self, seg: impl Into<Seg>) -> Path {
        let mut path = self.clone();
        path.0.push(seg.into());
        path
    }

    pub fn join(&self, other: &Path) -> Path {
        let mut path = self.clone();
        path.0.extend(other.0.iter().cloned());
        path
    }

    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }

    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].iter().cloned().collect()))
    }

    /// Splits off the last segment.
    pub fn split_last(&self) -> Option<(Path, &Seg)> {
        let (last, rest) = self.0.split_last()?;
        Some((Path(rest.iter().cloned().collect()), last))
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Like [`Path::starts_with`], with wildcards on either side matching any
    /// index.
    pub fn starts_with_matching(&self, prefix: &Path) -> bool {
        prefix.len() <= self.len() && prefix.0.iter().zip(self.0.iter()).all(|(a, b)| a.matches(b))
    }

    pub fn has_wildcard(&self) -> bool {
        self.0.iter().any(Seg::is_wildcard)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Seg> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl From<&str> for Path {
    fn from(raw: &str) -> Self {
        Path::parse(raw)
    }
}

impl From<String> for Path {
    fn from(raw: String) -> Self {
        Path::parse(&raw)
    }
}

impl From<&String> for Path {
    fn from(raw: &String) -> Self {
        Path::parse(raw)
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Build a [`Path`] from segments: string literals become keys, integers
/// become indices.
///
/// ```
/// use floem_form::path;
///
/// let p = path!("items", 2, "price");
/// assert_eq!(p.to_string(), "items.2.price");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}
