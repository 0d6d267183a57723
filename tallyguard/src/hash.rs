use crate::*;
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// One input to [`hash_elems`].
///
/// Every element is rendered to a string and fed to SHA-256 between `|` separators:
/// group elements as uppercase hex, numbers in decimal, text verbatim, and nested
/// sequences as the hex of their own hash.
#[derive(Debug, Clone)]
pub enum HashElem<'a> {
    P(&'a ElementModP),
    Q(&'a ElementModQ),
    Text(&'a str),
    Num(u64),
    Seq(Vec<HashElem<'a>>),
    Null,
}

impl<'a> From<&'a ElementModP> for HashElem<'a> {
    fn from(e: &'a ElementModP) -> Self {
        HashElem::P(e)
    }
}

impl<'a> From<&'a ElementModQ> for HashElem<'a> {
    fn from(e: &'a ElementModQ) -> Self {
        HashElem::Q(e)
    }
}

impl<'a> From<&'a str> for HashElem<'a> {
    fn from(s: &'a str) -> Self {
        HashElem::Text(s)
    }
}

impl<'a> From<&'a String> for HashElem<'a> {
    fn from(s: &'a String) -> Self {
        HashElem::Text(s.as_str())
    }
}

impl<'a> From<u64> for HashElem<'a> {
    fn from(n: u64) -> Self {
        HashElem::Num(n)
    }
}

impl<'a> From<u32> for HashElem<'a> {
    fn from(n: u32) -> Self {
        HashElem::Num(n as u64)
    }
}

impl<'a, T: Into<HashElem<'a>>> From<Vec<T>> for HashElem<'a> {
    fn from(items: Vec<T>) -> Self {
        HashElem::Seq(items.into_iter().map(Into::into).collect())
    }
}

/// Hash a sequence of elements into an exponent mod q.
pub fn hash_elems(group: &Group, elems: &[HashElem]) -> ElementModQ {
    let mut hasher = Sha256::new();
    hasher.update(b"|");
    for elem in elems {
        let repr = match elem {
            HashElem::P(e) => e.to_hex(),
            HashElem::Q(e) => e.to_hex(),
            HashElem::Text(s) => s.to_string(),
            HashElem::Num(n) => n.to_string(),
            HashElem::Seq(items) => hash_elems(group, items).to_hex(),
            HashElem::Null => "null".to_string(),
        };
        hasher.update(repr.as_bytes());
        hasher.update(b"|");
    }
    let digest = hasher.finalize();
    group.reduce_q(BigUint::from_bytes_be(&digest))
}
