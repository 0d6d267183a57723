use crate::*;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use serde::de::{Deserializer, Error as DeError};
use serde::ser::Serializer;
use std::fmt;
use std::str::FromStr;

// RFC 3526, 2048-bit MODP group 14
const STANDARD_P: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF6955817183995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF";
const STANDARD_G: &str = "2";

// 256-bit safe prime, p = 2q + 1
const REDUCED_P: &str = "999A70980F95A8EB7A74B3A9691F6FE8384A7CB08055128DDB8019FF46B57AEF";
const REDUCED_Q: &str = "4CCD384C07CAD475BD3A59D4B48FB7F41C253E58402A8946EDC00CFFA35ABD77";
const REDUCED_G: &str = "4";

macro_rules! group_element {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) BigUint);

        impl $name {
            pub fn as_biguint(&self) -> &BigUint {
                &self.0
            }

            /// Uppercase hex, the only textual form used on the wire.
            pub fn to_hex(&self) -> String {
                self.0.to_str_radix(16).to_uppercase()
            }

            pub fn from_hex(s: &str) -> Result<Self, Error> {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(Error::Malformed(format!("not a hex integer: {:?}", s)));
                }
                BigUint::parse_bytes(s.as_bytes(), 16)
                    .map($name)
                    .ok_or_else(|| Error::Malformed(format!("not a hex integer: {:?}", s)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::from_hex(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                $name::from_hex(&s).map_err(D::Error::custom)
            }
        }
    };
}

group_element!(ElementModP, "An element of the multiplicative group mod p.");
group_element!(ElementModQ, "An exponent, reduced mod q.");

/// A safe-prime group: `p = 2q + 1` with `g` generating the order-`q` subgroup.
#[derive(Clone, PartialEq, Eq)]
pub struct Group {
    p: BigUint,
    q: BigUint,
    g: BigUint,
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Group({} bits)", self.p.bits())
    }
}

impl Group {
    /// The 2048-bit MODP group from RFC 3526.
    pub fn standard() -> Self {
        let p = parse_const(STANDARD_P);
        let q = (&p - BigUint::one()) >> 1;
        Group {
            p,
            q,
            g: parse_const(STANDARD_G),
        }
    }

    /// A 256-bit safe-prime group. Fast enough for tests and demos, far too small for
    /// real elections.
    pub fn reduced() -> Self {
        Group {
            p: parse_const(REDUCED_P),
            q: parse_const(REDUCED_Q),
            g: parse_const(REDUCED_G),
        }
    }

    /// Build a group from hex parameters, checking that `g` has order `q`.
    pub fn from_hex(p: &str, q: &str, g: &str) -> Result<Self, Error> {
        let p = ElementModP::from_hex(p)?.0;
        let q = ElementModQ::from_hex(q)?.0;
        let g = ElementModP::from_hex(g)?.0;

        if p <= BigUint::from(3u32) || q.is_zero() {
            return Err(Error::InvalidGroup("modulus too small".into()));
        }
        if !((&p - BigUint::one()) % &q).is_zero() {
            return Err(Error::InvalidGroup("q does not divide p - 1".into()));
        }
        if g <= BigUint::one() || g >= p || !g.modpow(&q, &p).is_one() {
            return Err(Error::InvalidGroup("g does not generate the order-q subgroup".into()));
        }
        Ok(Group { p, q, g })
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn q(&self) -> &BigUint {
        &self.q
    }

    pub fn generator(&self) -> ElementModP {
        ElementModP(self.g.clone())
    }

    pub fn one_p(&self) -> ElementModP {
        ElementModP(BigUint::one())
    }

    pub fn zero_q(&self) -> ElementModQ {
        ElementModQ(BigUint::zero())
    }

    /// `g^e mod p`
    pub fn g_pow(&self, e: &ElementModQ) -> ElementModP {
        ElementModP(self.g.modpow(&e.0, &self.p))
    }

    /// `b^e mod p`
    pub fn pow_p(&self, b: &ElementModP, e: &ElementModQ) -> ElementModP {
        ElementModP(b.0.modpow(&e.0, &self.p))
    }

    pub fn mul_p(&self, a: &ElementModP, b: &ElementModP) -> ElementModP {
        ElementModP((&a.0 * &b.0) % &self.p)
    }

    pub fn product_p<'a, I>(&self, elements: I) -> ElementModP
    where
        I: IntoIterator<Item = &'a ElementModP>,
    {
        elements
            .into_iter()
            .fold(self.one_p(), |acc, e| self.mul_p(&acc, e))
    }

    /// Multiplicative inverse mod p (p prime).
    pub fn inv_p(&self, a: &ElementModP) -> ElementModP {
        let exp = &self.p - BigUint::from(2u32);
        ElementModP(a.0.modpow(&exp, &self.p))
    }

    pub fn div_p(&self, a: &ElementModP, b: &ElementModP) -> ElementModP {
        self.mul_p(a, &self.inv_p(b))
    }

    pub fn add_q(&self, a: &ElementModQ, b: &ElementModQ) -> ElementModQ {
        ElementModQ((&a.0 + &b.0) % &self.q)
    }

    pub fn sub_q(&self, a: &ElementModQ, b: &ElementModQ) -> ElementModQ {
        let a = &a.0 % &self.q;
        let b = &b.0 % &self.q;
        ElementModQ((a + &self.q - b) % &self.q)
    }

    pub fn mul_q(&self, a: &ElementModQ, b: &ElementModQ) -> ElementModQ {
        ElementModQ((&a.0 * &b.0) % &self.q)
    }

    /// Multiplicative inverse mod q (q prime).
    pub fn inv_q(&self, a: &ElementModQ) -> ElementModQ {
        let exp = &self.q - BigUint::from(2u32);
        ElementModQ(a.0.modpow(&exp, &self.q))
    }

    pub fn q_from_u64(&self, n: u64) -> ElementModQ {
        ElementModQ(BigUint::from(n) % &self.q)
    }

    pub fn reduce_q(&self, n: BigUint) -> ElementModQ {
        ElementModQ(n % &self.q)
    }

    /// Uniform-enough random exponent: 128 bits of slack above `q` keep the modular
    /// bias negligible.
    pub fn rand_q<R: RngCore + CryptoRng>(&self, rng: &mut R) -> ElementModQ {
        let len = (self.q.bits() as usize + 7) / 8 + 16;
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        self.reduce_q(BigUint::from_bytes_be(&bytes))
    }

    /// True iff `0 < a < p` and `a` lies in the order-`q` subgroup.
    pub fn is_valid_residue(&self, a: &ElementModP) -> bool {
        !a.0.is_zero() && a.0 < self.p && a.0.modpow(&self.q, &self.p).is_one()
    }

    pub fn is_in_bounds_q(&self, a: &ElementModQ) -> bool {
        a.0 < self.q
    }
}

impl Default for Group {
    fn default() -> Self {
        Group::standard()
    }
}

fn parse_const(hex: &str) -> BigUint {
    // Constants above are checked by the tests below
    BigUint::parse_bytes(hex.as_bytes(), 16).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_constants() {
        for group in &[Group::standard(), Group::reduced()] {
            assert_eq!(group.p(), &(group.q() * BigUint::from(2u32) + BigUint::one()));
            assert!(group.is_valid_residue(&group.generator()));
            let rebuilt = Group::from_hex(
                &group.p().to_str_radix(16),
                &group.q().to_str_radix(16),
                &group.generator().to_hex(),
            )
            .unwrap();
            assert_eq!(&rebuilt, group);
        }
    }

    #[test]
    fn test_bad_group() {
        assert!(Group::from_hex("17", "B", "1").is_err());
        assert!(Group::from_hex("17", "5", "4").is_err());
        assert!(Group::from_hex("17", "B", "4").is_ok());
    }

    #[test]
    fn test_arithmetic() {
        let group = Group::reduced();
        let mut rng = rand::thread_rng();
        let a = group.rand_q(&mut rng);
        let b = group.rand_q(&mut rng);

        // g^(a+b) == g^a * g^b
        assert_eq!(
            group.g_pow(&group.add_q(&a, &b)),
            group.mul_p(&group.g_pow(&a), &group.g_pow(&b))
        );

        // (a - b) + b == a
        assert_eq!(group.add_q(&group.sub_q(&a, &b), &b), a);

        // a * a^-1 == 1
        assert_eq!(group.mul_q(&a, &group.inv_q(&a)), group.q_from_u64(1));

        let ga = group.g_pow(&a);
        assert_eq!(group.div_p(&ga, &ga), group.one_p());
        assert!(!group.is_valid_residue(&ElementModP(BigUint::zero())));
    }

    #[test]
    fn test_hex() {
        let e = ElementModP::from_hex("00ff1A").unwrap();
        assert_eq!(e.to_hex(), "FF1A");
        assert_eq!(e.to_string(), "FF1A");
        assert!(ElementModP::from_hex("").is_err());
        assert!(ElementModP::from_hex("12_3").is_err());
        assert!(ElementModQ::from_hex("XYZ").is_err());

        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, "\"FF1A\"");
        let back: ElementModP = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
