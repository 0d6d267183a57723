//! Delimited text forms. These are also the serde forms of the listed types, so every
//! JSON document the crate emits carries them as plain strings.
//!
//! ```text
//! ciphertext            pad;data
//! chaum-pedersen        pad;data;challenge;response
//! constant              pad;data;challenge;response;constant
//! disjunctive           proof0|proof1|challenge
//! coefficient           order;publicKey;commitment;challenge;response
//! backup                senderIndex;shareHex
//! ```

use crate::*;
use std::fmt;
use std::str::FromStr;

fn fields<'a>(s: &'a str, sep: char, count: usize, what: &str) -> Result<Vec<&'a str>, Error> {
    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() != count {
        return Err(Error::Malformed(format!(
            "{}: expected {} fields separated by '{}', found {}",
            what,
            count,
            sep,
            parts.len()
        )));
    }
    Ok(parts)
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{};{}", self.pad, self.data)
    }
}

impl FromStr for Ciphertext {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = fields(s, ';', 2, "ciphertext")?;
        Ok(Ciphertext {
            pad: parts[0].parse()?,
            data: parts[1].parse()?,
        })
    }
}

impl fmt::Display for ChaumPedersenProof {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{};{};{};{}",
            self.pad, self.data, self.challenge, self.response
        )
    }
}

impl FromStr for ChaumPedersenProof {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = fields(s, ';', 4, "chaum-pedersen proof")?;
        Ok(ChaumPedersenProof {
            pad: parts[0].parse()?,
            data: parts[1].parse()?,
            challenge: parts[2].parse()?,
            response: parts[3].parse()?,
        })
    }
}

impl fmt::Display for ConstantChaumPedersenProof {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{};{};{};{};{}",
            self.pad, self.data, self.challenge, self.response, self.constant
        )
    }
}

impl FromStr for ConstantChaumPedersenProof {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = fields(s, ';', 5, "constant proof")?;
        Ok(ConstantChaumPedersenProof {
            pad: parts[0].parse()?,
            data: parts[1].parse()?,
            challenge: parts[2].parse()?,
            response: parts[3].parse()?,
            constant: parts[4].parse()?,
        })
    }
}

impl fmt::Display for DisjunctiveChaumPedersenProof {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}|{}|{}", self.proof_zero, self.proof_one, self.challenge)
    }
}

impl FromStr for DisjunctiveChaumPedersenProof {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = fields(s, '|', 3, "disjunctive proof")?;
        Ok(DisjunctiveChaumPedersenProof {
            proof_zero: parts[0].parse()?,
            proof_one: parts[1].parse()?,
            challenge: parts[2].parse()?,
        })
    }
}

impl fmt::Display for CoefficientCommitment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{};{};{};{};{}",
            self.order,
            self.proof.public_key,
            self.proof.commitment,
            self.proof.challenge,
            self.proof.response
        )
    }
}

impl FromStr for CoefficientCommitment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = fields(s, ';', 5, "coefficient commitment")?;
        Ok(CoefficientCommitment {
            order: parts[0].parse()?,
            proof: SchnorrProof {
                public_key: parts[1].parse()?,
                commitment: parts[2].parse()?,
                challenge: parts[3].parse()?,
                response: parts[4].parse()?,
            },
        })
    }
}

impl fmt::Display for EncryptedBackup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{};{}", self.sender, hex::encode_upper(&self.share))
    }
}

impl FromStr for EncryptedBackup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = fields(s, ';', 2, "backup")?;
        Ok(EncryptedBackup {
            sender: parts[0].parse()?,
            share: hex::decode(parts[1])?,
        })
    }
}

/// Serialize through the delimited form, so JSON carries the same strings as the wire.
macro_rules! serde_as_wire_string {
    ($($ty:ty),*) => {$(
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    )*};
}

serde_as_wire_string!(
    Ciphertext,
    ChaumPedersenProof,
    ConstantChaumPedersenProof,
    DisjunctiveChaumPedersenProof,
    CoefficientCommitment,
    EncryptedBackup
);

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: u64) -> ElementModP {
        Group::reduced().g_pow(&Group::reduced().q_from_u64(n))
    }

    fn q(n: u64) -> ElementModQ {
        Group::reduced().q_from_u64(n)
    }

    #[test]
    fn test_exact_forms() {
        let proof = ChaumPedersenProof {
            pad: ElementModP::from_hex("1A").unwrap(),
            data: ElementModP::from_hex("2B").unwrap(),
            challenge: ElementModQ::from_hex("3C").unwrap(),
            response: ElementModQ::from_hex("4D").unwrap(),
        };
        assert_eq!(proof.to_string(), "1A;2B;3C;4D");

        let disjunctive = DisjunctiveChaumPedersenProof {
            proof_zero: proof.clone(),
            proof_one: proof.clone(),
            challenge: ElementModQ::from_hex("FF").unwrap(),
        };
        assert_eq!(disjunctive.to_string(), "1A;2B;3C;4D|1A;2B;3C;4D|FF");

        let backup = EncryptedBackup {
            sender: 3,
            share: vec![0xde, 0xad],
        };
        assert_eq!(backup.to_string(), "3;DEAD");
    }

    #[test]
    fn test_parse() {
        let constant = ConstantChaumPedersenProof {
            pad: p(2),
            data: p(3),
            challenge: q(4),
            response: q(5),
            constant: 2,
        };
        let parsed: ConstantChaumPedersenProof = constant.to_string().parse().unwrap();
        assert_eq!(parsed, constant);

        let commitment = CoefficientCommitment {
            order: 1,
            proof: SchnorrProof {
                public_key: p(6),
                commitment: p(7),
                challenge: q(8),
                response: q(9),
            },
        };
        let parsed: CoefficientCommitment = commitment.to_string().parse().unwrap();
        assert_eq!(parsed, commitment);

        let disjunctive: DisjunctiveChaumPedersenProof =
            "1A;2B;3C;4D|5E;6F;7A;8B|9C".parse().unwrap();
        assert_eq!(disjunctive.proof_one.data, ElementModP::from_hex("6F").unwrap());

        let backup: EncryptedBackup = "12;00FF".parse().unwrap();
        assert_eq!(backup.sender, 12);
        assert_eq!(backup.share, vec![0x00, 0xff]);
    }

    #[test]
    fn test_json_is_wire_string() {
        let ciphertext = Ciphertext {
            pad: ElementModP::from_hex("1A").unwrap(),
            data: ElementModP::from_hex("2B").unwrap(),
        };
        assert_eq!(serde_json::to_string(&ciphertext).unwrap(), "\"1A;2B\"");

        let json = "\"1A;2B;3C;4D|5E;6F;7A;8B|9C\"";
        let disjunctive: DisjunctiveChaumPedersenProof = serde_json::from_str(json).unwrap();
        assert_eq!(serde_json::to_string(&disjunctive).unwrap(), json);

        let commitment = CoefficientCommitment {
            order: 1,
            proof: SchnorrProof {
                public_key: p(6),
                commitment: p(7),
                challenge: q(8),
                response: q(9),
            },
        };
        let json = serde_json::to_string(&commitment).unwrap();
        assert_eq!(json, format!("\"{}\"", commitment));
        let back: CoefficientCommitment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, commitment);

        assert!(serde_json::from_str::<Ciphertext>("\"1A\"").is_err());
        assert!(serde_json::from_str::<Ciphertext>(r#"{"pad":"1A","data":"2B"}"#).is_err());
    }

    #[test]
    fn test_malformed() {
        assert!("1A;2B;3C".parse::<ChaumPedersenProof>().is_err());
        assert!("1A;2B;3C;ZZ".parse::<ChaumPedersenProof>().is_err());
        assert!("1A;2B;3C;4D|9C".parse::<DisjunctiveChaumPedersenProof>().is_err());
        assert!("x;00".parse::<EncryptedBackup>().is_err());
        assert!("1;0".parse::<EncryptedBackup>().is_err());
        assert!("1A;2B;3C;4D;-1".parse::<ConstantChaumPedersenProof>().is_err());
    }
}
