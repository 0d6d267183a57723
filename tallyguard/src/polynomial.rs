use crate::*;
use rand::{CryptoRng, RngCore};

/// Public commitment `K_j = g^{a_j}` to one polynomial coefficient, with a Schnorr proof
/// of knowledge of `a_j`. The commitment itself is `proof.public_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoefficientCommitment {
    pub order: u32,
    pub proof: SchnorrProof,
}

impl CoefficientCommitment {
    pub fn commitment(&self) -> &ElementModP {
        &self.proof.public_key
    }
}

/// A trustee's secret polynomial `P(x) = a_0 + a_1 x + ... + a_{t-1} x^{t-1}`.
///
/// `a_0` is the trustee's share of the election secret; `g^{a_0}` its primary public key.
#[derive(Clone)]
pub struct ElectionPolynomial {
    coefficients: Vec<ElementModQ>,
    commitments: Vec<CoefficientCommitment>,
}

impl ElectionPolynomial {
    /// Random polynomial with `threshold` coefficients, each committed and proven.
    pub fn generate<R: RngCore + CryptoRng>(group: &Group, rng: &mut R, threshold: u32) -> Self {
        let mut coefficients = Vec::with_capacity(threshold as usize);
        let mut commitments = Vec::with_capacity(threshold as usize);
        for order in 0..threshold {
            let keypair = ElGamalKeyPair::generate(group, rng);
            let proof = SchnorrProof::make(group, &keypair, &group.rand_q(rng));
            coefficients.push(keypair.secret);
            commitments.push(CoefficientCommitment { order, proof });
        }
        ElectionPolynomial {
            coefficients,
            commitments,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.coefficients.len() as u32
    }

    /// `a_0`, the trustee's secret key share.
    pub fn secret(&self) -> &ElementModQ {
        &self.coefficients[0]
    }

    pub fn public_key(&self) -> &ElementModP {
        self.commitments[0].commitment()
    }

    pub fn commitments(&self) -> &[CoefficientCommitment] {
        &self.commitments
    }

    /// Evaluate `P(index) mod q` by Horner's rule.
    pub fn coordinate(&self, group: &Group, index: u32) -> ElementModQ {
        let x = group.q_from_u64(index as u64);
        self.coefficients
            .iter()
            .rev()
            .fold(group.zero_q(), |acc, coeff| {
                group.add_q(&group.mul_q(&acc, &x), coeff)
            })
    }
}

/// `g^{P(index)}` computed from public commitments alone: `prod_j K_j^(index^j)`.
pub fn compute_recovery_public_key(
    group: &Group,
    commitments: &[CoefficientCommitment],
    index: u32,
) -> ElementModP {
    let x = group.q_from_u64(index as u64);
    let mut exponent = group.q_from_u64(1);
    let mut product = group.one_p();
    for commitment in commitments {
        product = group.mul_p(&product, &group.pow_p(commitment.commitment(), &exponent));
        exponent = group.mul_q(&exponent, &x);
    }
    product
}

/// Check a decrypted backup coordinate against the sender's public commitments.
pub fn verify_polynomial_coordinate(
    group: &Group,
    coordinate: &ElementModQ,
    index: u32,
    commitments: &[CoefficientCommitment],
) -> bool {
    group.g_pow(coordinate) == compute_recovery_public_key(group, commitments, index)
}

/// Lagrange coefficient at zero for `index` over the set `index ∪ others`:
/// `prod_{j in others} j / (j - index) mod q`.
pub fn lagrange_coefficient(group: &Group, index: u32, others: &[u32]) -> ElementModQ {
    let i = group.q_from_u64(index as u64);
    let mut numerator = group.q_from_u64(1);
    let mut denominator = group.q_from_u64(1);
    for &other in others.iter().filter(|&&j| j != index) {
        let j = group.q_from_u64(other as u64);
        numerator = group.mul_q(&numerator, &j);
        denominator = group.mul_q(&denominator, &group.sub_q(&j, &i));
    }
    group.mul_q(&numerator, &group.inv_q(&denominator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_polynomial() {
        let group = Group::reduced();
        let mut rng = rand::thread_rng();
        let polynomial = ElectionPolynomial::generate(&group, &mut rng, 3);

        assert_eq!(polynomial.threshold(), 3);
        assert_eq!(polynomial.coordinate(&group, 0), *polynomial.secret());

        for commitment in polynomial.commitments() {
            assert!(commitment.proof.is_valid(&group));
        }

        for index in 1..5 {
            let coordinate = polynomial.coordinate(&group, index);
            assert!(verify_polynomial_coordinate(
                &group,
                &coordinate,
                index,
                polynomial.commitments()
            ));
            let wrong = group.add_q(&coordinate, &group.q_from_u64(1));
            assert!(!verify_polynomial_coordinate(
                &group,
                &wrong,
                index,
                polynomial.commitments()
            ));
        }
    }

    #[test]
    fn test_horner_matches_naive() {
        let group = Group::reduced();
        let mut rng = rand::thread_rng();
        let polynomial = ElectionPolynomial::generate(&group, &mut rng, 4);

        let x = group.q_from_u64(7);
        let mut naive = group.zero_q();
        let mut power = group.q_from_u64(1);
        for coefficient in &polynomial.coefficients {
            naive = group.add_q(&naive, &group.mul_q(coefficient, &power));
            power = group.mul_q(&power, &x);
        }
        assert_eq!(polynomial.coordinate(&group, 7), naive);
    }

    #[quickcheck]
    fn quickcheck_interpolation(threshold: u8, offset: u8) -> TestResult {
        let threshold = threshold as u32;
        if threshold < 1 || threshold > 6 {
            return TestResult::discard();
        }
        let group = Group::reduced();
        let mut rng = rand::thread_rng();
        let polynomial = ElectionPolynomial::generate(&group, &mut rng, threshold);

        // Any `threshold` distinct indices reconstruct P(0)
        let indices: Vec<u32> = (0..threshold).map(|i| 1 + offset as u32 + 2 * i).collect();
        let mut secret = group.zero_q();
        for &index in &indices {
            let w = lagrange_coefficient(&group, index, &indices);
            let y = polynomial.coordinate(&group, index);
            secret = group.add_q(&secret, &group.mul_q(&w, &y));
        }
        TestResult::from_bool(&secret == polynomial.secret())
    }
}
