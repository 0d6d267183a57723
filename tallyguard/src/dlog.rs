use crate::*;
use std::collections::HashMap;
use std::sync::Mutex;

/// Largest plaintext the decryptor will search for.
pub const DEFAULT_DLOG_CAP: u64 = 200_000;

/// Bounded discrete log in base `g`.
///
/// Powers of `g` are memoised as the search walks upward, so repeated lookups of small
/// vote counts are hash-map hits. The walk never goes past `cap`: a target that is not
/// `g^0..=g^cap` is an error, never a guess.
pub struct DiscreteLog {
    group: Group,
    cap: u64,
    table: Mutex<PowerTable>,
}

struct PowerTable {
    powers: HashMap<ElementModP, u64>,
    last: ElementModP,
    last_exp: u64,
}

impl DiscreteLog {
    pub fn new(group: &Group, cap: u64) -> Self {
        let one = group.one_p();
        let mut powers = HashMap::new();
        powers.insert(one.clone(), 0);
        DiscreteLog {
            group: group.clone(),
            cap,
            table: Mutex::new(PowerTable {
                powers,
                last: one,
                last_exp: 0,
            }),
        }
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// Find `m` with `g^m == target` and `m <= cap`.
    pub fn solve(&self, target: &ElementModP) -> Result<u64, Error> {
        // A poisoned table is still a valid prefix of powers
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(exp) = table.powers.get(target) {
            return Ok(*exp);
        }

        let g = self.group.generator();
        while table.last_exp < self.cap {
            let next = self.group.mul_p(&table.last, &g);
            table.last_exp += 1;
            let exp = table.last_exp;
            table.powers.insert(next.clone(), exp);
            table.last = next;
            if &table.last == target {
                return Ok(exp);
            }
        }

        Err(Error::DiscreteLogExhausted(self.cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dlog_cap() {
        let group = Group::reduced();
        let dlog = DiscreteLog::new(&group, 50);

        let at_cap = group.g_pow(&group.q_from_u64(50));
        let above_cap = group.g_pow(&group.q_from_u64(51));

        assert_eq!(dlog.solve(&at_cap).unwrap(), 50);
        match dlog.solve(&above_cap) {
            Err(Error::DiscreteLogExhausted(50)) => {}
            other => panic!("expected exhaustion, got {:?}", other),
        }

        // Memoised lookups agree with a fresh walk
        assert_eq!(dlog.solve(&group.g_pow(&group.q_from_u64(7))).unwrap(), 7);
        assert_eq!(dlog.solve(&group.one_p()).unwrap(), 0);
    }

    #[test]
    fn test_dlog_default_cap() {
        let group = Group::reduced();
        let dlog = DiscreteLog::new(&group, DEFAULT_DLOG_CAP);
        let target = group.g_pow(&group.q_from_u64(1234));
        assert_eq!(dlog.solve(&target).unwrap(), 1234);
    }
}
