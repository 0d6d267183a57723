use crate::*;
use num_enum::TryFromPrimitive;

/// Election phases, in order. Phase PP is skipped when every trustee decrypts.
#[derive(
    Serialize,
    Deserialize,
    TryFromPrimitive,
    Copy,
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Phase {
    AuxKeys = 0,
    Epkb = 1,
    KeyCeremonyFinished = 2,
    Open = 3,
    PDecryption = 4,
    PpDecryption = 5,
    Done = 6,
}

impl Phase {
    pub fn can_transition_to(self, target: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, target),
            (AuxKeys, Epkb)
                | (Epkb, KeyCeremonyFinished)
                | (KeyCeremonyFinished, Open)
                | (Open, PDecryption)
                | (PDecryption, PpDecryption)
                | (PDecryption, Done)
                | (PpDecryption, Done)
        )
    }

    fn resets_waiting(self) -> bool {
        matches!(
            self,
            Phase::AuxKeys | Phase::Epkb | Phase::PDecryption | Phase::PpDecryption
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Phase::AuxKeys => "AUX_KEYS",
            Phase::Epkb => "EPKB",
            Phase::KeyCeremonyFinished => "KEYCEREMONY_FINISHED",
            Phase::Open => "OPEN",
            Phase::PDecryption => "P_DECRYPTION",
            Phase::PpDecryption => "PP_DECRYPTION",
            Phase::Done => "DONE",
        };
        write!(f, "{}", name)
    }
}

/// Drives phase transitions and runs their entry effects.
///
/// A transition is applied to a copy of the election state and only committed if its
/// guard holds and every entry effect succeeds, automated trustee duties included.
pub struct Lifecycle<'a> {
    group: &'a Group,
    dlog: &'a DiscreteLog,
}

impl<'a> Lifecycle<'a> {
    pub fn new(group: &'a Group, dlog: &'a DiscreteLog) -> Self {
        Lifecycle { group, dlog }
    }

    /// Move `state` to `target`, or fail leaving it untouched.
    pub fn test_and_set(
        &self,
        state: &mut ElectionState,
        target: Phase,
        now: u64,
    ) -> Result<(), Error> {
        let from = state.phase();
        if !from.can_transition_to(target) {
            return Err(Error::IllegalTransition { from, to: target });
        }
        check_guard(state, target, now)?;

        let mut working = state.clone();
        working.election.phase = target;
        if target.resets_waiting() {
            working.reset_waiting();
        }
        if let Err(e) = self.enter(&mut working, from, target, now) {
            tracing::warn!(
                election = %state.id(),
                %from,
                to = %target,
                error = %e,
                "transition aborted"
            );
            return Err(e);
        }

        *state = working;
        tracing::info!(election = %state.id(), %from, to = %target, "phase transition");
        Ok(())
    }

    /// Close voting if the end time has passed. Returns whether the phase changed.
    pub fn observe_closing(&self, state: &mut ElectionState, now: u64) -> Result<bool, Error> {
        if state.phase() == Phase::Open && now >= state.election.end_time {
            tracing::info!(
                election = %state.id(),
                end_time = state.election.end_time,
                "voting closed"
            );
            self.test_and_set(state, Phase::PDecryption, now)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn enter(
        &self,
        state: &mut ElectionState,
        from: Phase,
        target: Phase,
        now: u64,
    ) -> Result<(), Error> {
        let group = self.group;
        match target {
            Phase::AuxKeys => Ok(()),
            Phase::Epkb => with_automated(state, |bot, state| {
                let request = state.key_ceremony_request(bot.index())?;
                let submission = bot.key_ceremony(&request)?;
                state.accept_key_ceremony(group, submission)
            }),
            Phase::KeyCeremonyFinished => {
                state.finish_key_ceremony(group)?;
                with_automated(state, |bot, state| {
                    bot.receive_backups(&state.backup_delivery(bot.index())?)
                })
            }
            Phase::Open => {
                state.election.start_time = Some(now);
                Ok(())
            }
            Phase::PDecryption => {
                state.snapshot_targets(group)?;
                for trustee in &mut state.trustees {
                    trustee.available = false;
                    trustee.lagrange_coefficient = None;
                }
                with_automated(state, |bot, state| {
                    let submission = bot.partial_decrypt(&state.decryption_request(bot.index())?)?;
                    state.accept_partial_decryption(group, submission)
                })
            }
            Phase::PpDecryption => {
                state.update_lagrange_coefficients(group);
                for trustee in &mut state.trustees {
                    trustee.waiting = !trustee.available;
                }
                with_automated(state, |bot, state| {
                    let submission = bot.compensate(&state.compensation_request(bot.index())?)?;
                    state.accept_compensation(group, submission)
                })
            }
            Phase::Done => {
                if from == Phase::PpDecryption {
                    state.update_lagrange_coefficients(group);
                }
                state.decrypt(group, self.dlog)
            }
        }
    }
}

fn refused(to: Phase, reason: String) -> Error {
    Error::TransitionRefused { to, reason }
}

fn check_guard(state: &ElectionState, target: Phase, now: u64) -> Result<(), Error> {
    let n = state.election.trustee_count;
    let t = state.election.threshold;
    match target {
        Phase::AuxKeys => Ok(()),
        Phase::Epkb => match state.trustees.iter().find(|r| r.aux_public_key.is_none()) {
            Some(r) => Err(refused(target, format!("trustee {} has no auxiliary key", r.index))),
            None => Ok(()),
        },
        Phase::KeyCeremonyFinished => {
            match state.trustees.iter().find(|r| r.commitments.is_empty()) {
                Some(r) => Err(refused(target, format!("trustee {} has not submitted", r.index))),
                None => Ok(()),
            }
        }
        Phase::Open => {
            if state.election.end_time <= now {
                return Err(refused(target, "end time has already passed".into()));
            }
            Ok(())
        }
        Phase::PDecryption => Ok(()),
        Phase::PpDecryption => {
            let available = state.available().len() as u32;
            if available < t {
                return Err(Error::NotEnoughTrustees {
                    needed: t,
                    available,
                });
            }
            if available == n {
                return Err(refused(target, "no trustee is missing".into()));
            }
            Ok(())
        }
        Phase::Done => match state.phase() {
            Phase::PDecryption => {
                let available = state.available().len() as u32;
                if available < n {
                    return Err(refused(
                        target,
                        format!("{} of {} trustees decrypted", available, n),
                    ));
                }
                Ok(())
            }
            _ => match state
                .trustees
                .iter()
                .find(|r| r.available && !r.waiting)
            {
                Some(r) => Err(refused(
                    target,
                    format!("trustee {} has not compensated", r.index),
                )),
                None => Ok(()),
            },
        },
    }
}

/// Run `duty` with the automated trustee, if the election has one.
fn with_automated<F>(state: &mut ElectionState, duty: F) -> Result<(), Error>
where
    F: FnOnce(&mut AutomatedTrustee, &mut ElectionState) -> Result<(), Error>,
{
    match state.automated.take() {
        Some(mut bot) => {
            let outcome = duty(&mut bot, state);
            state.automated = Some(bot);
            outcome
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn test_legal_transitions() {
        use Phase::*;
        let order = [AuxKeys, Epkb, KeyCeremonyFinished, Open, PDecryption, PpDecryption, Done];
        for window in order.windows(2) {
            assert!(window[0].can_transition_to(window[1]));
            assert!(!window[1].can_transition_to(window[0]));
        }
        assert!(PDecryption.can_transition_to(Done));
        assert!(!Open.can_transition_to(Done));
        assert!(!AuxKeys.can_transition_to(Open));
        assert!(!Done.can_transition_to(AuxKeys));
    }

    #[test]
    fn test_phase_code() {
        assert_eq!(Phase::try_from(3u8).unwrap(), Phase::Open);
        assert_eq!(Phase::PpDecryption as u8, 5);
        assert!(Phase::try_from(7u8).is_err());
        assert_eq!(Phase::KeyCeremonyFinished.to_string(), "KEYCEREMONY_FINISHED");
    }
}
