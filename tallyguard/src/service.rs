use crate::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::MutexGuard;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// The authenticated identity behind a request, as established by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identity: String,
}

impl Caller {
    pub fn new<S: Into<String>>(identity: S) -> Self {
        Caller {
            identity: identity.into(),
        }
    }
}

/// Seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        ManualClock(AtomicU64::new(now))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub group: Group,
    /// Largest count the decryptor will search for.
    pub dlog_cap: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            group: Group::standard(),
            dlog_cap: DEFAULT_DLOG_CAP,
        }
    }
}

/// Entry points for every election operation.
///
/// Requests are stateless; each one locks the election it touches for its whole duration.
/// Operations that voting closure affects check the closing time first.
pub struct ElectionService<S: Store = MemStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
    group: Group,
    dlog: DiscreteLog,
}

impl<S: Store, C: Clock> ElectionService<S, C> {
    pub fn new(config: ServiceConfig, store: S, clock: C) -> Self {
        let dlog = DiscreteLog::new(&config.group, config.dlog_cap);
        ElectionService {
            store,
            clock,
            group: config.group,
            dlog,
        }
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(&self.group, &self.dlog)
    }

    fn with_election<T, F>(&self, id: Uuid, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut ElectionState) -> Result<T, Error>,
    {
        let shared = self.store.get_election(id)?;
        // A panic mid-request never commits a half-applied transition
        let mut state: MutexGuard<ElectionState> =
            shared.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn require_authority(state: &ElectionState, caller: &Caller) -> Result<(), Error> {
        if state.election.authority != caller.identity {
            return Err(Error::Unauthorized(caller.identity.clone()));
        }
        Ok(())
    }

    pub fn create_election(&self, caller: &Caller, setup: ElectionSetup) -> Result<Uuid, Error> {
        if setup.authority != caller.identity {
            return Err(Error::Unauthorized(caller.identity.clone()));
        }
        let state = ElectionState::new(&self.group, setup)?;
        let id = state.id();
        tracing::info!(
            election = %id,
            trustees = state.election.trustee_count,
            threshold = state.election.threshold,
            automated = state.automated.is_some(),
            "election created"
        );
        self.store.insert(state);
        Ok(id)
    }

    /// Request a phase transition. Only the election authority may.
    pub fn transition(&self, caller: &Caller, id: Uuid, target: Phase) -> Result<Phase, Error> {
        let now = self.clock.now();
        self.with_election(id, |state| {
            Self::require_authority(state, caller)?;
            self.lifecycle().test_and_set(state, target, now)?;
            Ok(state.phase())
        })
    }

    /// Close voting if its end time has passed.
    pub fn observe_closing(&self, id: Uuid) -> Result<bool, Error> {
        let now = self.clock.now();
        self.with_election(id, |state| self.lifecycle().observe_closing(state, now))
    }

    pub fn submit_aux_key(
        &self,
        caller: &Caller,
        id: Uuid,
        key: AuxPublicKey,
    ) -> Result<u32, Error> {
        self.with_election(id, |state| {
            let index = state.trustee_for(&caller.identity)?;
            state.accept_aux_key(index, key)?;
            Ok(index)
        })
    }

    pub fn key_ceremony_request(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> Result<KeyCeremonyRequest, Error> {
        self.with_election(id, |state| {
            let index = state.trustee_for(&caller.identity)?;
            state.key_ceremony_request(index)
        })
    }

    pub fn submit_key_ceremony(
        &self,
        caller: &Caller,
        id: Uuid,
        submission: KeyCeremonySubmission,
    ) -> Result<(), Error> {
        self.with_election(id, |state| {
            Self::require_trustee(state, caller, submission.trustee_index)?;
            state.accept_key_ceremony(&self.group, submission)
        })
    }

    pub fn backup_delivery(&self, caller: &Caller, id: Uuid) -> Result<BackupDelivery, Error> {
        self.with_election(id, |state| {
            let index = state.trustee_for(&caller.identity)?;
            state.backup_delivery(index)
        })
    }

    /// Verify and chain a ballot. It is stored spoiled until the voter confirms it.
    pub fn submit_ballot(
        &self,
        caller: &Caller,
        id: Uuid,
        submission: BallotSubmission,
    ) -> Result<BallotReceipt, Error> {
        let now = self.clock.now();
        self.with_election(id, |state| {
            self.lifecycle().observe_closing(state, now)?;
            state.accept_ballot(&self.group, &caller.identity, submission, now)
        })
    }

    /// Cast the ballot a voter was given `tracking_code` for.
    pub fn confirm_ballot(
        &self,
        caller: &Caller,
        id: Uuid,
        tracking_code: &TrackingCode,
    ) -> Result<(), Error> {
        let now = self.clock.now();
        self.with_election(id, |state| {
            self.lifecycle().observe_closing(state, now)?;
            state.confirm_ballot(&caller.identity, tracking_code)
        })
    }

    pub fn decryption_request(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> Result<DecryptionRequest, Error> {
        let now = self.clock.now();
        self.with_election(id, |state| {
            self.lifecycle().observe_closing(state, now)?;
            let index = state.trustee_for(&caller.identity)?;
            state.decryption_request(index)
        })
    }

    pub fn submit_partial_decryption(
        &self,
        caller: &Caller,
        id: Uuid,
        submission: DecryptionSubmission,
    ) -> Result<(), Error> {
        let now = self.clock.now();
        self.with_election(id, |state| {
            self.lifecycle().observe_closing(state, now)?;
            Self::require_trustee(state, caller, submission.trustee_index)?;
            state.accept_partial_decryption(&self.group, submission)
        })
    }

    pub fn compensation_request(
        &self,
        caller: &Caller,
        id: Uuid,
    ) -> Result<CompensationRequest, Error> {
        self.with_election(id, |state| {
            let index = state.trustee_for(&caller.identity)?;
            state.compensation_request(index)
        })
    }

    pub fn submit_compensation(
        &self,
        caller: &Caller,
        id: Uuid,
        submission: CompensationSubmission,
    ) -> Result<(), Error> {
        self.with_election(id, |state| {
            Self::require_trustee(state, caller, submission.trustee_index)?;
            state.accept_compensation(&self.group, submission)
        })
    }

    /// The public election record. Never changes the phase.
    pub fn election(&self, id: Uuid) -> Result<Election, Error> {
        self.with_election(id, |state| Ok(state.election.clone()))
    }

    pub fn result(&self, id: Uuid) -> Result<ElectionResult, Error> {
        self.with_election(id, |state| {
            state.require_phase(Phase::Done)?;
            state
                .result
                .clone()
                .ok_or_else(|| Error::MissingShare("election result".into()))
        })
    }

    pub fn tracking_log(&self, id: Uuid) -> Result<TrackingLog, Error> {
        self.with_election(id, |state| state.tracking_log())
    }

    fn require_trustee(state: &ElectionState, caller: &Caller, index: u32) -> Result<(), Error> {
        if state.trustee_for(&caller.identity)? != index {
            return Err(Error::Unauthorized(caller.identity.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(10);
        clock.advance(5);
        assert_eq!(clock.now(), 15);
        clock.set(3);
        assert_eq!(clock.now(), 3);
    }

    #[test]
    fn test_unknown_election() {
        let service = ElectionService::new(
            ServiceConfig {
                group: Group::reduced(),
                dlog_cap: 10,
            },
            MemStore::new(),
            ManualClock::new(0),
        );
        let err = service.election(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
