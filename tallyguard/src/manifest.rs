use crate::*;
use std::collections::HashSet;

const PLACEHOLDER_TITLE: &str = "placeholder";

/// One selectable option, real or placeholder.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OptionDescription {
    pub object_id: String,
    pub sequence: u32,
    pub title: String,
    pub placeholder: bool,
}

impl OptionDescription {
    fn new(contest_id: &str, sequence: u32, title: &str, placeholder: bool) -> Self {
        OptionDescription {
            object_id: selection_id(contest_id, sequence, title),
            sequence,
            title: title.to_string(),
            placeholder,
        }
    }

    pub fn crypto_hash(&self, group: &Group) -> ElementModQ {
        hash_elems(
            group,
            &[
                (&self.object_id).into(),
                self.sequence.into(),
                (&self.title).into(),
            ],
        )
    }
}

/// A contest: real options followed by `max` placeholders.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContestDescription {
    pub object_id: String,
    pub sequence: u32,
    pub title: String,
    /// Maximum number of selections a voter may make.
    pub max: u32,
    options: Vec<OptionDescription>,
}

impl ContestDescription {
    pub fn new<S: AsRef<str>>(
        object_id: &str,
        sequence: u32,
        title: &str,
        max: u32,
        option_titles: &[S],
    ) -> Result<Self, Error> {
        if option_titles.is_empty() {
            return Err(Error::InvalidManifest(format!(
                "contest {} has no options",
                object_id
            )));
        }
        if max == 0 || max as usize > option_titles.len() {
            return Err(Error::InvalidManifest(format!(
                "contest {} allows {} selections over {} options",
                object_id,
                max,
                option_titles.len()
            )));
        }

        let real = option_titles.len() as u32;
        let mut options: Vec<OptionDescription> = option_titles
            .iter()
            .enumerate()
            .map(|(seq, title)| {
                OptionDescription::new(object_id, seq as u32, title.as_ref(), false)
            })
            .collect();
        for seq in real..real + max {
            options.push(OptionDescription::new(object_id, seq, PLACEHOLDER_TITLE, true));
        }

        Ok(ContestDescription {
            object_id: object_id.to_string(),
            sequence,
            title: title.to_string(),
            max,
            options,
        })
    }

    /// Every option a ballot must carry, placeholders last.
    pub fn all_options(&self) -> &[OptionDescription] {
        &self.options
    }

    pub fn real_options(&self) -> impl Iterator<Item = &OptionDescription> {
        self.options.iter().filter(|o| !o.placeholder)
    }

    pub fn num_real_options(&self) -> usize {
        self.real_options().count()
    }

    pub fn crypto_hash(&self, group: &Group) -> ElementModQ {
        let option_hashes: Vec<ElementModQ> =
            self.options.iter().map(|o| o.crypto_hash(group)).collect();
        hash_elems(
            group,
            &[
                (&self.object_id).into(),
                self.sequence.into(),
                (&self.title).into(),
                self.max.into(),
                option_hashes.iter().collect::<Vec<_>>().into(),
            ],
        )
    }
}

/// The static ballot shape of an election.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub contests: Vec<ContestDescription>,
}

impl Manifest {
    pub fn new(contests: Vec<ContestDescription>) -> Result<Self, Error> {
        let manifest = Manifest { contests };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Non-empty, with unique contest and option ids.
    pub fn validate(&self) -> Result<(), Error> {
        if self.contests.is_empty() {
            return Err(Error::InvalidManifest("no contests".into()));
        }
        let mut contest_ids = HashSet::new();
        for contest in &self.contests {
            if !contest_ids.insert(&contest.object_id) {
                return Err(Error::InvalidManifest(format!(
                    "duplicate contest {}",
                    contest.object_id
                )));
            }
            let placeholders = contest.options.len() - contest.num_real_options();
            if contest.max == 0
                || placeholders != contest.max as usize
                || contest.num_real_options() < contest.max as usize
            {
                return Err(Error::InvalidManifest(format!(
                    "contest {} is not padded with {} placeholders",
                    contest.object_id, contest.max
                )));
            }
            let mut option_ids = HashSet::new();
            for option in &contest.options {
                if !option_ids.insert(&option.object_id) {
                    return Err(Error::InvalidManifest(format!(
                        "duplicate option {} in contest {}",
                        option.object_id, contest.object_id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn contest(&self, contest_id: &str) -> Result<&ContestDescription, Error> {
        self.contests
            .iter()
            .find(|c| c.object_id == contest_id)
            .ok_or_else(|| Error::SelectionNotFound(contest_id.to_string()))
    }

    pub fn crypto_hash(&self, group: &Group) -> ElementModQ {
        let contest_hashes: Vec<ElementModQ> =
            self.contests.iter().map(|c| c.crypto_hash(group)).collect();
        hash_elems(group, &[contest_hashes.iter().collect::<Vec<_>>().into()])
    }
}

/// `{contestId}-{sequence}-{title}` with spaces replaced by dashes.
pub fn selection_id(contest_id: &str, sequence: u32, title: &str) -> String {
    format!("{}-{}-{}", contest_id, sequence, title).replace(' ', "-")
}
