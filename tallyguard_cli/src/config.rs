use std::env::var;
use std::str::FromStr;
use tallyguard::{Group, ServiceConfig, DEFAULT_DLOG_CAP};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be `standard` or `reduced`, got `{1}`")]
    UnknownGroup(&'static str, String),

    #[error("{0} is not a valid number: `{1}`")]
    NotANumber(&'static str, String),

    #[error("{0} must be `true` or `false`, got `{1}`")]
    NotABool(&'static str, String),

    #[error("threshold {threshold} is invalid for {trustees} trustees")]
    InvalidThreshold { threshold: u32, trustees: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupChoice {
    Standard,
    Reduced,
}

impl FromStr for GroupChoice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(GroupChoice::Standard),
            "reduced" => Ok(GroupChoice::Reduced),
            other => Err(ConfigError::UnknownGroup("TALLYGUARD_GROUP", other.to_owned())),
        }
    }
}

pub struct Config {
    pub group: GroupChoice,
    pub dlog_cap: u64,
    pub trustees: u32,
    pub threshold: u32,
    pub voters: u32,
    pub automated_trustee: bool,
    pub log: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            group: GroupChoice::Reduced,
            dlog_cap: DEFAULT_DLOG_CAP,
            trustees: 3,
            threshold: 2,
            voters: 10,
            automated_trustee: false,
            log: "info".to_owned(),
        }
    }
}

fn number<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Ok(val) => val.parse().map_err(|_| ConfigError::NotANumber(name, val)),
        Err(_e) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let group = match var("TALLYGUARD_GROUP") {
            Ok(val) => val.parse()?,
            Err(_e) => defaults.group,
        };

        let automated_trustee = match var("TALLYGUARD_AUTOMATED_TRUSTEE") {
            Ok(val) => match val.as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(ConfigError::NotABool("TALLYGUARD_AUTOMATED_TRUSTEE", val)),
            },
            Err(_e) => defaults.automated_trustee,
        };

        let log = var("TALLYGUARD_LOG").unwrap_or(defaults.log);

        Ok(Config {
            group,
            dlog_cap: number("TALLYGUARD_DLOG_CAP", defaults.dlog_cap)?,
            trustees: number("TALLYGUARD_TRUSTEES", defaults.trustees)?,
            threshold: number("TALLYGUARD_THRESHOLD", defaults.threshold)?,
            voters: number("TALLYGUARD_VOTERS", defaults.voters)?,
            automated_trustee,
            log,
        })
    }

    /// Apply any flags given on the command line over the environment.
    pub fn override_with(mut self, matches: &clap::ArgMatches) -> Result<Self, ConfigError> {
        if let Some(val) = matches.value_of("group") {
            self.group = val.parse()?;
        }
        if let Some(val) = matches.value_of("trustees") {
            self.trustees = val
                .parse()
                .map_err(|_| ConfigError::NotANumber("--trustees", val.to_owned()))?;
        }
        if let Some(val) = matches.value_of("threshold") {
            self.threshold = val
                .parse()
                .map_err(|_| ConfigError::NotANumber("--threshold", val.to_owned()))?;
        }
        if let Some(val) = matches.value_of("voters") {
            self.voters = val
                .parse()
                .map_err(|_| ConfigError::NotANumber("--voters", val.to_owned()))?;
        }
        if matches.is_present("automated-trustee") {
            self.automated_trustee = true;
        }
        Ok(self)
    }

    /// Total trustees including the automated one.
    pub fn trustee_count(&self) -> u32 {
        self.trustees + self.automated_trustee as u32
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.trustee_count();
        if self.threshold == 0 || self.threshold > n {
            return Err(ConfigError::InvalidThreshold {
                threshold: self.threshold,
                trustees: n,
            });
        }
        Ok(())
    }

    pub fn group(&self) -> Group {
        match self.group {
            GroupChoice::Standard => Group::standard(),
            GroupChoice::Reduced => Group::reduced(),
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            group: self.group(),
            dlog_cap: self.dlog_cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_choice() {
        assert_eq!("reduced".parse::<GroupChoice>().unwrap(), GroupChoice::Reduced);
        assert_eq!("standard".parse::<GroupChoice>().unwrap(), GroupChoice::Standard);
        assert!("tiny".parse::<GroupChoice>().is_err());
    }

    #[test]
    fn test_threshold_counts_automated_trustee() {
        let mut config = Config {
            trustees: 2,
            threshold: 3,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        config.automated_trustee = true;
        assert!(config.validate().is_ok());
    }
}
