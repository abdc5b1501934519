use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Serialize;

use crate::tower::ExtraVars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    User,
    Group,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Group => "group",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(EntityType::User),
            "group" => Ok(EntityType::Group),
            other => Err(format!("'{other}' is neither 'user' nor 'group'")),
        }
    }
}

/// One RACF lookup: which profile, on which z/OS host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RacfQuery {
    pub host: String,
    pub entity_type: EntityType,
    pub entity_name: String,
}

impl RacfQuery {
    pub fn extra_vars(&self) -> ExtraVars {
        ExtraVars {
            host: self.host.clone(),
            entity_type: self.entity_type,
            entity_name: self.entity_name.clone(),
        }
    }

    pub fn humanize_prompt(&self, racf_output: &str) -> String {
        format!(
            "The following information is about a {} from a z/OS server. \
             Please provide this information to the user in a natural language format: {}",
            self.entity_type, racf_output
        )
    }
}
