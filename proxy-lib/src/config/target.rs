use std::num::NonZeroU32;

use rama::http::Uri;
use serde::{Deserialize, Serialize, Serializer};

use super::ValidationError;

pub const DEFAULT_TARGET_URL: &str = "https://jsonplaceholder.typicode.com/todos/1";
const DEFAULT_USER_COUNT: u32 = 10;
const DEFAULT_SPAWN_RATE: u32 = 2;

/// Where proxied traffic goes and how the load driver shapes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetConfig {
    #[serde(serialize_with = "serialize_uri")]
    target_url: Uri,
    #[serde(rename = "users")]
    user_count: NonZeroU32,
    spawn_rate: NonZeroU32,
}

impl TargetConfig {
    pub fn try_new(
        target_url: &str,
        user_count: u32,
        spawn_rate: u32,
    ) -> Result<Self, ValidationError> {
        let target_url = parse_target_url(target_url)?;
        let user_count =
            NonZeroU32::new(user_count).ok_or(ValidationError::NotPositive { field: "users" })?;
        let spawn_rate = NonZeroU32::new(spawn_rate)
            .ok_or(ValidationError::NotPositive { field: "spawn_rate" })?;
        Ok(Self {
            target_url,
            user_count,
            spawn_rate,
        })
    }

    pub fn target_url(&self) -> &Uri {
        &self.target_url
    }

    pub fn user_count(&self) -> u32 {
        self.user_count.get()
    }

    pub fn spawn_rate(&self) -> u32 {
        self.spawn_rate.get()
    }
}

/// Target config as received over the wire, prior to validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetConfigInput {
    pub target_url: String,
    pub users: u32,
    pub spawn_rate: u32,
}

impl Default for TargetConfigInput {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_owned(),
            users: DEFAULT_USER_COUNT,
            spawn_rate: DEFAULT_SPAWN_RATE,
        }
    }
}

impl TryFrom<TargetConfigInput> for TargetConfig {
    type Error = ValidationError;

    fn try_from(input: TargetConfigInput) -> Result<Self, Self::Error> {
        Self::try_new(&input.target_url, input.users, input.spawn_rate)
    }
}

fn parse_target_url(value: &str) -> Result<Uri, ValidationError> {
    let invalid = |reason| ValidationError::InvalidUrl {
        value: value.to_owned(),
        reason,
    };

    let uri: Uri = value.trim().parse().map_err(|_| invalid("malformed url"))?;

    match uri.scheme_str() {
        Some(scheme) if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") => {}
        Some(_) => return Err(invalid("scheme must be http or https")),
        None => return Err(invalid("url must be absolute")),
    }

    match uri.host() {
        Some(host) if !host.is_empty() => Ok(uri),
        _ => Err(invalid("url is missing a host")),
    }
}

fn serialize_uri<S>(uri: &Uri, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(uri)
}
