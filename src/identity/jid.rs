use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Length of the hashed part of a user id; anything after it is the resource
pub const USER_HASH_LEN: usize = 40;

/// Network address of an authenticated participant: `user@host/resource`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    user: Option<String>,
    host: String,
    resource: Option<String>,
}

impl Jid {
    /// Build a JID from its parts. User and host are case-folded, the
    /// resource is kept verbatim.
    pub fn new(user: Option<&str>, host: &str, resource: Option<&str>) -> Result<Self> {
        let invalid = || {
            let mut s = String::new();
            if let Some(u) = user {
                s.push_str(u);
                s.push('@');
            }
            s.push_str(host);
            if let Some(r) = resource {
                s.push('/');
                s.push_str(r);
            }
            Error::InvalidJid(s)
        };

        if host.is_empty() || host.contains(['@', '/']) || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        if let Some(u) = user {
            if u.is_empty() || u.contains(['@', '/']) || u.contains(char::is_whitespace) {
                return Err(invalid());
            }
        }
        if resource.is_some_and(str::is_empty) {
            return Err(invalid());
        }

        Ok(Self {
            user: user.map(str::to_lowercase),
            host: host.to_lowercase(),
            resource: resource.map(str::to_string),
        })
    }

    /// Parse the textual form `[user@]host[/resource]`
    pub fn parse(input: &str) -> Result<Self> {
        let (bare, resource) = match input.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (input, None),
        };

        let (user, host) = match bare.split_once('@') {
            Some((user, host)) => (Some(user), host),
            None => (None, bare),
        };

        Self::new(user, host, resource).map_err(|_| Error::InvalidJid(input.to_string()))
    }

    /// Build a JID from a user id (40-char user hash + optional resource)
    pub fn from_userid(userid: &str, host: &str) -> Result<Self> {
        let (user, resource) = split_userid(userid)?;
        Self::new(Some(user), host, resource)
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Same address without the resource
    pub fn bare(&self) -> Self {
        Self {
            user: self.user.clone(),
            host: self.host.clone(),
            resource: None,
        }
    }

    /// User and resource as separate parts
    pub fn userid_parts(&self) -> (Option<&str>, Option<&str>) {
        (self.user(), self.resource())
    }

    /// User and resource concatenated back into a single user id
    pub fn to_userid(&self) -> String {
        let mut userid = self.user.clone().unwrap_or_default();
        if let Some(resource) = &self.resource {
            userid.push_str(resource);
        }
        userid
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.host)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{}", resource)?;
        }
        Ok(())
    }
}

impl FromStr for Jid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Jid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

/// Split a user id into its user hash and resource
pub fn split_userid(userid: &str) -> Result<(&str, Option<&str>)> {
    let user = userid
        .get(..USER_HASH_LEN)
        .ok_or_else(|| Error::InvalidJid(userid.to_string()))?;
    let resource = &userid[USER_HASH_LEN..];

    Ok((user, (!resource.is_empty()).then_some(resource)))
}

/// Address of a server component, e.g. `c2s.example.com`
pub fn component_jid(host: &str, component: &str) -> String {
    format!("{}.{}", component, host)
}
